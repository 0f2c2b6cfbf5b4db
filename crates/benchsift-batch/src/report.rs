//! Per-candidate records and the aggregate batch report.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

use benchsift_core::{
    BenchsiftError, EligibilityVerdict, PullRequestCandidate, RegressionResult, RegressionVerdict,
    VerdictStatus,
};
use benchsift_judge::JudgeScore;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Everything decided about one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    /// PR number.
    pub number: u64,
    /// PR title.
    pub title: String,
    /// Author login.
    pub author: String,
    /// Merge time.
    pub merged_at: DateTime<Utc>,
    /// Pre-fix commit.
    pub base_sha: String,
    /// Post-fix commit.
    pub head_sha: String,
    /// Final status after eligibility and, when it ran, the oracle.
    pub status: VerdictStatus,
    /// Stable code for a rejection; absent when accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    /// Human-readable detail for the final status.
    pub message: String,
    /// Verdict of the eligibility chain alone.
    pub eligibility: EligibilityVerdict,
    /// Oracle result, when the candidate reached the oracle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regression: Option<RegressionResult>,
    /// Judge scores by category; `None` where the judge gave no usable reply.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub judge: BTreeMap<String, Option<JudgeScore>>,
}

impl CandidateRecord {
    /// Combine the eligibility verdict and optional oracle result.
    ///
    /// An oracle skip leaves the candidate accepted but unverified; an
    /// invalid or errored oracle result rejects it with the oracle code.
    pub fn new(
        candidate: &PullRequestCandidate,
        eligibility: EligibilityVerdict,
        regression: Option<RegressionResult>,
    ) -> Self {
        let (status, reason_code, message) = match (&eligibility, &regression) {
            (v, _) if !v.is_accepted() => (
                VerdictStatus::Rejected,
                v.reason().map(|r| r.as_str().to_string()),
                v.message().to_string(),
            ),
            (_, Some(r)) if matches!(r.verdict, RegressionVerdict::Invalid | RegressionVerdict::Error) => (
                VerdictStatus::Rejected,
                r.code.map(|c| c.as_str().to_string()),
                r.detail.clone().unwrap_or_default(),
            ),
            (_, Some(r)) if r.is_valid() => (
                VerdictStatus::Accepted,
                None,
                format!("valid (F2P: {}, P2P: {})", r.f2p.len(), r.p2p.len()),
            ),
            (v, _) => (VerdictStatus::Accepted, None, v.message().to_string()),
        };
        Self {
            number: candidate.number,
            title: candidate.title.clone(),
            author: candidate.author.login.clone(),
            merged_at: candidate.merged_at,
            base_sha: candidate.base_sha.clone(),
            head_sha: candidate.head_sha.clone(),
            status,
            reason_code,
            message,
            eligibility,
            regression,
            judge: BTreeMap::new(),
        }
    }

    /// Whether the candidate ends up accepted.
    pub fn is_accepted(&self) -> bool {
        self.status == VerdictStatus::Accepted
    }

    /// Whether the oracle confirmed the candidate.
    pub fn is_verified(&self) -> bool {
        self.regression.as_ref().is_some_and(RegressionResult::is_valid)
    }
}

/// Count and share of one rejection reason.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReasonCount {
    /// Rejections with this reason.
    pub count: usize,
    /// Share of all rejections, in percent, rounded to one decimal.
    pub percentage: f64,
}

/// Aggregate result of one batch run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// `owner/repo` of the evaluated repository.
    pub repository: String,
    /// Forge the candidates came from.
    pub forge: String,
    /// Language profile used for classification.
    pub language: String,
    /// When the report was built.
    pub generated_at: DateTime<Utc>,
    /// Candidates evaluated.
    pub total_prs: usize,
    /// Candidates accepted, verified or not.
    pub accepted: usize,
    /// Candidates rejected by a filter or the oracle.
    pub rejected: usize,
    /// Accepted candidates the oracle confirmed.
    pub verified: usize,
    /// `accepted / total_prs`, rounded to three decimals.
    pub acceptance_rate: f64,
    /// Rejections per stable reason code.
    pub rejection_breakdown: BTreeMap<String, ReasonCount>,
    /// Why the oracle did not run, when it was skipped for the whole batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle_skipped_reason: Option<String>,
    /// Every candidate, sorted by PR number.
    pub records: Vec<CandidateRecord>,
}

impl BatchReport {
    /// Aggregate `records` into a report.
    ///
    /// The result depends only on the set of records, not on their order.
    ///
    /// # Examples
    ///
    /// ```
    /// use benchsift_batch::BatchReport;
    ///
    /// let report = BatchReport::from_records("psf/requests", "github", "Python", vec![], None);
    /// assert_eq!(report.total_prs, 0);
    /// assert_eq!(report.acceptance_rate, 0.0);
    /// ```
    pub fn from_records(
        repository: impl Into<String>,
        forge: impl Into<String>,
        language: impl Into<String>,
        mut records: Vec<CandidateRecord>,
        oracle_skipped_reason: Option<String>,
    ) -> Self {
        records.sort_by_key(|r| r.number);

        let total_prs = records.len();
        let accepted = records.iter().filter(|r| r.is_accepted()).count();
        let rejected = total_prs - accepted;
        let verified = records.iter().filter(|r| r.is_verified()).count();

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for record in records.iter().filter(|r| !r.is_accepted()) {
            let code = record.reason_code.clone().unwrap_or_else(|| "unknown".into());
            *counts.entry(code).or_default() += 1;
        }
        let rejection_breakdown = counts
            .into_iter()
            .map(|(code, count)| {
                let percentage = round_to(count as f64 / rejected as f64 * 100.0, 1);
                (code, ReasonCount { count, percentage })
            })
            .collect();

        let acceptance_rate = if total_prs == 0 {
            0.0
        } else {
            round_to(accepted as f64 / total_prs as f64, 3)
        };

        Self {
            repository: repository.into(),
            forge: forge.into(),
            language: language.into(),
            generated_at: Utc::now(),
            total_prs,
            accepted,
            rejected,
            verified,
            acceptance_rate,
            rejection_breakdown,
            oracle_skipped_reason,
            records,
        }
    }

    /// Records of accepted candidates.
    pub fn accepted_records(&self) -> impl Iterator<Item = &CandidateRecord> {
        self.records.iter().filter(|r| r.is_accepted())
    }

    /// Write the whole report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Io`] or [`BenchsiftError::Serialization`].
    pub fn write_json(&self, path: &Path) -> Result<(), BenchsiftError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Write one JSON object per candidate, one per line.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Io`] or [`BenchsiftError::Serialization`].
    pub fn write_records_jsonl(&self, path: &Path) -> Result<(), BenchsiftError> {
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        for record in &self.records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchsift_core::{Author, OracleCode, RejectionReason, TestId};

    fn candidate(number: u64) -> PullRequestCandidate {
        PullRequestCandidate {
            number,
            title: format!("PR {number}"),
            body: String::new(),
            author: Author {
                login: "alice".into(),
                is_bot: false,
            },
            created_at: Utc::now(),
            merged_at: Utc::now(),
            base_sha: "a".into(),
            head_sha: "b".into(),
            files: vec![],
            linked_issues: vec![],
        }
    }

    fn valid() -> RegressionResult {
        let mut r = RegressionResult::skipped(OracleCode::NoTestRunner, "");
        r.verdict = RegressionVerdict::Valid;
        r.code = None;
        r.detail = None;
        r.f2p.insert(TestId::new("t.py", "a"));
        r.p2p.insert(TestId::new("t.py", "b"));
        r
    }

    fn invalid_f2p() -> RegressionResult {
        let mut r = RegressionResult::error(OracleCode::EmptyF2p, "No F2P tests found");
        r.verdict = RegressionVerdict::Invalid;
        r
    }

    #[test]
    fn oracle_rejections_join_the_breakdown() {
        let records = vec![
            CandidateRecord::new(
                &candidate(3),
                EligibilityVerdict::rejected(RejectionReason::BotPr, "bot"),
                None,
            ),
            CandidateRecord::new(&candidate(1), EligibilityVerdict::accepted(), Some(valid())),
            CandidateRecord::new(&candidate(2), EligibilityVerdict::accepted(), Some(invalid_f2p())),
            CandidateRecord::new(
                &candidate(4),
                EligibilityVerdict::rejected(RejectionReason::BotPr, "bot"),
                None,
            ),
        ];
        let report = BatchReport::from_records("o/r", "github", "Python", records, None);

        assert_eq!(report.records.iter().map(|r| r.number).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!((report.total_prs, report.accepted, report.rejected), (4, 1, 3));
        assert_eq!(report.verified, 1);
        assert_eq!(report.acceptance_rate, 0.25);
        assert_eq!(report.rejection_breakdown["bot_pr"].count, 2);
        assert_eq!(report.rejection_breakdown["bot_pr"].percentage, 66.7);
        assert_eq!(report.rejection_breakdown["empty_f2p"].percentage, 33.3);
    }

    #[test]
    fn skipped_oracle_keeps_candidate_accepted() {
        let skipped = RegressionResult::skipped(OracleCode::RunnerUnavailable, "no python");
        let record = CandidateRecord::new(&candidate(9), EligibilityVerdict::accepted(), Some(skipped));
        assert!(record.is_accepted());
        assert!(!record.is_verified());
        assert_eq!(record.reason_code, None);
    }

    #[test]
    fn oracle_error_rejects_with_its_code() {
        let timeout = RegressionResult::error(OracleCode::OracleTimeout, "exceeded 600s");
        let record = CandidateRecord::new(&candidate(5), EligibilityVerdict::accepted(), Some(timeout));
        assert_eq!(record.status, VerdictStatus::Rejected);
        assert_eq!(record.reason_code.as_deref(), Some("oracle_timeout"));
        assert_eq!(record.message, "exceeded 600s");
    }

    #[test]
    fn report_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            CandidateRecord::new(&candidate(1), EligibilityVerdict::accepted(), None),
            CandidateRecord::new(
                &candidate(2),
                EligibilityVerdict::rejected(RejectionReason::MergeDate, "too old"),
                None,
            ),
        ];
        let report = BatchReport::from_records("o/r", "github", "Python", records, Some("no runner".into()));

        let json_path = dir.path().join("report.json");
        report.write_json(&json_path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["totalPrs"], 2);
        assert_eq!(json["oracleSkippedReason"], "no runner");
        assert_eq!(json["records"][1]["reasonCode"], "merge_date");

        let lines_path = dir.path().join("records.jsonl");
        report.write_records_jsonl(&lines_path).unwrap();
        let text = std::fs::read_to_string(&lines_path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
