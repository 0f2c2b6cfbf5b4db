//! The candidate evaluation loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use benchsift_core::{
    BenchsiftConfig, EligibilityVerdict, LanguageProfile, PullRequestCandidate, RejectionReason,
};
use benchsift_eligibility::{FilterChain, PatchRetriever};
use benchsift_forge::{CandidatePage, Forge};
use benchsift_git::{GitBackend, WorkingTree};
use benchsift_judge::Judge;
use benchsift_oracle::{RegressionOracle, RunnerRegistry};
use futures::stream::{self, Stream, StreamExt};
use futures::FutureExt;
use indicatif::ProgressBar;

use crate::report::{BatchReport, CandidateRecord};

/// What the regression oracle needs besides the language profile, which is
/// only known once the first page arrives.
pub struct OracleSetup {
    /// The clone the oracle checks out.
    pub tree: Arc<WorkingTree>,
    /// Git access for PR-ref fetches.
    pub git: Arc<dyn GitBackend>,
    /// Runners to choose from.
    pub registry: RunnerRegistry,
}

/// Pages through merged PRs and evaluates each one.
///
/// Candidates are evaluated by a bounded pool of `batch.workers` concurrent
/// tasks. Oracle runs share one working tree and are serialized by its lease.
pub struct BatchEvaluator {
    config: BenchsiftConfig,
    repository: String,
    forge: Arc<dyn Forge>,
    retriever: Arc<PatchRetriever>,
    oracle: Option<OracleSetup>,
    judge: Option<Judge>,
    progress: Option<ProgressBar>,
}

impl BatchEvaluator {
    /// An evaluator without oracle or judge.
    pub fn new(
        config: BenchsiftConfig,
        repository: impl Into<String>,
        forge: Arc<dyn Forge>,
        retriever: Arc<PatchRetriever>,
    ) -> Self {
        Self {
            config,
            repository: repository.into(),
            forge,
            retriever,
            oracle: None,
            judge: None,
            progress: None,
        }
    }

    /// Verify accepted candidates with the regression oracle.
    ///
    /// Ignored when `oracle.enabled` is false.
    pub fn with_oracle(mut self, setup: OracleSetup) -> Self {
        self.oracle = Some(setup);
        self
    }

    /// Score accepted candidates with `judge`.
    pub fn with_judge(mut self, judge: Judge) -> Self {
        self.judge = Some(judge);
        self
    }

    /// Report progress on `bar`.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Evaluate up to `max_prs` merged PRs (all of them when `None`).
    ///
    /// Pages are fetched lazily and their candidates flow straight into the
    /// worker pool, so only the pages in flight are held in memory. Never
    /// fails as a whole: a page that cannot be fetched ends pagination, and
    /// per-candidate failures, panics included, become rejections.
    pub async fn run(&self, max_prs: Option<usize>) -> BatchReport {
        let limit = max_prs.filter(|&n| n > 0).unwrap_or(usize::MAX);
        let first = self.fetch_page(None).await;
        let forge_language = first.as_ref().and_then(|p| p.primary_language.clone());
        let profile = self
            .config
            .profile_for(forge_language.as_deref().unwrap_or("Unknown"));
        let (first_candidates, next_cursor) = match first {
            Some(page) if !page.candidates.is_empty() => (page.candidates, page.next_cursor),
            _ => (Vec::new(), None),
        };
        tracing::info!(repo = %self.repository, language = %profile.name, "evaluating candidates");

        let chain = FilterChain::standard(
            self.config.filters.clone(),
            profile.clone(),
            self.retriever.clone(),
        );
        let oracle = self.build_oracle(&profile);

        if let Some(bar) = &self.progress {
            bar.set_length(first_candidates.len().min(limit) as u64);
        }
        let workers = self.config.batch.workers.max(1);
        let records: Vec<CandidateRecord> = stream::iter(first_candidates)
            .chain(self.later_pages(next_cursor))
            .take(limit)
            .map(|candidate| self.evaluate_isolated(&chain, oracle.as_ref(), candidate))
            .buffer_unordered(workers)
            .collect()
            .await;
        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }

        let mut oracle_skipped_reason = None;
        if let Some(oracle) = &oracle {
            if records.iter().any(|r| r.eligibility.is_accepted()) {
                if let Err(skip) = oracle.runner().await {
                    tracing::warn!(reason = ?skip.detail, "regression oracle skipped");
                    oracle_skipped_reason = skip.detail;
                }
            }
        }

        BatchReport::from_records(
            self.repository.clone(),
            self.forge.kind().to_string(),
            profile.name,
            records,
            oracle_skipped_reason,
        )
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Option<CandidatePage> {
        match self.forge.fetch_page(cursor, self.config.forge.page_size).await {
            Ok(page) => Some(page),
            Err(e) => {
                tracing::warn!(repo = %self.repository, cursor = ?cursor, error = %e, "failed to fetch PR page");
                None
            }
        }
    }

    /// Candidates from the pages after the first, fetched on demand.
    fn later_pages(
        &self,
        cursor: Option<String>,
    ) -> impl Stream<Item = PullRequestCandidate> + '_ {
        stream::unfold(cursor, move |cursor| async move {
            let cursor = cursor?;
            let page = self.fetch_page(Some(&cursor)).await?;
            if page.candidates.is_empty() {
                return None;
            }
            if let Some(bar) = &self.progress {
                bar.inc_length(page.candidates.len() as u64);
            }
            Some((stream::iter(page.candidates), page.next_cursor))
        })
        .flatten()
    }

    fn build_oracle(&self, profile: &LanguageProfile) -> Option<RegressionOracle> {
        if !self.config.oracle.enabled {
            return None;
        }
        let setup = self.oracle.as_ref()?;
        Some(RegressionOracle::new(
            setup.tree.clone(),
            setup.git.clone(),
            setup.registry.clone(),
            profile.clone(),
            self.config.oracle.budget(),
        ))
    }

    /// [`Self::evaluate`], with a panic turned into a rejection for this
    /// candidate alone.
    async fn evaluate_isolated(
        &self,
        chain: &FilterChain,
        oracle: Option<&RegressionOracle>,
        candidate: PullRequestCandidate,
    ) -> CandidateRecord {
        let fallback = candidate.clone();
        match AssertUnwindSafe(self.evaluate(chain, oracle, candidate))
            .catch_unwind()
            .await
        {
            Ok(record) => record,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(pr = fallback.number, panic = %message, "candidate evaluation panicked");
                if let Some(bar) = &self.progress {
                    bar.inc(1);
                }
                let verdict = EligibilityVerdict::rejected(
                    RejectionReason::PrProcessingError,
                    format!("Exception during processing: {message}"),
                );
                CandidateRecord::new(&fallback, verdict, None)
            }
        }
    }

    async fn evaluate(
        &self,
        chain: &FilterChain,
        oracle: Option<&RegressionOracle>,
        mut candidate: PullRequestCandidate,
    ) -> CandidateRecord {
        if candidate.linked_issues.is_empty() {
            self.resolve_issue_refs(&mut candidate).await;
        }

        let verdict = if candidate.has_distinct_commits() {
            chain.evaluate(&candidate).await
        } else {
            EligibilityVerdict::rejected(
                RejectionReason::PrProcessingError,
                "Exception during processing: base and head commits are missing or identical",
            )
        };

        let regression = match oracle {
            Some(oracle) if verdict.is_accepted() => Some(oracle.verify(&candidate).await),
            _ => None,
        };

        let mut record = CandidateRecord::new(&candidate, verdict, regression);
        if let Some(judge) = &self.judge {
            if record.is_accepted() && (record.is_verified() || oracle.is_none()) {
                match self
                    .retriever
                    .retrieve(&candidate.base_sha, &candidate.head_sha, Some(candidate.number))
                    .await
                {
                    Ok(diff) => record.judge = judge.score_all(&candidate, &diff).await,
                    Err(e) => {
                        tracing::warn!(pr = candidate.number, error = %e, "diff unavailable for judging");
                    }
                }
            }
        }

        tracing::info!(
            pr = record.number,
            status = ?record.status,
            reason = record.reason_code.as_deref().unwrap_or("-"),
            "{}",
            record.message
        );
        if let Some(bar) = &self.progress {
            bar.inc(1);
            bar.set_message(format!("PR #{}", record.number));
        }
        record
    }

    /// Fill linked issues from `#N` references and issue URLs in the body.
    async fn resolve_issue_refs(&self, candidate: &mut PullRequestCandidate) {
        for number in self.forge.extract_issue_refs(&candidate.body) {
            if number == candidate.number {
                continue;
            }
            match self.forge.fetch_issue(number).await {
                Ok(Some(issue)) => candidate.linked_issues.push(issue),
                Ok(None) => {
                    tracing::debug!(pr = candidate.number, issue = number, "referenced issue not found");
                }
                Err(e) => {
                    tracing::warn!(pr = candidate.number, issue = number, error = %e, "failed to fetch referenced issue");
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with a non-string payload".into())
}
