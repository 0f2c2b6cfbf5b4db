//! The individual eligibility predicates.
//!
//! Each filter is a small object over a shared read-only [`FilterContext`].
//! Filters never mutate the candidate; the diff is cached in the context so
//! it is fetched once, by the first filter that asks for it.

use async_trait::async_trait;
use benchsift_core::{
    BenchsiftError, FilterConfig, LanguageProfile, LinkedIssue, PullRequestCandidate,
    RejectionReason,
};
use benchsift_difflens::classify::{FileClassifier, FileShape};
use benchsift_difflens::parser::parse_unified_diff;
use benchsift_difflens::volume::measure;
use benchsift_forge::refs::is_bot_login;
use tokio::sync::OnceCell;

use crate::english::{is_english, word_count};
use crate::patch::PatchRetriever;

/// What one filter decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Move on to the next filter.
    Pass,
    /// Stop the chain.
    Reject {
        /// Stable reason code.
        reason: RejectionReason,
        /// Human-readable detail.
        message: String,
    },
}

impl FilterOutcome {
    fn reject(reason: RejectionReason, message: impl Into<String>) -> Self {
        FilterOutcome::Reject {
            reason,
            message: message.into(),
        }
    }
}

/// Everything a filter may look at for one candidate.
pub struct FilterContext<'a> {
    /// The candidate under evaluation.
    pub candidate: &'a PullRequestCandidate,
    /// Thresholds.
    pub config: &'a FilterConfig,
    /// Classification rules for the repository language.
    pub profile: &'a LanguageProfile,
    /// Compiled form of `profile`.
    pub classifier: &'a FileClassifier,
    retriever: &'a PatchRetriever,
    diff: OnceCell<String>,
}

impl<'a> FilterContext<'a> {
    /// Context for `candidate`.
    pub fn new(
        candidate: &'a PullRequestCandidate,
        config: &'a FilterConfig,
        profile: &'a LanguageProfile,
        classifier: &'a FileClassifier,
        retriever: &'a PatchRetriever,
    ) -> Self {
        Self {
            candidate,
            config,
            profile,
            classifier,
            retriever,
            diff: OnceCell::new(),
        }
    }

    /// File counts for the candidate.
    pub fn shape(&self) -> FileShape {
        self.classifier.shape(&self.candidate.files)
    }

    /// The candidate's diff, retrieved on first use.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::PatchUnavailable`] when no tier produced a diff.
    pub async fn diff(&self) -> Result<&str, BenchsiftError> {
        let c = self.candidate;
        self.diff
            .get_or_try_init(|| {
                self.retriever
                    .retrieve(&c.base_sha, &c.head_sha, Some(c.number))
            })
            .await
            .map(String::as_str)
    }
}

/// One predicate in the chain.
#[async_trait]
pub trait EligibilityFilter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Decide for one candidate.
    ///
    /// An `Err` is reported as `pr_processing_error` by the chain.
    async fn check(&self, ctx: &FilterContext<'_>) -> Result<FilterOutcome, BenchsiftError>;
}

/// Rejects PRs authored by automation accounts.
pub struct BotAuthor;

#[async_trait]
impl EligibilityFilter for BotAuthor {
    fn name(&self) -> &'static str {
        "bot_author"
    }

    async fn check(&self, ctx: &FilterContext<'_>) -> Result<FilterOutcome, BenchsiftError> {
        let author = &ctx.candidate.author;
        if author.is_bot || is_bot_login(&author.login) {
            return Ok(FilterOutcome::reject(
                RejectionReason::BotPr,
                format!("PR is from bot account: {}", author.login),
            ));
        }
        Ok(FilterOutcome::Pass)
    }
}

/// Rejects PRs merged before the configured cutoff.
pub struct MergeDate;

#[async_trait]
impl EligibilityFilter for MergeDate {
    fn name(&self) -> &'static str {
        "merge_date"
    }

    async fn check(&self, ctx: &FilterContext<'_>) -> Result<FilterOutcome, BenchsiftError> {
        let merged = ctx.candidate.merged_at;
        match ctx.config.merged_after {
            Some(cutoff) if merged < cutoff => Ok(FilterOutcome::reject(
                RejectionReason::MergeDate,
                format!(
                    "PR merged {} before start date {}",
                    merged.date_naive(),
                    cutoff.date_naive()
                ),
            )),
            _ => Ok(FilterOutcome::Pass),
        }
    }
}

/// Rejects PRs whose title or body does not look like English.
pub struct EnglishContent;

#[async_trait]
impl EligibilityFilter for EnglishContent {
    fn name(&self) -> &'static str {
        "english_content"
    }

    async fn check(&self, ctx: &FilterContext<'_>) -> Result<FilterOutcome, BenchsiftError> {
        let threshold = ctx.config.english_threshold;
        let c = ctx.candidate;
        if is_english(&c.title, threshold) && is_english(&c.body, threshold) {
            return Ok(FilterOutcome::Pass);
        }
        Ok(FilterOutcome::reject(
            RejectionReason::ContentNotInEnglish,
            "Content may not be in English",
        ))
    }
}

/// Requires one linked issue to be a closed, well-described issue.
///
/// Candidates without linked issues pass. When none qualifies, the most
/// specific failure across all issues is reported: a PR posing as an
/// issue, then an open issue, then a body outside the word band.
pub struct LinkedIssues;

impl LinkedIssues {
    fn failure(issue: &LinkedIssue, config: &FilterConfig) -> Option<(RejectionReason, String)> {
        if issue.is_pull_request {
            return Some((
                RejectionReason::IssueIsAPr,
                format!("Linked issue #{} is a Pull Request", issue.number),
            ));
        }
        if !issue.is_closed() {
            return Some((
                RejectionReason::IssueIsNotClosed,
                format!(
                    "Linked issue #{} is not closed (state: {})",
                    issue.number, issue.state
                ),
            ));
        }
        let words = word_count(&issue.body);
        if words < config.min_issue_words || words > config.max_issue_words {
            return Some((
                RejectionReason::IssueWordCount,
                format!(
                    "Issue #{} word count ({words}) is outside {}-{} range",
                    issue.number, config.min_issue_words, config.max_issue_words
                ),
            ));
        }
        None
    }
}

#[async_trait]
impl EligibilityFilter for LinkedIssues {
    fn name(&self) -> &'static str {
        "linked_issues"
    }

    async fn check(&self, ctx: &FilterContext<'_>) -> Result<FilterOutcome, BenchsiftError> {
        let mut worst: Option<(RejectionReason, String)> = None;
        for issue in &ctx.candidate.linked_issues {
            let Some(failure) = Self::failure(issue, ctx.config) else {
                return Ok(FilterOutcome::Pass);
            };
            // Lower reason codes are more specific.
            if worst.as_ref().map_or(true, |(reason, _)| failure.0 < *reason) {
                worst = Some(failure);
            }
        }
        Ok(match worst {
            Some((reason, message)) => FilterOutcome::Reject { reason, message },
            None => FilterOutcome::Pass,
        })
    }
}

/// Which file-count bound a [`FileShapeRule`] enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeBound {
    /// At least `min_test_files` test files.
    MinTestFiles,
    /// At most `max_non_test_files` non-test files.
    MaxNonTestFiles,
    /// At least `min_total_files` test plus non-test files.
    MinTotalFiles,
    /// At most `max_test_files` test files.
    MaxTestFiles,
    /// At most `max_code_files` files that are not data files.
    MaxCodeFiles,
}

/// One file-count bound.
pub struct FileShapeRule(pub ShapeBound);

#[async_trait]
impl EligibilityFilter for FileShapeRule {
    fn name(&self) -> &'static str {
        match self.0 {
            ShapeBound::MinTestFiles => "min_test_files",
            ShapeBound::MaxNonTestFiles => "max_non_test_files",
            ShapeBound::MinTotalFiles => "min_total_files",
            ShapeBound::MaxTestFiles => "max_test_files",
            ShapeBound::MaxCodeFiles => "max_code_files",
        }
    }

    async fn check(&self, ctx: &FilterContext<'_>) -> Result<FilterOutcome, BenchsiftError> {
        let shape = ctx.shape();
        let cfg = ctx.config;
        let outcome = match self.0 {
            ShapeBound::MinTestFiles if shape.test_files < cfg.min_test_files => {
                FilterOutcome::reject(
                    RejectionReason::FewerThanMinTestFiles,
                    format!("PR has fewer than {} test files", cfg.min_test_files),
                )
            }
            ShapeBound::MaxNonTestFiles if shape.source_files > cfg.max_non_test_files => {
                FilterOutcome::reject(
                    RejectionReason::MoreThanMaxNonTestFiles,
                    format!("PR has more than {} non-test files", cfg.max_non_test_files),
                )
            }
            ShapeBound::MinTotalFiles if shape.total() < cfg.min_total_files => {
                FilterOutcome::reject(
                    RejectionReason::DifficultyNotHard,
                    format!(
                        "PR has {} files, fewer than {} (difficulty not hard enough)",
                        shape.total(),
                        cfg.min_total_files
                    ),
                )
            }
            ShapeBound::MaxTestFiles if shape.test_files > cfg.max_test_files => {
                FilterOutcome::reject(
                    RejectionReason::TooManyTestFiles,
                    format!("PR has more than {} test files", cfg.max_test_files),
                )
            }
            ShapeBound::MaxCodeFiles if shape.code_files > cfg.max_code_files => {
                FilterOutcome::reject(
                    RejectionReason::TooManyChangedFiles,
                    format!("PR has more than {} changed code files", cfg.max_code_files),
                )
            }
            _ => FilterOutcome::Pass,
        };
        Ok(outcome)
    }
}

/// Retrieves the diff, rejects embedded tests and too little source change.
pub struct PatchVolume;

#[async_trait]
impl EligibilityFilter for PatchVolume {
    fn name(&self) -> &'static str {
        "patch_volume"
    }

    async fn check(&self, ctx: &FilterContext<'_>) -> Result<FilterOutcome, BenchsiftError> {
        let diff = match ctx.diff().await {
            Ok(diff) => diff,
            Err(BenchsiftError::PatchUnavailable { .. }) => {
                return Ok(FilterOutcome::reject(
                    RejectionReason::FullPatchRetrieval,
                    "Could not retrieve full patch",
                ))
            }
            Err(e) => return Err(e),
        };

        let files = parse_unified_diff(diff)?;
        let volume = measure(&files, ctx.classifier, ctx.profile);
        if volume.has_embedded_tests() {
            return Ok(FilterOutcome::reject(
                RejectionReason::EmbeddedTests,
                format!(
                    "{} files contain embedded tests: {}",
                    ctx.profile.name,
                    volume.embedded_test_files.join(", ")
                ),
            ));
        }
        if volume.source_lines < ctx.config.min_code_changes {
            return Ok(FilterOutcome::reject(
                RejectionReason::CodeChangesNotSufficient,
                format!(
                    "Code changes {} below {}",
                    volume.source_lines, ctx.config.min_code_changes
                ),
            ));
        }
        Ok(FilterOutcome::Pass)
    }
}
