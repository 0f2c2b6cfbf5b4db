use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A merged pull request under evaluation, normalized across forges.
///
/// Candidates are built per fetched page and dropped once their verdict
/// has been recorded.
///
/// # Examples
///
/// ```
/// use benchsift_core::{Author, PullRequestCandidate};
/// use chrono::Utc;
///
/// let pr = PullRequestCandidate {
///     number: 42,
///     title: "Fix overflow in parser".into(),
///     body: String::new(),
///     author: Author { login: "alice".into(), is_bot: false },
///     created_at: Utc::now(),
///     merged_at: Utc::now(),
///     base_sha: "aaa".into(),
///     head_sha: "bbb".into(),
///     files: vec![],
///     linked_issues: vec![],
/// };
/// assert!(pr.has_distinct_commits());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestCandidate {
    /// Forge-assigned PR number.
    pub number: u64,
    /// PR title.
    pub title: String,
    /// PR description (empty when the forge returns none).
    pub body: String,
    /// Who opened the PR.
    pub author: Author,
    /// When the PR was opened.
    pub created_at: DateTime<Utc>,
    /// When the PR was merged.
    pub merged_at: DateTime<Utc>,
    /// Pre-fix commit.
    pub base_sha: String,
    /// Post-fix commit.
    pub head_sha: String,
    /// Files touched by the PR.
    pub files: Vec<ChangedFile>,
    /// Issues the PR references or closes.
    pub linked_issues: Vec<LinkedIssue>,
}

impl PullRequestCandidate {
    /// Whether the pre-fix and post-fix commits differ.
    pub fn has_distinct_commits(&self) -> bool {
        !self.base_sha.is_empty() && !self.head_sha.is_empty() && self.base_sha != self.head_sha
    }
}

/// PR author as reported by the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    /// Login or display name.
    pub login: String,
    /// Whether the forge itself flags the account as a bot.
    pub is_bot: bool,
}

/// A single file touched by a pull request.
///
/// # Examples
///
/// ```
/// use benchsift_core::{ChangeKind, ChangedFile};
///
/// let file = ChangedFile {
///     path: "tests/test_parser.py".into(),
///     change: ChangeKind::Added,
///     additions: 30,
///     deletions: 0,
/// };
/// assert_eq!(file.change.to_string(), "added");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedFile {
    /// Path at the head commit (the new path for renames).
    pub path: String,
    /// Kind of change.
    pub change: ChangeKind,
    /// Lines added.
    pub additions: u64,
    /// Lines removed.
    pub deletions: u64,
}

/// How a file changed between base and head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// File exists only at head.
    Added,
    /// File exists at both commits.
    Modified,
    /// File exists only at base.
    Deleted,
}

impl ChangeKind {
    /// Map a forge change label (`ADDED`, `removed`, `RENAMED`, ...) to a kind.
    ///
    /// Renames and copies count as modifications of the head path.
    ///
    /// # Examples
    ///
    /// ```
    /// use benchsift_core::ChangeKind;
    ///
    /// assert_eq!(ChangeKind::from_forge("ADDED"), ChangeKind::Added);
    /// assert_eq!(ChangeKind::from_forge("removed"), ChangeKind::Deleted);
    /// assert_eq!(ChangeKind::from_forge("RENAMED"), ChangeKind::Modified);
    /// ```
    pub fn from_forge(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "added" => ChangeKind::Added,
            "deleted" | "removed" => ChangeKind::Deleted,
            _ => ChangeKind::Modified,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// An issue referenced by a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedIssue {
    /// Issue number.
    pub number: u64,
    /// Issue title.
    pub title: String,
    /// Issue body.
    pub body: String,
    /// Lower-cased forge state (`open`, `closed`, `resolved`, ...).
    pub state: String,
    /// Whether the "issue" is itself a pull request.
    pub is_pull_request: bool,
}

impl LinkedIssue {
    /// Whether the forge reports the issue as closed.
    pub fn is_closed(&self) -> bool {
        self.state.eq_ignore_ascii_case("closed")
    }
}

/// Why the eligibility chain rejected a candidate.
///
/// Serialized as stable snake_case codes used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Authored by a bot account.
    BotPr,
    /// Merged before the configured cutoff.
    MergeDate,
    /// Title or body failed the English heuristic.
    ContentNotInEnglish,
    /// The best linked issue is itself a pull request.
    IssueIsAPr,
    /// The best linked issue is still open.
    IssueIsNotClosed,
    /// Linked issue body is outside the word-count band.
    IssueWordCount,
    /// Too few test files.
    FewerThanMinTestFiles,
    /// Too many non-test files.
    MoreThanMaxNonTestFiles,
    /// Too few files overall.
    DifficultyNotHard,
    /// Too many test files.
    TooManyTestFiles,
    /// Too many non-data files.
    TooManyChangedFiles,
    /// No diff could be retrieved.
    FullPatchRetrieval,
    /// Tests live inside source files.
    EmbeddedTests,
    /// Too few changed source lines.
    CodeChangesNotSufficient,
    /// A filter failed unexpectedly.
    PrProcessingError,
}

impl RejectionReason {
    /// The stable reason code.
    ///
    /// # Examples
    ///
    /// ```
    /// use benchsift_core::RejectionReason;
    ///
    /// assert_eq!(RejectionReason::FewerThanMinTestFiles.as_str(), "fewer_than_min_test_files");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::BotPr => "bot_pr",
            RejectionReason::MergeDate => "merge_date",
            RejectionReason::ContentNotInEnglish => "content_not_in_english",
            RejectionReason::IssueIsAPr => "issue_is_a_pr",
            RejectionReason::IssueIsNotClosed => "issue_is_not_closed",
            RejectionReason::IssueWordCount => "issue_word_count",
            RejectionReason::FewerThanMinTestFiles => "fewer_than_min_test_files",
            RejectionReason::MoreThanMaxNonTestFiles => "more_than_max_non_test_files",
            RejectionReason::DifficultyNotHard => "difficulty_not_hard",
            RejectionReason::TooManyTestFiles => "too_many_test_files",
            RejectionReason::TooManyChangedFiles => "too_many_changed_files",
            RejectionReason::FullPatchRetrieval => "full_patch_retrieval",
            RejectionReason::EmbeddedTests => "embedded_tests",
            RejectionReason::CodeChangesNotSufficient => "code_changes_not_sufficient",
            RejectionReason::PrProcessingError => "pr_processing_error",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accept / reject status of an eligibility verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    /// Passed every filter.
    Accepted,
    /// Stopped by the first failing filter.
    Rejected,
}

/// Outcome of the eligibility chain for one candidate.
///
/// Fields are private so a verdict cannot be edited after the chain
/// produced it. A rejected verdict always carries exactly one reason.
///
/// # Examples
///
/// ```
/// use benchsift_core::{EligibilityVerdict, RejectionReason, VerdictStatus};
///
/// let v = EligibilityVerdict::rejected(RejectionReason::BotPr, "PR is from bot account: dependabot");
/// assert_eq!(v.status(), VerdictStatus::Rejected);
/// assert_eq!(v.reason(), Some(RejectionReason::BotPr));
///
/// let ok = EligibilityVerdict::accepted();
/// assert!(ok.is_accepted());
/// assert_eq!(ok.reason(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityVerdict {
    status: VerdictStatus,
    reason_code: Option<RejectionReason>,
    message: String,
}

impl EligibilityVerdict {
    /// A verdict for a candidate that passed every filter.
    pub fn accepted() -> Self {
        Self {
            status: VerdictStatus::Accepted,
            reason_code: None,
            message: "accepted".into(),
        }
    }

    /// A verdict for a candidate stopped by a filter.
    pub fn rejected(reason: RejectionReason, message: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Rejected,
            reason_code: Some(reason),
            message: message.into(),
        }
    }

    /// Accepted or rejected.
    pub fn status(&self) -> VerdictStatus {
        self.status
    }

    /// Whether the candidate was accepted.
    pub fn is_accepted(&self) -> bool {
        self.status == VerdictStatus::Accepted
    }

    /// The rejection reason, if rejected.
    pub fn reason(&self) -> Option<RejectionReason> {
        self.reason_code
    }

    /// Human-readable detail.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Which side of the change a test run observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Checkout {
    /// Pre-fix commit.
    Base,
    /// Post-fix commit.
    Head,
}

impl fmt::Display for Checkout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkout::Base => write!(f, "base"),
            Checkout::Head => write!(f, "head"),
        }
    }
}

/// Identity of a single test: the file it lives in and its name.
///
/// Identities are compared literally, so a renamed test is a new identity.
///
/// # Examples
///
/// ```
/// use benchsift_core::TestId;
///
/// let id = TestId::new("tests/test_api.py", "test_login");
/// assert_eq!(id.to_string(), "tests/test_api.py::test_login");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TestId {
    /// File (or test target) containing the test.
    pub file: String,
    /// Test name within the file.
    pub name: String,
}

impl TestId {
    /// Build an identity from its parts.
    pub fn new(file: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.file, self.name)
    }
}

/// Result of one test in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Assertions held.
    Pass,
    /// An assertion failed.
    Fail,
    /// The test could not be collected or set up (import error, fixture crash).
    Error,
    /// Skipped or ignored.
    Skip,
}

/// One test's status at one checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Which test.
    pub id: TestId,
    /// How it ended.
    pub status: TestStatus,
    /// Which commit it ran against.
    pub checkout: Checkout,
}

/// Overall regression-oracle verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegressionVerdict {
    /// At least one F2P and one P2P test.
    Valid,
    /// Ran cleanly but the tests do not form an oracle.
    Invalid,
    /// No usable runner; the candidate stays accepted but unverified.
    Skipped,
    /// Checkout, execution, restore or timeout failure.
    Error,
}

/// Machine-readable reason attached to a non-valid regression result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleCode {
    /// No fail-to-pass test.
    EmptyF2p,
    /// No pass-to-pass test.
    EmptyP2p,
    /// Could not check out base or head.
    CheckoutFailed,
    /// The suite crashed at head or the runner could not be spawned.
    TestExecutionError,
    /// The per-candidate budget ran out.
    OracleTimeout,
    /// The working tree could not be put back on its original ref.
    RestoreFailed,
    /// No runner matches the project markers.
    NoTestRunner,
    /// A runner matched but its toolchain is not usable.
    RunnerUnavailable,
}

impl OracleCode {
    /// The stable reason code.
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleCode::EmptyF2p => "empty_f2p",
            OracleCode::EmptyP2p => "empty_p2p",
            OracleCode::CheckoutFailed => "checkout_failed",
            OracleCode::TestExecutionError => "test_execution_error",
            OracleCode::OracleTimeout => "oracle_timeout",
            OracleCode::RestoreFailed => "restore_failed",
            OracleCode::NoTestRunner => "no_test_runner",
            OracleCode::RunnerUnavailable => "runner_unavailable",
        }
    }
}

impl fmt::Display for OracleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the regression oracle concluded for an accepted candidate.
///
/// # Examples
///
/// ```
/// use benchsift_core::{OracleCode, RegressionResult, RegressionVerdict};
///
/// let skipped = RegressionResult::skipped(OracleCode::NoTestRunner, "no runner for Haskell");
/// assert_eq!(skipped.verdict, RegressionVerdict::Skipped);
/// assert!(skipped.f2p.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionResult {
    /// Overall verdict.
    pub verdict: RegressionVerdict,
    /// Why the verdict is not `valid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<OracleCode>,
    /// Fail-to-pass tests.
    pub f2p: BTreeSet<TestId>,
    /// Pass-to-pass tests.
    pub p2p: BTreeSet<TestId>,
    /// Tests excluded because they errored at either checkout.
    pub errored: BTreeSet<TestId>,
    /// Error or skip detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RegressionResult {
    /// A skip: no runner could be used.
    pub fn skipped(code: OracleCode, detail: impl Into<String>) -> Self {
        Self {
            verdict: RegressionVerdict::Skipped,
            code: Some(code),
            f2p: BTreeSet::new(),
            p2p: BTreeSet::new(),
            errored: BTreeSet::new(),
            detail: Some(detail.into()),
        }
    }

    /// An infrastructure failure.
    pub fn error(code: OracleCode, detail: impl Into<String>) -> Self {
        Self {
            verdict: RegressionVerdict::Error,
            code: Some(code),
            f2p: BTreeSet::new(),
            p2p: BTreeSet::new(),
            errored: BTreeSet::new(),
            detail: Some(detail.into()),
        }
    }

    /// Whether the candidate's tests form a valid oracle.
    pub fn is_valid(&self) -> bool {
        self.verdict == RegressionVerdict::Valid
    }
}
