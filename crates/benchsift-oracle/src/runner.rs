//! The test-runner capability.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use benchsift_core::{BenchsiftError, Checkout, TestOutcome, TestStatus};
use serde::Serialize;

/// How a suite run ended as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SuiteStatus {
    /// The runner found nothing to run.
    NoTestsCollected,
    /// The runner itself failed (build error, internal error, bad usage).
    Crashed {
        /// Tail of the runner output.
        detail: String,
    },
    /// Tests ran.
    Ran {
        /// Passing tests.
        passed: usize,
        /// Failing or erroring tests.
        failed: usize,
    },
}

/// Structured result of one runner invocation at one checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Per-test outcomes.
    pub outcomes: Vec<TestOutcome>,
    /// Files (or packages) that failed to load, so none of their tests ran.
    pub collection_errors: BTreeSet<String>,
    /// Overall status.
    pub status: SuiteStatus,
}

impl RunReport {
    /// A report for a run that had nothing to execute.
    pub fn empty() -> Self {
        Self {
            outcomes: Vec::new(),
            collection_errors: BTreeSet::new(),
            status: SuiteStatus::NoTestsCollected,
        }
    }

    /// A report for a crashed run.
    pub fn crashed(detail: impl Into<String>) -> Self {
        Self {
            outcomes: Vec::new(),
            collection_errors: BTreeSet::new(),
            status: SuiteStatus::Crashed {
                detail: detail.into(),
            },
        }
    }

    /// Build a report from outcomes, deriving the status from their counts.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::BTreeSet;
    /// use benchsift_core::{Checkout, TestId, TestOutcome, TestStatus};
    /// use benchsift_oracle::{RunReport, SuiteStatus};
    ///
    /// let pass = TestOutcome {
    ///     id: TestId::new("tests/test_a.py", "test_ok"),
    ///     status: TestStatus::Pass,
    ///     checkout: Checkout::Head,
    /// };
    /// let report = RunReport::from_outcomes(vec![pass], BTreeSet::new());
    /// assert_eq!(report.status, SuiteStatus::Ran { passed: 1, failed: 0 });
    ///
    /// let none = RunReport::from_outcomes(vec![], BTreeSet::new());
    /// assert_eq!(none.status, SuiteStatus::NoTestsCollected);
    /// ```
    pub fn from_outcomes(outcomes: Vec<TestOutcome>, collection_errors: BTreeSet<String>) -> Self {
        let passed = outcomes
            .iter()
            .filter(|o| o.status == TestStatus::Pass)
            .count();
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o.status, TestStatus::Fail | TestStatus::Error))
            .count();
        let status = if outcomes.is_empty() && collection_errors.is_empty() {
            SuiteStatus::NoTestsCollected
        } else {
            SuiteStatus::Ran { passed, failed }
        };
        Self {
            outcomes,
            collection_errors,
            status,
        }
    }

    /// Stamp every outcome with `checkout`.
    pub fn at(mut self, checkout: Checkout) -> Self {
        for outcome in &mut self.outcomes {
            outcome.checkout = checkout;
        }
        self
    }
}

/// Runs one language's tests and reports per-test outcomes.
///
/// Implementations spawn the tool through [`crate::exec::run_process`] so
/// that dropping the `run` future kills the child.
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Runner name, e.g. `pytest`.
    fn name(&self) -> &'static str;

    /// Canonical language the runner serves.
    fn language(&self) -> &'static str;

    /// Files at the project root that indicate this runner applies.
    fn markers(&self) -> &'static [&'static str];

    /// Confirm the toolchain is usable in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::CapabilityUnavailable`] if it is not.
    async fn probe(&self, dir: &Path) -> Result<(), BenchsiftError>;

    /// Run `targets` (test file paths relative to `dir`; empty means the whole
    /// suite) and report outcomes stamped with `checkout`.
    ///
    /// A suite that crashes is an `Ok` report with [`SuiteStatus::Crashed`];
    /// `Err` means the runner could not be executed at all.
    async fn run(
        &self,
        dir: &Path,
        targets: &[String],
        checkout: Checkout,
        timeout: Duration,
    ) -> Result<RunReport, BenchsiftError>;
}
