//! Dual checkout and run of a candidate's tests.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use benchsift_core::scope;
use benchsift_core::{
    BenchsiftError, ChangeKind, Checkout, LanguageProfile, OracleCode, PullRequestCandidate,
    RegressionResult, RegressionVerdict,
};
use benchsift_difflens::classify::FileClassifier;
use benchsift_git::{GitBackend, TreeLease, WorkingTree};
use tokio::sync::OnceCell;

use crate::classify::{classify, Classification};
use crate::registry::RunnerRegistry;
use crate::runner::{RunReport, SuiteStatus, TestRunner};

type RunnerChoice = Result<Arc<dyn TestRunner>, RegressionResult>;

/// Decides whether an accepted candidate's tests form a regression oracle.
///
/// The runner is selected and probed once, on first use. Every
/// verification holds the [`WorkingTree`] lease from the base checkout to
/// the final restore, so runs never overlap on one clone.
pub struct RegressionOracle {
    tree: Arc<WorkingTree>,
    git: Arc<dyn GitBackend>,
    registry: RunnerRegistry,
    profile: LanguageProfile,
    classifier: FileClassifier,
    budget: Duration,
    runner: OnceCell<RunnerChoice>,
}

impl RegressionOracle {
    /// An oracle over `tree` with a per-candidate wall-clock `budget`.
    pub fn new(
        tree: Arc<WorkingTree>,
        git: Arc<dyn GitBackend>,
        registry: RunnerRegistry,
        profile: LanguageProfile,
        budget: Duration,
    ) -> Self {
        let classifier = FileClassifier::new(&profile, &[]);
        Self {
            tree,
            git,
            registry,
            profile,
            classifier,
            budget,
            runner: OnceCell::new(),
        }
    }

    /// The usable runner, or the skip result every candidate will get.
    ///
    /// Selection holds the tree lease so marker files are read from the
    /// original ref, never from another candidate's checkout.
    pub async fn runner(&self) -> RunnerChoice {
        self.runner
            .get_or_init(|| async {
                let lease = self.tree.acquire().await.map_err(|e| {
                    RegressionResult::error(OracleCode::CheckoutFailed, e.to_string())
                })?;
                let dir = lease.path();
                let language = self.profile.name.as_str();
                let Some(runner) = self.registry.select(dir, Some(language)) else {
                    return Err(RegressionResult::skipped(
                        OracleCode::NoTestRunner,
                        format!("No suitable test runner found for {language}"),
                    ));
                };
                if let Err(e) = runner.probe(dir).await {
                    return Err(RegressionResult::skipped(
                        OracleCode::RunnerUnavailable,
                        format!("{} is not usable: {e}", runner.name()),
                    ));
                }
                tracing::info!(runner = runner.name(), language = runner.language(), "test runner selected");
                Ok(runner)
            })
            .await
            .clone()
    }

    /// Verify one accepted candidate.
    ///
    /// Never returns early with the tree checked out: the restore step runs
    /// after success, failure, panic and timeout alike.
    pub async fn verify(&self, candidate: &PullRequestCandidate) -> RegressionResult {
        let runner = match self.runner().await {
            Ok(runner) => runner,
            Err(skip) => return skip,
        };
        let targets = self.targets(candidate);
        if targets.is_empty() {
            return invalid(Classification::default(), "PR keeps no test files at head");
        }

        if !self.git.commit_exists(&candidate.head_sha).await {
            if let Err(e) = self.git.fetch_pr_head(candidate.number).await {
                tracing::debug!(pr = candidate.number, error = %e, "PR ref fetch failed");
            }
        }

        let lease = match self.tree.acquire().await {
            Ok(lease) => lease,
            Err(e) => return RegressionResult::error(OracleCode::CheckoutFailed, e.to_string()),
        };

        let budget = self.budget;
        let (outcome, restored) = scope::guarded(
            tokio::time::timeout(
                budget,
                dual_run(&lease, runner.as_ref(), candidate, &targets, budget),
            ),
            lease.restore(),
        )
        .await;
        drop(lease);

        if let Err(e) = restored {
            tracing::error!(pr = candidate.number, error = %e, "failed to restore working tree");
            return RegressionResult::error(OracleCode::RestoreFailed, e.to_string());
        }

        match outcome {
            Err(_) => RegressionResult::error(
                OracleCode::OracleTimeout,
                format!("oracle run exceeded {}s", budget.as_secs()),
            ),
            Ok(Err(failure)) => failure,
            Ok(Ok((base, head))) => judge(classify(&base, &head)),
        }
    }

    /// Test files the candidate touches that still exist at head.
    fn targets(&self, candidate: &PullRequestCandidate) -> Vec<String> {
        candidate
            .files
            .iter()
            .filter(|f| f.change != ChangeKind::Deleted)
            .filter(|f| self.classifier.is_test(&f.path) && !self.classifier.is_asset(&f.path))
            .map(|f| f.path.clone())
            .collect()
    }
}

/// Check out base then head and run the targets at each.
async fn dual_run(
    lease: &TreeLease<'_>,
    runner: &dyn TestRunner,
    candidate: &PullRequestCandidate,
    targets: &[String],
    budget: Duration,
) -> Result<(RunReport, RunReport), RegressionResult> {
    let base = run_at(lease, runner, &candidate.base_sha, Checkout::Base, targets, budget).await?;
    let head = run_at(lease, runner, &candidate.head_sha, Checkout::Head, targets, budget).await?;
    if let SuiteStatus::Crashed { detail } = &head.status {
        return Err(RegressionResult::error(
            OracleCode::TestExecutionError,
            format!("test suite crashed at head: {detail}"),
        ));
    }
    Ok((base, head))
}

async fn run_at(
    lease: &TreeLease<'_>,
    runner: &dyn TestRunner,
    sha: &str,
    checkout: Checkout,
    targets: &[String],
    budget: Duration,
) -> Result<RunReport, RegressionResult> {
    lease.checkout(sha).await.map_err(|e| {
        RegressionResult::error(
            OracleCode::CheckoutFailed,
            format!("failed to check out {checkout} {sha}: {e}"),
        )
    })?;

    let present = existing(lease.path(), targets);
    if present.is_empty() {
        tracing::debug!(%checkout, "no target test files at this checkout");
        return Ok(RunReport::empty());
    }

    match runner.run(lease.path(), &present, checkout, budget).await {
        Ok(report) => {
            tracing::debug!(%checkout, status = ?report.status, tests = report.outcomes.len(), "run finished");
            Ok(report)
        }
        Err(BenchsiftError::Timeout { seconds, .. }) => Err(RegressionResult::error(
            OracleCode::OracleTimeout,
            format!("{} run at {checkout} exceeded {seconds}s", runner.name()),
        )),
        Err(e) => Err(RegressionResult::error(
            OracleCode::TestExecutionError,
            format!("{} failed at {checkout}: {e}", runner.name()),
        )),
    }
}

fn existing(root: &Path, targets: &[String]) -> Vec<String> {
    targets
        .iter()
        .filter(|t| root.join(t).exists())
        .cloned()
        .collect()
}

fn judge(classification: Classification) -> RegressionResult {
    if !classification.errored.is_empty() {
        tracing::info!(
            errored = classification.errored.len(),
            "tests excluded from classification"
        );
    }
    if classification.f2p.is_empty() {
        return invalid(classification, "No F2P tests found");
    }
    if classification.p2p.is_empty() {
        return RegressionResult {
            verdict: RegressionVerdict::Invalid,
            code: Some(OracleCode::EmptyP2p),
            f2p: classification.f2p,
            p2p: BTreeSet::new(),
            errored: classification.errored,
            detail: Some("No P2P tests found".into()),
        };
    }
    RegressionResult {
        verdict: RegressionVerdict::Valid,
        code: None,
        f2p: classification.f2p,
        p2p: classification.p2p,
        errored: classification.errored,
        detail: None,
    }
}

fn invalid(classification: Classification, detail: &str) -> RegressionResult {
    RegressionResult {
        verdict: RegressionVerdict::Invalid,
        code: Some(OracleCode::EmptyF2p),
        f2p: BTreeSet::new(),
        p2p: classification.p2p,
        errored: classification.errored,
        detail: Some(detail.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchsift_core::TestId;

    #[test]
    fn empty_p2p_keeps_f2p() {
        let mut c = Classification::default();
        c.f2p.insert(TestId::new("t.py", "a"));
        let result = judge(c);
        assert_eq!(result.code, Some(OracleCode::EmptyP2p));
        assert_eq!(result.f2p.len(), 1);
    }

    #[test]
    fn f2p_and_p2p_make_valid() {
        let mut c = Classification::default();
        c.f2p.insert(TestId::new("t.py", "a"));
        c.p2p.insert(TestId::new("t.py", "b"));
        let result = judge(c);
        assert!(result.is_valid());
        assert_eq!(result.code, None);
    }

    #[test]
    fn no_f2p_is_empty_f2p() {
        let mut c = Classification::default();
        c.p2p.insert(TestId::new("t.py", "b"));
        assert_eq!(judge(c).code, Some(OracleCode::EmptyF2p));
    }
}
