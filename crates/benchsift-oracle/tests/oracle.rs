use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use benchsift_core::{
    Author, BenchsiftError, ChangeKind, ChangedFile, Checkout, LanguageProfile, OracleCode,
    PullRequestCandidate, RegressionVerdict, TestId, TestOutcome, TestStatus,
};
use benchsift_git::repo::current_ref;
use benchsift_git::{GitCli, OriginalRef, WorkingTree};
use benchsift_oracle::{RegressionOracle, RunReport, RunnerRegistry, TestRunner};
use chrono::Utc;

fn run_git(repo_dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Commit `contents` of `tests/test_cart.py` and return the new sha.
fn commit_tests(dir: &Path, contents: &str, message: &str) -> String {
    std::fs::write(dir.join("tests/test_cart.py"), contents).unwrap();
    run_git(dir, &["add", "."]);
    run_git(dir, &["commit", "-m", message]);
    run_git(dir, &["rev-parse", "HEAD"])
}

/// A repo on `main` with a base and a head commit, then one more commit
/// so `main` is neither of them.
fn make_repo(base_tests: &str, head_tests: &str) -> (tempfile::TempDir, String, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path();
    run_git(path, &["init", "-b", "main"]);
    run_git(path, &["config", "user.name", "test-user"]);
    run_git(path, &["config", "user.email", "test@example.com"]);
    std::fs::create_dir_all(path.join("tests")).unwrap();
    std::fs::write(path.join("fake.marker"), "").unwrap();
    std::fs::write(path.join("cart.py"), "def total(items):\n    return None\n").unwrap();
    let base = commit_tests(path, base_tests, "base");
    std::fs::write(path.join("cart.py"), "def total(items):\n    return 0\n").unwrap();
    let head = commit_tests(path, head_tests, "head");
    std::fs::write(path.join("NOTES"), "after\n").unwrap();
    run_git(path, &["add", "."]);
    run_git(path, &["commit", "-m", "later"]);
    (dir, base, head)
}

/// Reads `name=status` lines from each target file.
///
/// `import-error` marks the whole file as failing to collect, `crash` makes
/// the whole run crash, and `sleep=MS` stalls the run. Every run is logged
/// with its checkout, and runs that overlap are flagged.
#[derive(Default)]
struct ScriptedRunner {
    runs: AtomicUsize,
    unusable: bool,
    active: AtomicUsize,
    overlapped: AtomicBool,
    checkouts: Mutex<Vec<Checkout>>,
}

impl ScriptedRunner {
    async fn script(
        &self,
        dir: &Path,
        targets: &[String],
        checkout: Checkout,
    ) -> Result<RunReport, BenchsiftError> {
        let mut outcomes = Vec::new();
        let mut broken = BTreeSet::new();
        for target in targets {
            let text = std::fs::read_to_string(dir.join(target))?;
            for line in text.lines() {
                if line == "crash" {
                    return Ok(RunReport::crashed("ImportError while loading conftest"));
                }
                if line == "import-error" {
                    broken.insert(target.clone());
                    continue;
                }
                let Some((name, status)) = line.split_once('=') else {
                    continue;
                };
                let status = match status {
                    "pass" => TestStatus::Pass,
                    "fail" => TestStatus::Fail,
                    "error" => TestStatus::Error,
                    ms if name == "sleep" => {
                        tokio::time::sleep(Duration::from_millis(ms.parse().unwrap())).await;
                        continue;
                    }
                    _ => TestStatus::Skip,
                };
                outcomes.push(TestOutcome {
                    id: TestId::new(target.as_str(), name),
                    status,
                    checkout,
                });
            }
        }
        Ok(RunReport::from_outcomes(outcomes, broken))
    }
}

#[async_trait]
impl TestRunner for ScriptedRunner {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn language(&self) -> &'static str {
        "Python"
    }

    fn markers(&self) -> &'static [&'static str] {
        &["fake.marker"]
    }

    async fn probe(&self, _dir: &Path) -> Result<(), BenchsiftError> {
        if self.unusable {
            return Err(BenchsiftError::CapabilityUnavailable("no interpreter".into()));
        }
        Ok(())
    }

    async fn run(
        &self,
        dir: &Path,
        targets: &[String],
        checkout: Checkout,
        _timeout: Duration,
    ) -> Result<RunReport, BenchsiftError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.checkouts.lock().unwrap().push(checkout);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let report = self.script(dir, targets, checkout).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        report
    }
}

fn candidate(base: &str, head: &str) -> PullRequestCandidate {
    let file = |path: &str| ChangedFile {
        path: path.into(),
        change: ChangeKind::Modified,
        additions: 2,
        deletions: 1,
    };
    PullRequestCandidate {
        number: 12,
        title: "Return zero for empty carts".into(),
        body: String::new(),
        author: Author {
            login: "alice".into(),
            is_bot: false,
        },
        created_at: Utc::now(),
        merged_at: Utc::now(),
        base_sha: base.into(),
        head_sha: head.into(),
        files: vec![file("cart.py"), file("tests/test_cart.py")],
        linked_issues: vec![],
    }
}

fn oracle(repo: &Path, runner: Arc<ScriptedRunner>, budget: Duration) -> RegressionOracle {
    let tree = Arc::new(WorkingTree::open(repo, Duration::from_secs(30)).unwrap());
    let git = Arc::new(GitCli::new(repo, Duration::from_secs(30)));
    let mut registry = RunnerRegistry::new();
    registry.register(runner);
    RegressionOracle::new(tree, git, registry, LanguageProfile::builtin("Python"), budget)
}

fn on_main(repo: &Path) -> bool {
    current_ref(repo).unwrap() == OriginalRef::Branch("main".into())
}

#[tokio::test]
async fn fixed_test_is_f2p_and_kept_test_is_p2p() {
    let (repo, base, head) = make_repo(
        "test_sum=pass\ntest_empty=fail\n",
        "test_sum=pass\ntest_empty=pass\n",
    );
    let runner = Arc::new(ScriptedRunner::default());
    let oracle = oracle(repo.path(), runner.clone(), Duration::from_secs(60));

    let result = oracle.verify(&candidate(&base, &head)).await;
    assert_eq!(result.verdict, RegressionVerdict::Valid, "{:?}", result.detail);
    assert!(result
        .f2p
        .contains(&TestId::new("tests/test_cart.py", "test_empty")));
    assert!(result
        .p2p
        .contains(&TestId::new("tests/test_cart.py", "test_sum")));
    assert_eq!(runner.runs.load(Ordering::SeqCst), 2);
    assert!(on_main(repo.path()));
}

#[tokio::test]
async fn repeated_runs_agree() {
    let (repo, base, head) = make_repo(
        "a=pass\nb=fail\nc=fail\n",
        "a=pass\nb=pass\nc=pass\nd=pass\n",
    );
    let oracle = oracle(
        repo.path(),
        Arc::new(ScriptedRunner::default()),
        Duration::from_secs(60),
    );
    let pr = candidate(&base, &head);
    let first = oracle.verify(&pr).await;
    let second = oracle.verify(&pr).await;
    assert_eq!(first.f2p, second.f2p);
    assert_eq!(first.p2p, second.p2p);
    assert_eq!(first.f2p.len(), 3);
}

#[tokio::test]
async fn import_error_at_base_is_not_f2p() {
    let (repo, base, head) = make_repo("import-error\n", "test_x=pass\n");
    let oracle = oracle(
        repo.path(),
        Arc::new(ScriptedRunner::default()),
        Duration::from_secs(60),
    );
    let result = oracle.verify(&candidate(&base, &head)).await;
    assert_eq!(result.verdict, RegressionVerdict::Invalid);
    assert_eq!(result.code, Some(OracleCode::EmptyF2p));
    assert!(result
        .errored
        .contains(&TestId::new("tests/test_cart.py", "test_x")));
    assert!(on_main(repo.path()));
}

#[tokio::test]
async fn no_passing_base_tests_is_empty_p2p() {
    let (repo, base, head) = make_repo("test_x=fail\n", "test_x=pass\n");
    let oracle = oracle(
        repo.path(),
        Arc::new(ScriptedRunner::default()),
        Duration::from_secs(60),
    );
    let result = oracle.verify(&candidate(&base, &head)).await;
    assert_eq!(result.code, Some(OracleCode::EmptyP2p));
}

#[tokio::test]
async fn timeout_during_head_run_restores_branch() {
    let (repo, base, head) = make_repo(
        "test_sum=pass\n",
        "sleep=5000\ntest_sum=pass\ntest_new=pass\n",
    );
    let oracle = oracle(
        repo.path(),
        Arc::new(ScriptedRunner::default()),
        Duration::from_millis(1500),
    );
    let result = oracle.verify(&candidate(&base, &head)).await;
    assert_eq!(result.verdict, RegressionVerdict::Error);
    assert_eq!(result.code, Some(OracleCode::OracleTimeout));
    assert!(on_main(repo.path()));
    assert_eq!(
        std::fs::read_to_string(repo.path().join("NOTES")).unwrap(),
        "after\n"
    );
}

#[tokio::test]
async fn unknown_commit_is_checkout_failure() {
    let (repo, base, _) = make_repo("a=pass\n", "a=pass\n");
    let oracle = oracle(
        repo.path(),
        Arc::new(ScriptedRunner::default()),
        Duration::from_secs(60),
    );
    let result = oracle
        .verify(&candidate(&base, "0123456789abcdef0123456789abcdef01234567"))
        .await;
    assert_eq!(result.code, Some(OracleCode::CheckoutFailed));
    assert!(on_main(repo.path()));
}

#[tokio::test]
async fn missing_runner_skips() {
    let (repo, base, head) = make_repo("a=pass\n", "a=pass\n");
    let tree = Arc::new(WorkingTree::open(repo.path(), Duration::from_secs(30)).unwrap());
    let git = Arc::new(GitCli::new(repo.path(), Duration::from_secs(30)));
    let oracle = RegressionOracle::new(
        tree,
        git,
        RunnerRegistry::new(),
        LanguageProfile::builtin("Python"),
        Duration::from_secs(60),
    );
    let result = oracle.verify(&candidate(&base, &head)).await;
    assert_eq!(result.verdict, RegressionVerdict::Skipped);
    assert_eq!(result.code, Some(OracleCode::NoTestRunner));
}

#[tokio::test]
async fn unusable_runner_skips_without_running() {
    let (repo, base, head) = make_repo("a=pass\n", "a=pass\n");
    let runner = Arc::new(ScriptedRunner {
        unusable: true,
        ..Default::default()
    });
    let oracle = oracle(repo.path(), runner.clone(), Duration::from_secs(60));
    let result = oracle.verify(&candidate(&base, &head)).await;
    assert_eq!(result.verdict, RegressionVerdict::Skipped);
    assert_eq!(result.code, Some(OracleCode::RunnerUnavailable));
    assert_eq!(runner.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn crashed_base_run_is_not_f2p() {
    let (repo, base, head) = make_repo("crash\n", "test_x=pass\ntest_y=pass\n");
    let oracle = oracle(
        repo.path(),
        Arc::new(ScriptedRunner::default()),
        Duration::from_secs(60),
    );
    let result = oracle.verify(&candidate(&base, &head)).await;
    assert_eq!(result.code, Some(OracleCode::EmptyF2p));
    assert!(result.f2p.is_empty());
    assert_eq!(result.errored.len(), 2);
    assert!(on_main(repo.path()));
}

#[tokio::test]
async fn concurrent_verifications_take_turns() {
    let (repo, base, head) = make_repo(
        "test_sum=pass\ntest_empty=fail\n",
        "test_sum=pass\ntest_empty=pass\n",
    );
    let runner = Arc::new(ScriptedRunner::default());
    let oracle = oracle(repo.path(), runner.clone(), Duration::from_secs(60));
    let first = candidate(&base, &head);
    let mut second = candidate(&base, &head);
    second.number = 13;

    let (a, b) = tokio::join!(oracle.verify(&first), oracle.verify(&second));
    assert!(a.is_valid(), "{:?}", a.detail);
    assert!(b.is_valid(), "{:?}", b.detail);
    assert!(!runner.overlapped.load(Ordering::SeqCst));
    assert_eq!(
        *runner.checkouts.lock().unwrap(),
        vec![Checkout::Base, Checkout::Head, Checkout::Base, Checkout::Head]
    );
    assert!(on_main(repo.path()));
}
