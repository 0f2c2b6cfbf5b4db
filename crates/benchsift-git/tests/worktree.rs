use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use benchsift_git::repo::{commit_exists, current_ref, resolve_commit};
use benchsift_git::{GitBackend, GitCli, OriginalRef, WorkingTree};

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

/// A repo on branch `main` with two commits; returns (dir, base, head).
fn make_git_repo() -> (tempfile::TempDir, String, String) {
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init", "-b", "main"]);
    run_git(dir.path(), &["config", "user.name", "test-user"]);
    run_git(dir.path(), &["config", "user.email", "test@example.com"]);
    std::fs::write(dir.path().join("lib.py"), "def f():\n    return 1\n").unwrap();
    run_git(dir.path(), &["add", "."]);
    run_git(dir.path(), &["commit", "-m", "base"]);
    let base = run_git(dir.path(), &["rev-parse", "HEAD"]);
    std::fs::write(dir.path().join("lib.py"), "def f():\n    return 2\n").unwrap();
    run_git(dir.path(), &["commit", "-am", "head"]);
    let head = run_git(dir.path(), &["rev-parse", "HEAD"]);
    (dir, base, head)
}

#[test]
fn probes_see_local_commits() {
    let (repo, base, head) = make_git_repo();
    assert!(commit_exists(repo.path(), &base));
    assert!(commit_exists(repo.path(), &head));
    assert!(!commit_exists(repo.path(), "0123456789abcdef0123456789abcdef01234567"));
    assert_eq!(resolve_commit(repo.path(), "main").unwrap(), head);
    assert_eq!(
        current_ref(repo.path()).unwrap(),
        OriginalRef::Branch("main".into())
    );
}

#[tokio::test]
async fn range_diff_between_commits() {
    let (repo, base, head) = make_git_repo();
    let git = GitCli::new(repo.path(), Duration::from_secs(30));
    assert!(git.commit_exists(&head).await);
    let diff = git.range_diff(&base, &head).await.unwrap();
    assert!(diff.contains("-    return 1"));
    assert!(diff.contains("+    return 2"));
}

#[tokio::test]
async fn fetch_without_remote_fails() {
    let (repo, _, _) = make_git_repo();
    let git = GitCli::new(repo.path(), Duration::from_secs(30));
    assert!(git.fetch_pr_head(7).await.is_err());
}

#[tokio::test]
async fn lease_restores_branch() {
    let (repo, base, _) = make_git_repo();
    let tree = WorkingTree::open(repo.path(), Duration::from_secs(30)).unwrap();

    let lease = tree.acquire().await.unwrap();
    lease.checkout(&base).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(repo.path().join("lib.py")).unwrap(),
        "def f():\n    return 1\n"
    );
    assert!(matches!(tree.current_ref().unwrap(), OriginalRef::Detached(_)));
    lease.restore().await.unwrap();
    lease.restore().await.unwrap();
    drop(lease);

    assert_eq!(tree.current_ref().unwrap(), OriginalRef::Branch("main".into()));
}

#[tokio::test]
async fn dropped_lease_restores_branch() {
    let (repo, base, _) = make_git_repo();
    let tree = WorkingTree::open(repo.path(), Duration::from_secs(30)).unwrap();
    {
        let lease = tree.acquire().await.unwrap();
        lease.checkout(&base).await.unwrap();
    }
    assert_eq!(tree.current_ref().unwrap(), OriginalRef::Branch("main".into()));
}

#[tokio::test]
async fn detached_head_is_restored_to_same_commit() {
    let (repo, base, head) = make_git_repo();
    run_git(repo.path(), &["checkout", "--detach", &head]);
    let tree = WorkingTree::open(repo.path(), Duration::from_secs(30)).unwrap();
    let lease = tree.acquire().await.unwrap();
    assert_eq!(lease.original(), &OriginalRef::Detached(head.clone()));
    lease.checkout(&base).await.unwrap();
    lease.restore().await.unwrap();
    drop(lease);
    assert_eq!(run_git(repo.path(), &["rev-parse", "HEAD"]), head);
}

#[tokio::test]
async fn concurrent_leases_never_overlap() {
    let (repo, base, head) = make_git_repo();
    let tree = WorkingTree::open(repo.path(), Duration::from_secs(30)).unwrap();
    let holders = AtomicUsize::new(0);
    let overlapped = AtomicBool::new(false);

    let (tree, holders, overlapped) = (&tree, &holders, &overlapped);
    let hold = move |sha: String| {
        async move {
            let lease = tree.acquire().await.unwrap();
            if holders.fetch_add(1, Ordering::SeqCst) > 0 {
                overlapped.store(true, Ordering::SeqCst);
            }
            lease.checkout(&sha).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            let seen = std::fs::read_to_string(tree.path().join("lib.py")).unwrap();
            lease.restore().await.unwrap();
            holders.fetch_sub(1, Ordering::SeqCst);
            seen
        }
    };

    let (at_base, at_head) = tokio::join!(hold(base), hold(head));
    assert!(!overlapped.load(Ordering::SeqCst));
    assert_eq!(at_base, "def f():\n    return 1\n");
    assert_eq!(at_head, "def f():\n    return 2\n");
    assert_eq!(tree.current_ref().unwrap(), OriginalRef::Branch("main".into()));
}

#[tokio::test]
async fn lease_without_checkout_leaves_tree_alone() {
    let (repo, _, _) = make_git_repo();
    std::fs::write(repo.path().join("scratch.txt"), "untracked\n").unwrap();
    std::fs::write(repo.path().join("lib.py"), "edited\n").unwrap();
    let tree = WorkingTree::open(repo.path(), Duration::from_secs(30)).unwrap();
    drop(tree.acquire().await.unwrap());
    assert_eq!(
        std::fs::read_to_string(repo.path().join("lib.py")).unwrap(),
        "edited\n"
    );
}

#[test]
fn open_rejects_plain_directory() {
    let dir = tempfile::tempdir().unwrap();
    assert!(WorkingTree::open(dir.path(), Duration::from_secs(30)).is_err());
}
