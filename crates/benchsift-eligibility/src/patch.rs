//! Three-tier diff retrieval: PR-ref fetch, local range diff, remote service.

use std::sync::Arc;

use benchsift_core::BenchsiftError;
use benchsift_forge::DiffService;
use benchsift_git::GitBackend;

/// Produces the literal diff for a `(base, head)` pair.
///
/// Never checks anything out; the only local side effect is the PR ref a
/// best-effort fetch may create.
pub struct PatchRetriever {
    git: Arc<dyn GitBackend>,
    remote: Arc<dyn DiffService>,
}

impl PatchRetriever {
    /// Retriever over a local clone and a remote diff service.
    pub fn new(git: Arc<dyn GitBackend>, remote: Arc<dyn DiffService>) -> Self {
        Self { git, remote }
    }

    /// Diff text from `base` to `head`.
    ///
    /// 1. If `head` is not reachable locally and `pr` is known, fetch the PR
    ///    head ref. A failed fetch is ignored.
    /// 2. If both commits are reachable, use the local range diff when it
    ///    exits cleanly with non-empty output.
    /// 3. Otherwise ask the remote service. Any error there is a miss.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::PatchUnavailable`] when every tier misses.
    pub async fn retrieve(
        &self,
        base: &str,
        head: &str,
        pr: Option<u64>,
    ) -> Result<String, BenchsiftError> {
        if let Some(number) = pr {
            if !self.git.commit_exists(head).await {
                tracing::debug!(pr = number, head, "head not local, fetching PR ref");
                if let Err(e) = self.git.fetch_pr_head(number).await {
                    tracing::debug!(pr = number, error = %e, "PR ref fetch failed");
                }
            }
        }

        if self.git.commit_exists(base).await && self.git.commit_exists(head).await {
            match self.git.range_diff(base, head).await {
                Ok(diff) if !diff.trim().is_empty() => {
                    tracing::debug!(base, head, "diff from local range");
                    return Ok(diff);
                }
                Ok(_) => tracing::debug!(base, head, "local range diff is empty"),
                Err(e) => tracing::debug!(base, head, error = %e, "local range diff failed"),
            }
        }

        match self.remote.fetch_diff(base, head).await {
            Ok(diff) if !diff.trim().is_empty() => {
                tracing::debug!(base, head, "diff from remote service");
                Ok(diff)
            }
            Ok(_) => Err(unavailable(base, head)),
            Err(e) => {
                tracing::debug!(base, head, error = %e, "remote diff failed");
                Err(unavailable(base, head))
            }
        }
    }
}

fn unavailable(base: &str, head: &str) -> BenchsiftError {
    BenchsiftError::PatchUnavailable {
        base: base.into(),
        head: head.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct FakeGit {
        present: Mutex<HashSet<String>>,
        fetchable: Option<String>,
        diff: Result<String, String>,
        fetches: AtomicUsize,
    }

    impl FakeGit {
        fn new(present: &[&str], diff: Result<&str, &str>) -> Self {
            Self {
                present: Mutex::new(present.iter().map(|s| s.to_string()).collect()),
                fetchable: None,
                diff: diff.map(String::from).map_err(String::from),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GitBackend for FakeGit {
        async fn commit_exists(&self, sha: &str) -> bool {
            self.present.lock().unwrap().contains(sha)
        }

        async fn fetch_pr_head(&self, _pr: u64) -> Result<(), BenchsiftError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match &self.fetchable {
                Some(sha) => {
                    self.present.lock().unwrap().insert(sha.clone());
                    Ok(())
                }
                None => Err(BenchsiftError::Git("couldn't find remote ref".into())),
            }
        }

        async fn range_diff(&self, _base: &str, _head: &str) -> Result<String, BenchsiftError> {
            self.diff.clone().map_err(BenchsiftError::Git)
        }
    }

    struct FakeRemote {
        diff: Result<String, String>,
        calls: AtomicUsize,
    }

    impl FakeRemote {
        fn new(diff: Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                diff: diff.map(String::from).map_err(String::from),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DiffService for FakeRemote {
        async fn fetch_diff(&self, _base: &str, _head: &str) -> Result<String, BenchsiftError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.diff.clone().map_err(BenchsiftError::transient)
        }
    }

    const DIFF: &str = "diff --git a/x b/x\n";

    #[tokio::test]
    async fn local_diff_skips_remote() {
        let git = Arc::new(FakeGit::new(&["base", "head"], Ok(DIFF)));
        let remote = FakeRemote::new(Ok("remote"));
        let retriever = PatchRetriever::new(git.clone(), remote.clone());

        let diff = retriever.retrieve("base", "head", Some(7)).await.unwrap();
        assert_eq!(diff, DIFF);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
        assert_eq!(git.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_head_is_fetched_then_diffed_locally() {
        let mut git = FakeGit::new(&["base"], Ok(DIFF));
        git.fetchable = Some("head".into());
        let git = Arc::new(git);
        let remote = FakeRemote::new(Ok("remote"));
        let retriever = PatchRetriever::new(git.clone(), remote.clone());

        let diff = retriever.retrieve("base", "head", Some(7)).await.unwrap();
        assert_eq!(diff, DIFF);
        assert_eq!(git.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_pr_number_means_no_fetch() {
        let git = Arc::new(FakeGit::new(&["base"], Ok(DIFF)));
        let remote = FakeRemote::new(Ok("remote"));
        let retriever = PatchRetriever::new(git.clone(), remote.clone());

        assert_eq!(retriever.retrieve("base", "head", None).await.unwrap(), "remote");
        assert_eq!(git.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_local_diff_falls_through() {
        let git = Arc::new(FakeGit::new(&["base", "head"], Ok("  \n")));
        let remote = FakeRemote::new(Ok("remote"));
        let retriever = PatchRetriever::new(git, remote.clone());

        assert_eq!(retriever.retrieve("base", "head", None).await.unwrap(), "remote");
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_and_remote_error_are_unavailable() {
        let git = Arc::new(FakeGit::new(&["base"], Err("bad revision")));
        let remote = FakeRemote::new(Err("HTTP 404: Not Found"));
        let retriever = PatchRetriever::new(git.clone(), remote);

        let err = retriever.retrieve("base", "head", Some(3)).await.unwrap_err();
        assert!(matches!(err, BenchsiftError::PatchUnavailable { .. }));
        assert_eq!(git.fetches.load(Ordering::SeqCst), 1);
    }
}
