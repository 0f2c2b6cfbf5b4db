//! The local git operations the patch fallback chain needs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use benchsift_core::BenchsiftError;

use crate::command::GitCommand;
use crate::repo;

/// Read-only local git access used by patch retrieval.
///
/// None of these operations check anything out.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Whether `sha` is reachable in the local object database.
    async fn commit_exists(&self, sha: &str) -> bool;

    /// Fetch a pull request's head into a local ref.
    async fn fetch_pr_head(&self, pr: u64) -> Result<(), BenchsiftError>;

    /// `git diff base..head` output.
    async fn range_diff(&self, base: &str, head: &str) -> Result<String, BenchsiftError>;
}

/// [`GitBackend`] over a local clone.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use benchsift_git::GitCli;
///
/// let git = GitCli::new("/tmp/clone", Duration::from_secs(120));
/// assert_eq!(git.pr_refspec(42), "pull/42/head:refs/remotes/origin/pr/42");
/// ```
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: PathBuf,
    git: GitCommand,
    remote: String,
}

impl GitCli {
    /// Back onto the clone at `repo`, fetching from `origin`.
    pub fn new(repo: impl Into<PathBuf>, timeout: Duration) -> Self {
        let repo = repo.into();
        Self {
            git: GitCommand::new(repo.clone(), timeout),
            repo,
            remote: "origin".into(),
        }
    }

    /// Fetch pull refs from `remote` instead of `origin`.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// The clone this backend reads.
    pub fn repo_path(&self) -> &Path {
        &self.repo
    }

    /// Refspec that maps a PR head onto a local remote-tracking ref.
    pub fn pr_refspec(&self, pr: u64) -> String {
        format!("pull/{pr}/head:refs/remotes/{}/pr/{pr}", self.remote)
    }
}

#[async_trait]
impl GitBackend for GitCli {
    async fn commit_exists(&self, sha: &str) -> bool {
        let repo = self.repo.clone();
        let sha = sha.to_string();
        tokio::task::spawn_blocking(move || repo::commit_exists(&repo, &sha))
            .await
            .unwrap_or(false)
    }

    async fn fetch_pr_head(&self, pr: u64) -> Result<(), BenchsiftError> {
        let refspec = self.pr_refspec(pr);
        self.git
            .run(&["fetch", "--no-tags", &self.remote, &refspec])
            .await
            .map(|_| ())
    }

    async fn range_diff(&self, base: &str, head: &str) -> Result<String, BenchsiftError> {
        let range = format!("{base}..{head}");
        self.git.run(&["diff", "--no-color", "--no-ext-diff", &range]).await
    }
}
