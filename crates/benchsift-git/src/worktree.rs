//! Exclusive, self-restoring access to the shared clone.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use benchsift_core::BenchsiftError;
use tokio::sync::{Mutex, MutexGuard};

use crate::command::GitCommand;
use crate::repo::{self, OriginalRef};

/// The on-disk clone the oracle checks commits out into.
///
/// Only one [`TreeLease`] exists at a time; [`WorkingTree::acquire`] waits
/// for the previous holder to release.
#[derive(Debug)]
pub struct WorkingTree {
    path: PathBuf,
    git: GitCommand,
    lock: Mutex<()>,
}

impl WorkingTree {
    /// Open the clone at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Git`] if `path` is not a git repository.
    pub fn open(path: impl Into<PathBuf>, git_timeout: Duration) -> Result<Self, BenchsiftError> {
        let path = path.into();
        if !repo::is_git_repo(&path) {
            return Err(BenchsiftError::Git(format!(
                "{} is not a git repository",
                path.display()
            )));
        }
        Ok(Self {
            git: GitCommand::new(path.clone(), git_timeout),
            path,
            lock: Mutex::new(()),
        })
    }

    /// Root of the clone.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// What `HEAD` currently points at.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Git`] if `HEAD` cannot be resolved.
    pub fn current_ref(&self) -> Result<OriginalRef, BenchsiftError> {
        repo::current_ref(&self.path)
    }

    /// Wait for exclusive access and record the ref to restore.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Git`] if `HEAD` cannot be resolved; the
    /// lock is released again in that case.
    pub async fn acquire(&self) -> Result<TreeLease<'_>, BenchsiftError> {
        let guard = self.lock.lock().await;
        let original = self.current_ref()?;
        tracing::debug!(tree = %self.path.display(), original = %original, "working tree acquired");
        Ok(TreeLease {
            tree: self,
            original,
            restored: AtomicBool::new(true),
            _guard: guard,
        })
    }
}

/// Exclusive hold on a [`WorkingTree`].
///
/// Call [`TreeLease::restore`] on every exit path. A lease dropped after a
/// checkout without a successful restore falls back to a blocking
/// `git checkout -f` so a cancelled run still leaves the tree on its
/// original ref. A lease that never checked anything out drops silently.
#[derive(Debug)]
pub struct TreeLease<'a> {
    tree: &'a WorkingTree,
    original: OriginalRef,
    restored: AtomicBool,
    _guard: MutexGuard<'a, ()>,
}

impl TreeLease<'_> {
    /// The ref that [`TreeLease::restore`] returns to.
    pub fn original(&self) -> &OriginalRef {
        &self.original
    }

    /// Root of the leased clone.
    pub fn path(&self) -> &Path {
        self.tree.path()
    }

    /// Force-checkout `sha` as a detached `HEAD`.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Git`] or [`BenchsiftError::Timeout`] when
    /// the checkout fails.
    pub async fn checkout(&self, sha: &str) -> Result<(), BenchsiftError> {
        self.restored.store(false, Ordering::SeqCst);
        self.tree
            .git
            .run(&["checkout", "-f", "--detach", sha])
            .await
            .map(|_| ())
    }

    /// Force-checkout the original ref. Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Git`] or [`BenchsiftError::Timeout`] when
    /// the checkout fails; the drop fallback will try again.
    pub async fn restore(&self) -> Result<(), BenchsiftError> {
        let args = restore_args(&self.original);
        self.tree.git.run(&args).await?;
        self.restored.store(true, Ordering::SeqCst);
        tracing::debug!(original = %self.original, "working tree restored");
        Ok(())
    }
}

fn restore_args(original: &OriginalRef) -> Vec<&str> {
    match original {
        OriginalRef::Branch(name) => vec!["checkout", "-f", name.as_str()],
        OriginalRef::Detached(sha) => vec!["checkout", "-f", "--detach", sha.as_str()],
    }
}

impl Drop for TreeLease<'_> {
    fn drop(&mut self) {
        if self.restored.load(Ordering::SeqCst) {
            return;
        }
        let status = std::process::Command::new("git")
            .args(restore_args(&self.original))
            .current_dir(self.tree.path())
            .output();
        match status {
            Ok(out) if out.status.success() => {
                tracing::warn!(original = %self.original, "working tree restored on drop");
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                tracing::error!(
                    original = %self.original,
                    stderr = %stderr.trim(),
                    "failed to restore working tree"
                );
            }
            Err(e) => tracing::error!(original = %self.original, error = %e, "failed to run git"),
        }
    }
}
