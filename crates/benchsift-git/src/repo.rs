//! Local repository probes via git2.

use std::fmt;
use std::path::Path;

use benchsift_core::BenchsiftError;
use git2::{ObjectType, Repository};

/// What `HEAD` pointed at before the oracle touched the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginalRef {
    /// A named branch.
    Branch(String),
    /// A detached commit.
    Detached(String),
}

impl OriginalRef {
    /// The argument to hand to `git checkout`.
    pub fn checkout_target(&self) -> &str {
        match self {
            OriginalRef::Branch(name) => name,
            OriginalRef::Detached(sha) => sha,
        }
    }
}

impl fmt::Display for OriginalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginalRef::Branch(name) => write!(f, "{name}"),
            OriginalRef::Detached(sha) => write!(f, "{sha} (detached)"),
        }
    }
}

/// Whether `path` is inside a git repository.
pub fn is_git_repo(path: &Path) -> bool {
    Repository::discover(path).is_ok()
}

/// Whether `rev` names a commit present in the local object database.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use benchsift_git::repo::commit_exists;
///
/// let dir = tempfile::tempdir().unwrap();
/// assert!(!commit_exists(dir.path(), "deadbeef"));
/// ```
pub fn commit_exists(repo_path: &Path, rev: &str) -> bool {
    let Ok(repo) = Repository::open(repo_path) else {
        return false;
    };
    let exists = repo
        .revparse_single(rev)
        .and_then(|obj| obj.peel(ObjectType::Commit))
        .is_ok();
    exists
}

/// Resolve the current `HEAD` to a branch name, or the commit id when detached.
///
/// # Errors
///
/// Returns [`BenchsiftError::Git`] if the repository cannot be opened or has
/// no commits.
pub fn current_ref(repo_path: &Path) -> Result<OriginalRef, BenchsiftError> {
    let repo = Repository::open(repo_path)
        .map_err(|e| BenchsiftError::Git(format!("failed to open repository: {e}")))?;
    let head = repo
        .head()
        .map_err(|e| BenchsiftError::Git(format!("failed to resolve HEAD: {e}")))?;

    if head.is_branch() {
        if let Some(name) = head.shorthand() {
            return Ok(OriginalRef::Branch(name.to_string()));
        }
    }

    let oid = head
        .target()
        .ok_or_else(|| BenchsiftError::Git("HEAD has no target".into()))?;
    Ok(OriginalRef::Detached(oid.to_string()))
}

/// Full id of the commit `rev` resolves to.
///
/// # Errors
///
/// Returns [`BenchsiftError::Git`] if `rev` does not resolve to a commit.
pub fn resolve_commit(repo_path: &Path, rev: &str) -> Result<String, BenchsiftError> {
    let repo = Repository::open(repo_path)
        .map_err(|e| BenchsiftError::Git(format!("failed to open repository: {e}")))?;
    let commit = repo
        .revparse_single(rev)
        .and_then(|obj| obj.peel_to_commit())
        .map_err(|e| BenchsiftError::Git(format!("failed to resolve '{rev}': {e}")))?;
    Ok(commit.id().to_string())
}
