//! Timeout-bounded `git` invocations.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use benchsift_core::BenchsiftError;
use tokio::process::Command;

/// Captured result of one `git` invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Whether git exited with status 0.
    pub success: bool,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

/// Runs `git` in a fixed directory with a per-command timeout.
///
/// The child is killed if the timeout fires or the future is dropped.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use benchsift_git::GitCommand;
///
/// let git = GitCommand::new(".", Duration::from_secs(30));
/// assert_eq!(git.dir().to_str(), Some("."));
/// ```
#[derive(Debug, Clone)]
pub struct GitCommand {
    dir: PathBuf,
    timeout: Duration,
}

impl GitCommand {
    /// Create a runner rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            timeout,
        }
    }

    /// The directory git runs in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run `git <args>` and capture its output, whatever the exit status.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Git`] if git cannot be spawned, or
    /// [`BenchsiftError::Timeout`] if it outlives the timeout.
    pub async fn output(&self, args: &[&str]) -> Result<GitOutput, BenchsiftError> {
        let child = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| BenchsiftError::Timeout {
                operation: format!("git {}", args.join(" ")),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| BenchsiftError::Git(format!("failed to run git: {e}")))?;

        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run `git <args>` and require a zero exit status.
    ///
    /// # Errors
    ///
    /// As [`GitCommand::output`], plus [`BenchsiftError::Git`] carrying
    /// stderr when git exits non-zero.
    pub async fn run(&self, args: &[&str]) -> Result<String, BenchsiftError> {
        let out = self.output(args).await?;
        if !out.success {
            return Err(BenchsiftError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                out.stderr.trim()
            )));
        }
        Ok(out.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_reports_stderr_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCommand::new(dir.path(), Duration::from_secs(30));
        let err = git.run(&["rev-parse", "HEAD"]).await.unwrap_err();
        assert!(matches!(err, BenchsiftError::Git(_)));
        assert!(err.to_string().contains("rev-parse"));
    }

    #[tokio::test]
    async fn output_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCommand::new(dir.path(), Duration::from_secs(30));
        let out = git.output(&["--version"]).await.unwrap();
        assert!(out.success);
        assert!(out.stdout.starts_with("git version"));
    }
}
