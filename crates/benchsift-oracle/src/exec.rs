//! Timeout-bounded process execution for test runners.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use benchsift_core::BenchsiftError;
use tokio::process::Command;

/// Captured output of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code; `None` if the process was killed by a signal.
    pub code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl ProcessOutput {
    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The last `lines` lines of stderr, falling back to stdout.
    pub fn tail(&self, lines: usize) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let all: Vec<&str> = text.lines().collect();
        all[all.len().saturating_sub(lines)..].join("\n")
    }
}

/// Run `program args..` in `dir`, killing it if it outlives `timeout`.
///
/// Dropping the returned future also kills the child.
///
/// # Errors
///
/// Returns [`BenchsiftError::Execution`] if the program cannot be spawned
/// and [`BenchsiftError::Timeout`] if it runs too long.
pub async fn run_process(
    program: &str,
    args: &[String],
    dir: &Path,
    timeout: Duration,
) -> Result<ProcessOutput, BenchsiftError> {
    let child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| BenchsiftError::Execution(format!("failed to spawn {program}: {e}")))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| BenchsiftError::Timeout {
            operation: program.to_string(),
            seconds: timeout.as_secs(),
        })?
        .map_err(|e| BenchsiftError::Execution(format!("{program} failed: {e}")))?;

    Ok(ProcessOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Whether `program args..` runs and exits 0 within ten seconds.
pub async fn probe_command(program: &str, args: &[&str], dir: &Path) -> Result<(), BenchsiftError> {
    let args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
    let output = run_process(program, &args, dir, Duration::from_secs(10))
        .await
        .map_err(|e| BenchsiftError::CapabilityUnavailable(format!("{program}: {e}")))?;
    if output.success() {
        Ok(())
    } else {
        Err(BenchsiftError::CapabilityUnavailable(format!(
            "`{program} {}` exited with {:?}: {}",
            args.join(" "),
            output.code,
            output.tail(3)
        )))
    }
}
