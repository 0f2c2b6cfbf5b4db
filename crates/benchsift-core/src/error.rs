use std::path::PathBuf;

/// Errors that can occur across benchsift.
///
/// Library crates return this type directly; the binary crate renders it
/// through `miette` at the boundary. Only [`BenchsiftError::Config`] is fatal
/// to a batch; every other variant is caught at the candidate boundary and
/// turned into a reason code.
///
/// # Examples
///
/// ```
/// use benchsift_core::BenchsiftError;
///
/// let err = BenchsiftError::Config("min_issue_words > max_issue_words".into());
/// assert!(err.is_fatal());
/// assert!(err.to_string().contains("min_issue_words"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum BenchsiftError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(benchsift::io))]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration. Halts the run.
    #[error("configuration error: {0}")]
    #[diagnostic(
        code(benchsift::config),
        help("check .benchsift.toml and the command-line flags")
    )]
    Config(String),

    /// Forge or diff-service request failure.
    #[error("network error: {message}")]
    #[diagnostic(code(benchsift::network))]
    Network {
        /// Human-readable failure description.
        message: String,
        /// Whether retrying could succeed (timeouts, 5xx, rate limits).
        transient: bool,
    },

    /// No tier of the patch fallback chain produced a diff.
    #[error("patch unavailable for {base}..{head}")]
    #[diagnostic(code(benchsift::patch_unavailable))]
    PatchUnavailable {
        /// Pre-fix commit.
        base: String,
        /// Post-fix commit.
        head: String,
    },

    /// No usable test runner for the repository.
    #[error("test runner unavailable: {0}")]
    #[diagnostic(code(benchsift::capability))]
    CapabilityUnavailable(String),

    /// An operation exceeded its wall-clock budget.
    #[error("{operation} timed out after {seconds}s")]
    #[diagnostic(code(benchsift::timeout))]
    Timeout {
        /// What was running.
        operation: String,
        /// The budget that was exceeded.
        seconds: u64,
    },

    /// Git operation failure.
    #[error("git error: {0}")]
    #[diagnostic(code(benchsift::git))]
    Git(String),

    /// External process (test runner) failure.
    #[error("execution error: {0}")]
    #[diagnostic(code(benchsift::execution))]
    Execution(String),

    /// Malformed diff, runner output or forge payload.
    #[error("parse error: {0}")]
    #[diagnostic(code(benchsift::parse))]
    Parse(String),

    /// LLM API or response error.
    #[error("LLM error: {0}")]
    #[diagnostic(code(benchsift::llm))]
    Llm(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    #[diagnostic(code(benchsift::serialization))]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(benchsift::toml))]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    #[diagnostic(code(benchsift::file_not_found))]
    FileNotFound(PathBuf),
}

impl BenchsiftError {
    /// Whether this error must halt the whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BenchsiftError::Config(_) | BenchsiftError::Toml(_))
    }

    /// Whether a retry of the same request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BenchsiftError::Network {
                transient: true,
                ..
            }
        )
    }

    /// Shorthand for a transient network failure.
    pub fn transient(message: impl Into<String>) -> Self {
        BenchsiftError::Network {
            message: message.into(),
            transient: true,
        }
    }

    /// Shorthand for a permanent network failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        BenchsiftError::Network {
            message: message.into(),
            transient: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BenchsiftError = io_err.into();
        assert!(err.to_string().contains("gone"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn config_error_is_fatal() {
        let err = BenchsiftError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
        assert!(err.is_fatal());
    }

    #[test]
    fn network_transience() {
        assert!(BenchsiftError::transient("502").is_transient());
        assert!(!BenchsiftError::permanent("410 gone").is_transient());
        assert!(!BenchsiftError::Git("boom".into()).is_transient());
    }

    #[test]
    fn timeout_displays_budget() {
        let err = BenchsiftError::Timeout {
            operation: "oracle run".into(),
            seconds: 600,
        };
        assert_eq!(err.to_string(), "oracle run timed out after 600s");
    }

    #[test]
    fn patch_unavailable_names_range() {
        let err = BenchsiftError::PatchUnavailable {
            base: "aaa".into(),
            head: "bbb".into(),
        };
        assert!(err.to_string().contains("aaa..bbb"));
    }
}
