use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BenchsiftError;
use crate::language::LanguageProfile;
use crate::scope::RetryPolicy;

/// Top-level configuration loaded from `.benchsift.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use benchsift_core::BenchsiftConfig;
///
/// let config = BenchsiftConfig::default();
/// assert_eq!(config.filters.min_test_files, 1);
/// assert_eq!(config.oracle.timeout_secs, 600);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchsiftConfig {
    /// Eligibility thresholds.
    #[serde(default)]
    pub filters: FilterConfig,
    /// Regression oracle settings.
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Forge client settings.
    #[serde(default)]
    pub forge: ForgeConfig,
    /// Batch concurrency settings.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Optional LLM judge.
    #[serde(default)]
    pub judge: JudgeConfig,
    /// Per-language classification overrides.
    #[serde(default)]
    pub languages: HashMap<String, LanguageProfile>,
}

impl BenchsiftConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Io`] if the file cannot be read,
    /// [`BenchsiftError::Toml`] if the content is not valid TOML, or
    /// [`BenchsiftError::Config`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, BenchsiftError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Examples
    ///
    /// ```
    /// use benchsift_core::BenchsiftConfig;
    ///
    /// let toml = r#"
    /// [filters]
    /// min_test_files = 2
    /// "#;
    /// let config = BenchsiftConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.filters.min_test_files, 2);
    /// assert_eq!(config.filters.max_test_files, 15);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, BenchsiftError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The language profile for `language`, with `[languages.*]` overrides applied.
    ///
    /// `[oracle] language` wins over the forge-reported `language` when set.
    pub fn profile_for(&self, language: &str) -> LanguageProfile {
        let language = self.oracle.language.as_deref().unwrap_or(language);
        LanguageProfile::resolve(language, &self.languages)
    }

    /// Reject internally inconsistent settings.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Config`] naming the offending key.
    pub fn validate(&self) -> Result<(), BenchsiftError> {
        let f = &self.filters;
        if f.min_issue_words > f.max_issue_words {
            return Err(BenchsiftError::Config(format!(
                "filters.min_issue_words ({}) exceeds filters.max_issue_words ({})",
                f.min_issue_words, f.max_issue_words
            )));
        }
        if f.min_test_files > f.max_test_files {
            return Err(BenchsiftError::Config(format!(
                "filters.min_test_files ({}) exceeds filters.max_test_files ({})",
                f.min_test_files, f.max_test_files
            )));
        }
        if !(0.0..=1.0).contains(&f.english_threshold) {
            return Err(BenchsiftError::Config(format!(
                "filters.english_threshold must be within 0.0..=1.0, got {}",
                f.english_threshold
            )));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(BenchsiftError::Config(
                "oracle.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.batch.workers == 0 {
            return Err(BenchsiftError::Config(
                "batch.workers must be greater than zero".into(),
            ));
        }
        if self.forge.page_size == 0 {
            return Err(BenchsiftError::Config(
                "forge.page_size must be greater than zero".into(),
            ));
        }
        if self.judge.min_score > self.judge.max_score {
            return Err(BenchsiftError::Config(format!(
                "judge.min_score ({}) exceeds judge.max_score ({})",
                self.judge.min_score, self.judge.max_score
            )));
        }
        Ok(())
    }
}

/// Thresholds for the eligibility filter chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum number of test files (default: 1).
    #[serde(default = "default_min_test_files")]
    pub min_test_files: usize,
    /// Maximum number of non-test, non-asset files (default: 100).
    #[serde(default = "default_max_non_test_files")]
    pub max_non_test_files: usize,
    /// Minimum number of test plus non-test files (default: 6).
    #[serde(default = "default_min_total_files")]
    pub min_total_files: usize,
    /// Maximum number of test files (default: 15).
    #[serde(default = "default_max_test_files")]
    pub max_test_files: usize,
    /// Maximum number of files that are not data files (default: 50).
    #[serde(default = "default_max_code_files")]
    pub max_code_files: usize,
    /// Minimum changed source lines (default: 1).
    #[serde(default = "default_min_code_changes")]
    pub min_code_changes: usize,
    /// Lower bound of the linked-issue word band (default: 50).
    #[serde(default = "default_min_issue_words")]
    pub min_issue_words: usize,
    /// Upper bound of the linked-issue word band (default: 500).
    #[serde(default = "default_max_issue_words")]
    pub max_issue_words: usize,
    /// Reject PRs merged before this instant (RFC 3339 string).
    #[serde(default)]
    pub merged_after: Option<DateTime<Utc>>,
    /// Share of ASCII letters required to call text English (default: 0.8).
    #[serde(default = "default_english_threshold")]
    pub english_threshold: f64,
    /// Extensions that do not count towards `max_code_files`.
    #[serde(default = "default_data_extensions")]
    pub data_extensions: Vec<String>,
}

fn default_min_test_files() -> usize {
    1
}

fn default_max_non_test_files() -> usize {
    100
}

fn default_min_total_files() -> usize {
    6
}

fn default_max_test_files() -> usize {
    15
}

fn default_max_code_files() -> usize {
    50
}

fn default_min_code_changes() -> usize {
    1
}

fn default_min_issue_words() -> usize {
    50
}

fn default_max_issue_words() -> usize {
    500
}

fn default_english_threshold() -> f64 {
    0.8
}

fn default_data_extensions() -> Vec<String> {
    [
        ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".csv", ".json", ".xml", ".yaml", ".yml",
        ".md", ".txt", ".pdf", ".zip", ".tar", ".gz",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_test_files: default_min_test_files(),
            max_non_test_files: default_max_non_test_files(),
            min_total_files: default_min_total_files(),
            max_test_files: default_max_test_files(),
            max_code_files: default_max_code_files(),
            min_code_changes: default_min_code_changes(),
            min_issue_words: default_min_issue_words(),
            max_issue_words: default_max_issue_words(),
            merged_after: None,
            english_threshold: default_english_threshold(),
            data_extensions: default_data_extensions(),
        }
    }
}

/// Regression oracle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Run the oracle on accepted candidates (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Wall-clock budget for one candidate's dual run (default: 600).
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
    /// Budget for a single git command (default: 120).
    #[serde(default = "default_git_timeout")]
    pub git_timeout_secs: u64,
    /// Pin the repository language instead of using the forge's guess.
    #[serde(default)]
    pub language: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_oracle_timeout() -> u64 {
    600
}

fn default_git_timeout() -> u64 {
    120
}

impl OracleConfig {
    /// The per-candidate budget as a [`Duration`].
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_oracle_timeout(),
            git_timeout_secs: default_git_timeout(),
            language: None,
        }
    }
}

/// Forge client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Candidates per page (default: 50).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Retries after the first attempt for transient failures (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff delay in milliseconds (default: 1000).
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Longest single wait, including server hints, in seconds (default: 900).
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// API token; the `GITHUB_TOKEN` / `BITBUCKET_TOKEN` env vars take precedence.
    #[serde(default)]
    pub token: Option<String>,
}

fn default_page_size() -> usize {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    1000
}

fn default_max_wait_secs() -> u64 {
    900
}

fn default_request_timeout() -> u64 {
    30
}

impl ForgeConfig {
    /// Retry policy for forge and diff-service requests.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_ms),
            max_delay: Duration::from_secs(self.max_wait_secs),
        }
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            max_wait_secs: default_max_wait_secs(),
            request_timeout_secs: default_request_timeout(),
            token: None,
        }
    }
}

/// Batch evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Candidates evaluated concurrently (default: 4).
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    4
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// LLM judge configuration.
///
/// # Examples
///
/// ```
/// use benchsift_core::JudgeConfig;
///
/// let config = JudgeConfig::default();
/// assert!(!config.enabled);
/// assert_eq!(config.model, "gpt-4o");
/// assert_eq!((config.min_score, config.max_score), (0, 3));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Score validated candidates with the judge (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key; `BENCHSIFT_LLM_API_KEY` takes precedence.
    pub api_key: Option<String>,
    /// Custom base URL for an OpenAI-compatible endpoint.
    pub base_url: Option<String>,
    /// Attempts per rubric before a malformed response is treated as absent (default: 3).
    #[serde(default = "default_judge_attempts")]
    pub max_attempts: u32,
    /// Lowest valid score (default: 0).
    #[serde(default = "default_min_score")]
    pub min_score: i64,
    /// Highest valid score (default: 3).
    #[serde(default = "default_max_score")]
    pub max_score: i64,
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_judge_attempts() -> u32 {
    3
}

fn default_min_score() -> i64 {
    0
}

fn default_max_score() -> i64 {
    3
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_model(),
            api_key: None,
            base_url: None,
            max_attempts: default_judge_attempts(),
            min_score: default_min_score(),
            max_score: default_max_score(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = BenchsiftConfig::default();
        assert_eq!(config.filters.min_test_files, 1);
        assert_eq!(config.filters.max_non_test_files, 100);
        assert_eq!(config.filters.min_total_files, 6);
        assert_eq!(config.filters.max_test_files, 15);
        assert_eq!(config.filters.max_code_files, 50);
        assert_eq!(config.filters.min_code_changes, 1);
        assert_eq!(config.filters.min_issue_words, 50);
        assert_eq!(config.filters.max_issue_words, 500);
        assert!(config.filters.merged_after.is_none());
        assert!(config.oracle.enabled);
        assert_eq!(config.forge.page_size, 50);
        assert_eq!(config.batch.workers, 4);
        assert!(!config.judge.enabled);
        assert!(config.languages.is_empty());
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = BenchsiftConfig::from_toml("").unwrap();
        assert_eq!(config.filters.max_test_files, 15);
        assert_eq!(config.judge.model, "gpt-4o");
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[filters]
min_test_files = 2
merged_after = "2024-01-01T00:00:00Z"
data_extensions = [".png"]

[oracle]
timeout_secs = 120
language = "Python"

[forge]
max_retries = 5

[batch]
workers = 8

[judge]
enabled = true
model = "gpt-4o-mini"

[languages.Python]
test_patterns = ["check_*.py"]
"#;
        let config = BenchsiftConfig::from_toml(toml).unwrap();
        assert_eq!(config.filters.min_test_files, 2);
        assert_eq!(
            config.filters.merged_after.map(|d| d.to_rfc3339()),
            Some("2024-01-01T00:00:00+00:00".to_string())
        );
        assert_eq!(config.filters.data_extensions, vec![".png"]);
        assert_eq!(config.oracle.budget(), Duration::from_secs(120));
        assert_eq!(config.oracle.language.as_deref(), Some("Python"));
        assert_eq!(config.forge.retry_policy().max_retries, 5);
        assert_eq!(config.batch.workers, 8);
        assert!(config.judge.enabled);
        assert_eq!(
            config.languages["Python"].test_patterns,
            vec!["check_*.py"]
        );
    }

    #[test]
    fn pinned_language_overrides_forge_guess() {
        let config = BenchsiftConfig::from_toml("[oracle]\nlanguage = \"Rust\"\n").unwrap();
        let profile = config.profile_for("Python");
        assert_eq!(profile.name, "Rust");
        assert!(profile.detects_embedded_tests());
    }

    #[test]
    fn inverted_word_band_is_rejected() {
        let toml = r#"
[filters]
min_issue_words = 600
max_issue_words = 500
"#;
        let err = BenchsiftConfig::from_toml(toml).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("min_issue_words"));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = BenchsiftConfig::from_toml("[batch]\nworkers = 0\n").unwrap_err();
        assert!(matches!(err, BenchsiftError::Config(_)));
    }

    #[test]
    fn invalid_toml_returns_error() {
        assert!(BenchsiftConfig::from_toml("{{invalid}}").is_err());
    }
}
