//! Issue references and bot accounts recognised in PR metadata.

use benchsift_core::BenchsiftError;
use regex::Regex;

/// Well-known automation accounts that do not use the `[bot]` suffix.
const KNOWN_BOTS: &[&str] = &[
    "dependabot",
    "renovate",
    "codecov",
    "greenkeeper",
    "snyk-bot",
    "pyup-bot",
    "whitesource",
    "mergify",
    "stale",
    "github-actions",
    "allcontributors",
    "imgbot",
    "k8s-ci-robot",
    "k8s-bot",
    "k8s-mergebot",
];

/// Whether a login looks like an automation account.
///
/// # Examples
///
/// ```
/// use benchsift_forge::refs::is_bot_login;
///
/// assert!(is_bot_login("dependabot[bot]"));
/// assert!(is_bot_login("Renovate"));
/// assert!(!is_bot_login("octocat"));
/// assert!(!is_bot_login(""));
/// ```
pub fn is_bot_login(login: &str) -> bool {
    if login.is_empty() {
        return false;
    }
    if login.ends_with("[bot]") {
        return true;
    }
    let lower = login.to_ascii_lowercase();
    KNOWN_BOTS.contains(&lower.as_str())
}

/// Extracts issue numbers from free text for one forge host.
#[derive(Debug, Clone)]
pub struct IssueRefExtractor {
    short: Regex,
    url: Regex,
}

impl IssueRefExtractor {
    /// Recognise `#123` and `https://<host>/<owner>/<repo>/issues/123`.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Config`] if `host` yields an invalid pattern.
    pub fn new(host: &str) -> Result<Self, BenchsiftError> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| BenchsiftError::Config(format!("invalid issue pattern: {e}")))
        };
        Ok(Self {
            short: compile(r"#(\d+)")?,
            url: compile(&format!(
                r"https://{}/[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+/issues/(\d+)",
                regex::escape(host)
            ))?,
        })
    }

    /// Distinct issue numbers in `text`, ascending.
    ///
    /// # Examples
    ///
    /// ```
    /// use benchsift_forge::refs::IssueRefExtractor;
    ///
    /// let refs = IssueRefExtractor::new("github.com").unwrap();
    /// let text = "Fixes #12, see https://github.com/psf/requests/issues/7 and #12";
    /// assert_eq!(refs.extract(text), vec![7, 12]);
    /// ```
    pub fn extract(&self, text: &str) -> Vec<u64> {
        let mut numbers: Vec<u64> = self
            .short
            .captures_iter(text)
            .chain(self.url.captures_iter(text))
            .filter_map(|c| c.get(1)?.as_str().parse().ok())
            .collect();
        numbers.sort_unstable();
        numbers.dedup();
        numbers
    }
}
