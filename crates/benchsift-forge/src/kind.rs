//! Which forge a repository lives on, and its `owner/name` slug.

use std::fmt;

use benchsift_core::BenchsiftError;

/// Supported hosting platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeKind {
    /// github.com
    GitHub,
    /// bitbucket.org
    Bitbucket,
}

impl ForgeKind {
    /// Pick the forge from an explicit choice, else from the repository string.
    ///
    /// `github:` / `bitbucket:` prefixes and host names are recognised;
    /// anything else is GitHub.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Config`] for an unknown explicit choice.
    ///
    /// # Examples
    ///
    /// ```
    /// use benchsift_forge::ForgeKind;
    ///
    /// assert_eq!(ForgeKind::detect(None, "psf/requests").unwrap(), ForgeKind::GitHub);
    /// assert_eq!(
    ///     ForgeKind::detect(None, "https://bitbucket.org/atlassian/python-bitbucket").unwrap(),
    ///     ForgeKind::Bitbucket
    /// );
    /// assert_eq!(ForgeKind::detect(Some("bitbucket"), "a/b").unwrap(), ForgeKind::Bitbucket);
    /// assert!(ForgeKind::detect(Some("gitlab"), "a/b").is_err());
    /// ```
    pub fn detect(explicit: Option<&str>, repo: &str) -> Result<Self, BenchsiftError> {
        if let Some(choice) = explicit {
            return match choice.to_ascii_lowercase().as_str() {
                "github" => Ok(ForgeKind::GitHub),
                "bitbucket" => Ok(ForgeKind::Bitbucket),
                other => Err(BenchsiftError::Config(format!(
                    "unknown forge '{other}' (expected github or bitbucket)"
                ))),
            };
        }
        let lower = repo.to_ascii_lowercase();
        if lower.starts_with("bitbucket:") || lower.contains("bitbucket.org") {
            Ok(ForgeKind::Bitbucket)
        } else {
            Ok(ForgeKind::GitHub)
        }
    }

    /// Web host, used for issue URLs.
    pub fn host(&self) -> &'static str {
        match self {
            ForgeKind::GitHub => "github.com",
            ForgeKind::Bitbucket => "bitbucket.org",
        }
    }

    /// Environment variable holding the API token.
    pub fn token_env(&self) -> &'static str {
        match self {
            ForgeKind::GitHub => "GITHUB_TOKEN",
            ForgeKind::Bitbucket => "BITBUCKET_TOKEN",
        }
    }
}

impl fmt::Display for ForgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForgeKind::GitHub => write!(f, "github"),
            ForgeKind::Bitbucket => write!(f, "bitbucket"),
        }
    }
}

/// A repository's `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    /// Owner or workspace.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl RepoSlug {
    /// Parse `owner/name`, `github:owner/name` or a web / clone URL.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Config`] if no `owner/name` pair can be found.
    ///
    /// # Examples
    ///
    /// ```
    /// use benchsift_forge::RepoSlug;
    ///
    /// let slug = RepoSlug::parse("https://github.com/psf/requests.git").unwrap();
    /// assert_eq!(slug.full_name(), "psf/requests");
    ///
    /// let slug = RepoSlug::parse("bitbucket:atlassian/stash-example").unwrap();
    /// assert_eq!(slug.owner, "atlassian");
    /// ```
    pub fn parse(repo: &str) -> Result<Self, BenchsiftError> {
        let mut rest = repo.trim();
        for prefix in ["github:", "bitbucket:", "https://", "http://", "git@"] {
            rest = rest.strip_prefix(prefix).unwrap_or(rest);
        }
        for host in ["github.com/", "github.com:", "bitbucket.org/", "bitbucket.org:"] {
            rest = rest.strip_prefix(host).unwrap_or(rest);
        }
        let rest = rest.trim_end_matches('/');
        let rest = rest.strip_suffix(".git").unwrap_or(rest);

        let mut parts = rest.split('/');
        match (parts.next(), parts.next()) {
            (Some(owner), Some(name)) if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(BenchsiftError::Config(format!(
                "cannot parse repository '{repo}' (expected owner/name)"
            ))),
        }
    }

    /// `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}
