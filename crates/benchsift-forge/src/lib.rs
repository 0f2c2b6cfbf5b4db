//! Forge clients: paginated merged-PR listings, issue lookups and remote diffs.
//!
//! Every forge normalises its payloads into [`PullRequestCandidate`] and
//! [`LinkedIssue`], so nothing downstream branches on the platform.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use benchsift_core::{BenchsiftError, ForgeConfig, LinkedIssue, PullRequestCandidate};

pub mod bitbucket;
pub mod github;
pub mod http;
pub mod kind;
pub mod refs;

pub use bitbucket::BitbucketForge;
pub use github::GitHubForge;
pub use kind::{ForgeKind, RepoSlug};

/// One page of merged pull requests.
#[derive(Debug, Clone, Default)]
pub struct CandidatePage {
    /// Candidates on this page, newest first.
    pub candidates: Vec<PullRequestCandidate>,
    /// Cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
    /// The repository's primary language, when the forge reports one.
    pub primary_language: Option<String>,
}

/// A source of merged pull requests and their issues.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Which platform this is.
    fn kind(&self) -> ForgeKind;

    /// Fetch one page of merged PRs starting at `cursor`.
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<CandidatePage, BenchsiftError>;

    /// Fetch one issue; `Ok(None)` when it does not exist.
    async fn fetch_issue(&self, number: u64) -> Result<Option<LinkedIssue>, BenchsiftError>;

    /// Issue numbers referenced in free text.
    fn extract_issue_refs(&self, text: &str) -> Vec<u64>;
}

/// Remote `(base, head)` diff retrieval.
#[async_trait]
pub trait DiffService: Send + Sync {
    /// Unified diff from `base` to `head`.
    async fn fetch_diff(&self, base: &str, head: &str) -> Result<String, BenchsiftError>;
}

/// Forge client and diff service for one repository.
pub struct Connection {
    /// PR and issue source.
    pub forge: Arc<dyn Forge>,
    /// Remote diff source.
    pub diffs: Arc<dyn DiffService>,
}

/// Connect to `slug` on `kind`.
///
/// # Errors
///
/// Returns [`BenchsiftError::Config`] if the HTTP client cannot be built.
///
/// # Examples
///
/// ```
/// use benchsift_core::ForgeConfig;
/// use benchsift_forge::{connect, ForgeKind, RepoSlug};
///
/// let slug = RepoSlug::parse("psf/requests").unwrap();
/// let conn = connect(ForgeKind::GitHub, &slug, None, &ForgeConfig::default()).unwrap();
/// assert_eq!(conn.forge.kind(), ForgeKind::GitHub);
/// ```
pub fn connect(
    kind: ForgeKind,
    slug: &RepoSlug,
    token: Option<String>,
    config: &ForgeConfig,
) -> Result<Connection, BenchsiftError> {
    let http = http::HttpClient::new(
        token,
        Duration::from_secs(config.request_timeout_secs),
        config.retry_policy(),
    )?;
    Ok(match kind {
        ForgeKind::GitHub => {
            let forge = Arc::new(GitHubForge::new(slug.clone(), http)?);
            Connection {
                forge: forge.clone(),
                diffs: forge,
            }
        }
        ForgeKind::Bitbucket => {
            let forge = Arc::new(BitbucketForge::new(slug.clone(), http)?);
            Connection {
                forge: forge.clone(),
                diffs: forge,
            }
        }
    })
}
