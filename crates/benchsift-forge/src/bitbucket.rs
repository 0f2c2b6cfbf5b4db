//! Bitbucket Cloud: REST pages, diffstat per PR, issues and diffs.

use async_trait::async_trait;
use benchsift_core::{
    Author, BenchsiftError, ChangeKind, ChangedFile, LinkedIssue, PullRequestCandidate,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::http::HttpClient;
use crate::kind::{ForgeKind, RepoSlug};
use crate::refs::IssueRefExtractor;
use crate::{CandidatePage, DiffService, Forge};

const API: &str = "https://api.bitbucket.org/2.0";
const JSON: &str = "application/json";

/// Bitbucket forge client.
///
/// Bitbucket has no closing-issue links, so candidates come back with no
/// linked issues; the batch layer resolves references from the PR body.
pub struct BitbucketForge {
    slug: RepoSlug,
    http: HttpClient,
    refs: IssueRefExtractor,
    language: OnceCell<Option<String>>,
}

impl BitbucketForge {
    /// Client for `slug`.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Config`] if the issue-reference pattern fails to compile.
    pub fn new(slug: RepoSlug, http: HttpClient) -> Result<Self, BenchsiftError> {
        Ok(Self {
            slug,
            http,
            refs: IssueRefExtractor::new(ForgeKind::Bitbucket.host())?,
            language: OnceCell::new(),
        })
    }

    fn repo_url(&self) -> String {
        format!("{API}/repositories/{}", self.slug.full_name())
    }

    async fn primary_language(&self) -> Option<String> {
        self.language
            .get_or_init(|| async {
                match self.http.get_json::<BbRepository>(&self.repo_url(), JSON).await {
                    Ok(repo) => repo.language.filter(|l| !l.is_empty()),
                    Err(e) => {
                        tracing::debug!(error = %e, "failed to fetch repository language");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    async fn diffstat(&self, url: &str) -> Result<Vec<ChangedFile>, BenchsiftError> {
        let mut files = Vec::new();
        let mut next = Some(url.to_string());
        while let Some(url) = next {
            let page: BbPage<BbDiffStat> = self.http.get_json(&url, JSON).await?;
            files.extend(page.values.into_iter().filter_map(changed_file));
            next = page.next;
        }
        Ok(files)
    }
}

#[async_trait]
impl Forge for BitbucketForge {
    fn kind(&self) -> ForgeKind {
        ForgeKind::Bitbucket
    }

    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<CandidatePage, BenchsiftError> {
        // Bitbucket cursors are full `next` URLs.
        let url = match cursor {
            Some(next) => next.to_string(),
            None => format!(
                "{}/pullrequests?state=MERGED&sort=-created_on&pagelen={page_size}",
                self.repo_url()
            ),
        };
        let page: BbPage<BbPullRequest> = self.http.get_json(&url, JSON).await?;

        let mut candidates = Vec::with_capacity(page.values.len());
        for pr in page.values {
            let files = match pr.links.diffstat.as_ref() {
                Some(link) => self.diffstat(&link.href).await.unwrap_or_else(|e| {
                    tracing::warn!(pr = pr.id, error = %e, "failed to fetch diffstat");
                    Vec::new()
                }),
                None => Vec::new(),
            };
            if let Some(candidate) = candidate_from_pr(pr, files) {
                candidates.push(candidate);
            }
        }

        Ok(CandidatePage {
            candidates,
            next_cursor: page.next,
            primary_language: self.primary_language().await,
        })
    }

    async fn fetch_issue(&self, number: u64) -> Result<Option<LinkedIssue>, BenchsiftError> {
        let url = format!("{}/issues/{number}", self.repo_url());
        let issue: BbIssue = match self.http.get_json(&url, JSON).await {
            Ok(issue) => issue,
            Err(BenchsiftError::Network { message, .. }) if message.starts_with("HTTP 404") => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };
        Ok(Some(LinkedIssue {
            number: issue.id,
            title: issue.title,
            body: issue.content.and_then(|c| c.raw).unwrap_or_default(),
            state: issue.state.to_ascii_lowercase(),
            is_pull_request: false,
        }))
    }

    fn extract_issue_refs(&self, text: &str) -> Vec<u64> {
        self.refs.extract(text)
    }
}

#[async_trait]
impl DiffService for BitbucketForge {
    async fn fetch_diff(&self, base: &str, head: &str) -> Result<String, BenchsiftError> {
        // Bitbucket's spec is `<source>..<destination>`.
        let url = format!("{}/diff/{head}..{base}", self.repo_url());
        let diff = self.http.get_text(&url, "text/plain").await?;
        if diff.trim().is_empty() {
            return Err(BenchsiftError::PatchUnavailable {
                base: base.into(),
                head: head.into(),
            });
        }
        Ok(diff)
    }
}

#[derive(Debug, Deserialize)]
struct BbPage<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BbRepository {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BbPullRequest {
    id: u64,
    #[serde(default)]
    title: String,
    description: Option<String>,
    author: Option<BbAccount>,
    source: BbEndpoint,
    destination: BbEndpoint,
    created_on: DateTime<Utc>,
    closed_on: Option<DateTime<Utc>>,
    updated_on: Option<DateTime<Utc>>,
    #[serde(default)]
    links: BbLinks,
}

#[derive(Debug, Deserialize)]
struct BbAccount {
    display_name: Option<String>,
    nickname: Option<String>,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct BbEndpoint {
    commit: Option<BbCommit>,
}

#[derive(Debug, Deserialize)]
struct BbCommit {
    hash: String,
}

#[derive(Debug, Default, Deserialize)]
struct BbLinks {
    diffstat: Option<BbHref>,
}

#[derive(Debug, Deserialize)]
struct BbHref {
    href: String,
}

#[derive(Debug, Deserialize)]
struct BbDiffStat {
    #[serde(default)]
    status: String,
    #[serde(default)]
    lines_added: u64,
    #[serde(default)]
    lines_removed: u64,
    old: Option<BbPath>,
    new: Option<BbPath>,
}

#[derive(Debug, Deserialize)]
struct BbPath {
    path: String,
}

#[derive(Debug, Deserialize)]
struct BbIssue {
    id: u64,
    #[serde(default)]
    title: String,
    content: Option<BbContent>,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
struct BbContent {
    raw: Option<String>,
}

fn changed_file(stat: BbDiffStat) -> Option<ChangedFile> {
    let path = stat.new.or(stat.old)?.path;
    Some(ChangedFile {
        path,
        change: ChangeKind::from_forge(&stat.status),
        additions: stat.lines_added,
        deletions: stat.lines_removed,
    })
}

fn candidate_from_pr(pr: BbPullRequest, files: Vec<ChangedFile>) -> Option<PullRequestCandidate> {
    let merged_at = pr.closed_on.or(pr.updated_on)?;
    let author = pr.author.map_or_else(
        || Author {
            login: String::new(),
            is_bot: false,
        },
        |a| Author {
            is_bot: a.kind == "app_user",
            login: a.nickname.or(a.display_name).unwrap_or_default(),
        },
    );
    Some(PullRequestCandidate {
        number: pr.id,
        title: pr.title,
        body: pr.description.unwrap_or_default(),
        author,
        created_at: pr.created_on,
        merged_at,
        base_sha: pr.destination.commit.map(|c| c.hash).unwrap_or_default(),
        head_sha: pr.source.commit.map(|c| c.hash).unwrap_or_default(),
        files,
        linked_issues: Vec::new(),
    })
}
