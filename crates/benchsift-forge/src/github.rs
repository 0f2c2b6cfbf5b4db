//! GitHub: GraphQL for PR pages, REST for issues and compare diffs.

use async_trait::async_trait;
use benchsift_core::{
    Author, BenchsiftError, ChangeKind, ChangedFile, LinkedIssue, PullRequestCandidate,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::http::HttpClient;
use crate::kind::{ForgeKind, RepoSlug};
use crate::refs::IssueRefExtractor;
use crate::{CandidatePage, DiffService, Forge};

const API: &str = "https://api.github.com";
const JSON: &str = "application/vnd.github+json";
const DIFF: &str = "application/vnd.github.v3.diff";

const PULLS_QUERY: &str = r#"
query($owner: String!, $name: String!, $cursor: String, $pageSize: Int!) {
  repository(owner: $owner, name: $name) {
    primaryLanguage { name }
    pullRequests(first: $pageSize, after: $cursor, states: MERGED,
                 orderBy: {field: CREATED_AT, direction: DESC}) {
      pageInfo { endCursor hasNextPage }
      nodes {
        number
        title
        body
        baseRefOid
        headRefOid
        mergedAt
        createdAt
        author { login __typename }
        files(first: 100) {
          nodes { path changeType additions deletions }
        }
        closingIssuesReferences(first: 10) {
          nodes { number title body state __typename }
        }
      }
    }
  }
}
"#;

/// GitHub forge client.
pub struct GitHubForge {
    slug: RepoSlug,
    http: HttpClient,
    refs: IssueRefExtractor,
}

impl GitHubForge {
    /// Client for `slug`.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Config`] if the issue-reference pattern fails to compile.
    pub fn new(slug: RepoSlug, http: HttpClient) -> Result<Self, BenchsiftError> {
        Ok(Self {
            slug,
            http,
            refs: IssueRefExtractor::new(ForgeKind::GitHub.host())?,
        })
    }
}

#[async_trait]
impl Forge for GitHubForge {
    fn kind(&self) -> ForgeKind {
        ForgeKind::GitHub
    }

    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<CandidatePage, BenchsiftError> {
        let body = json!({
            "query": PULLS_QUERY,
            "variables": {
                "owner": self.slug.owner,
                "name": self.slug.name,
                "cursor": cursor,
                "pageSize": page_size,
            },
        });
        let response: GraphQlResponse = self
            .http
            .post_json(&format!("{API}/graphql"), &body)
            .await?;
        parse_page(response)
    }

    async fn fetch_issue(&self, number: u64) -> Result<Option<LinkedIssue>, BenchsiftError> {
        let url = format!("{API}/repos/{}/issues/{number}", self.slug.full_name());
        let issue: RestIssue = match self.http.get_json(&url, JSON).await {
            Ok(issue) => issue,
            Err(BenchsiftError::Network { message, .. }) if message.starts_with("HTTP 404") => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };
        Ok(Some(LinkedIssue {
            number: issue.number,
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            state: issue.state.to_ascii_lowercase(),
            is_pull_request: issue.pull_request.is_some(),
        }))
    }

    fn extract_issue_refs(&self, text: &str) -> Vec<u64> {
        self.refs.extract(text)
    }
}

#[async_trait]
impl DiffService for GitHubForge {
    async fn fetch_diff(&self, base: &str, head: &str) -> Result<String, BenchsiftError> {
        let url = format!(
            "{API}/repos/{}/compare/{base}...{head}",
            self.slug.full_name()
        );
        let diff = self.http.get_text(&url, DIFF).await?;
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
struct RestIssue {
    number: u64,
    #[serde(default)]
    title: String,
    body: Option<String>,
    #[serde(default)]
    state: String,
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlData {
    repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    primary_language: Option<NameNode>,
    pull_requests: Nodes<PullRequestNode>,
}

#[derive(Debug, Deserialize)]
struct NameNode {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Nodes<T> {
    page_info: Option<PageInfo>,
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestNode {
    number: u64,
    title: String,
    body: Option<String>,
    base_ref_oid: String,
    head_ref_oid: String,
    merged_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    author: Option<AuthorNode>,
    files: Option<Nodes<FileNode>>,
    closing_issues_references: Option<Nodes<IssueNode>>,
}

#[derive(Debug, Deserialize)]
struct AuthorNode {
    login: String,
    #[serde(rename = "__typename", default)]
    typename: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileNode {
    path: String,
    change_type: String,
    additions: u64,
    deletions: u64,
}

#[derive(Debug, Deserialize)]
struct IssueNode {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    #[serde(rename = "__typename", default)]
    typename: String,
}

fn parse_page(response: GraphQlResponse) -> Result<CandidatePage, BenchsiftError> {
    if let Some(first) = response.errors.first() {
        return Err(BenchsiftError::permanent(format!(
            "GraphQL error: {}",
            first.message
        )));
    }
    let repository = response
        .data
        .and_then(|d| d.repository)
        .ok_or_else(|| BenchsiftError::Parse("GraphQL response has no repository".into()))?;

    let next_cursor = repository
        .pull_requests
        .page_info
        .filter(|p| p.has_next_page)
        .and_then(|p| p.end_cursor);

    let candidates = repository
        .pull_requests
        .nodes
        .into_iter()
        .flatten()
        .filter_map(candidate_from_node)
        .collect();

    Ok(CandidatePage {
        candidates,
        next_cursor,
        primary_language: repository.primary_language.map(|l| l.name),
    })
}

fn candidate_from_node(node: PullRequestNode) -> Option<PullRequestCandidate> {
    let merged_at = node.merged_at?;
    let author = node.author.map_or_else(
        || Author {
            login: "ghost".into(),
            is_bot: false,
        },
        |a| Author {
            is_bot: a.typename == "Bot",
            login: a.login,
        },
    );
    let files = node
        .files
        .map(|f| f.nodes.into_iter().flatten().collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
        .map(|f| ChangedFile {
            change: ChangeKind::from_forge(&f.change_type),
            path: f.path,
            additions: f.additions,
            deletions: f.deletions,
        })
        .collect();
    let linked_issues = node
        .closing_issues_references
        .map(|i| i.nodes.into_iter().flatten().collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
        .map(|i| LinkedIssue {
            is_pull_request: i.typename == "PullRequest",
            number: i.number,
            title: i.title,
            body: i.body.unwrap_or_default(),
            state: i.state.to_ascii_lowercase(),
        })
        .collect();

    Some(PullRequestCandidate {
        number: node.number,
        title: node.title,
        body: node.body.unwrap_or_default(),
        author,
        created_at: node.created_at,
        merged_at,
        base_sha: node.base_ref_oid,
        head_sha: node.head_ref_oid,
        files,
        linked_issues,
    })
}
