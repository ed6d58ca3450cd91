//! Commit history from the GitHub REST API.
//!
//! Commits come from `GET /repos/{owner}/{repo}/commits` and tags from
//! `GET /repos/{owner}/{repo}/tags`; both are paginated 100 at a time. Tags
//! are joined onto commits by hash.
//!
//! Authentication is a bearer token. Without one, requests are anonymous and
//! subject to GitHub's much lower rate limit.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::commit::Commit;
use crate::history::{HistoryError, HistorySource};

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "relnotes";

/// Items requested per page (GitHub's maximum).
const PER_PAGE: usize = 100;

/// GitHub-backed history source.
pub struct GitHubHistory {
    client: Client,
    owner: String,
    repo: String,
    /// Branch to read when no start commit is given; the repository default when `None`
    branch: Option<String>,
    token: Option<String>,
    api_base: String,
    /// Upper bound on pages fetched per listing
    max_pages: u32,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitHubHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubHistory")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("has_token", &self.token.is_some())
            .field("api_base", &self.api_base)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl GitHubHistory {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            owner: owner.into(),
            repo: repo.into(),
            branch: None,
            token,
            api_base: DEFAULT_API_BASE.to_string(),
            max_pages: 10,
        }
    }

    /// Point at a different API root (GitHub Enterprise, test servers).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    fn headers(&self) -> Result<HeaderMap, HistoryError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| HistoryError::Auth("token contains invalid characters".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.owner, self.repo, path
        )
    }

    /// Fetch every page of a listing endpoint, up to `max_pages`.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, HistoryError> {
        let url = self.repo_url(path);
        let per_page = PER_PAGE.to_string();
        let mut items = Vec::new();

        for page in 1..=self.max_pages {
            let page_param = page.to_string();
            let response = self
                .client
                .get(&url)
                .headers(self.headers()?)
                .query(query)
                .query(&[("per_page", per_page.as_str()), ("page", page_param.as_str())])
                .send()
                .await
                .map_err(|source| HistoryError::Transport {
                    url: url.clone(),
                    source,
                })?;

            let batch: Vec<T> = handle_response(response).await?;
            let len = batch.len();
            items.extend(batch);
            debug!(%url, page, len, "fetched page");

            if len < PER_PAGE {
                return Ok(items);
            }
        }

        warn!(
            %url,
            max_pages = self.max_pages,
            "listing truncated; older entries were not fetched"
        );
        Ok(items)
    }
}

impl HistorySource for GitHubHistory {
    async fn fetch(&self, start: Option<&str>) -> Result<Vec<Commit>, HistoryError> {
        let head = start.or(self.branch.as_deref());
        let query: Vec<(&str, &str)> = head.map(|sha| ("sha", sha)).into_iter().collect();

        let commits: Vec<ApiCommit> = self.get_all("commits", &query).await?;
        let tags: Vec<ApiTag> = self.get_all("tags", &[]).await?;

        let mut tag_by_sha = HashMap::new();
        for tag in tags {
            tag_by_sha.entry(tag.commit.sha).or_insert(tag.name);
        }

        Ok(commits
            .into_iter()
            .map(|c| {
                let date = c
                    .commit
                    .committer
                    .or(c.commit.author)
                    .map(|sig| sig.date)
                    .unwrap_or_default();
                Commit {
                    tag: tag_by_sha.get(&c.sha).cloned(),
                    sha: c.sha,
                    message: c.commit.message,
                    date,
                }
            })
            .collect())
    }
}

/// Map a response to its JSON body or a typed error.
async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, HistoryError> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(HistoryError::Decode);
    }

    let message = match response.json::<GitHubErrorResponse>().await {
        Ok(err) => err.message,
        Err(_) => "Unknown error".to_string(),
    };

    Err(match status {
        StatusCode::UNAUTHORIZED => HistoryError::Auth(format!("invalid or expired token ({message})")),
        _ => HistoryError::Api {
            status: status.as_u16(),
            message,
        },
    })
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    commit: ApiCommitDetails,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetails {
    message: String,
    author: Option<ApiSignature>,
    committer: Option<ApiSignature>,
}

#[derive(Debug, Deserialize)]
struct ApiSignature {
    date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ApiTag {
    name: String,
    commit: ApiTagCommit,
}

#[derive(Debug, Deserialize)]
struct ApiTagCommit {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitHubErrorResponse {
    message: String,
}
