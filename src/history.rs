//! Where commit history comes from.
//!
//! A [`HistorySource`] returns commits newest-first, optionally starting from
//! an arbitrary commit instead of the branch head. Two sources are provided:
//! the GitHub REST API ([`GitHubHistory`]) and a local checkout ([`Git`]).

use std::future::Future;

use thiserror::Error;
use tracing::debug;

use crate::commit::Commit;
use crate::config::{ConfigError, HistoryConfig, Provider};
use crate::git::{self, Git};
use crate::github::GitHubHistory;

/// Supplies commit metadata, newest first.
pub trait HistorySource {
    /// Fetch commits reachable from `start`, or from the default head when `None`.
    fn fetch(
        &self,
        start: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Commit>, HistoryError>>;
}

/// The history source selected by configuration.
#[derive(Debug)]
pub enum HistoryProvider {
    GitHub(GitHubHistory),
    Git(Git),
}

impl HistoryProvider {
    /// Build the configured source. `env` looks up environment variables.
    pub fn from_config(
        config: &HistoryConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        match config.provider {
            Provider::GitHub => {
                let slug = env("GITHUB_REPO")
                    .or_else(|| config.repo.clone())
                    .ok_or(ConfigError::MissingRepo)?;
                let (owner, repo) = slug
                    .split_once('/')
                    .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty() && !repo.contains('/'))
                    .ok_or_else(|| ConfigError::InvalidRepo(slug.clone()))?;

                let token = env(&config.token_env);
                if token.is_none() {
                    debug!(var = %config.token_env, "no GitHub token; requests are unauthenticated");
                }

                let github = GitHubHistory::new(owner, repo, token)
                    .with_api_base(&config.api_base)
                    .with_branch(config.branch.clone())
                    .with_max_pages(config.max_pages);
                Ok(Self::GitHub(github))
            }
            Provider::Git => {
                let repo = Git::discover(&config.path).map_err(ConfigError::Git)?;
                debug!(root = %repo.root().display(), "reading local repository");
                Ok(Self::Git(match &config.branch {
                    Some(branch) => repo.with_rev(branch.as_str()),
                    None => repo,
                }))
            }
        }
    }
}

impl HistorySource for HistoryProvider {
    async fn fetch(&self, start: Option<&str>) -> Result<Vec<Commit>, HistoryError> {
        match self {
            Self::GitHub(github) => github.fetch(start).await,
            Self::Git(repo) => repo.fetch(start).await,
        }
    }
}

/// Failure to obtain commit history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode GitHub response")]
    Decode(#[source] reqwest::Error),

    #[error("git error")]
    Git(#[from] git::Error),
}

impl HistoryError {
    /// The error and its causes on one line, for handing back to the model.
    pub fn describe(&self) -> String {
        let mut text = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            text.push_str(": ");
            text.push_str(&cause.to_string());
            source = std::error::Error::source(cause);
        }
        text
    }
}
