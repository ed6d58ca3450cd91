//! Reading commit history from a local git repository.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::commit::Commit;
use crate::history::{HistoryError, HistorySource};

/// Field separator inside a `git log` record.
const FIELD_SEP: char = '\x1f';

/// Record separator between `git log` entries.
const RECORD_SEP: char = '\x1e';

/// A git repository handle that reads commits and tags.
#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
    rev: String,
}

impl Git {
    /// Find the git repository containing `start`.
    pub fn discover(start: &Path) -> Result<Self, Error> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(start)
            .output()
            .map_err(|e| Error::Exec(format!("git rev-parse: {e}")))?;

        if !output.status.success() {
            return Err(Error::NotARepo(start.display().to_string()));
        }

        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Self {
            root: PathBuf::from(root),
            rev: "HEAD".to_string(),
        })
    }

    /// Read history from `rev` instead of `HEAD` when no start commit is given.
    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = rev.into();
        self
    }

    /// Check if a branch or ref exists.
    pub fn ref_exists(&self, refname: &str) -> bool {
        Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", refname])
            .current_dir(&self.root)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Get the repository root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List commits reachable from `rev`, newest first, without tags.
    pub fn log(&self, rev: &str) -> Result<Vec<Commit>, Error> {
        let format = "--format=%H%x1f%cI%x1f%B%x1e";
        let output = self.run_output(&["log", format, rev, "--"])?;
        output
            .split(RECORD_SEP)
            .map(|record| record.trim_start_matches('\n'))
            .filter(|record| !record.is_empty())
            .map(parse_record)
            .collect()
    }

    /// Map each tagged commit hash to its tag name.
    ///
    /// Annotated tags are peeled to the commit they point at. When several
    /// tags point at one commit, the one git lists first wins.
    pub fn tags(&self) -> Result<HashMap<String, String>, Error> {
        let output = self.run_output(&[
            "for-each-ref",
            "refs/tags",
            "--format=%(refname:lstrip=2) %(objectname) %(*objectname)",
        ])?;

        let mut tags = HashMap::new();
        for line in output.lines() {
            let mut fields = line.split_whitespace();
            let (Some(name), Some(object)) = (fields.next(), fields.next()) else {
                continue;
            };
            let commit = fields.next().unwrap_or(object);
            tags.entry(commit.to_string())
                .or_insert_with(|| name.to_string());
        }
        Ok(tags)
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    /// Run a git command and capture its stdout.
    fn run_output(&self, args: &[&str]) -> Result<String, Error> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| Error::Exec(format!("git {}: {e}", args.first().unwrap_or(&""))))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(Error::Failed(format!(
                "git {}: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl HistorySource for Git {
    async fn fetch(&self, start: Option<&str>) -> Result<Vec<Commit>, HistoryError> {
        let rev = start.unwrap_or(&self.rev);
        debug!(root = %self.root.display(), rev, "reading local history");

        // A freshly initialized repository has no HEAD to log from
        if rev == "HEAD" && !self.ref_exists(rev) {
            return Ok(Vec::new());
        }

        let tags = self.tags()?;
        let mut commits = self.log(rev)?;
        for commit in &mut commits {
            commit.tag = tags.get(&commit.sha).cloned();
        }
        Ok(commits)
    }
}

/// Parse one `sha<US>date<US>message` record.
fn parse_record(record: &str) -> Result<Commit, Error> {
    let mut fields = record.splitn(3, FIELD_SEP);
    let (Some(sha), Some(date), Some(message)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(Error::Parse(format!("malformed log record: {record:?}")));
    };

    let date = DateTime::parse_from_rfc3339(date)
        .map_err(|e| Error::Parse(format!("bad commit date '{date}': {e}")))?
        .with_timezone(&Utc);

    Ok(Commit {
        sha: sha.to_string(),
        message: message.trim_end().to_string(),
        date,
        tag: None,
    })
}

/// Errors from git operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to execute: {0}")]
    Exec(String),

    #[error("not a git repository (searched from '{0}')")]
    NotARepo(String),

    #[error("{0}")]
    Failed(String),

    #[error("unexpected git output: {0}")]
    Parse(String),
}
