//! Selecting the window of commits a changelog covers.
//!
//! The window runs from the newest release commit (`last`) back to the start
//! of that release line (`first`): the nearest `x.y.0` tag at or before `last`,
//! or the oldest commit in the history when there is none.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::commit::{Commit, Version};

/// What to do when no commit carries a version tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Untagged {
    /// Report [`SelectionError::NoTaggedCommits`]
    #[default]
    Fail,

    /// Treat the newest commit as the release commit
    NewestCommit,
}

/// How boundary commits are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicy {
    /// Fallback when the history has no version tags at all
    pub untagged: Untagged,

    /// Require the `x.y.0` boundary to share its minor version with `last`
    pub same_minor: bool,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::strict()
    }
}

impl SelectionPolicy {
    /// Fail without tags; the release-line start must share `last`'s minor version.
    pub fn strict() -> Self {
        Self {
            untagged: Untagged::Fail,
            same_minor: true,
        }
    }

    /// Fall back to the newest commit; any `x.y.0` tag starts the release line.
    pub fn permissive() -> Self {
        Self {
            untagged: Untagged::NewestCommit,
            same_minor: false,
        }
    }
}

/// Why no window could be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("no commits found")]
    NoCommits,

    #[error("no commits with a major.minor.patch tag found")]
    NoTaggedCommits,
}

/// A contiguous, newest-first run of commits from `last` back to `first`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitWindow {
    commits: Vec<Commit>,
}

impl CommitWindow {
    /// The release commit (newest end of the window).
    pub fn last(&self) -> &Commit {
        &self.commits[0]
    }

    /// The release-line start (oldest end of the window).
    pub fn first(&self) -> &Commit {
        &self.commits[self.commits.len() - 1]
    }

    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    /// The version being released, if `last` is tagged.
    pub fn release(&self) -> Option<Version> {
        self.last().version()
    }
}

/// Select the changelog window from newest-first `commits`.
///
/// Pure: the same input always yields the same window. Malformed tags are
/// treated as absent and never cause an error.
pub fn select_window(
    commits: &[Commit],
    policy: &SelectionPolicy,
) -> Result<CommitWindow, SelectionError> {
    if commits.is_empty() {
        return Err(SelectionError::NoCommits);
    }

    // Without any version tag there is no `x.y.0` boundary either, so an
    // untagged release always spans the whole history.
    let (last_idx, first_idx) = match find_last(commits) {
        Some((idx, version)) => {
            let first = find_first(commits, idx, version, policy).unwrap_or_else(|| {
                debug!("no release-line start found; using the oldest commit");
                commits.len() - 1
            });
            (idx, first)
        }
        None => match policy.untagged {
            Untagged::Fail => return Err(SelectionError::NoTaggedCommits),
            Untagged::NewestCommit => {
                debug!("no version tags; using the whole history");
                (0, commits.len() - 1)
            }
        },
    };

    debug!(
        last = commits[last_idx].short_sha(),
        first = commits[first_idx].short_sha(),
        len = first_idx - last_idx + 1,
        "selected window"
    );

    Ok(CommitWindow {
        commits: commits[last_idx..=first_idx].to_vec(),
    })
}

/// The newest commit whose tag parses as a version.
fn find_last(commits: &[Commit]) -> Option<(usize, Version)> {
    for (idx, commit) in commits.iter().enumerate() {
        match (commit.tag.as_deref(), commit.version()) {
            (_, Some(version)) => return Some((idx, version)),
            (Some(tag), None) => debug!(sha = commit.short_sha(), tag, "ignoring non-version tag"),
            (None, None) => {}
        }
    }
    None
}

/// The nearest `x.y.0` commit at or before `last_idx`.
fn find_first(
    commits: &[Commit],
    last_idx: usize,
    last_version: Version,
    policy: &SelectionPolicy,
) -> Option<usize> {
    commits[last_idx..]
        .iter()
        .position(|commit| {
            commit.version().is_some_and(|version| {
                version.patch == 0 && (!policy.same_minor || version.minor == last_version.minor)
            })
        })
        .map(|offset| last_idx + offset)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::*;

    /// Build a newest-first history; `tags[i]` belongs to `C{n - i}`.
    fn history(tags: &[Option<&str>]) -> Vec<Commit> {
        let n = tags.len();
        tags.iter()
            .enumerate()
            .map(|(i, tag)| Commit {
                sha: format!("C{}", n - i),
                message: format!("change {}", n - i),
                date: DateTime::<Utc>::UNIX_EPOCH + Duration::minutes((n - i) as i64),
                tag: tag.map(str::to_string),
            })
            .collect()
    }

    fn shas(window: &CommitWindow) -> Vec<&str> {
        window.commits().iter().map(|c| c.sha.as_str()).collect()
    }

    #[test]
    fn release_commit_that_starts_its_line_is_a_single_commit_window() {
        // C5(2.1.0), C4, C3(garbage), C2(2.0.0), C1
        let commits = history(&[Some("2.1.0"), None, Some("2.1.0-dup"), Some("2.0.0"), None]);
        let window = select_window(&commits, &SelectionPolicy::strict()).unwrap();
        assert_eq!(shas(&window), ["C5"]);
        assert_eq!(window.last(), window.first());
        assert_eq!(window.release(), Some(Version::new(2, 1, 0)));
    }

    #[test]
    fn window_runs_back_to_nearest_patch_zero() {
        // C6, C5(2.1.3), C4, C3(2.1.0), C2, C1
        let commits = history(&[None, Some("2.1.3"), None, Some("2.1.0"), None, None]);
        let window = select_window(&commits, &SelectionPolicy::strict()).unwrap();
        assert_eq!(shas(&window), ["C5", "C4", "C3"]);
        assert_eq!(window.last().sha, "C5");
        assert_eq!(window.first().sha, "C3");
    }

    #[test]
    fn no_tags_fails_under_strict_policy() {
        let commits = history(&[None, None, None]);
        assert_eq!(
            select_window(&commits, &SelectionPolicy::strict()),
            Err(SelectionError::NoTaggedCommits)
        );
    }

    #[test]
    fn no_tags_covers_whole_history_under_permissive_policy() {
        let commits = history(&[None, None, None]);
        let window = select_window(&commits, &SelectionPolicy::permissive()).unwrap();
        assert_eq!(shas(&window), ["C3", "C2", "C1"]);
        assert_eq!(window.release(), None);
    }

    #[test]
    fn empty_history_has_no_commits() {
        for policy in [SelectionPolicy::strict(), SelectionPolicy::permissive()] {
            assert_eq!(select_window(&[], &policy), Err(SelectionError::NoCommits));
        }
    }

    #[test]
    fn missing_release_line_start_falls_back_to_oldest_commit() {
        let commits = history(&[Some("1.4.2"), None, Some("1.4.1"), None]);
        let window = select_window(&commits, &SelectionPolicy::strict()).unwrap();
        assert_eq!(shas(&window), ["C4", "C3", "C2", "C1"]);
    }

    #[test]
    fn oldest_commit_as_release_is_single_commit_window() {
        let commits = history(&[None, None, Some("0.1.3")]);
        let window = select_window(&commits, &SelectionPolicy::strict()).unwrap();
        assert_eq!(shas(&window), ["C1"]);
    }

    #[test]
    fn same_minor_skips_other_release_lines() {
        // C4(2.1.2), C3(2.0.0), C2(1.1.0), C1
        let commits = history(&[Some("2.1.2"), Some("2.0.0"), Some("1.1.0"), None]);

        let strict = select_window(&commits, &SelectionPolicy::strict()).unwrap();
        assert_eq!(shas(&strict), ["C4", "C3", "C2"]);

        let any_minor = SelectionPolicy {
            same_minor: false,
            ..SelectionPolicy::strict()
        };
        let loose = select_window(&commits, &any_minor).unwrap();
        assert_eq!(shas(&loose), ["C4", "C3"]);
    }

    #[test]
    fn commits_newer_than_release_are_excluded() {
        let commits = history(&[None, None, Some("v3.0.1"), Some("3.0.0"), None]);
        let window = select_window(&commits, &SelectionPolicy::strict()).unwrap();
        assert_eq!(shas(&window), ["C3", "C2"]);
    }

    #[test]
    fn malformed_tags_never_become_boundaries() {
        let commits = history(&[Some("latest"), Some("1.2.3"), Some("1.2"), Some("1.2.0.0"), None]);
        let window = select_window(&commits, &SelectionPolicy::strict()).unwrap();
        assert_eq!(shas(&window), ["C4", "C3", "C2", "C1"]);
    }

    #[test]
    fn newest_commit_fallback_spans_whole_history() {
        let commits = history(&[None, Some("nightly"), Some("5.2.0-rc1"), None]);
        let policy = SelectionPolicy {
            untagged: Untagged::NewestCommit,
            same_minor: true,
        };
        let window = select_window(&commits, &policy).unwrap();
        assert_eq!(shas(&window), ["C4", "C3", "C2", "C1"]);
        assert_eq!(window.release(), None);
    }

    #[test]
    fn newest_commit_fallback_ignored_when_a_version_tag_exists() {
        let commits = history(&[None, None, Some("5.2.0"), None]);
        let window = select_window(&commits, &SelectionPolicy::permissive()).unwrap();
        assert_eq!(shas(&window), ["C2"]);
    }

    #[test]
    fn policy_deserializes_from_kebab_case() {
        let policy: SelectionPolicy =
            toml::from_str("untagged = \"newest-commit\"\nsame_minor = false").unwrap();
        assert_eq!(policy, SelectionPolicy::permissive());

        let defaulted: SelectionPolicy = toml::from_str("").unwrap();
        assert_eq!(defaulted, SelectionPolicy::strict());
    }
}
