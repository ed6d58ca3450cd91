//! Commit and version types.
//!
//! Commits arrive newest-first from a [`HistorySource`](crate::HistorySource)
//! and are never mutated afterwards. A commit's tag only counts as a release
//! marker when it parses as a [`Version`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single commit as reported by the history source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full commit hash
    pub sha: String,

    /// Commit message, possibly spanning several lines
    pub message: String,

    /// Committer timestamp
    pub date: DateTime<Utc>,

    /// Tag pointing at this commit, if any
    #[serde(default)]
    pub tag: Option<String>,
}

impl Commit {
    /// The release version encoded in this commit's tag.
    ///
    /// Returns `None` for untagged commits and for tags that are not
    /// `major.minor.patch`.
    pub fn version(&self) -> Option<Version> {
        self.tag.as_deref().and_then(|tag| tag.parse().ok())
    }

    /// First eight characters of the hash.
    pub fn short_sha(&self) -> &str {
        self.sha.get(..8).unwrap_or(&self.sha)
    }

    /// First line of the message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// A `major.minor.patch` release version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A tag that is not a `major.minor.patch` version.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a major.minor.patch version")]
pub struct ParseVersionError(String);

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseVersionError(s.to_string());

        // Release tags are commonly written `v1.2.3`
        let bare = s.strip_prefix('v').unwrap_or(s);
        let mut parts = bare.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        Ok(Self {
            major: component(major).ok_or_else(invalid)?,
            minor: component(minor).ok_or_else(invalid)?,
            patch: component(patch).ok_or_else(invalid)?,
        })
    }
}

/// Parse one version component: ASCII digits only, no sign, must fit in `u64`.
fn component(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}
