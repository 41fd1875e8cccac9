//! Repository, commit, and VCS-type identifiers.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque path-shaped repository identifier.
///
/// A valid identifier has at least two `/`-separated segments; no segment may
/// be empty or begin with `.` (operation route segments begin with `.`, and
/// dotted segments would collide with them or escape the storage root).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoId(String);

impl RepoId {
    /// Parses and validates a repository identifier.
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        let segments: Vec<&str> = s.split('/').collect();
        if segments.len() < 2 {
            return Err(Error::invalid_argument(format!(
                "repository id {s:?} must have at least 2 path segments"
            )));
        }
        for seg in &segments {
            if seg.is_empty() {
                return Err(Error::invalid_argument(format!(
                    "repository id {s:?} contains an empty path segment"
                )));
            }
            if seg.starts_with('.') {
                return Err(Error::invalid_argument(format!(
                    "repository id {s:?} contains a segment beginning with '.'"
                )));
            }
        }
        Ok(Self(s))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the `/`-separated segments of the identifier.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A commit identifier: lowercase hex, 1 to 40 characters.
///
/// A commit id is canonical iff it is the full 40 characters. Canonicality
/// drives the cache policy and redirect status codes of commit-bound routes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    /// The length of a canonical commit id.
    pub const CANONICAL_LEN: usize = 40;

    /// Parses and validates a commit id.
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(Error::invalid_argument("commit id is empty"));
        }
        if s.len() > Self::CANONICAL_LEN {
            return Err(Error::invalid_argument(format!(
                "commit id {s:?} is longer than 40 characters"
            )));
        }
        if !s
            .bytes()
            .all(|c| c.is_ascii_digit() || (b'a'..=b'f').contains(&c))
        {
            return Err(Error::invalid_argument(format!(
                "commit id {s:?} must be lowercase hex"
            )));
        }
        Ok(Self(s))
    }

    /// Returns true iff this is a full 40-character commit id.
    pub fn is_canonical(&self) -> bool {
        self.0.len() == Self::CANONICAL_LEN
    }

    /// Returns the commit id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A short lowercase-letters VCS type tag, e.g. `git` or `hg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VcsType(String);

impl VcsType {
    /// Parses and validates a VCS type tag.
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.is_empty() || !s.bytes().all(|c| c.is_ascii_lowercase()) {
            return Err(Error::invalid_argument(format!(
                "VCS type {s:?} must be nonempty lowercase letters"
            )));
        }
        Ok(Self(s))
    }

    /// Returns the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VcsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
