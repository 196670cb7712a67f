//! Canonical path model for the contents tree.
//!
//! Paths are `/`-separated segment strings with no leading or trailing
//! separator; the root is the empty string. Parsing rejects traversal
//! segments up front so every other component can treat a
//! [`CanonicalPath`] as safe to splice into queries and mount prefixes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ContentsError, ContentsResult};

/// A normalized, separator-delimited path identifying a tree node.
///
/// Invariants held by construction: no empty segments, no `.` or `..`,
/// no backslashes or NUL bytes, no leading/trailing `/`. The root path
/// is the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalPath(String);

impl CanonicalPath {
    /// The root path (empty string).
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Parse and canonicalize an API-style path.
    ///
    /// A single leading and/or trailing `/` is tolerated (callers pass
    /// both `"a/b"` and `"/a/b/"`); anything else that would change the
    /// meaning of the path fails with `InvalidPath`.
    pub fn parse(raw: &str) -> ContentsResult<Self> {
        let trimmed = raw.strip_prefix('/').unwrap_or(raw);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        for segment in trimmed.split('/') {
            if segment.is_empty() {
                return Err(ContentsError::invalid_path(format!(
                    "empty segment in {raw:?}"
                )));
            }
            if segment == "." || segment == ".." {
                return Err(ContentsError::invalid_path(format!(
                    "traversal segment in {raw:?}"
                )));
            }
            if segment.contains('\\') || segment.contains('\0') {
                return Err(ContentsError::invalid_path(format!(
                    "forbidden character in {raw:?}"
                )));
            }
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// True for the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of segments; 0 for the root.
    pub fn depth(&self) -> usize {
        if self.0.is_empty() {
            0
        } else {
            self.0.split('/').count()
        }
    }

    /// The final segment, or `""` for the root.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// The containing directory, or `None` for the root.
    pub fn parent(&self) -> Option<CanonicalPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rsplit_once('/') {
            Some((dir, _)) => Some(Self(dir.to_owned())),
            None => Some(Self::root()),
        }
    }

    /// Append a relative path under this one.
    pub fn join(&self, rest: &CanonicalPath) -> CanonicalPath {
        if self.is_root() {
            rest.clone()
        } else if rest.is_root() {
            self.clone()
        } else {
            Self(format!("{}/{}", self.0, rest.0))
        }
    }

    /// Strip this path off the front of `other`.
    ///
    /// Returns the remainder when `other` equals this path or lies
    /// beneath it, and `None` otherwise. Exact inverse of [`join`] for
    /// any path under this prefix.
    ///
    /// [`join`]: CanonicalPath::join
    pub fn relativize(&self, other: &CanonicalPath) -> Option<CanonicalPath> {
        if self.is_root() {
            return Some(other.clone());
        }
        if other == self {
            return Some(Self::root());
        }
        other
            .0
            .strip_prefix(&self.0)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|rest| Self(rest.to_owned()))
    }

    /// True when `other` lies strictly beneath this path.
    pub fn is_ancestor_of(&self, other: &CanonicalPath) -> bool {
        if self == other {
            return false;
        }
        if self.is_root() {
            return true;
        }
        other
            .0
            .strip_prefix(&self.0)
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
