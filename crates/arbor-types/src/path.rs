use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A key in the catalog's hierarchical key space.
///
/// Paths compare byte-wise lexicographically, which is the order every
/// cursor, partition and merge in Arbor relies on. The empty path is the
/// minimal path and sorts before every other one.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryPath(String);

impl EntryPath {
    /// Create a path from anything string-like.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The minimal path, ordered before every non-empty path.
    pub fn minimal() -> Self {
        Self(String::new())
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the minimal (empty) path.
    pub fn is_minimal(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if the path starts with `prefix`.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    /// Consume the path and return the underlying string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryPath {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntryPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for EntryPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntryPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
