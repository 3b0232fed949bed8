use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path::EntryPath;

/// The object a path maps to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryValue {
    /// Where the object's bytes live in the underlying object store.
    pub physical_address: String,
    /// Content checksum reported by the writer.
    pub checksum: String,
    /// Object size in bytes.
    pub size: u64,
    /// When the entry was written.
    pub creation_date: DateTime<Utc>,
    /// User-supplied metadata.
    pub metadata: BTreeMap<String, String>,
}

impl EntryValue {
    /// Create a value stamped with the current time and no metadata.
    pub fn new(physical_address: impl Into<String>, checksum: impl Into<String>, size: u64) -> Self {
        Self {
            physical_address: physical_address.into(),
            checksum: checksum.into(),
            size,
            creation_date: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Replace the creation timestamp.
    pub fn with_creation_date(mut self, creation_date: DateTime<Utc>) -> Self {
        self.creation_date = creation_date;
        self
    }

    /// Add a metadata key.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A path visible on one branch at one commit.
///
/// An entry either carries a value or is a tombstone. Tombstones record a
/// deletion on a branch so that the path stays hidden even though an
/// ancestor still defines it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub path: EntryPath,
    pub value: Option<EntryValue>,
}

impl Entry {
    /// An entry mapping `path` to `value`.
    pub fn new(path: impl Into<EntryPath>, value: EntryValue) -> Self {
        Self {
            path: path.into(),
            value: Some(value),
        }
    }

    /// A deletion marker for `path`.
    pub fn tombstone(path: impl Into<EntryPath>) -> Self {
        Self {
            path: path.into(),
            value: None,
        }
    }

    /// Returns `true` if this entry marks a deletion.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// The entry's value, if it is not a tombstone.
    pub fn value(&self) -> Option<&EntryValue> {
        self.value.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_has_no_value() {
        let e = Entry::tombstone("a/b");
        assert!(e.is_tombstone());
        assert!(e.value().is_none());
        assert_eq!(e.path.as_str(), "a/b");
    }

    #[test]
    fn value_builder() {
        let v = EntryValue::new("s3://bucket/obj", "abc", 42).with_metadata("owner", "ops");
        let e = Entry::new("data/file", v.clone());
        assert!(!e.is_tombstone());
        assert_eq!(e.value(), Some(&v));
        assert_eq!(v.metadata.get("owner").map(String::as_str), Some("ops"));
    }

    #[test]
    fn json_roundtrip_keeps_tombstone() {
        let e = Entry::tombstone("gone");
        let json = serde_json::to_string(&e).unwrap();
        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
