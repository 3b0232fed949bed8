//! Public records returned by the catalog.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arbor_types::{BranchId, CommitId, Entry, EntryPath, Lineage, TreeId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    /// Where the repository's objects live; opaque to the catalog.
    pub storage_namespace: String,
    pub default_branch: String,
    pub creation_date: DateTime<Utc>,
}

/// A branch as seen at its latest commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub repository: String,
    pub name: String,
    /// Latest commit; [`CommitId::ZERO`] before the first commit.
    pub head: CommitId,
    /// Current ancestry, nearest first.
    pub lineage: Lineage,
}

/// One commit on one branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitLog {
    pub branch: BranchId,
    pub commit: CommitId,
    pub message: String,
    pub committer: String,
    pub creation_date: DateTime<Utc>,
    /// The branch's own content at this commit.
    pub tree_id: TreeId,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Paging and filtering for entry listings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Only paths starting with this prefix.
    pub prefix: Option<String>,
    /// Resume strictly after this path.
    pub after: Option<EntryPath>,
    /// Maximum entries to return; `None` reads to the end.
    pub limit: Option<usize>,
}

impl ListOptions {
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn after(mut self, path: impl Into<EntryPath>) -> Self {
        self.after = Some(path.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listing {
    pub entries: Vec<Entry>,
    /// More entries follow the last one returned.
    pub has_more: bool,
}

impl Listing {
    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.path.as_str()).collect()
    }
}
