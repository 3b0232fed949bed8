//! A fixed, in-memory lineage for tests, benchmarks and tools.

use std::collections::HashMap;
use std::sync::Arc;

use arbor_store::{EntryCursor, SliceCursor, StoreError, StoreResult};
use arbor_types::{BranchId, CommitId, Entry, EntryPath, Lineage};

use crate::error::{LineageError, LineageResult};
use crate::source::{BranchCursorSource, LineageResolver};

/// Branches with fixed contents and fixed ancestry.
///
/// Commit identifiers are ignored: every branch is a single snapshot.
#[derive(Clone, Debug, Default)]
pub struct StaticLineage {
    lineages: HashMap<BranchId, Lineage>,
    entries: HashMap<BranchId, Arc<[Entry]>>,
}

impl StaticLineage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a branch. Entries are sorted by path; on duplicate paths the
    /// first one given is kept.
    pub fn with_branch(mut self, branch: BranchId, lineage: Lineage, mut entries: Vec<Entry>) -> Self {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries.dedup_by(|later, earlier| later.path == earlier.path);
        self.lineages.insert(branch, lineage);
        self.entries.insert(branch, entries.into());
        self
    }
}

impl LineageResolver for StaticLineage {
    fn resolve_lineage(&self, branch: BranchId, commit: CommitId) -> LineageResult<Lineage> {
        self.lineages
            .get(&branch)
            .cloned()
            .ok_or_else(|| LineageError::Resolution {
                branch,
                commit,
                reason: "unknown branch".into(),
            })
    }
}

impl BranchCursorSource for StaticLineage {
    fn open_branch_cursor(
        &self,
        branch: BranchId,
        _commit: CommitId,
        after: Option<&EntryPath>,
        _buffer_size: usize,
    ) -> StoreResult<Box<dyn EntryCursor + '_>> {
        let entries = self
            .entries
            .get(&branch)
            .cloned()
            .ok_or_else(|| StoreError::Unavailable(format!("unknown branch {branch}")))?;
        let cursor = match after {
            Some(after) => SliceCursor::starting_after(entries, after),
            None => SliceCursor::new(entries),
        };
        Ok(Box::new(cursor))
    }
}
