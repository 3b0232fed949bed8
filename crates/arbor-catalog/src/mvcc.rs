//! Multi-versioned entry rows of one branch.
//!
//! Every path keeps its version history. A version is staged until a commit
//! stamps its `min_commit`; it stays live until a later commit supersedes it
//! and stamps its `max_commit`. A version is visible at commit `c` when
//! `min_commit <= c <= max_commit`.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;

use arbor_store::{EntryCursor, StoreResult};
use arbor_types::{BranchId, CommitId, Entry, EntryPath};

use crate::catalog::InMemoryCatalog;

#[derive(Clone, Debug)]
struct EntryVersion {
    entry: Entry,
    /// `None` while staged.
    min_commit: Option<CommitId>,
    /// `None` while live.
    max_commit: Option<CommitId>,
}

impl EntryVersion {
    fn is_staged(&self) -> bool {
        self.min_commit.is_none()
    }

    fn is_live(&self) -> bool {
        self.min_commit.is_some() && self.max_commit.is_none()
    }

    fn visible_at(&self, commit: CommitId) -> bool {
        self.min_commit.is_some_and(|min| min <= commit)
            && self.max_commit.map_or(true, |max| commit <= max)
    }
}

fn visible_version(versions: &[EntryVersion], commit: CommitId) -> Option<&Entry> {
    let version = match commit {
        CommitId::UNCOMMITTED => versions
            .iter()
            .find(|v| v.is_staged())
            .or_else(|| versions.iter().find(|v| v.is_live())),
        CommitId::COMMITTED => versions.iter().find(|v| v.is_live()),
        at => versions.iter().find(|v| v.visible_at(at)),
    };
    version.map(|v| &v.entry)
}

/// One batch of a branch scan.
#[derive(Debug, Default)]
pub(crate) struct RowBatch {
    pub entries: Vec<Entry>,
    /// Last path examined; the next batch starts after it.
    pub resume_after: Option<EntryPath>,
    pub exhausted: bool,
}

/// The rows of one branch, keyed by path.
#[derive(Clone, Debug, Default)]
pub(crate) struct BranchRows {
    rows: BTreeMap<EntryPath, Vec<EntryVersion>>,
}

impl BranchRows {
    /// The entry at `path` visible at `commit` (tombstones included).
    pub fn visible(&self, path: &EntryPath, commit: CommitId) -> Option<&Entry> {
        self.rows
            .get(path)
            .and_then(|versions| visible_version(versions, commit))
    }

    pub fn staged_entry(&self, path: &EntryPath) -> Option<&Entry> {
        self.rows
            .get(path)?
            .iter()
            .find(|v| v.is_staged())
            .map(|v| &v.entry)
    }

    /// Stage `entry`, replacing any staged version of its path.
    pub fn stage(&mut self, entry: Entry) {
        let versions = self.rows.entry(entry.path.clone()).or_default();
        let staged = EntryVersion {
            entry,
            min_commit: None,
            max_commit: None,
        };
        match versions.iter_mut().find(|v| v.is_staged()) {
            Some(existing) => *existing = staged,
            None => versions.push(staged),
        }
    }

    /// Drop the staged version of `path`. Returns `true` if there was one.
    pub fn unstage(&mut self, path: &EntryPath) -> bool {
        let Some(versions) = self.rows.get_mut(path) else {
            return false;
        };
        let before = versions.len();
        versions.retain(|v| !v.is_staged());
        let removed = versions.len() != before;
        if versions.is_empty() {
            self.rows.remove(path);
        }
        removed
    }

    /// Staged entries in path order.
    pub fn staged(&self) -> impl Iterator<Item = &Entry> {
        self.rows
            .values()
            .filter_map(|versions| versions.iter().find(|v| v.is_staged()))
            .map(|v| &v.entry)
    }

    pub fn has_staged(&self) -> bool {
        self.staged().next().is_some()
    }

    /// Drop every staged version. Returns how many were dropped.
    pub fn clear_staged(&mut self) -> usize {
        let mut dropped = 0;
        self.rows.retain(|_, versions| {
            let before = versions.len();
            versions.retain(|v| !v.is_staged());
            dropped += before - versions.len();
            !versions.is_empty()
        });
        dropped
    }

    /// Commit every staged version as `commit`. Live versions they replace
    /// stay visible up to `previous`.
    pub fn stamp(&mut self, previous: CommitId, commit: CommitId) -> usize {
        let mut stamped = 0;
        for versions in self.rows.values_mut() {
            if !versions.iter().any(EntryVersion::is_staged) {
                continue;
            }
            for version in versions.iter_mut() {
                if version.is_live() {
                    version.max_commit = Some(previous);
                } else if version.is_staged() {
                    version.min_commit = Some(commit);
                    stamped += 1;
                }
            }
        }
        stamped
    }

    /// Up to `limit` entries visible at `commit`, strictly after `after`.
    pub fn scan(&self, after: Option<&EntryPath>, commit: CommitId, limit: usize) -> RowBatch {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        let mut batch = RowBatch::default();
        for (path, versions) in self.rows.range::<EntryPath, _>((lower, Bound::Unbounded)) {
            batch.resume_after = Some(path.clone());
            if let Some(entry) = visible_version(versions, commit) {
                batch.entries.push(entry.clone());
                if batch.entries.len() >= limit {
                    return batch;
                }
            }
        }
        batch.exhausted = true;
        batch
    }
}

/// Branch cursor over catalog rows, fetched in batches of `buffer_size`.
///
/// Each batch is read under a short read lock, so a long scan never blocks
/// writers for its whole duration.
pub(crate) struct MvccBranchCursor<'a> {
    catalog: &'a InMemoryCatalog,
    branch: BranchId,
    commit: CommitId,
    after: Option<EntryPath>,
    buffer: VecDeque<Entry>,
    buffer_size: usize,
    exhausted: bool,
}

impl<'a> MvccBranchCursor<'a> {
    pub fn new(
        catalog: &'a InMemoryCatalog,
        branch: BranchId,
        commit: CommitId,
        after: Option<&EntryPath>,
        buffer_size: usize,
    ) -> Self {
        Self {
            catalog,
            branch,
            commit,
            after: after.cloned(),
            buffer: VecDeque::new(),
            buffer_size: buffer_size.max(1),
            exhausted: false,
        }
    }
}

impl EntryCursor for MvccBranchCursor<'_> {
    fn next_entry(&mut self) -> StoreResult<Option<Entry>> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Ok(Some(entry));
            }
            if self.exhausted {
                return Ok(None);
            }
            let batch = self.catalog.scan_rows(
                self.branch,
                self.commit,
                self.after.as_ref(),
                self.buffer_size,
            )?;
            self.buffer.extend(batch.entries);
            self.after = batch.resume_after.or(self.after.take());
            self.exhausted = batch.exhausted;
        }
    }
}
