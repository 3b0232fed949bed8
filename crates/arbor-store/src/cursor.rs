//! The [`EntryCursor`] trait and a slice-backed implementation.

use std::sync::Arc;

use arbor_types::{Entry, EntryPath};

use crate::error::StoreResult;

/// A forward-only, pull-based cursor over path-ordered entries.
///
/// Every storage medium (MVCC rows, in-memory parts, part files, committed
/// trees) exposes its entries through this trait, and the merge and rebuild
/// logic depends on nothing else.
///
/// Implementations must deliver entries in strictly increasing path order.
/// `Ok(None)` means clean exhaustion; once returned, further calls keep
/// returning `Ok(None)`. An `Err` reports a failed fetch.
pub trait EntryCursor {
    /// Fetch the next entry.
    fn next_entry(&mut self) -> StoreResult<Option<Entry>>;
}

impl<C: EntryCursor + ?Sized> EntryCursor for Box<C> {
    fn next_entry(&mut self) -> StoreResult<Option<Entry>> {
        (**self).next_entry()
    }
}

/// Cursor over a shared, already sorted slice of entries.
#[derive(Clone, Debug)]
pub struct SliceCursor {
    entries: Arc<[Entry]>,
    pos: usize,
}

impl SliceCursor {
    /// Cursor over every entry.
    pub fn new(entries: Arc<[Entry]>) -> Self {
        Self { entries, pos: 0 }
    }

    /// Cursor positioned at the first entry whose path is `>= from`.
    pub fn starting_at(entries: Arc<[Entry]>, from: &EntryPath) -> Self {
        let pos = entries.partition_point(|e| e.path < *from);
        Self { entries, pos }
    }

    /// Cursor positioned at the first entry whose path is `> after`.
    pub fn starting_after(entries: Arc<[Entry]>, after: &EntryPath) -> Self {
        let pos = entries.partition_point(|e| e.path <= *after);
        Self { entries, pos }
    }

    /// Entries not yet returned.
    pub fn remaining(&self) -> usize {
        self.entries.len() - self.pos
    }
}

impl EntryCursor for SliceCursor {
    fn next_entry(&mut self) -> StoreResult<Option<Entry>> {
        let entry = self.entries.get(self.pos).cloned();
        if entry.is_some() {
            self.pos += 1;
        }
        Ok(entry)
    }
}

/// Drain a cursor into a vector.
pub fn collect_entries(cursor: &mut dyn EntryCursor) -> StoreResult<Vec<Entry>> {
    let mut out = Vec::new();
    while let Some(entry) = cursor.next_entry()? {
        out.push(entry);
    }
    Ok(out)
}
