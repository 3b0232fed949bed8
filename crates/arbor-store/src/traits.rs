use arbor_types::{Entry, EntryPath, PartName, TreeId};

use crate::cursor::EntryCursor;
use crate::error::{StoreError, StoreResult};
use crate::sequence::{PartRef, TreePartitionSequence};

/// Storage for immutable, path-sorted parts.
///
/// All implementations must satisfy these invariants:
/// - A part's name is the content hash of its entries, so writing the same
///   entries twice is a no-op returning the same [`PartRef`].
/// - Entries handed to [`write_part`](PartStore::write_part) are strictly
///   increasing by path; the part's `max_path` is its last path.
/// - Cursors deliver a part's entries in the order they were written.
pub trait PartStore: Send + Sync {
    /// Open a cursor over `part`, positioned at the first entry whose path
    /// is `>= from`. Pass [`EntryPath::minimal`] to read the whole part.
    fn open_part_cursor(&self, part: &PartName, from: &EntryPath)
        -> StoreResult<Box<dyn EntryCursor + '_>>;

    /// Write a new part and return its reference.
    fn write_part(&self, entries: &[Entry]) -> StoreResult<PartRef>;

    /// Check whether a part exists.
    fn part_exists(&self, part: &PartName) -> StoreResult<bool>;
}

/// Storage for tree layouts (partition sequences).
pub trait TreeStore: Send + Sync {
    /// Load the sequence identified by `tree`.
    ///
    /// [`TreeId::empty`] always loads the empty sequence.
    fn load_tree(&self, tree: &TreeId) -> StoreResult<TreePartitionSequence>;

    /// Persist a sequence and return its identifier.
    fn save_tree(&self, sequence: &TreePartitionSequence) -> StoreResult<TreeId>;
}

/// Check that entries are non-empty and strictly increasing by path.
///
/// Shared by part writers before they hash or encode anything.
pub fn check_part_entries(entries: &[Entry]) -> StoreResult<&EntryPath> {
    for pair in entries.windows(2) {
        if pair[0].path >= pair[1].path {
            return Err(StoreError::UnorderedEntries {
                previous: pair[0].path.clone(),
                next: pair[1].path.clone(),
            });
        }
    }
    entries.last().map(|e| &e.path).ok_or(StoreError::EmptyPart)
}
