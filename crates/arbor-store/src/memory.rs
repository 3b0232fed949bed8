//! In-memory part and tree store for tests and embedding.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use arbor_types::{Entry, EntryPath, PartName, TreeId};

use crate::codec::encode_payload;
use crate::cursor::{EntryCursor, SliceCursor};
use crate::error::{StoreError, StoreResult};
use crate::sequence::{PartRef, TreePartitionSequence};
use crate::traits::{check_part_entries, PartStore, TreeStore};

/// In-memory, `HashMap`-based part and tree store.
///
/// Parts are held as shared slices so opening a cursor never copies the
/// part. Part names match those of [`FsPartStore`](crate::FsPartStore) for
/// the same entries.
#[derive(Default)]
pub struct InMemoryPartStore {
    parts: RwLock<HashMap<PartName, Arc<[Entry]>>>,
    trees: RwLock<HashMap<TreeId, TreePartitionSequence>>,
}

impl InMemoryPartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct parts stored.
    pub fn part_count(&self) -> StoreResult<usize> {
        Ok(self.parts.read().map_err(poisoned)?.len())
    }

    /// Number of distinct tree layouts stored.
    pub fn tree_count(&self) -> StoreResult<usize> {
        Ok(self.trees.read().map_err(poisoned)?.len())
    }

    /// All entries of a part.
    pub fn part_entries(&self, part: &PartName) -> StoreResult<Arc<[Entry]>> {
        let parts = self.parts.read().map_err(poisoned)?;
        parts.get(part).cloned().ok_or(StoreError::PartNotFound(*part))
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::LockPoisoned(e.to_string())
}

impl PartStore for InMemoryPartStore {
    fn open_part_cursor(
        &self,
        part: &PartName,
        from: &EntryPath,
    ) -> StoreResult<Box<dyn EntryCursor + '_>> {
        let entries = self.part_entries(part)?;
        Ok(Box::new(SliceCursor::starting_at(entries, from)))
    }

    fn write_part(&self, entries: &[Entry]) -> StoreResult<PartRef> {
        let max_path = check_part_entries(entries)?.clone();
        let name = PartName::for_payload(&encode_payload(entries)?);
        let mut parts = self.parts.write().map_err(poisoned)?;
        parts.entry(name).or_insert_with(|| entries.to_vec().into());
        Ok(PartRef::new(name, max_path))
    }

    fn part_exists(&self, part: &PartName) -> StoreResult<bool> {
        Ok(self.parts.read().map_err(poisoned)?.contains_key(part))
    }
}

impl TreeStore for InMemoryPartStore {
    fn load_tree(&self, tree: &TreeId) -> StoreResult<TreePartitionSequence> {
        if tree.is_empty() {
            return Ok(TreePartitionSequence::empty());
        }
        let trees = self.trees.read().map_err(poisoned)?;
        trees.get(tree).cloned().ok_or(StoreError::TreeNotFound(*tree))
    }

    fn save_tree(&self, sequence: &TreePartitionSequence) -> StoreResult<TreeId> {
        sequence.validate()?;
        let id = sequence.tree_id()?;
        if id.is_empty() {
            return Ok(id);
        }
        let mut trees = self.trees.write().map_err(poisoned)?;
        trees.entry(id).or_insert_with(|| sequence.clone());
        Ok(id)
    }
}

impl std::fmt::Debug for InMemoryPartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryPartStore")
            .field("parts", &self.part_count().unwrap_or_default())
            .field("trees", &self.tree_count().unwrap_or_default())
            .finish()
    }
}
