//! A bounded cache in front of a [`TreeStore`].
//!
//! Tree layouts are immutable, so a cached sequence never goes stale; the
//! cache only bounds memory. The least recently loaded layout is evicted.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use arbor_types::{Entry, EntryPath, PartName, TreeId};

use crate::cursor::EntryCursor;
use crate::error::StoreResult;
use crate::sequence::{PartRef, TreePartitionSequence};
use crate::traits::{PartStore, TreeStore};

/// Wraps a [`TreeStore`], keeping up to `capacity` loaded layouts.
///
/// A capacity of zero disables caching.
pub struct CachedTreeStore<S> {
    inner: S,
    cache: Option<Mutex<LruCache<TreeId, TreePartitionSequence>>>,
}

impl<S: TreeStore> CachedTreeStore<S> {
    pub fn new(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            cache: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of layouts currently cached.
    pub fn cached(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.lock().len())
    }

    /// Returns `true` if `tree` is cached, without touching its recency.
    pub fn is_cached(&self, tree: &TreeId) -> bool {
        self.cache.as_ref().is_some_and(|c| c.lock().contains(tree))
    }

    fn remember(&self, id: TreeId, sequence: &TreePartitionSequence) {
        if id.is_empty() {
            return;
        }
        if let Some(cache) = &self.cache {
            cache.lock().put(id, sequence.clone());
        }
    }
}

impl<S: TreeStore> TreeStore for CachedTreeStore<S> {
    fn load_tree(&self, tree: &TreeId) -> StoreResult<TreePartitionSequence> {
        if let Some(cache) = &self.cache {
            if let Some(seq) = cache.lock().get(tree) {
                return Ok(seq.clone());
            }
        }
        let seq = self.inner.load_tree(tree)?;
        self.remember(*tree, &seq);
        Ok(seq)
    }

    fn save_tree(&self, sequence: &TreePartitionSequence) -> StoreResult<TreeId> {
        let id = self.inner.save_tree(sequence)?;
        self.remember(id, sequence);
        Ok(id)
    }
}

/// Parts pass straight through; only layouts are cached.
impl<S: PartStore + TreeStore> PartStore for CachedTreeStore<S> {
    fn open_part_cursor(
        &self,
        part: &PartName,
        from: &EntryPath,
    ) -> StoreResult<Box<dyn EntryCursor + '_>> {
        self.inner.open_part_cursor(part, from)
    }

    fn write_part(&self, entries: &[Entry]) -> StoreResult<PartRef> {
        self.inner.write_part(entries)
    }

    fn part_exists(&self, part: &PartName) -> StoreResult<bool> {
        self.inner.part_exists(part)
    }
}
