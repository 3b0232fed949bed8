//! Positional walk over a base tree during a rebuild.
//!
//! [`BaseTreeManager`] moves forward through the base sequence as the
//! rebuild touches increasing paths. Every part it passes over without a
//! touch is reused by reference; the part covering a touched path is opened
//! and handed to the caller, who becomes responsible for its content.
//!
//! # Invariants
//!
//! - `base_index` never decreases.
//! - Each base part is classified exactly once: reused, or opened.
//! - Reused ∪ opened equals the base sequence once the manager is consumed
//!   by [`BaseTreeManager::into_reusable_parts`].

use tracing::debug;

use arbor_store::{PartRef, PartStore, TreePartitionSequence, TreeStore};
use arbor_types::{EntryPath, TreeId};

use crate::error::{TreeError, TreeResult};
use crate::pushback::PushbackCursor;

/// The outcome of asking for the part covering a path.
pub enum BasePart<'a> {
    /// The part covering the path, opened at its first entry.
    Opened {
        part: PartRef,
        cursor: PushbackCursor<'a>,
    },
    /// No base part remains at or after the path: everything from here on
    /// is new content. This is a normal outcome, not an error.
    Exhausted,
}

impl BasePart<'_> {
    /// Upper boundary of the opened part.
    pub fn max_path(&self) -> Option<&EntryPath> {
        match self {
            Self::Opened { part, .. } => Some(&part.max_path),
            Self::Exhausted => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }
}

/// Classifies the parts of a base tree into reused and opened.
///
/// Requests must arrive in non-decreasing path order. One manager serves
/// one rebuild; it is consumed when the reusable parts are collected.
pub struct BaseTreeManager<'a> {
    store: &'a dyn PartStore,
    base: TreePartitionSequence,
    base_index: usize,
    reuse: Vec<PartRef>,
    opened: Vec<PartRef>,
}

impl<'a> BaseTreeManager<'a> {
    pub fn new(store: &'a dyn PartStore, base: TreePartitionSequence) -> Self {
        Self {
            store,
            base,
            base_index: 0,
            reuse: Vec::new(),
            opened: Vec::new(),
        }
    }

    /// Load the base sequence for `tree` (empty for [`TreeId::empty`]).
    pub fn load(store: &'a dyn PartStore, trees: &dyn TreeStore, tree: &TreeId) -> TreeResult<Self> {
        let base = trees.load_tree(tree)?;
        debug!(tree = %tree.short_hex(), parts = base.len(), "loaded base tree");
        Ok(Self::new(store, base))
    }

    pub fn base(&self) -> &TreePartitionSequence {
        &self.base
    }

    /// Returns `true` once every base part has been classified.
    pub fn is_end_of_base(&self) -> bool {
        self.base_index >= self.base.len()
    }

    /// Returns `true` once the final base part has been reused or opened.
    pub fn was_last_part_processed(&self) -> bool {
        self.base_index == self.base.len()
    }

    /// Parts classified as reused so far.
    pub fn reused_count(&self) -> usize {
        self.reuse.len()
    }

    /// Parts opened so far, in order.
    pub fn opened_parts(&self) -> &[PartRef] {
        &self.opened
    }

    /// Open the part covering `path`.
    ///
    /// Every part whose `max_path` is strictly below `path` is skipped and
    /// reused: requests arrive in path order, so nothing will touch it. If
    /// that exhausts the base, returns [`BasePart::Exhausted`].
    pub fn part_for_path(&mut self, path: &EntryPath) -> TreeResult<BasePart<'a>> {
        while let Some(part) = self.base.get(self.base_index) {
            if part.max_path >= *path {
                break;
            }
            self.reuse.push(part.clone());
            self.base_index += 1;
        }

        let Some(part) = self.base.get(self.base_index).cloned() else {
            return Ok(BasePart::Exhausted);
        };
        self.base_index += 1;

        let cursor = self
            .store
            .open_part_cursor(&part.name, &EntryPath::minimal())
            .map_err(|source| TreeError::PartCursor {
                part: part.name,
                source,
            })?;
        debug!(part = %part.name.short_hex(), max_path = %part.max_path, "opened base part");
        self.opened.push(part.clone());
        Ok(BasePart::Opened {
            part,
            cursor: PushbackCursor::new(cursor),
        })
    }

    /// Whether `path` still belongs to the part being written.
    ///
    /// True when the base is exhausted (all further content is new and goes
    /// to the active part), or when `path` is within the boundary of the
    /// most recently opened part. False means the caller must request the
    /// next part with [`part_for_path`](Self::part_for_path).
    pub fn is_path_covered(&self, path: &EntryPath) -> bool {
        if self.is_end_of_base() {
            return true;
        }
        self.opened
            .last()
            .is_some_and(|active| *path <= active.max_path)
    }

    /// Upper boundary of the whole base tree, if it has any parts.
    pub fn base_max_path(&self) -> Option<&EntryPath> {
        self.base.max_path()
    }

    /// Open the final base part so trailing content can be merged into it.
    ///
    /// Reuses every part before it that was not yet classified. Returns
    /// [`BasePart::Exhausted`] when the base is empty or the final part was
    /// already processed.
    pub fn last_part_cursor(&mut self) -> TreeResult<BasePart<'a>> {
        if self.was_last_part_processed() {
            return Ok(BasePart::Exhausted);
        }
        match self.base_max_path().cloned() {
            Some(max_path) => self.part_for_path(&max_path),
            None => Ok(BasePart::Exhausted),
        }
    }

    /// Finish classification and return every reusable part.
    ///
    /// Parts not yet reached were never touched and are reused wholesale.
    pub fn into_reusable_parts(mut self) -> Vec<PartRef> {
        if self.base_index < self.base.len() {
            self.reuse
                .extend_from_slice(&self.base.parts()[self.base_index..]);
            self.base_index = self.base.len();
        }
        debug_assert_eq!(self.reuse.len() + self.opened.len(), self.base.len());
        self.reuse
    }
}
