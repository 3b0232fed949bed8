//! Branch cursors over committed trees.

use arbor_lineage::BranchCursorSource;
use arbor_store::{EntryCursor, StoreError, StoreResult};
use arbor_tree::TreeCursor;
use arbor_types::{BranchId, CommitId, EntryPath};

use crate::catalog::InMemoryCatalog;

/// Reads each branch from the tree recorded on its commit rather than from
/// the catalog rows.
///
/// For a committed snapshot a [`LineageMergeReader`] over this source yields
/// exactly what it yields over the catalog itself. Staged changes are never
/// in a tree, so [`CommitId::UNCOMMITTED`] is refused.
///
/// [`LineageMergeReader`]: arbor_lineage::LineageMergeReader
pub struct ForestCursorSource<'a> {
    catalog: &'a InMemoryCatalog,
}

impl<'a> ForestCursorSource<'a> {
    pub fn new(catalog: &'a InMemoryCatalog) -> Self {
        Self { catalog }
    }
}

impl BranchCursorSource for ForestCursorSource<'_> {
    fn open_branch_cursor(
        &self,
        branch: BranchId,
        commit: CommitId,
        after: Option<&EntryPath>,
        _buffer_size: usize,
    ) -> StoreResult<Box<dyn EntryCursor + '_>> {
        if commit == CommitId::UNCOMMITTED {
            return Err(StoreError::Unavailable(format!(
                "staged changes of {branch} are not in a tree"
            )));
        }
        let tree = self.catalog.tree_at(branch, commit)?;
        let store = self.catalog.store();
        let sequence = store.trees().load_tree(&tree)?;
        Ok(Box::new(TreeCursor::new(store.parts(), sequence, after)))
    }
}
