//! The seams the merge reader reads through.

use arbor_store::{EntryCursor, StoreResult};
use arbor_types::{BranchId, CommitId, EntryPath, Lineage};

use crate::error::LineageResult;

/// Resolves the ancestry of a branch at a commit.
pub trait LineageResolver {
    /// The lineage of `branch` as of `commit`, nearest ancestor first.
    ///
    /// Failures are reported as [`LineageError::Resolution`].
    ///
    /// [`LineageError::Resolution`]: crate::LineageError::Resolution
    fn resolve_lineage(&self, branch: BranchId, commit: CommitId) -> LineageResult<Lineage>;
}

/// Opens a cursor over one branch's own entries at a commit snapshot.
///
/// The cursor must deliver only entries visible at `commit`, in strictly
/// increasing path order, starting strictly after `after` when given.
/// `buffer_size` is a read-ahead hint for backends that fetch in batches.
pub trait BranchCursorSource {
    fn open_branch_cursor(
        &self,
        branch: BranchId,
        commit: CommitId,
        after: Option<&EntryPath>,
        buffer_size: usize,
    ) -> StoreResult<Box<dyn EntryCursor + '_>>;
}
