//! Error types for lineage reads.

use arbor_store::StoreError;
use arbor_types::{BranchId, CommitId};
use thiserror::Error;

/// Errors that can occur while reading across a lineage.
#[derive(Debug, Error)]
pub enum LineageError {
    /// The ancestry of the branch could not be resolved.
    #[error("error getting lineage of {branch} at commit {commit}: {reason}")]
    Resolution {
        branch: BranchId,
        commit: CommitId,
        reason: String,
    },

    /// A branch cursor failed to open or to advance.
    #[error("getting entry from {branch}: {source}")]
    Cursor {
        branch: BranchId,
        #[source]
        source: StoreError,
    },

    /// A previous failure left the reader unusable; build a new one.
    #[error("lineage reader is unusable after an earlier failure")]
    ReaderPoisoned,
}

/// Convenience alias for lineage results.
pub type LineageResult<T> = Result<T, LineageError>;
