//! Error types for tree reconciliation.

use arbor_store::StoreError;
use arbor_types::{EntryPath, PartName};
use thiserror::Error;

/// Errors that can occur while rebuilding or reading a tree.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Loading or saving through the store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A part cursor failed to open or to advance.
    #[error("reading part {part}: {source}")]
    PartCursor {
        part: PartName,
        #[source]
        source: StoreError,
    },

    /// Mutations must arrive in strictly increasing path order.
    #[error("mutations out of order: {next:?} does not follow {previous:?}")]
    UnorderedMutations { previous: EntryPath, next: EntryPath },

    /// A rebuilt sequence would contain overlapping parts.
    #[error("part boundary violated: {next:?} is not after {previous:?}")]
    BoundaryViolation { previous: EntryPath, next: EntryPath },

    /// Only one entry can be pushed back before it is read again.
    #[error("cannot push back {pushed:?}: {pending:?} is already pushed back")]
    PushbackOccupied { pending: EntryPath, pushed: EntryPath },
}

/// Convenience alias for tree results.
pub type TreeResult<T> = Result<T, TreeError>;
