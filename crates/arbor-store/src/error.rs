use arbor_types::{EntryPath, PartName, TreeId};

/// Errors from part and tree storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested part was not found.
    #[error("part not found: {0}")]
    PartNotFound(PartName),

    /// The requested tree layout was not found.
    #[error("tree not found: {0}")]
    TreeNotFound(TreeId),

    /// Entries handed to a part writer were not strictly increasing.
    #[error("entries out of order: {next:?} does not follow {previous:?}")]
    UnorderedEntries { previous: EntryPath, next: EntryPath },

    /// Parts must hold at least one entry.
    #[error("cannot write an empty part")]
    EmptyPart,

    /// A partition sequence whose boundaries are not strictly increasing.
    #[error("part boundaries out of order at index {index}: {next:?} does not follow {previous:?}")]
    BoundaryViolation {
        index: usize,
        previous: EntryPath,
        next: EntryPath,
    },

    /// The stored part could not be decoded.
    #[error("corrupt part {part}: {reason}")]
    CorruptPart { part: PartName, reason: String },

    /// Content hash mismatch on read.
    #[error("hash mismatch for part {expected}: computed {computed}")]
    HashMismatch {
        expected: PartName,
        computed: PartName,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend cannot serve the request (unknown branch, closed store).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A lock guarding shared state was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
