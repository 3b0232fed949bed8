//! Error types for catalog operations.

use arbor_lineage::LineageError;
use arbor_store::StoreError;
use arbor_tree::TreeError;
use arbor_types::{BranchId, CommitId, EntryPath};
use thiserror::Error;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("repository not found: {name}")]
    RepositoryNotFound { name: String },

    #[error("repository already exists: {name}")]
    RepositoryExists { name: String },

    #[error("branch not found: {repository}/{branch}")]
    BranchNotFound { repository: String, branch: String },

    #[error("branch already exists: {repository}/{branch}")]
    BranchExists { repository: String, branch: String },

    /// A repository or branch name failed validation.
    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// A branch id with no record, usually from a stale lineage.
    #[error("unknown branch {0}")]
    UnknownBranch(BranchId),

    #[error("entry not found: {path}")]
    EntryNotFound { path: EntryPath },

    #[error("commit {commit} not found on {branch}")]
    CommitNotFound { branch: BranchId, commit: CommitId },

    #[error("nothing to commit on {repository}/{branch}")]
    NothingToCommit { repository: String, branch: String },

    /// The operation needs a branch without staged changes.
    #[error("{repository}/{branch} has uncommitted changes")]
    UncommittedChanges { repository: String, branch: String },

    #[error("{repository}/{branch} has no parent branch")]
    NoParent { repository: String, branch: String },

    /// Committed tree reads cannot see staged changes.
    #[error("staged changes are not materialized in a tree")]
    UncommittedTreeRead,

    #[error("invalid regexp /{pattern}/ at position {index} in last_keys_in_prefix_regexp: {source}")]
    InvalidExportRegexp {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no export configuration for {repository}/{branch}")]
    ExportConfigurationNotFound { repository: String, branch: String },

    #[error("no export state for {repository}/{branch}")]
    ExportStateNotFound { repository: String, branch: String },

    /// An export state callback refused the transition.
    #[error("export state transition rejected: {0}")]
    ExportRejected(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Lineage(#[from] LineageError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for catalog results.
pub type CatalogResult<T> = Result<T, CatalogError>;
