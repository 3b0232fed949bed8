//! The Arbor catalog.
//!
//! Repositories hold branches; each branch stores only its own entries as
//! multi-versioned rows and inherits everything else from its lineage. The
//! catalog is the reference implementation of the collaborators the core
//! crates read through:
//!
//! - [`LineageResolver`](arbor_lineage::LineageResolver) from the per-branch
//!   lineage history
//! - [`BranchCursorSource`](arbor_lineage::BranchCursorSource) over MVCC rows
//!   (staged and committed), and over committed trees via
//!   [`ForestCursorSource`]
//!
//! Commits apply staged rows to the branch's previous tree with
//! [`TreeRebuilder`](arbor_tree::TreeRebuilder) and record the new tree id.
//!
//! # Modules
//!
//! - [`catalog`] -- [`InMemoryCatalog`]: repositories, branches, entries, commits
//! - [`forest`] -- tree-backed branch cursors
//! - [`export`] -- export configuration and export state
//! - [`config`] -- [`ArborConfig`], loaded from TOML
//! - [`names`] -- repository and branch name validation

pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod forest;
pub mod model;
pub mod mvcc;
pub mod names;

pub use catalog::{ForestStore, InMemoryCatalog};
pub use config::{ArborConfig, LogConfig, ReaderConfig, StorageConfig};
pub use error::{CatalogError, CatalogResult};
pub use export::{
    ExportConfiguration, ExportConfigurationForBranch, ExportState, ExportStatus, ExportTransition,
};
pub use forest::ForestCursorSource;
pub use model::{Branch, CommitLog, ListOptions, Listing, Repository};
pub use names::{validate_branch_name, validate_repository_name};
