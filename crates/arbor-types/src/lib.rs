//! Foundation types for Arbor.
//!
//! Arbor is a branch-aware object catalog: every branch stores only its own
//! changes, and inherits everything else from its ancestors. This crate holds
//! the vocabulary shared by every other Arbor crate.
//!
//! # Key Types
//!
//! - [`BranchId`] / [`CommitId`] -- opaque branch and commit snapshot identifiers
//! - [`Lineage`] -- ordered ancestry of a branch at a fixed commit
//! - [`EntryPath`] -- totally ordered key inside the catalog
//! - [`Entry`] / [`EntryValue`] -- a path mapped to a value or a tombstone
//! - [`PartName`] / [`TreeId`] -- BLAKE3 content identifiers for parts and trees
//! - [`ContentHasher`] -- domain-separated hasher producing content identifiers

pub mod content;
pub mod entry;
pub mod error;
pub mod ids;
pub mod lineage;
pub mod path;

pub use content::{ContentHasher, PartName, TreeId};
pub use entry::{Entry, EntryValue};
pub use error::TypeError;
pub use ids::{BranchId, CommitId};
pub use lineage::{Lineage, LineageElement};
pub use path::EntryPath;
