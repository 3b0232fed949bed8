//! Lineage-aware merge reader for Arbor.
//!
//! A branch stores only its own changes. Everything else it sees is
//! inherited from its ancestors, with nearer branches shadowing farther
//! ones. [`LineageMergeReader`] materializes that view lazily: it opens one
//! cursor per branch in the lineage and performs a k-way merge by path,
//! emitting exactly one entry per path, taken from the highest-priority
//! branch that defines it.
//!
//! # Modules
//!
//! - [`source`] -- the [`LineageResolver`] and [`BranchCursorSource`] seams
//! - [`reader`] -- the merge reader itself
//! - [`memory`] -- [`StaticLineage`], a fixed in-memory lineage for tests and tools
//! - [`error`] -- [`LineageError`]

pub mod error;
pub mod memory;
pub mod reader;
pub mod source;

pub use error::{LineageError, LineageResult};
pub use memory::StaticLineage;
pub use reader::{LineageMergeReader, ReadOptions, DEFAULT_BUFFER_SIZE};
pub use source::{BranchCursorSource, LineageResolver};
