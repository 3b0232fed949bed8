//! Partitioned tree reconciliation for Arbor.
//!
//! A committed tree is a [`TreePartitionSequence`]: immutable parts ordered
//! by their upper path boundary. Committing new changes rebuilds the
//! sequence copy-on-write. Parts the changes never touch are carried over
//! by reference; only parts whose range overlaps a changed path are opened,
//! merged with the changes and rewritten.
//!
//! # Architecture
//!
//! - [`PushbackCursor`] -- one-entry lookahead over a part cursor
//! - [`BaseTreeManager`] -- walks the base sequence, classifying each part
//!   as reused or opened exactly once
//! - [`TreeRebuilder`] -- applies a path-ordered [`Mutation`] stream to a base
//!   tree and saves the result
//! - [`TreeCursor`] -- reads a committed tree in path order

pub mod error;
pub mod manager;
pub mod pushback;
pub mod rebuild;
pub mod tree_cursor;

pub use arbor_store::{PartRef, TreePartitionSequence};
pub use error::{TreeError, TreeResult};
pub use manager::{BasePart, BaseTreeManager};
pub use pushback::PushbackCursor;
pub use rebuild::{Mutation, RebuildOptions, RebuildOutcome, TreeRebuilder};
pub use tree_cursor::TreeCursor;
