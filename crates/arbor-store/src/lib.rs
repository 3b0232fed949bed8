//! Partition storage for Arbor.
//!
//! A branch's committed content is stored as a [`TreePartitionSequence`]: an
//! ordered list of immutable parts, each bounded above by its `max_path`.
//! This crate provides the storage side of that model:
//!
//! - [`EntryCursor`] -- the pull-based cursor every reader in Arbor consumes
//! - [`PartStore`] -- write immutable parts, open cursors over them
//! - [`TreeStore`] -- persist and load partition sequences by [`TreeId`]
//!
//! # Backends
//!
//! - [`InMemoryPartStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsPartStore`] -- one zstd-compressed, CRC-checked file per part
//! - [`CachedTreeStore`] -- keeps recently loaded sequences in memory
//!
//! # Design Rules
//!
//! 1. Parts and trees are immutable once written; names are content hashes.
//! 2. Entries inside a part are strictly increasing by path.
//! 3. Corruption is reported as an error, never skipped.
//!
//! [`TreeId`]: arbor_types::TreeId

pub mod cache;
pub mod codec;
pub mod cursor;
pub mod error;
pub mod fs;
pub mod memory;
pub mod sequence;
pub mod traits;

pub use cache::CachedTreeStore;
pub use cursor::{collect_entries, EntryCursor, SliceCursor};
pub use error::{StoreError, StoreResult};
pub use fs::FsPartStore;
pub use memory::InMemoryPartStore;
pub use sequence::{PartRef, TreePartitionSequence};
pub use traits::{PartStore, TreeStore};
