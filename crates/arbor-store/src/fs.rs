//! Filesystem part and tree store.
//!
//! Layout under the store root:
//!
//! ```text
//! parts/<part-name>.part   framed, zstd-compressed entries (see codec)
//! trees/<tree-id>.json     ordered (name, max_path) pairs
//! ```
//!
//! Files are written to a temporary file in the target directory and
//! renamed into place, so readers never observe a partial part.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use arbor_types::{Entry, EntryPath, PartName, TreeId};

use crate::codec::{decode_part, encode_part};
use crate::cursor::{EntryCursor, SliceCursor};
use crate::error::{StoreError, StoreResult};
use crate::sequence::{PartRef, TreePartitionSequence};
use crate::traits::{check_part_entries, PartStore, TreeStore};

const PARTS_DIR: &str = "parts";
const TREES_DIR: &str = "trees";

/// Part and tree store backed by a directory.
#[derive(Clone, Debug)]
pub struct FsPartStore {
    root: PathBuf,
}

impl FsPartStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(PARTS_DIR))?;
        std::fs::create_dir_all(root.join(TREES_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn part_path(&self, part: &PartName) -> PathBuf {
        self.root.join(PARTS_DIR).join(format!("{}.part", part.to_hex()))
    }

    fn tree_path(&self, tree: &TreeId) -> PathBuf {
        self.root.join(TREES_DIR).join(format!("{}.json", tree.to_hex()))
    }

    /// Read and decode every entry of a part.
    pub fn read_part(&self, part: &PartName) -> StoreResult<Vec<Entry>> {
        let data = match std::fs::read(self.part_path(part)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::PartNotFound(*part));
            }
            Err(e) => return Err(e.into()),
        };
        decode_part(part, &data)
    }

    /// Identifiers of every stored tree layout, sorted.
    pub fn tree_ids(&self) -> StoreResult<Vec<TreeId>> {
        let mut ids = Vec::new();
        for dir_entry in std::fs::read_dir(self.root.join(TREES_DIR))? {
            let path = dir_entry?.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            match TreeId::from_hex(stem) {
                Ok(id) => ids.push(id),
                Err(e) => warn!("skipping unrecognised tree file {:?}: {}", path, e),
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn write_atomically(&self, target: &Path, data: &[u8]) -> StoreResult<()> {
        let dir = target.parent().unwrap_or(&self.root);
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(target).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl PartStore for FsPartStore {
    fn open_part_cursor(
        &self,
        part: &PartName,
        from: &EntryPath,
    ) -> StoreResult<Box<dyn EntryCursor + '_>> {
        let entries: Arc<[Entry]> = self.read_part(part)?.into();
        Ok(Box::new(SliceCursor::starting_at(entries, from)))
    }

    fn write_part(&self, entries: &[Entry]) -> StoreResult<PartRef> {
        let max_path = check_part_entries(entries)?.clone();
        let (name, bytes) = encode_part(entries)?;
        let path = self.part_path(&name);
        if !path.exists() {
            self.write_atomically(&path, &bytes)?;
            debug!(part = %name.short_hex(), entries = entries.len(), bytes = bytes.len(), "wrote part");
        }
        Ok(PartRef::new(name, max_path))
    }

    fn part_exists(&self, part: &PartName) -> StoreResult<bool> {
        Ok(self.part_path(part).exists())
    }
}

impl TreeStore for FsPartStore {
    fn load_tree(&self, tree: &TreeId) -> StoreResult<TreePartitionSequence> {
        if tree.is_empty() {
            return Ok(TreePartitionSequence::empty());
        }
        let data = match std::fs::read(self.tree_path(tree)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::TreeNotFound(*tree));
            }
            Err(e) => return Err(e.into()),
        };
        TreePartitionSequence::from_layout_bytes(&data)
    }

    fn save_tree(&self, sequence: &TreePartitionSequence) -> StoreResult<TreeId> {
        sequence.validate()?;
        let id = sequence.tree_id()?;
        if id.is_empty() {
            return Ok(id);
        }
        let path = self.tree_path(&id);
        if !path.exists() {
            self.write_atomically(&path, &sequence.to_layout_bytes()?)?;
            debug!(tree = %id.short_hex(), parts = sequence.len(), "saved tree");
        }
        Ok(id)
    }
}
