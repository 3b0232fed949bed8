//! The persisted layout of one tree snapshot.

use serde::{Deserialize, Serialize};

use arbor_types::{EntryPath, PartName, TreeId};

use crate::error::{StoreError, StoreResult};

/// Reference to one immutable part: its name and upper path boundary.
///
/// Every entry stored in the part satisfies `entry.path <= max_path`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartRef {
    pub name: PartName,
    pub max_path: EntryPath,
}

impl PartRef {
    pub fn new(name: PartName, max_path: impl Into<EntryPath>) -> Self {
        Self {
            name,
            max_path: max_path.into(),
        }
    }
}

/// The ordered, boundary-disjoint parts that make up one tree snapshot.
///
/// For any `i < j`, every path in part `i` orders before every path in part
/// `j`. A sequence is never mutated in place: a rebuild produces a new one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreePartitionSequence {
    parts: Vec<PartRef>,
}

impl TreePartitionSequence {
    /// The sequence of a tree that was never materialized.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a sequence, checking that boundaries strictly increase.
    pub fn new(parts: Vec<PartRef>) -> StoreResult<Self> {
        let seq = Self { parts };
        seq.validate()?;
        Ok(seq)
    }

    /// Check that part boundaries are strictly increasing.
    pub fn validate(&self) -> StoreResult<()> {
        for (index, pair) in self.parts.windows(2).enumerate() {
            if pair[0].max_path >= pair[1].max_path {
                return Err(StoreError::BoundaryViolation {
                    index: index + 1,
                    previous: pair[0].max_path.clone(),
                    next: pair[1].max_path.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn parts(&self) -> &[PartRef] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PartRef> {
        self.parts.get(index)
    }

    pub fn last(&self) -> Option<&PartRef> {
        self.parts.last()
    }

    /// Upper boundary of the whole tree.
    pub fn max_path(&self) -> Option<&EntryPath> {
        self.parts.last().map(|p| &p.max_path)
    }

    /// Index of the first part whose boundary is `>= path`, i.e. the part
    /// that covers `path` if any part does.
    pub fn covering_index(&self, path: &EntryPath) -> usize {
        self.parts.partition_point(|p| p.max_path < *path)
    }

    /// Serialized layout: the ordered `(name, max_path)` pairs as JSON.
    pub fn to_layout_bytes(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Parse a serialized layout and validate it.
    pub fn from_layout_bytes(data: &[u8]) -> StoreResult<Self> {
        let seq: Self =
            serde_json::from_slice(data).map_err(|e| StoreError::Serialization(e.to_string()))?;
        seq.validate()?;
        Ok(seq)
    }

    /// Content identifier of this layout. The empty sequence maps to
    /// [`TreeId::empty`].
    pub fn tree_id(&self) -> StoreResult<TreeId> {
        if self.is_empty() {
            return Ok(TreeId::empty());
        }
        Ok(TreeId::for_layout(&self.to_layout_bytes()?))
    }

    pub fn into_parts(self) -> Vec<PartRef> {
        self.parts
    }
}

impl<'a> IntoIterator for &'a TreePartitionSequence {
    type Item = &'a PartRef;
    type IntoIter = std::slice::Iter<'a, PartRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}
