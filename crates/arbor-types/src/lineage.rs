use serde::{Deserialize, Serialize};

use crate::ids::{BranchId, CommitId};

/// One ancestor in a lineage: a branch read at a fixed commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineageElement {
    pub branch: BranchId,
    pub commit: CommitId,
}

impl LineageElement {
    pub fn new(branch: BranchId, commit: CommitId) -> Self {
        Self { branch, commit }
    }
}

/// The ancestry of a branch at a fixed commit, nearest ancestor first.
///
/// A lineage does not include the branch itself. An empty lineage belongs
/// to a root branch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    elements: Vec<LineageElement>,
}

impl Lineage {
    /// The lineage of a root branch.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(elements: Vec<LineageElement>) -> Self {
        Self { elements }
    }

    /// The lineage of a branch created from `parent` at `commit`, where the
    /// parent itself had `parent_lineage`.
    pub fn child_of(parent: BranchId, commit: CommitId, parent_lineage: &Lineage) -> Self {
        let mut elements = Vec::with_capacity(parent_lineage.len() + 1);
        elements.push(LineageElement::new(parent, commit));
        elements.extend_from_slice(&parent_lineage.elements);
        Self { elements }
    }

    /// Nearest ancestor, if any.
    pub fn parent(&self) -> Option<&LineageElement> {
        self.elements.first()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LineageElement> {
        self.elements.iter()
    }

    /// Returns `true` if `branch` appears anywhere in the ancestry.
    pub fn contains_branch(&self, branch: BranchId) -> bool {
        self.elements.iter().any(|e| e.branch == branch)
    }
}

impl<'a> IntoIterator for &'a Lineage {
    type Item = &'a LineageElement;
    type IntoIter = std::slice::Iter<'a, LineageElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
