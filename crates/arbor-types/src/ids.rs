use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque identifier of a branch within a catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchId(pub u64);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch#{}", self.0)
    }
}

/// Identifier of a commit snapshot on one branch.
///
/// Real commits are numbered from 1 per branch. Two sentinel values select
/// a snapshot relative to the branch head:
///
/// - [`CommitId::UNCOMMITTED`] reads the head including staged changes.
/// - [`CommitId::COMMITTED`] reads the latest commit, ignoring staged changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitId(pub u64);

impl CommitId {
    /// Snapshot including staged (uncommitted) changes.
    pub const UNCOMMITTED: Self = Self(u64::MAX);
    /// Snapshot at the latest commit of the branch.
    pub const COMMITTED: Self = Self(u64::MAX - 1);
    /// The commit before any commit was made on a branch.
    pub const ZERO: Self = Self(0);

    /// Returns `true` for a concrete commit number (not a sentinel).
    pub fn is_concrete(&self) -> bool {
        *self != Self::UNCOMMITTED && *self != Self::COMMITTED
    }

    /// The commit following this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::UNCOMMITTED => write!(f, "uncommitted"),
            Self::COMMITTED => write!(f, "committed"),
            Self(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for CommitId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uncommitted" => Ok(Self::UNCOMMITTED),
            "committed" => Ok(Self::COMMITTED),
            _ => {
                let n: u64 = s
                    .parse()
                    .map_err(|_| TypeError::InvalidCommitId(s.to_string()))?;
                let id = Self(n);
                if !id.is_concrete() {
                    return Err(TypeError::InvalidCommitId(s.to_string()));
                }
                Ok(id)
            }
        }
    }
}
