//! Content-addressed identifiers for stored parts and trees.
//!
//! Parts and tree sequences are immutable: their identifier is the BLAKE3
//! hash of their serialized form, domain-separated by kind so that a part
//! and a tree with identical bytes never collide.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Domain-separated BLAKE3 content hasher.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for partition payloads.
    pub const PART: Self = Self {
        domain: "arbor-part-v1",
    };
    /// Hasher for serialized partition sequences.
    pub const TREE: Self = Self {
        domain: "arbor-tree-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

fn decode_hash(s: &str) -> Result<[u8; 32], TypeError> {
    let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(TypeError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

macro_rules! content_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Create from a pre-computed hash.
            pub const fn from_hash(hash: [u8; 32]) -> Self {
                Self(hash)
            }

            /// The raw 32-byte hash.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Hex-encoded string representation.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Short hex representation (first 8 characters).
            pub fn short_hex(&self) -> String {
                hex::encode(&self.0[..4])
            }

            /// Parse from a 64-character hex string.
            pub fn from_hex(s: &str) -> Result<Self, TypeError> {
                decode_hash(s).map(Self)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.short_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl std::str::FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.strip_prefix(concat!($label, ":")).unwrap_or(s);
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

content_id!(
    /// Name of an immutable partition: the hash of its encoded entries.
    PartName,
    "part"
);

content_id!(
    /// Identifier of a partition sequence: the hash of its serialized layout.
    ///
    /// The all-zero identifier names the empty tree of a branch that has
    /// never been materialized.
    TreeId,
    "tree"
);

impl PartName {
    /// Name a partition by hashing its encoded payload.
    pub fn for_payload(payload: &[u8]) -> Self {
        Self(ContentHasher::PART.hash(payload))
    }
}

impl TreeId {
    /// The identifier of the empty (never materialized) tree.
    pub const fn empty() -> Self {
        Self([0u8; 32])
    }

    /// Returns `true` if this names the empty tree.
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Identify a tree by hashing its serialized layout.
    pub fn for_layout(layout: &[u8]) -> Self {
        Self(ContentHasher::TREE.hash(layout))
    }
}

impl Default for TreeId {
    fn default() -> Self {
        Self::empty()
    }
}
