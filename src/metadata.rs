//! Persisted tree- and index-metadata records.
//!
//! `spec.md` §3/§6: a reserved sub-collection (never user-addressable,
//! since user tree names are rejected if they start with `idx:` and this
//! name is reserved the same way) holds one record per tree, keyed by
//! the tree's name, containing its cached entry count and, for each
//! attached index, its name, flags, extractor composite key, and
//! user-data bytes.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Name of the reserved sub-collection holding one [`TreeMetadata`]
/// record per user tree, keyed by tree name.
pub const METADATA_TREE: &str = "ixtree:metadata";

/// Prefix reserved for index backing sub-collections: `idx:<tree>:<index>`.
pub const INDEX_PREFIX: &str = "idx:";

/// Builds the physical name of an index's backing sub-collection.
pub fn index_db_name(tree: &str, index: &str) -> String {
    format!("{INDEX_PREFIX}{tree}:{index}")
}

/// `true` if `name` falls in the reserved `idx:` namespace or names the
/// metadata sub-collection itself — both rejected as `InvalidArg` when a
/// user tries to open them as an ordinary tree (`spec.md` §6).
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with(INDEX_PREFIX) || name == METADATA_TREE
}

/// One persisted index descriptor, as stored inside a [`TreeMetadata`] record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexMetadata {
    /// Index name, unique within its tree.
    pub name: String,
    /// `unique`/`sparse` flag byte (see `crate::registry::{FLAG_UNIQUE, FLAG_SPARSE}`).
    pub flags: u8,
    /// Schema version the extractor was registered under.
    pub version: u32,
    /// Opaque bytes handed back to the extractor on every invocation.
    pub user_data: Vec<u8>,
}

impl IndexMetadata {
    /// The composite `(version, flags)` key used to look up this index's
    /// extractor in the registry.
    pub fn composite_key(&self) -> u64 {
        crate::registry::composite_key(self.version, self.flags)
    }

    /// `true` if the `unique` bit is set.
    pub fn is_unique(&self) -> bool {
        self.flags & crate::registry::FLAG_UNIQUE != 0
    }

    /// `true` if the `sparse` bit is set.
    pub fn is_sparse(&self) -> bool {
        self.flags & crate::registry::FLAG_SPARSE != 0
    }
}

/// The full persisted record for one tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TreeMetadata {
    /// Cached entry count, persisted at every write-transaction commit.
    pub count: i64,
    /// One entry per attached index.
    pub indexes: Vec<IndexMetadata>,
}

impl TreeMetadata {
    /// Serializes this record for storage in the metadata sub-collection.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        bincode::serialize(self).map_err(|e| Error::generic("metadata", e.to_string()))
    }

    /// Deserializes a record previously written by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        bincode::deserialize(bytes).map_err(|e| Error::generic("metadata", e.to_string()))
    }

    /// Finds the descriptor for `name`, if attached.
    pub fn index(&self, name: &str) -> Option<&IndexMetadata> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Finds the position of the descriptor for `name`, if attached.
    pub fn index_position(&self, name: &str) -> Option<usize> {
        self.indexes.iter().position(|i| i.name == name)
    }
}
