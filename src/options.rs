//! Abstract settings for opening a [`Database`](crate::Database).

use serde::{Deserialize, Serialize};

/// Options for opening the environment.
///
/// These parameters apply to the underlying `heed`/LMDB environment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[non_exhaustive]
pub struct DbOptions {
    /// Size, in bytes, of the memory map backing the environment.
    ///
    /// This is the hard ceiling on total database size until [`resize`]
    /// is called; it does not pre-allocate disk space. Defaults to 1 GiB.
    ///
    /// [`resize`]: crate::Database::resize
    pub map_size: usize,
    /// Maximum number of named sub-collections the environment can hold,
    /// counting both user trees and the `idx:` index sub-collections
    /// each tree's indexes occupy, plus the reserved metadata
    /// sub-collection. Defaults to 128.
    pub max_trees: u32,
    /// Schema version, packed as `(major << 16) | minor` by
    /// [`pack_version`]. Stored for the caller's own compatibility
    /// checks; the core does not interpret it.
    pub schema_version: u32,
    /// Whether `open` should create the environment directory and its
    /// files if missing. Defaults to `true`.
    pub create_if_missing: bool,
    /// Durability flags forwarded to the backend. Defaults to
    /// [`SyncMode::Durable`].
    pub sync_mode: SyncMode,
}

impl DbOptions {
    /// Creates a new options object.
    pub fn new(
        map_size: usize,
        max_trees: u32,
        schema_version: u32,
        create_if_missing: bool,
        sync_mode: SyncMode,
    ) -> Self {
        Self {
            map_size,
            max_trees,
            schema_version,
            create_if_missing,
            sync_mode,
        }
    }
}

/// Durability/sync behavior delegated entirely to the backend.
///
/// `spec.md` is explicit that the core does not define its own fsync
/// policy (§9 Open Questions): this enum only selects which backend flag
/// combination `Database::open` passes through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Every commit is flushed to disk before returning (LMDB default).
    Durable,
    /// Commits are written but the flush to disk is deferred
    /// (`MDB_NOSYNC`); durability is traded for throughput.
    NoSync,
    /// Metadata page flush is deferred as well (`MDB_NOMETASYNC`).
    NoMetaSync,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self::new(1 << 30, 128, pack_version(1, 0), true, SyncMode::Durable)
    }
}

/// Packs a `(major, minor)` schema version pair into one 32-bit identifier,
/// per `spec.md` §3: `version(major, minor) = (major << 16) | minor`.
pub const fn pack_version(major: u16, minor: u16) -> u32 {
    ((major as u32) << 16) | (minor as u32)
}

/// Splits a packed schema version back into `(major, minor)`.
pub const fn unpack_version(version: u32) -> (u16, u16) {
    ((version >> 16) as u16, version as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_packing_round_trips() {
        assert_eq!(pack_version(1, 0), 1 << 16);
        assert_eq!(unpack_version(pack_version(3, 7)), (3, 7));
        assert_eq!(unpack_version(0), (0, 0));
    }

    #[test]
    fn default_options_are_sane() {
        let opts = DbOptions::default();
        assert!(opts.map_size > 0);
        assert!(opts.max_trees > 0);
        assert_eq!(opts.sync_mode, SyncMode::Durable);
    }
}
