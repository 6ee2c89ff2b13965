//! The only module that speaks to `heed`/LMDB directly.
//!
//! Every other module in this crate reaches the backing store through the
//! thin surface exposed here, mirroring how `olegnn-metaldb`'s own
//! `backends` module isolates its single collaborator (there: `rocksdb`).
//! Restating `spec.md` §6: the backend provides a directory-addressed,
//! memory-mapped, copy-on-write B+-tree environment with MVCC read/write
//! transactions, named sub-collections (unique-keyed or duplicate-sorted
//! multimaps), custom comparators, and transaction-scoped cursors.

use std::path::Path;

use heed::types::Bytes;
use heed::{DatabaseFlags, EnvFlags, EnvOpenOptions};

use crate::comparator::{self, ComparatorSlot};
use crate::error::Error;
use crate::options::{DbOptions, SyncMode};

/// A raw byte-to-byte sub-collection: both the main tree and every index
/// backing store are typed this way. Higher layers own the meaning of
/// the bytes; the backend only orders and stores them.
pub type RawDatabase = heed::Database<Bytes, Bytes>;

/// The backing environment. Cheap to clone (an `Arc` internally, per
/// `heed::Env`'s own design), so [`crate::Database`] can hand copies to
/// every open [`crate::Tree`] without a lifetime tangle.
pub type Env = heed::Env;

/// A read-only snapshot transaction.
pub type RoTxn<'e> = heed::RoTxn<'e>;

/// A single active write transaction.
pub type RwTxn<'e> = heed::RwTxn<'e>;

/// Opens (and, if `create_if_missing`, creates) the environment at `path`.
pub fn open_env(path: &Path, opts: &DbOptions) -> Result<Env, Error> {
    if opts.create_if_missing {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::generic("backend", format!("create_dir_all({path:?}): {e}")))?;
    }

    let mut builder = EnvOpenOptions::new();
    builder.map_size(opts.map_size).max_dbs(opts.max_trees);

    let flags = match opts.sync_mode {
        SyncMode::Durable => EnvFlags::empty(),
        SyncMode::NoSync => EnvFlags::NO_SYNC,
        SyncMode::NoMetaSync => EnvFlags::NO_META_SYNC,
    };
    if !flags.is_empty() {
        unsafe { builder.flags(flags) };
    }

    // SAFETY: the caller (`Database::open`) upholds LMDB's single-writer
    // per-environment contract; no other process mode is used here.
    unsafe { builder.open(path) }.map_err(|e| Error::from_heed("backend", e))
}

/// Begins a read-write transaction. Blocks until the process-wide writer
/// slot is free — the only suspension point this crate introduces beyond
/// mmap page faults, per `spec.md` §5.
pub fn write_txn(env: &Env) -> Result<RwTxn<'_>, Error> {
    env.write_txn().map_err(|e| Error::from_heed("backend", e))
}

/// Begins a read-only transaction, pinning an MVCC snapshot.
pub fn read_txn(env: &Env) -> Result<RoTxn<'_>, Error> {
    env.read_txn().map_err(|e| Error::from_heed("backend", e))
}

/// Creates (or opens, if already present) a named sub-collection.
///
/// `dup_sort` selects a duplicate-sorted multimap backing store (used by
/// non-unique indexes, whose per-key bucket holds every main-key mapped
/// to that index key); `comparator` optionally installs a custom key
/// comparator claimed via [`comparator::install`]. For `dup_sort`
/// collections the same comparator additionally orders values within a
/// duplicate bucket (the "dup-value comparator" of `spec.md` §3/§9),
/// since LMDB's `MDB_DUPSORT` comparator governs value ordering, not key
/// ordering, inside one key's bucket.
pub fn create_database(
    env: &Env,
    wtxn: &mut RwTxn<'_>,
    name: &str,
    dup_sort: bool,
    comparator: Option<ComparatorSlot>,
) -> Result<RawDatabase, Error> {
    match comparator {
        Some(slot) => create_with_comparator_slot(env, wtxn, name, dup_sort, slot),
        None => {
            let mut options = env.database_options();
            options.name(name).types::<Bytes, Bytes>();
            if dup_sort {
                options.flags(DatabaseFlags::DUP_SORT);
            }
            options.create(wtxn).map_err(|e| Error::from_heed("backend", e))
        }
    }
}

/// Opens a named sub-collection if it already exists, without creating it.
pub fn open_database(
    env: &Env,
    rtxn: &RoTxn<'_>,
    name: &str,
) -> Result<Option<RawDatabase>, Error> {
    env.database_options()
        .name(name)
        .types::<Bytes, Bytes>()
        .open(rtxn)
        .map_err(|e| Error::from_heed("backend", e))
}

/// Drops a named sub-collection entirely, including its named-db slot,
/// so the name can be reused. Returns `Ok(false)` if it was already gone.
pub fn drop_database(
    env: &Env,
    wtxn: &mut RwTxn<'_>,
    name: &str,
) -> Result<bool, Error> {
    match open_database(env, wtxn, name)? {
        Some(db) => db.clear(wtxn).map(|()| true).map_err(|e| Error::from_heed("backend", e)),
        None => Ok(false),
    }
}

fn create_with_comparator_slot(
    env: &Env,
    wtxn: &mut RwTxn<'_>,
    name: &str,
    dup_sort: bool,
    slot: ComparatorSlot,
) -> Result<RawDatabase, Error> {
    use comparator::*;

    macro_rules! dispatch {
        ($($idx:literal => $ty:ty),* $(,)?) => {
            match slot.0 {
                $(
                    $idx => {
                        let mut options = env.database_options();
                        options.name(name).types::<Bytes, Bytes>().key_comparator::<$ty>();
                        if dup_sort {
                            options.flags(DatabaseFlags::DUP_SORT);
                        }
                        options.create(wtxn).map_err(|e| Error::from_heed("backend", e))
                    }
                )*
                other => Err(Error::generic(
                    "backend",
                    format!("comparator slot {other} out of range"),
                )),
            }
        };
    }

    dispatch! {
        0 => Slot0, 1 => Slot1, 2 => Slot2, 3 => Slot3,
        4 => Slot4, 5 => Slot5, 6 => Slot6, 7 => Slot7,
        8 => Slot8, 9 => Slot9, 10 => Slot10, 11 => Slot11,
        12 => Slot12, 13 => Slot13, 14 => Slot14, 15 => Slot15,
    }
}

/// Runtime statistics surfaced by [`crate::Database::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvStats {
    /// Size in bytes of a single memory page.
    pub page_size: u32,
    /// Height of the environment's internal B+-tree.
    pub depth: u32,
    /// Total number of key/value entries across all sub-collections'
    /// leaf pages known to this environment's root.
    pub entries: usize,
    /// Configured map size, in bytes.
    pub map_size: usize,
}

/// Reads environment-wide statistics.
pub fn env_stats(env: &Env) -> Result<EnvStats, Error> {
    let stat = env.stat().map_err(|e| Error::from_heed("backend", e))?;
    let info = env.info();
    Ok(EnvStats {
        page_size: stat.page_size,
        depth: stat.depth,
        entries: stat.entries,
        map_size: info.map_size,
    })
}

/// Grows the environment's map size. Only valid when no write
/// transaction is active in this process, per `spec.md` §4.2.
///
/// # Safety
/// The caller must ensure no other thread holds a reference into the
/// environment's memory map at the moment of resizing, per LMDB's
/// `mdb_env_set_mapsize` contract.
pub unsafe fn resize(env: &Env, new_map_size: usize) -> Result<(), Error> {
    env.resize(new_map_size)
        .map_err(|e| Error::from_heed("backend", e))
}

/// Forces (or defers to policy, if `force` is false) a durability sync.
pub fn sync(env: &Env, force: bool) -> Result<(), Error> {
    env.force_sync().map(|_| ()).or_else(|e| {
        if force {
            Err(Error::from_heed("backend", e))
        } else {
            Ok(())
        }
    })
}
