//! The index set and maintenance protocol — `spec.md` §4.5, the core of
//! this crate.
//!
//! Every insert, update, upsert and delete funnels through the functions
//! here so that "the set of index entries equals, pointwise, the image
//! of the main-tree entries under each registered extractor" (`spec.md`
//! §1) holds after every committed transaction.

use crate::backend::{self, Env, RawDatabase, RoTxn, RwTxn};
use crate::comparator::{self, CompareFn};
use crate::error::Error;
use crate::extractor::Extractor;
use crate::metadata::{index_db_name, IndexMetadata};
use crate::registry::{ExtractorRegistry, FLAG_SPARSE, FLAG_UNIQUE};

/// Configuration for [`IndexSet::add`].
#[derive(Clone, Debug)]
pub struct IndexConfig {
    /// Index name, unique within its tree.
    pub name: String,
    /// Schema version the extractor is registered under.
    pub version: u32,
    /// Whether the backing store forbids duplicate index keys.
    pub unique: bool,
    /// Whether the extractor may return "absent" without failing the write.
    pub sparse: bool,
    /// Opaque bytes handed back to the extractor on every invocation,
    /// and persisted so a reopened database can reconstruct it.
    pub user_data: Vec<u8>,
    /// Optional custom ordering for the index key.
    pub key_comparator: Option<CompareFn>,
    /// Optional custom ordering for main-keys within one index key's
    /// duplicate bucket. Only meaningful when `unique` is `false`.
    /// Mutually exclusive with `key_comparator`: each sub-collection
    /// carries a single comparator slot, so setting both is `InvalidArg`.
    pub dup_comparator: Option<CompareFn>,
}

impl IndexConfig {
    /// The `unique`/`sparse` flag byte this config maps to.
    pub(crate) fn flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.unique {
            flags |= FLAG_UNIQUE;
        }
        if self.sparse {
            flags |= FLAG_SPARSE;
        }
        flags
    }
}

/// One attached index, rehydrated from its [`IndexMetadata`] record at
/// tree-open time (`spec.md` §4.4) or freshly created by
/// [`IndexSet::add`].
#[derive(Clone)]
pub struct IndexHandle {
    pub(crate) name: String,
    pub(crate) extractor: Extractor,
    pub(crate) user_data: Vec<u8>,
    pub(crate) unique: bool,
    pub(crate) sparse: bool,
    pub(crate) composite_key: u64,
    pub(crate) db: RawDatabase,
}

impl IndexHandle {
    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this index rejects duplicate index keys.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether this index tolerates the extractor returning "absent".
    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    fn extract(&self, value: &[u8]) -> Option<Vec<u8>> {
        self.extractor.extract(value, &self.user_data)
    }

    fn to_metadata(&self) -> IndexMetadata {
        let (version, flags) = crate::registry::split_composite_key(self.composite_key);
        IndexMetadata {
            name: self.name.clone(),
            flags,
            version,
            user_data: self.user_data.clone(),
        }
    }

    /// Rebuilds a handle for an index already described by a persisted
    /// [`IndexMetadata`] record, used by `Tree::open` to rehydrate the
    /// attached-index set without re-running [`IndexSet::add`]'s
    /// creation logic.
    pub(crate) fn rehydrate(
        name: String,
        extractor: Extractor,
        user_data: Vec<u8>,
        unique: bool,
        sparse: bool,
        composite_key: u64,
        db: RawDatabase,
    ) -> Self {
        Self {
            name,
            extractor,
            user_data,
            unique,
            sparse,
            composite_key,
            db,
        }
    }
}

/// The ordered list of indexes attached to one tree.
///
/// Order is irrelevant to correctness (every mutation visits every
/// index); it only affects which index's precondition failure is
/// reported first, per `spec.md` §4.5.
#[derive(Clone, Default)]
pub struct IndexSet {
    indexes: Vec<IndexHandle>,
}

impl IndexSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_handles(indexes: Vec<IndexHandle>) -> Self {
        Self { indexes }
    }

    /// Iterates the attached indexes.
    pub fn iter(&self) -> impl Iterator<Item = &IndexHandle> {
        self.indexes.iter()
    }

    /// Number of attached indexes.
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// `true` if no indexes are attached.
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Detaches every index handle, used by `Tree::delete` after their
    /// backing stores have already been dropped.
    pub(crate) fn clear(&mut self) {
        self.indexes.clear();
    }

    /// Finds an attached index by name.
    pub fn get(&self, name: &str) -> Option<&IndexHandle> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub(crate) fn metadata(&self) -> Vec<IndexMetadata> {
        self.indexes.iter().map(IndexHandle::to_metadata).collect()
    }

    /// Creates the backing sub-collection for a new index and attaches
    /// it to this set. Does **not** populate — `populate_index` is a
    /// separate, explicit step (`spec.md` §4.5).
    pub(crate) fn add(
        &mut self,
        env: &Env,
        wtxn: &mut RwTxn<'_>,
        tree_name: &str,
        registry: &ExtractorRegistry,
        config: IndexConfig,
    ) -> Result<(), Error> {
        if self.get(&config.name).is_some() {
            return Err(Error::key_exists(
                "index",
                format!("index {:?} already attached to tree {tree_name:?}", config.name),
            ));
        }
        let flags = config.flags();
        let extractor = registry.get(config.version, flags).ok_or_else(|| {
            Error::invalid_arg(
                "index",
                format!(
                    "no extractor registered for version={} flags={flags:#x}",
                    config.version
                ),
            )
        })?;

        if config.key_comparator.is_some() && config.dup_comparator.is_some() {
            return Err(Error::invalid_arg(
                "index",
                format!(
                    "index {:?} sets both a key comparator and a dup comparator, but this \
                     backend's sub-collections carry a single comparator slot — supply only one",
                    config.name
                ),
            ));
        }
        let db_name = index_db_name(tree_name, &config.name);
        // Non-unique indexes order their duplicate bucket by the dup
        // comparator if given, else fall back to the key comparator so a
        // caller supplying only one still gets a well-defined main-key
        // ordering within a bucket. Unique indexes have no duplicate
        // bucket, so only the key comparator applies.
        let comparator_slot = if config.unique {
            config.key_comparator
        } else {
            config.dup_comparator.or(config.key_comparator)
        }
        .map(comparator::install)
        .transpose()?;

        let db = backend::create_database(env, wtxn, &db_name, !config.unique, comparator_slot)?;

        self.indexes.push(IndexHandle {
            name: config.name,
            extractor,
            user_data: config.user_data,
            unique: config.unique,
            sparse: config.sparse,
            composite_key: crate::registry::composite_key(config.version, flags),
            db,
        });
        Ok(())
    }

    /// Detaches and physically drops an index's backing sub-collection.
    /// Not idempotent: dropping a nonexistent index is `NotFound`.
    pub(crate) fn drop_index(
        &mut self,
        env: &Env,
        wtxn: &mut RwTxn<'_>,
        tree_name: &str,
        name: &str,
    ) -> Result<(), Error> {
        let pos = self
            .indexes
            .iter()
            .position(|i| i.name == name)
            .ok_or_else(|| Error::not_found("index", format!("no index named {name:?}")))?;
        self.indexes.remove(pos);
        backend::drop_database(env, wtxn, &index_db_name(tree_name, name))?;
        Ok(())
    }

    /// Scans `main_db` and inserts `(extract(v), k)` into `name`'s
    /// backing store for every entry whose extractor doesn't return
    /// absent. Fails fast and rolls back (by virtue of the caller's
    /// surrounding write transaction) on the first unique conflict,
    /// per `spec.md` §9's resolution of that Open Question.
    pub(crate) fn populate(
        &self,
        wtxn: &mut RwTxn<'_>,
        main_db: RawDatabase,
        name: &str,
    ) -> Result<u64, Error> {
        let index = self
            .get(name)
            .ok_or_else(|| Error::not_found("index", format!("no index named {name:?}")))?;

        let mut populated = 0u64;
        let entries: Vec<(Vec<u8>, Vec<u8>)> = main_db
            .iter(wtxn)
            .map_err(|e| Error::from_heed("index", e))?
            .map(|r| r.map(|(k, v)| (k.to_vec(), v.to_vec())))
            .collect::<Result<_, _>>()
            .map_err(|e| Error::from_heed("index", e))?;

        for (k, v) in entries {
            let Some(index_key) = index.extract(&v) else {
                if index.sparse {
                    continue;
                }
                return Err(Error::index_error(
                    "index",
                    format!("non-sparse index {name:?} extractor returned absent for an existing entry"),
                ));
            };
            if index.unique && index.db.get(wtxn, &index_key).map_err(|e| Error::from_heed("index", e))?.is_some() {
                return Err(Error::index_error(
                    "index",
                    format!("populate_index({name:?}): duplicate key during unique population"),
                ));
            }
            index
                .db
                .put(wtxn, &index_key, &k)
                .map_err(|e| Error::from_heed("index", e))?;
            populated += 1;
        }
        Ok(populated)
    }

    /// Verifies, for every index, that its entries equal the image of
    /// the main tree's entries under the extractor (`spec.md` §4.7/§8's
    /// `verify_indexes`). A debug-only consistency check; no online
    /// repair is attempted.
    pub(crate) fn verify(&self, rtxn: &RoTxn<'_>, main_db: RawDatabase) -> Result<(), Error> {
        for index in &self.indexes {
            let mut expected: std::collections::BTreeSet<(Vec<u8>, Vec<u8>)> = Default::default();
            for entry in main_db.iter(rtxn).map_err(|e| Error::from_heed("index", e))? {
                let (k, v) = entry.map_err(|e| Error::from_heed("index", e))?;
                if let Some(index_key) = index.extract(v) {
                    expected.insert((index_key, k.to_vec()));
                } else if !index.sparse {
                    return Err(Error::index_error(
                        "index",
                        format!("verify_indexes: non-sparse index {:?} has an absent entry", index.name),
                    ));
                }
            }

            let mut actual: std::collections::BTreeSet<(Vec<u8>, Vec<u8>)> = Default::default();
            for entry in index.db.iter(rtxn).map_err(|e| Error::from_heed("index", e))? {
                let (ik, mk) = entry.map_err(|e| Error::from_heed("index", e))?;
                actual.insert((ik.to_vec(), mk.to_vec()));
            }

            if expected != actual {
                return Err(Error::index_error(
                    "index",
                    format!("verify_indexes: index {:?} diverges from the main tree", index.name),
                ));
            }
        }
        Ok(())
    }
}

/// How a single index's extracted key changed across an update, per
/// `spec.md` §4.5's classification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexTransition {
    Unchanged,
    Removed,
    Added,
    Changed,
}

/// Index-key bytes, or the sparse "this entry has no place in this
/// index" signal, paired with the index it was computed for.
pub(crate) struct Extraction<'i> {
    pub(crate) index: &'i IndexHandle,
    pub(crate) key: Option<Vec<u8>>,
}

/// Runs step 1 of the insert protocol: extracts every index's key for
/// `value`, failing `IndexError` if a non-sparse index returns absent.
pub(crate) fn extract_for_insert<'i>(
    indexes: &'i IndexSet,
    value: &[u8],
) -> Result<Vec<Extraction<'i>>, Error> {
    indexes
        .iter()
        .map(|index| match index.extract(value) {
            Some(key) => Ok(Extraction { index, key: Some(key) }),
            None if index.sparse => Ok(Extraction { index, key: None }),
            None => Err(Error::index_error(
                "index",
                format!("non-sparse index {:?} extractor returned absent", index.name),
            )),
        })
        .collect()
}

/// Step 2 of the insert protocol: rejects the write if any unique
/// index's new key is already bound to a different main-key.
pub(crate) fn check_unique_conflicts(
    wtxn: &RwTxn<'_>,
    extractions: &[Extraction<'_>],
    excluding_main_key: Option<&[u8]>,
) -> Result<(), Error> {
    for ext in extractions {
        let (Some(key), true) = (&ext.key, ext.index.unique) else {
            continue;
        };
        if let Some(existing) = ext
            .index
            .db
            .get(wtxn, key)
            .map_err(|e| Error::from_heed("index", e))?
        {
            if Some(existing) != excluding_main_key {
                return Err(Error::index_error(
                    "index",
                    format!("unique index {:?} already has an entry for this key", ext.index.name),
                ));
            }
        }
    }
    Ok(())
}

/// Step 4 of the insert protocol: writes `(key, main_key)` into every
/// non-skipped index's backing store.
pub(crate) fn apply_insertions(
    wtxn: &mut RwTxn<'_>,
    extractions: &[Extraction<'_>],
    main_key: &[u8],
) -> Result<(), Error> {
    for ext in extractions {
        if let Some(key) = &ext.key {
            ext.index
                .db
                .put(wtxn, key, main_key)
                .map_err(|e| Error::from_heed("index", e))?;
        }
    }
    Ok(())
}

/// Removes `(key, main_key)` from every non-skipped index's backing
/// store; used by delete and by the `removed`/`changed` half of update.
pub(crate) fn apply_removals(
    wtxn: &mut RwTxn<'_>,
    extractions: &[Extraction<'_>],
    main_key: &[u8],
) -> Result<(), Error> {
    for ext in extractions {
        if let Some(key) = &ext.key {
            delete_dup_entry(wtxn, ext.index, key, main_key)?;
        }
    }
    Ok(())
}

fn delete_dup_entry(
    wtxn: &mut RwTxn<'_>,
    index: &IndexHandle,
    key: &[u8],
    main_key: &[u8],
) -> Result<(), Error> {
    if index.unique {
        index.db.delete(wtxn, key).map_err(|e| Error::from_heed("index", e))?;
    } else {
        index
            .db
            .delete_one_duplicate(wtxn, key, main_key)
            .map_err(|e| Error::from_heed("index", e))?;
    }
    Ok(())
}

/// Classifies every index's transition between `old` and `new` values
/// for an update, per `spec.md` §4.5 step 2.
pub(crate) struct UpdateTransition<'i> {
    pub(crate) index: &'i IndexHandle,
    pub(crate) old_key: Option<Vec<u8>>,
    pub(crate) new_key: Option<Vec<u8>>,
    pub(crate) kind: IndexTransition,
}

pub(crate) fn classify_update<'i>(
    indexes: &'i IndexSet,
    old_value: &[u8],
    new_value: &[u8],
) -> Result<Vec<UpdateTransition<'i>>, Error> {
    indexes
        .iter()
        .map(|index| {
            let old_key = extract_checked(index, old_value)?;
            let new_key = extract_checked(index, new_value)?;
            let kind = match (&old_key, &new_key) {
                (None, None) => IndexTransition::Unchanged,
                (Some(_), None) => IndexTransition::Removed,
                (None, Some(_)) => IndexTransition::Added,
                (Some(a), Some(b)) if a == b => IndexTransition::Unchanged,
                (Some(_), Some(_)) => IndexTransition::Changed,
            };
            Ok(UpdateTransition { index, old_key, new_key, kind })
        })
        .collect()
}

fn extract_checked(index: &IndexHandle, value: &[u8]) -> Result<Option<Vec<u8>>, Error> {
    match index.extract(value) {
        Some(key) => Ok(Some(key)),
        None if index.sparse => Ok(None),
        None => Err(Error::index_error(
            "index",
            format!("non-sparse index {:?} extractor returned absent", index.name),
        )),
    }
}

/// Step 3 of the update protocol: for every `added`/`changed` unique
/// index, rejects the write if `new_key` is already bound to some other
/// main-key (the same main-key is fine — an update that leaves a unique
/// key pointing at itself is a no-op for that index).
pub(crate) fn check_update_unique_conflicts(
    wtxn: &RwTxn<'_>,
    transitions: &[UpdateTransition<'_>],
    main_key: &[u8],
) -> Result<(), Error> {
    for t in transitions {
        if !t.index.unique || !matches!(t.kind, IndexTransition::Added | IndexTransition::Changed) {
            continue;
        }
        let Some(new_key) = &t.new_key else { continue };
        if let Some(existing) = t
            .index
            .db
            .get(wtxn, new_key)
            .map_err(|e| Error::from_heed("index", e))?
        {
            if existing != main_key {
                return Err(Error::index_error(
                    "index",
                    format!("unique index {:?} already has an entry for this key", t.index.name),
                ));
            }
        }
    }
    Ok(())
}

/// Steps 4/5 of the update protocol: removes stale, installs fresh
/// index entries per each transition's classification.
pub(crate) fn apply_update(
    wtxn: &mut RwTxn<'_>,
    transitions: &[UpdateTransition<'_>],
    main_key: &[u8],
) -> Result<(), Error> {
    for t in transitions {
        match t.kind {
            IndexTransition::Unchanged => {}
            IndexTransition::Removed => {
                delete_dup_entry(wtxn, t.index, t.old_key.as_ref().unwrap(), main_key)?;
            }
            IndexTransition::Added => {
                t.index
                    .db
                    .put(wtxn, t.new_key.as_ref().unwrap(), main_key)
                    .map_err(|e| Error::from_heed("index", e))?;
            }
            IndexTransition::Changed => {
                delete_dup_entry(wtxn, t.index, t.old_key.as_ref().unwrap(), main_key)?;
                t.index
                    .db
                    .put(wtxn, t.new_key.as_ref().unwrap(), main_key)
                    .map_err(|e| Error::from_heed("index", e))?;
            }
        }
    }
    Ok(())
}

/// Re-borrows this set's backing `Bytes` databases for use by cursors
/// that need direct backend access (e.g. `index_seek`).
pub(crate) fn backing_database(indexes: &IndexSet, name: &str) -> Option<RawDatabase> {
    indexes.get(name).map(|i| i.db)
}

#[allow(dead_code)]
fn _assert_send_sync() {
    fn assert<T: Send + Sync>() {}
    assert::<IndexSet>();
}
