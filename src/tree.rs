//! The tree handle (`spec.md` §4.4): a named sub-collection plus its
//! attached secondary indexes.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::instrument;

use crate::backend::{self, Env, RawDatabase};
use crate::error::Error;
use crate::extractor::MergeFn;
use crate::index::{IndexConfig, IndexHandle, IndexSet};
use crate::metadata::{index_db_name, is_reserved_name, IndexMetadata, TreeMetadata, METADATA_TREE};
use crate::registry::ExtractorRegistry;
use crate::txn::Transaction;

struct Shared {
    env: Env,
    name: String,
    main_db: Mutex<RawDatabase>,
    metadata_db: RawDatabase,
    indexes: Mutex<IndexSet>,
    merge_fn: Mutex<Option<(MergeFn, Vec<u8>)>>,
}

/// An open handle to one named sub-collection and its attached indexes.
///
/// Cheap to clone (an `Arc` internally); every clone shares the same
/// attached-index set and merge function, per `spec.md` §4.4's model of
/// "opening a tree multiple times yields independent handles over shared
/// state."
#[derive(Clone)]
pub struct Tree {
    shared: Arc<Shared>,
}

impl Tree {
    /// Opens (creating if absent) the named tree, rehydrating its
    /// attached indexes from the persisted [`TreeMetadata`] record.
    ///
    /// Fails `InvalidArg` if `name` falls in the reserved `idx:`/metadata
    /// namespace. Fails `IndexError` if a persisted index's
    /// `(version, flags)` pair has no registered extractor — the caller
    /// must register every extractor a tree will need before opening it.
    #[instrument(skip(env, txn, registry), fields(tree = name))]
    pub fn open(
        env: &Env,
        txn: &mut Transaction<'_>,
        name: &str,
        registry: &ExtractorRegistry,
    ) -> Result<Self, Error> {
        if is_reserved_name(name) {
            return Err(Error::invalid_arg("tree", format!("{name:?} is a reserved name")));
        }
        let wtxn = txn.as_write_mut()?;

        let metadata_db = backend::create_database(env, wtxn, METADATA_TREE, false, None)?;
        let main_db = backend::create_database(env, wtxn, name, false, None)?;

        let meta = match metadata_db.get(wtxn, name.as_bytes()).map_err(|e| Error::from_heed("tree", e))? {
            Some(bytes) => TreeMetadata::decode(bytes)?,
            None => {
                let meta = TreeMetadata::default();
                metadata_db
                    .put(wtxn, name.as_bytes(), &meta.encode()?)
                    .map_err(|e| Error::from_heed("tree", e))?;
                meta
            }
        };

        let mut handles = Vec::with_capacity(meta.indexes.len());
        for index_meta in &meta.indexes {
            let db_name = index_db_name(name, &index_meta.name);
            let db = backend::create_database(env, wtxn, &db_name, !index_meta.is_unique(), None)?;
            let extractor = registry.get_by_key(index_meta.composite_key()).ok_or_else(|| {
                Error::index_error(
                    "tree",
                    format!(
                        "tree {name:?}: no extractor registered for index {:?} (version={}, flags={:#x})",
                        index_meta.name, index_meta.version, index_meta.flags
                    ),
                )
            })?;
            handles.push(IndexHandle::rehydrate(
                index_meta.name.clone(),
                extractor,
                index_meta.user_data.clone(),
                index_meta.is_unique(),
                index_meta.is_sparse(),
                index_meta.composite_key(),
                db,
            ));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                env: env.clone(),
                name: name.to_string(),
                main_db: Mutex::new(main_db),
                metadata_db,
                indexes: Mutex::new(IndexSet::from_handles(handles)),
                merge_fn: Mutex::new(None),
            }),
        })
    }

    /// Opens a tree that must already exist, without creating anything.
    /// Works under a read-only transaction, unlike [`Tree::open`]. Fails
    /// `NotFound` if no tree by this name (or any of its persisted
    /// indexes' backing stores) has been created yet.
    #[instrument(skip(env, txn, registry), fields(tree = name))]
    pub fn open_existing(
        env: &Env,
        txn: &Transaction<'_>,
        name: &str,
        registry: &ExtractorRegistry,
    ) -> Result<Self, Error> {
        if is_reserved_name(name) {
            return Err(Error::invalid_arg("tree", format!("{name:?} is a reserved name")));
        }
        let rtxn = txn.as_read()?;

        let metadata_db = backend::open_database(env, rtxn, METADATA_TREE)?
            .ok_or_else(|| Error::not_found("tree", format!("tree {name:?} does not exist")))?;
        let main_db = backend::open_database(env, rtxn, name)?
            .ok_or_else(|| Error::not_found("tree", format!("tree {name:?} does not exist")))?;

        let meta = metadata_db
            .get(rtxn, name.as_bytes())
            .map_err(|e| Error::from_heed("tree", e))?
            .ok_or_else(|| Error::not_found("tree", format!("tree {name:?} does not exist")))
            .and_then(TreeMetadata::decode)?;

        let mut handles = Vec::with_capacity(meta.indexes.len());
        for index_meta in &meta.indexes {
            let db_name = index_db_name(name, &index_meta.name);
            let db = backend::open_database(env, rtxn, &db_name)?.ok_or_else(|| {
                Error::index_error(
                    "tree",
                    format!("tree {name:?}: backing store for index {:?} is missing", index_meta.name),
                )
            })?;
            let extractor = registry.get_by_key(index_meta.composite_key()).ok_or_else(|| {
                Error::index_error(
                    "tree",
                    format!(
                        "tree {name:?}: no extractor registered for index {:?} (version={}, flags={:#x})",
                        index_meta.name, index_meta.version, index_meta.flags
                    ),
                )
            })?;
            handles.push(IndexHandle::rehydrate(
                index_meta.name.clone(),
                extractor,
                index_meta.user_data.clone(),
                index_meta.is_unique(),
                index_meta.is_sparse(),
                index_meta.composite_key(),
                db,
            ));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                env: env.clone(),
                name: name.to_string(),
                main_db: Mutex::new(main_db),
                metadata_db,
                indexes: Mutex::new(IndexSet::from_handles(handles)),
                merge_fn: Mutex::new(None),
            }),
        })
    }

    /// The tree's name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub(crate) fn main_db(&self) -> RawDatabase {
        *self.shared.main_db.lock()
    }

    pub(crate) fn metadata_db(&self) -> RawDatabase {
        self.shared.metadata_db
    }

    pub(crate) fn env(&self) -> &Env {
        &self.shared.env
    }

    /// Installs the merge function `upsert` uses when the key already
    /// exists, along with the opaque bytes it receives on every
    /// invocation. Replaces any previously configured merge function.
    pub fn set_merge_fn(&self, merge: MergeFn, user_data: Vec<u8>) {
        *self.shared.merge_fn.lock() = Some((merge, user_data));
    }

    pub(crate) fn merge_fn(&self) -> Option<(MergeFn, Vec<u8>)> {
        self.shared.merge_fn.lock().clone()
    }

    /// Installs a custom comparator on the main tree's key ordering.
    ///
    /// Only valid while the tree is empty: LMDB fixes a sub-collection's
    /// comparator at creation time, so changing it requires dropping and
    /// recreating the backing store, which would silently discard any
    /// existing entries' established order. Fails `InvalidArg` otherwise.
    #[instrument(skip(self, txn))]
    pub fn set_compare(&self, txn: &mut Transaction<'_>, cmp: crate::comparator::CompareFn) -> Result<(), Error> {
        let slot = crate::comparator::install(cmp)?;
        let wtxn = txn.as_write_mut()?;
        let mut main_db = self.shared.main_db.lock();
        if main_db.len(wtxn).map_err(|e| Error::from_heed("tree", e))? != 0 {
            return Err(Error::invalid_arg(
                "tree",
                "set_compare requires an empty tree; drop and recreate to reorder existing entries",
            ));
        }
        backend::drop_database(&self.shared.env, wtxn, &self.shared.name)?;
        *main_db = backend::create_database(&self.shared.env, wtxn, &self.shared.name, false, Some(slot))?;
        Ok(())
    }

    /// The attached index set. Held behind a lock since `add_index`/
    /// `drop_index` mutate it under a write transaction while reads may
    /// run concurrently from other threads.
    pub(crate) fn with_indexes<R>(&self, f: impl FnOnce(&IndexSet) -> R) -> R {
        f(&self.shared.indexes.lock())
    }

    /// Current entry count, read from the main tree's live state rather
    /// than the (possibly stale between writes) cached metadata count.
    pub fn count(&self, txn: &Transaction<'_>) -> Result<u64, Error> {
        let rtxn = txn.as_read()?;
        self.main_db().len(rtxn).map_err(|e| Error::from_heed("tree", e))
    }

    /// Number of indexes currently attached to this tree.
    pub fn index_count(&self) -> usize {
        self.with_indexes(IndexSet::len)
    }

    /// Names of every index currently attached to this tree, in
    /// attachment order.
    pub fn index_names(&self) -> Vec<String> {
        self.with_indexes(|set| set.iter().map(|idx| idx.name().to_string()).collect())
    }

    /// Attaches a new secondary index, persisting its descriptor. Does
    /// not populate existing entries — call [`populate_index`](Self::populate_index)
    /// explicitly afterward, per `spec.md` §4.5.
    #[instrument(skip(self, txn, registry), fields(tree = %self.shared.name, index = %config.name))]
    pub fn add_index(
        &self,
        txn: &mut Transaction<'_>,
        registry: &ExtractorRegistry,
        config: IndexConfig,
    ) -> Result<(), Error> {
        let name = config.name.clone();
        let flags = config.flags();
        let version = config.version;
        let user_data = config.user_data.clone();

        let env = self.shared.env.clone();
        let tree_name = self.shared.name.clone();
        let wtxn = txn.as_write_mut()?;
        self.shared
            .indexes
            .lock()
            .add(&env, wtxn, &tree_name, registry, config)?;

        let mut meta = self.read_metadata(wtxn)?;
        meta.indexes.push(IndexMetadata {
            name,
            flags,
            version,
            user_data,
        });
        self.write_metadata(wtxn, &meta)
    }

    /// Detaches and drops an index's backing sub-collection.
    #[instrument(skip(self, txn), fields(tree = %self.shared.name, index = %name))]
    pub fn drop_index(&self, txn: &mut Transaction<'_>, name: &str) -> Result<(), Error> {
        let env = self.shared.env.clone();
        let tree_name = self.shared.name.clone();
        let wtxn = txn.as_write_mut()?;
        self.shared.indexes.lock().drop_index(&env, wtxn, &tree_name, name)?;

        let mut meta = self.read_metadata(wtxn)?;
        if let Some(pos) = meta.index_position(name) {
            meta.indexes.remove(pos);
        }
        self.write_metadata(wtxn, &meta)
    }

    /// Backfills `name`'s backing store from every existing main-tree
    /// entry. Fails fast on the first unique conflict found, per
    /// `spec.md` §9's resolution of that Open Question; the caller's
    /// surrounding write transaction is responsible for discarding the
    /// partial population on abort.
    #[instrument(skip(self, txn), fields(tree = %self.shared.name, index = %name))]
    pub fn populate_index(&self, txn: &mut Transaction<'_>, name: &str) -> Result<u64, Error> {
        let main_db = self.main_db();
        let wtxn = txn.as_write_mut()?;
        self.shared.indexes.lock().populate(wtxn, main_db, name)
    }

    /// Compares every attached index's contents against the image of the
    /// main tree under its extractor. A debug-only consistency check,
    /// per `spec.md` §4.7/§8's `verify_indexes`.
    pub fn verify_indexes(&self, txn: &Transaction<'_>) -> Result<(), Error> {
        let rtxn = txn.as_read()?;
        self.shared.indexes.lock().verify(rtxn, self.main_db())
    }

    /// Physically drops this tree and every one of its index backing
    /// stores. The handle remains valid to drop, but must not be used
    /// for further operations afterward.
    #[instrument(skip(self, txn), fields(tree = %self.shared.name))]
    pub fn drop_tree(&self, txn: &mut Transaction<'_>) -> Result<(), Error> {
        let env = self.shared.env.clone();
        let tree_name = self.shared.name.clone();
        let index_names: Vec<String> = self
            .shared
            .indexes
            .lock()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        let wtxn = txn.as_write_mut()?;

        for index_name in &index_names {
            backend::drop_database(&env, wtxn, &index_db_name(&tree_name, index_name))?;
        }
        backend::drop_database(&env, wtxn, &tree_name)?;
        self.shared.metadata_db.delete(wtxn, tree_name.as_bytes()).map_err(|e| Error::from_heed("tree", e))?;
        self.shared.indexes.lock().clear();
        Ok(())
    }

    pub(crate) fn read_metadata(&self, wtxn: &backend::RwTxn<'_>) -> Result<TreeMetadata, Error> {
        match self
            .shared
            .metadata_db
            .get(wtxn, self.shared.name.as_bytes())
            .map_err(|e| Error::from_heed("tree", e))?
        {
            Some(bytes) => TreeMetadata::decode(bytes),
            None => Ok(TreeMetadata::default()),
        }
    }

    pub(crate) fn write_metadata(&self, wtxn: &mut backend::RwTxn<'_>, meta: &TreeMetadata) -> Result<(), Error> {
        self.shared
            .metadata_db
            .put(wtxn, self.shared.name.as_bytes(), &meta.encode()?)
            .map_err(|e| Error::from_heed("tree", e))
    }

    /// Updates the cached entry count by `delta`, called at the end of
    /// every mutating operation before commit.
    pub(crate) fn adjust_count(&self, wtxn: &mut backend::RwTxn<'_>, delta: i64) -> Result<(), Error> {
        let mut meta = self.read_metadata(wtxn)?;
        meta.count += delta;
        self.write_metadata(wtxn, &meta)
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree").field("name", &self.shared.name).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Extractor;
    use crate::options::DbOptions;
    use crate::registry::FLAG_UNIQUE;

    fn open_env() -> (tempfile::TempDir, Env) {
        let dir = tempfile::tempdir().unwrap();
        let env = backend::open_env(dir.path(), &DbOptions::default()).unwrap();
        (dir, env)
    }

    #[test]
    fn open_rejects_reserved_names() {
        let (_dir, env) = open_env();
        let registry = ExtractorRegistry::new();
        let mut txn = Transaction::begin(&env, true).unwrap();
        let err = Tree::open(&env, &mut txn, "idx:people:email", &registry).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArg);
    }

    #[test]
    fn add_index_persists_across_reopen() {
        let (_dir, env) = open_env();
        let registry = ExtractorRegistry::new();
        registry
            .register(1, FLAG_UNIQUE, Extractor::new(|v, _ud| Some(v.to_vec())))
            .unwrap();

        let mut txn = Transaction::begin(&env, true).unwrap();
        let tree = Tree::open(&env, &mut txn, "people", &registry).unwrap();
        tree.add_index(
            &mut txn,
            &registry,
            IndexConfig {
                name: "by_value".into(),
                version: 1,
                unique: true,
                sparse: false,
                user_data: Vec::new(),
                key_comparator: None,
                dup_comparator: None,
            },
        )
        .unwrap();
        txn.commit().unwrap();

        let mut txn2 = Transaction::begin(&env, true).unwrap();
        let reopened = Tree::open(&env, &mut txn2, "people", &registry).unwrap();
        assert!(reopened.with_indexes(|idx| idx.get("by_value").is_some()));
    }

    #[test]
    fn delete_tree_clears_main_and_index_stores() {
        let (_dir, env) = open_env();
        let registry = ExtractorRegistry::new();
        registry
            .register(1, FLAG_UNIQUE, Extractor::new(|v, _ud| Some(v.to_vec())))
            .unwrap();

        let mut txn = Transaction::begin(&env, true).unwrap();
        let tree = Tree::open(&env, &mut txn, "people", &registry).unwrap();
        tree.add_index(
            &mut txn,
            &registry,
            IndexConfig {
                name: "by_value".into(),
                version: 1,
                unique: true,
                sparse: false,
                user_data: Vec::new(),
                key_comparator: None,
                dup_comparator: None,
            },
        )
        .unwrap();
        tree.drop_tree(&mut txn).unwrap();
        txn.commit().unwrap();

        let mut txn2 = Transaction::begin(&env, true).unwrap();
        let reopened = Tree::open(&env, &mut txn2, "people", &registry).unwrap();
        assert_eq!(reopened.count(&txn2).unwrap(), 0);
        assert!(reopened.with_indexes(|idx| idx.is_empty()));
    }
}
