//! Mutating operations on a [`Tree`] — `spec.md` §4.5: insert, update,
//! upsert, delete, modify, and their batch counterparts.
//!
//! Every function here follows the same shape: extract/classify against
//! the attached indexes, check preconditions, write the main tree (the
//! commit point), then write index postconditions — all inside the
//! caller's write transaction, so a later abort discards the whole thing
//! atomically.

use crate::error::Error;
use crate::extractor::ModifyFn;
use crate::index;
use crate::tree::Tree;
use crate::txn::Transaction;

impl Tree {
    /// Inserts `value` under `key`. Fails `KeyExists` if the key is
    /// already present in the main tree, or `IndexError` if a unique
    /// index's extracted key collides with a different existing entry,
    /// or a non-sparse index's extractor returns absent.
    pub fn insert(&self, txn: &mut Transaction<'_>, key: &[u8], value: &[u8]) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::invalid_arg("mutate", "key must be non-empty"));
        }
        let main_db = self.main_db();
        self.with_indexes(|indexes| -> Result<(), Error> {
            let extractions = index::extract_for_insert(indexes, value)?;
            let wtxn = txn.as_write_mut()?;
            if main_db.get(wtxn, key).map_err(|e| Error::from_heed("mutate", e))?.is_some() {
                return Err(Error::key_exists("mutate", "key already present"));
            }
            index::check_unique_conflicts(wtxn, &extractions, None)?;
            main_db.put(wtxn, key, value).map_err(|e| Error::from_heed("mutate", e))?;
            index::apply_insertions(wtxn, &extractions, key)?;
            Ok(())
        })?;
        let wtxn = txn.as_write_mut()?;
        self.adjust_count(wtxn, 1)
    }

    /// Replaces the value stored at `key`. Fails `NotFound` if the key is
    /// absent (`spec.md` §9's resolution of that Open Question: update
    /// requires existence).
    pub fn update(&self, txn: &mut Transaction<'_>, key: &[u8], new_value: &[u8]) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::invalid_arg("mutate", "key must be non-empty"));
        }
        let main_db = self.main_db();
        self.with_indexes(|indexes| -> Result<(), Error> {
            let wtxn = txn.as_write_mut()?;
            let old_value = main_db
                .get(wtxn, key)
                .map_err(|e| Error::from_heed("mutate", e))?
                .ok_or_else(|| Error::not_found("mutate", "key absent"))?
                .to_vec();
            let transitions = index::classify_update(indexes, &old_value, new_value)?;
            index::check_update_unique_conflicts(wtxn, &transitions, key)?;
            main_db.put(wtxn, key, new_value).map_err(|e| Error::from_heed("mutate", e))?;
            index::apply_update(wtxn, &transitions, key)?;
            Ok(())
        })
    }

    /// Inserts `value` if `key` is absent; otherwise combines the
    /// existing and incoming values with the tree's configured merge
    /// function (`spec.md` §4.5). Fails `Callback` if no merge function
    /// is configured and the key already exists, or if the merge
    /// function itself returns `None` to abort.
    pub fn upsert(&self, txn: &mut Transaction<'_>, key: &[u8], value: &[u8]) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::invalid_arg("mutate", "key must be non-empty"));
        }
        let main_db = self.main_db();
        let merge_fn = self.merge_fn();
        let existed = self.with_indexes(|indexes| -> Result<bool, Error> {
            let wtxn = txn.as_write_mut()?;
            match main_db.get(wtxn, key).map_err(|e| Error::from_heed("mutate", e))? {
                None => {
                    let extractions = index::extract_for_insert(indexes, value)?;
                    index::check_unique_conflicts(wtxn, &extractions, None)?;
                    main_db.put(wtxn, key, value).map_err(|e| Error::from_heed("mutate", e))?;
                    index::apply_insertions(wtxn, &extractions, key)?;
                    Ok(false)
                }
                Some(old_value) => {
                    let old_value = old_value.to_vec();
                    let (merge_fn, user_data) = merge_fn
                        .as_ref()
                        .ok_or_else(|| Error::callback("mutate", "upsert on an existing key with no merge function configured"))?;
                    let merged = merge_fn
                        .merge(&old_value, value, user_data)
                        .ok_or_else(|| Error::callback("mutate", "merge function aborted the upsert"))?;
                    let transitions = index::classify_update(indexes, &old_value, &merged)?;
                    index::check_update_unique_conflicts(wtxn, &transitions, key)?;
                    main_db.put(wtxn, key, &merged).map_err(|e| Error::from_heed("mutate", e))?;
                    index::apply_update(wtxn, &transitions, key)?;
                    Ok(true)
                }
            }
        })?;
        if !existed {
            let wtxn = txn.as_write_mut()?;
            self.adjust_count(wtxn, 1)?;
        }
        Ok(())
    }

    /// Removes `key` and its image from every attached index. Fails
    /// `NotFound` if the key is absent.
    pub fn delete(&self, txn: &mut Transaction<'_>, key: &[u8]) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::invalid_arg("mutate", "key must be non-empty"));
        }
        let main_db = self.main_db();
        self.with_indexes(|indexes| -> Result<(), Error> {
            let wtxn = txn.as_write_mut()?;
            let value = main_db
                .get(wtxn, key)
                .map_err(|e| Error::from_heed("mutate", e))?
                .ok_or_else(|| Error::not_found("mutate", "key absent"))?
                .to_vec();
            let extractions = index::extract_for_insert(indexes, &value)?;
            main_db.delete(wtxn, key).map_err(|e| Error::from_heed("mutate", e))?;
            index::apply_removals(wtxn, &extractions, key)?;
            Ok(())
        })?;
        let wtxn = txn.as_write_mut()?;
        self.adjust_count(wtxn, -1)
    }

    /// Removes `key` only if present, without surfacing `NotFound`.
    /// Returns `true` if an entry was removed.
    pub fn delete_if_present(&self, txn: &mut Transaction<'_>, key: &[u8]) -> Result<bool, Error> {
        match self.delete(txn, key) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == crate::error::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Atomically reads, computes, and writes back the value at `key` in
    /// one step, maintaining every attached index (`spec.md` §4.5).
    /// `modify` sees `None` when the key is absent; returning `None`
    /// deletes (or no-ops if already absent).
    pub fn modify(&self, txn: &mut Transaction<'_>, key: &[u8], modify: &ModifyFn, user_data: &[u8]) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::invalid_arg("mutate", "key must be non-empty"));
        }
        let main_db = self.main_db();
        let delta = self.with_indexes(|indexes| -> Result<i64, Error> {
            let wtxn = txn.as_write_mut()?;
            let current = main_db.get(wtxn, key).map_err(|e| Error::from_heed("mutate", e))?;
            let current_owned = current.map(|c| c.to_vec());
            let next = modify.apply(current_owned.as_deref(), user_data);

            match (current_owned, next) {
                (None, None) => Ok(0),
                (Some(old), None) => {
                    let extractions = index::extract_for_insert(indexes, &old)?;
                    main_db.delete(wtxn, key).map_err(|e| Error::from_heed("mutate", e))?;
                    index::apply_removals(wtxn, &extractions, key)?;
                    Ok(-1)
                }
                (None, Some(value)) => {
                    let extractions = index::extract_for_insert(indexes, &value)?;
                    index::check_unique_conflicts(wtxn, &extractions, None)?;
                    main_db.put(wtxn, key, &value).map_err(|e| Error::from_heed("mutate", e))?;
                    index::apply_insertions(wtxn, &extractions, key)?;
                    Ok(1)
                }
                (Some(old), Some(new)) => {
                    let transitions = index::classify_update(indexes, &old, &new)?;
                    index::check_update_unique_conflicts(wtxn, &transitions, key)?;
                    main_db.put(wtxn, key, &new).map_err(|e| Error::from_heed("mutate", e))?;
                    index::apply_update(wtxn, &transitions, key)?;
                    Ok(0)
                }
            }
        })?;
        if delta != 0 {
            let wtxn = txn.as_write_mut()?;
            self.adjust_count(wtxn, delta)?;
        }
        Ok(())
    }

    /// Point read of `key`'s value, if present.
    pub fn get<'t>(&self, txn: &'t Transaction<'_>, key: &[u8]) -> Result<Option<&'t [u8]>, Error> {
        let rtxn = txn.as_read()?;
        self.main_db().get(rtxn, key).map_err(|e| Error::from_heed("mutate", e))
    }

    /// `true` if `key` is present.
    pub fn exists(&self, txn: &Transaction<'_>, key: &[u8]) -> Result<bool, Error> {
        Ok(self.get(txn, key)?.is_some())
    }

    /// Inserts every `(key, value)` pair. Stops and returns the first
    /// error encountered, leaving earlier pairs in this batch already
    /// written — the caller's surrounding write transaction is
    /// responsible for discarding a partial batch on abort. Fails
    /// `InvalidArg` on an empty batch.
    pub fn insert_many<'a, I>(&self, txn: &mut Transaction<'_>, pairs: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
    {
        let pairs: Vec<_> = pairs.into_iter().collect();
        if pairs.is_empty() {
            return Err(Error::invalid_arg("mutate", "batch must be non-empty"));
        }
        for (key, value) in pairs {
            self.insert(txn, key, value)?;
        }
        Ok(())
    }

    /// Upserts every `(key, value)` pair, stopping at the first error.
    /// Fails `InvalidArg` on an empty batch.
    pub fn upsert_many<'a, I>(&self, txn: &mut Transaction<'_>, pairs: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
    {
        let pairs: Vec<_> = pairs.into_iter().collect();
        if pairs.is_empty() {
            return Err(Error::invalid_arg("mutate", "batch must be non-empty"));
        }
        for (key, value) in pairs {
            self.upsert(txn, key, value)?;
        }
        Ok(())
    }

    /// Checks existence of every key in `keys`, in order. Fails
    /// `InvalidArg` on an empty batch.
    pub fn exists_many<'a, I>(&self, txn: &Transaction<'_>, keys: I) -> Result<Vec<bool>, Error>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let keys: Vec<_> = keys.into_iter().collect();
        if keys.is_empty() {
            return Err(Error::invalid_arg("mutate", "batch must be non-empty"));
        }
        keys.into_iter().map(|key| self.exists(txn, key)).collect()
    }
}
