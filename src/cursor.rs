//! Repositionable cursors over a [`Tree`]'s main sub-collection and over
//! an individual index's backing store (`spec.md` §4.7).
//!
//! Unlike [`crate::scan`]'s one-shot helpers, a cursor holds a position
//! that survives across calls, so a caller can walk forward, backward,
//! or jump to an arbitrary key without re-scanning from the start. The
//! position is just an owned `(key, value)` pair on this side rather
//! than a live `heed` iterator: every step re-derives a fresh bounded
//! range from that position instead of holding a borrowed iterator
//! across calls, so a `Cursor` is free to outlive any single `range()`
//! call and never fights the transaction's borrow checker.

use std::ops::Bound;

use crate::backend::RawDatabase;
use crate::error::Error;
use crate::index;
use crate::tree::Tree;
use crate::txn::Transaction;

impl Tree {
    /// Opens a cursor over this tree's main sub-collection, initially
    /// unpositioned (`valid()` is `false` until a positioning call succeeds).
    pub fn cursor(&self) -> Cursor {
        Cursor { tree: self.clone(), current: None }
    }

    /// Opens a cursor over `name`'s backing store. Fails `NotFound` if no
    /// index by that name is attached.
    pub fn index_cursor(&self, name: &str) -> Result<IndexCursor, Error> {
        let db = self
            .with_indexes(|set| index::backing_database(set, name))
            .ok_or_else(|| Error::not_found("cursor", format!("no such index {name:?}")))?;
        Ok(IndexCursor { db, current: None })
    }
}

/// A positioned cursor over a [`Tree`]'s main sub-collection.
pub struct Cursor {
    tree: Tree,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl Cursor {
    /// Positions at the first entry in key order. Returns `false` (and
    /// invalidates the cursor) if the tree is empty.
    pub fn first(&mut self, txn: &Transaction<'_>) -> Result<bool, Error> {
        let rtxn = txn.as_read()?;
        let range = (Bound::Unbounded, Bound::Unbounded);
        self.land(
            self.tree
                .main_db()
                .range(rtxn, &range)
                .map_err(|e| Error::from_heed("cursor", e))?
                .next(),
        )
    }

    /// Positions at the last entry in key order. Returns `false` (and
    /// invalidates the cursor) if the tree is empty.
    pub fn last(&mut self, txn: &Transaction<'_>) -> Result<bool, Error> {
        let rtxn = txn.as_read()?;
        let range: (Bound<&[u8]>, Bound<&[u8]>) = (Bound::Unbounded, Bound::Unbounded);
        self.land(
            self.tree
                .main_db()
                .rev_range(rtxn, &range)
                .map_err(|e| Error::from_heed("cursor", e))?
                .next(),
        )
    }

    /// Advances to the next entry after the current position, or to the
    /// first entry if unpositioned.
    pub fn next(&mut self, txn: &Transaction<'_>) -> Result<bool, Error> {
        let Some((key, _)) = &self.current else {
            return self.first(txn);
        };
        let rtxn = txn.as_read()?;
        let range: (Bound<&[u8]>, Bound<&[u8]>) = (Bound::Excluded(key.as_slice()), Bound::Unbounded);
        self.land(
            self.tree
                .main_db()
                .range(rtxn, &range)
                .map_err(|e| Error::from_heed("cursor", e))?
                .next(),
        )
    }

    /// Steps to the entry before the current position, or to the last
    /// entry if unpositioned.
    pub fn prev(&mut self, txn: &Transaction<'_>) -> Result<bool, Error> {
        let Some((key, _)) = &self.current else {
            return self.last(txn);
        };
        let rtxn = txn.as_read()?;
        let range: (Bound<&[u8]>, Bound<&[u8]>) = (Bound::Unbounded, Bound::Excluded(key.as_slice()));
        self.land(
            self.tree
                .main_db()
                .rev_range(rtxn, &range)
                .map_err(|e| Error::from_heed("cursor", e))?
                .next(),
        )
    }

    /// Positions exactly at `key`. Returns `false` (and invalidates the
    /// cursor) if `key` is absent.
    pub fn seek(&mut self, txn: &Transaction<'_>, key: &[u8]) -> Result<bool, Error> {
        let rtxn = txn.as_read()?;
        let found = self
            .tree
            .main_db()
            .get(rtxn, key)
            .map_err(|e| Error::from_heed("cursor", e))?;
        self.current = found.map(|v| (key.to_vec(), v.to_vec()));
        Ok(self.current.is_some())
    }

    /// Positions at the first entry whose key is `>= key`. Returns `false`
    /// (and invalidates the cursor) if no such entry exists.
    pub fn seek_range(&mut self, txn: &Transaction<'_>, key: &[u8]) -> Result<bool, Error> {
        let rtxn = txn.as_read()?;
        let range: (Bound<&[u8]>, Bound<&[u8]>) = (Bound::Included(key), Bound::Unbounded);
        self.land(
            self.tree
                .main_db()
                .range(rtxn, &range)
                .map_err(|e| Error::from_heed("cursor", e))?
                .next(),
        )
    }

    /// Deletes the entry at the current position, maintaining every
    /// attached index, then repositions to the entry that followed it (or
    /// invalidates the cursor if none remains). Fails `InvalidArg` if the
    /// cursor is unpositioned.
    pub fn delete_current(&mut self, txn: &mut Transaction<'_>) -> Result<(), Error> {
        let Some((key, _)) = self.current.take() else {
            return Err(Error::invalid_arg("cursor", "delete_current called on an unpositioned cursor"));
        };
        self.tree.delete(txn, &key)?;
        let rtxn = txn.as_read()?;
        let range: (Bound<&[u8]>, Bound<&[u8]>) = (Bound::Excluded(key.as_slice()), Bound::Unbounded);
        self.land(
            self.tree
                .main_db()
                .range(rtxn, &range)
                .map_err(|e| Error::from_heed("cursor", e))?
                .next(),
        )
        .map(|_| ())
    }

    /// `true` once a positioning call has landed on an entry.
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// The current position's key, if positioned.
    pub fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_slice())
    }

    /// The current position's value, if positioned.
    pub fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| v.as_slice())
    }

    /// Owned copy of the current position's key.
    pub fn key_copy(&self) -> Option<Vec<u8>> {
        self.current.as_ref().map(|(k, _)| k.clone())
    }

    /// Owned copy of the current position's value.
    pub fn value_copy(&self) -> Option<Vec<u8>> {
        self.current.as_ref().map(|(_, v)| v.clone())
    }

    fn land(&mut self, found: Option<heed::Result<(&[u8], &[u8])>>) -> Result<bool, Error> {
        self.current = match found {
            Some(pair) => {
                let (k, v) = pair.map_err(|e| Error::from_heed("cursor", e))?;
                Some((k.to_vec(), v.to_vec()))
            }
            None => None,
        };
        Ok(self.current.is_some())
    }
}

/// A positioned cursor over one index's backing store, keyed by the
/// extracted index value and holding the referenced main key as its
/// value (`spec.md` §4.5).
pub struct IndexCursor {
    db: RawDatabase,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl IndexCursor {
    /// Positions at the first `(index key, main key)` pair.
    pub fn first(&mut self, txn: &Transaction<'_>) -> Result<bool, Error> {
        let rtxn = txn.as_read()?;
        let range: (Bound<&[u8]>, Bound<&[u8]>) = (Bound::Unbounded, Bound::Unbounded);
        self.land(self.db.range(rtxn, &range).map_err(|e| Error::from_heed("cursor", e))?.next())
    }

    /// Positions at the last `(index key, main key)` pair.
    pub fn last(&mut self, txn: &Transaction<'_>) -> Result<bool, Error> {
        let rtxn = txn.as_read()?;
        let range: (Bound<&[u8]>, Bound<&[u8]>) = (Bound::Unbounded, Bound::Unbounded);
        self.land(self.db.rev_range(rtxn, &range).map_err(|e| Error::from_heed("cursor", e))?.next())
    }

    /// Advances to the next pair, ordered first by index key and then
    /// (within a duplicate bucket) by main key.
    pub fn next(&mut self, txn: &Transaction<'_>) -> Result<bool, Error> {
        let Some((key, main_key)) = &self.current else {
            return self.first(txn);
        };
        let rtxn = txn.as_read()?;
        let range: (Bound<&[u8]>, Bound<&[u8]>) = (Bound::Excluded(key.as_slice()), Bound::Unbounded);
        let _ = main_key;
        self.land(self.db.range(rtxn, &range).map_err(|e| Error::from_heed("cursor", e))?.next())
    }

    /// Steps to the pair before the current position.
    pub fn prev(&mut self, txn: &Transaction<'_>) -> Result<bool, Error> {
        let Some((key, _)) = &self.current else {
            return self.last(txn);
        };
        let rtxn = txn.as_read()?;
        let range: (Bound<&[u8]>, Bound<&[u8]>) = (Bound::Unbounded, Bound::Excluded(key.as_slice()));
        self.land(self.db.rev_range(rtxn, &range).map_err(|e| Error::from_heed("cursor", e))?.next())
    }

    /// Positions at the first entry in `key`'s duplicate bucket. Returns
    /// `false` if `key` has no entries in this index.
    pub fn index_seek(&mut self, txn: &Transaction<'_>, key: &[u8]) -> Result<bool, Error> {
        let rtxn = txn.as_read()?;
        let found = self
            .db
            .get(rtxn, key)
            .map_err(|e| Error::from_heed("cursor", e))?;
        self.current = found.map(|main_key| (key.to_vec(), main_key.to_vec()));
        Ok(self.current.is_some())
    }

    /// Positions at the first entry whose index key is `>= key`.
    pub fn index_seek_range(&mut self, txn: &Transaction<'_>, key: &[u8]) -> Result<bool, Error> {
        let rtxn = txn.as_read()?;
        let range: (Bound<&[u8]>, Bound<&[u8]>) = (Bound::Included(key), Bound::Unbounded);
        self.land(self.db.range(rtxn, &range).map_err(|e| Error::from_heed("cursor", e))?.next())
    }

    /// `true` once a positioning call has landed on an entry.
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// The current position's index key.
    pub fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_slice())
    }

    /// The current position's main key (the index's value half).
    pub fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| v.as_slice())
    }

    /// Owned copy of the current position's index key.
    pub fn key_copy(&self) -> Option<Vec<u8>> {
        self.current.as_ref().map(|(k, _)| k.clone())
    }

    /// Owned copy of the current position's main key.
    pub fn value_copy(&self) -> Option<Vec<u8>> {
        self.current.as_ref().map(|(_, v)| v.clone())
    }

    /// The main-tree key referenced by the current index entry — an
    /// alias for [`value_copy`](Self::value_copy) that reads clearer at
    /// call sites that immediately look the main key up in the tree.
    pub fn index_iterator_main_key(&self) -> Option<Vec<u8>> {
        self.value_copy()
    }

    fn land(&mut self, found: Option<heed::Result<(&[u8], &[u8])>>) -> Result<bool, Error> {
        self.current = match found {
            Some(pair) => {
                let (k, v) = pair.map_err(|e| Error::from_heed("cursor", e))?;
                Some((k.to_vec(), v.to_vec()))
            }
            None => None,
        };
        Ok(self.current.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend;
    use crate::extractor::Extractor;
    use crate::index::IndexConfig;
    use crate::options::DbOptions;
    use crate::registry::ExtractorRegistry;

    fn harness() -> (tempfile::TempDir, crate::backend::Env, ExtractorRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let env = backend::open_env(dir.path(), &DbOptions::default()).unwrap();
        let registry = ExtractorRegistry::new();
        registry
            .register(1, 0, Extractor::new(|v: &[u8], _ud| Some(v.to_vec())))
            .unwrap();
        (dir, env, registry)
    }

    fn by_value_index() -> IndexConfig {
        IndexConfig {
            name: "by_value".into(),
            version: 1,
            unique: true,
            sparse: false,
            user_data: Vec::new(),
            key_comparator: None,
            dup_comparator: None,
        }
    }

    #[test]
    fn cursor_walks_forward_and_backward() {
        let (_dir, env, registry) = harness();
        let mut txn = Transaction::begin(&env, true).unwrap();
        let tree = Tree::open(&env, &mut txn, "people", &registry).unwrap();
        tree.insert_many(
            &mut txn,
            [(&b"a"[..], &b"1"[..]), (&b"b"[..], &b"2"[..]), (&b"c"[..], &b"3"[..])],
        )
        .unwrap();

        let mut cursor = tree.cursor();
        assert!(cursor.first(&txn).unwrap());
        assert_eq!(cursor.key(), Some(&b"a"[..]));
        assert!(cursor.next(&txn).unwrap());
        assert_eq!(cursor.key(), Some(&b"b"[..]));
        assert!(cursor.next(&txn).unwrap());
        assert_eq!(cursor.key(), Some(&b"c"[..]));
        assert!(!cursor.next(&txn).unwrap());
        assert!(!cursor.valid());

        assert!(cursor.last(&txn).unwrap());
        assert_eq!(cursor.key(), Some(&b"c"[..]));
        assert!(cursor.prev(&txn).unwrap());
        assert_eq!(cursor.key(), Some(&b"b"[..]));
    }

    #[test]
    fn cursor_seek_and_seek_range() {
        let (_dir, env, registry) = harness();
        let mut txn = Transaction::begin(&env, true).unwrap();
        let tree = Tree::open(&env, &mut txn, "people", &registry).unwrap();
        tree.insert_many(&mut txn, [(&b"b"[..], &b"2"[..]), (&b"d"[..], &b"4"[..])])
            .unwrap();

        let mut cursor = tree.cursor();
        assert!(!cursor.seek(&txn, b"c").unwrap());
        assert!(cursor.seek_range(&txn, b"c").unwrap());
        assert_eq!(cursor.key(), Some(&b"d"[..]));
        assert!(cursor.seek(&txn, b"b").unwrap());
        assert_eq!(cursor.value(), Some(&b"2"[..]));
    }

    #[test]
    fn cursor_delete_current_maintains_index() {
        let (_dir, env, registry) = harness();
        let mut txn = Transaction::begin(&env, true).unwrap();
        let tree = Tree::open(&env, &mut txn, "people", &registry).unwrap();
        tree.add_index(&mut txn, &registry, by_value_index()).unwrap();
        tree.insert(&mut txn, b"a", b"1").unwrap();

        let mut cursor = tree.cursor();
        assert!(cursor.seek(&txn, b"a").unwrap());
        cursor.delete_current(&mut txn).unwrap();
        assert!(!tree.exists(&txn, b"a").unwrap());
        // "a" was the only entry, so there is nothing to reposition onto
        assert!(!cursor.valid());

        let mut idx_cursor = tree.index_cursor("by_value").unwrap();
        assert!(!idx_cursor.first(&txn).unwrap());
    }

    #[test]
    fn cursor_delete_current_repositions_to_the_next_entry() {
        let (_dir, env, registry) = harness();
        let mut txn = Transaction::begin(&env, true).unwrap();
        let tree = Tree::open(&env, &mut txn, "people", &registry).unwrap();
        tree.insert_many(
            &mut txn,
            [(&b"a"[..], &b"1"[..]), (&b"b"[..], &b"2"[..]), (&b"c"[..], &b"3"[..])],
        )
        .unwrap();

        let mut cursor = tree.cursor();
        assert!(cursor.seek(&txn, b"b").unwrap());
        cursor.delete_current(&mut txn).unwrap();

        assert!(cursor.valid());
        assert_eq!(cursor.key(), Some(&b"c"[..]));
    }

    #[test]
    fn index_cursor_walks_in_index_key_order() {
        let (_dir, env, registry) = harness();
        let mut txn = Transaction::begin(&env, true).unwrap();
        let tree = Tree::open(&env, &mut txn, "people", &registry).unwrap();
        tree.add_index(&mut txn, &registry, by_value_index()).unwrap();
        tree.insert_many(&mut txn, [(&b"x"[..], &b"2"[..]), (&b"y"[..], &b"1"[..])])
            .unwrap();

        let mut cursor = tree.index_cursor("by_value").unwrap();
        assert!(cursor.first(&txn).unwrap());
        assert_eq!(cursor.key(), Some(&b"1"[..]));
        assert_eq!(cursor.index_iterator_main_key(), Some(b"y".to_vec()));
        assert!(cursor.next(&txn).unwrap());
        assert_eq!(cursor.key(), Some(&b"2"[..]));
        assert_eq!(cursor.index_iterator_main_key(), Some(b"x".to_vec()));
        assert!(!cursor.next(&txn).unwrap());
    }
}
