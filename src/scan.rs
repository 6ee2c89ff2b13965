//! Range, prefix and predicate-driven scans over a [`Tree`]'s main
//! sub-collection (`spec.md` §4.6).
//!
//! These are one-shot convenience wrappers; a caller that needs to stop
//! early or interleave other work should use [`crate::Cursor`] instead.

use std::ops::Bound;

use crate::error::Error;
use crate::tree::Tree;
use crate::txn::Transaction;

impl Tree {
    /// Collects every `(key, value)` pair with `start <= key < end` (per
    /// the given bounds), in ascending key order.
    pub fn scan_forward(
        &self,
        txn: &Transaction<'_>,
        start: Bound<&[u8]>,
        end: Bound<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let rtxn = txn.as_read()?;
        let range = (start, end);
        self.main_db()
            .range(rtxn, &range)
            .map_err(|e| Error::from_heed("scan", e))?
            .map(|r| r.map(|(k, v)| (k.to_vec(), v.to_vec())))
            .collect::<Result<_, _>>()
            .map_err(|e| Error::from_heed("scan", e))
    }

    /// Like [`scan_forward`](Self::scan_forward), but in descending key order.
    pub fn scan_reverse(
        &self,
        txn: &Transaction<'_>,
        start: Bound<&[u8]>,
        end: Bound<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let mut pairs = self.scan_forward(txn, start, end)?;
        pairs.reverse();
        Ok(pairs)
    }

    /// Collects every `(key, value)` pair whose key starts with `prefix`.
    pub fn scan_prefix(&self, txn: &Transaction<'_>, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let rtxn = txn.as_read()?;
        self.main_db()
            .prefix_iter(rtxn, prefix)
            .map_err(|e| Error::from_heed("scan", e))?
            .map(|r| r.map(|(k, v)| (k.to_vec(), v.to_vec())))
            .collect::<Result<_, _>>()
            .map_err(|e| Error::from_heed("scan", e))
    }

    /// Collects every `(key, value)` pair in the tree, in ascending key order.
    pub fn collect_all(&self, txn: &Transaction<'_>) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        self.scan_forward(txn, Bound::Unbounded, Bound::Unbounded)
    }

    /// Deletes every entry in `[start, end)` for which `predicate`
    /// returns `true`, maintaining every attached index for each
    /// removal. Matching keys are buffered before any delete runs, so
    /// the predicate never observes a half-applied scan and mutating the
    /// main tree mid-scan is safe.
    ///
    /// Returns the number of entries removed.
    pub fn delete_if(
        &self,
        txn: &mut Transaction<'_>,
        start: Bound<&[u8]>,
        end: Bound<&[u8]>,
        predicate: impl Fn(&[u8], &[u8]) -> bool,
    ) -> Result<u64, Error> {
        let matches: Vec<Vec<u8>> = self
            .scan_forward(txn, start, end)?
            .into_iter()
            .filter(|(k, v)| predicate(k, v))
            .map(|(k, _)| k)
            .collect();

        let mut removed = 0u64;
        for key in matches {
            self.delete(txn, &key)?;
            removed += 1;
        }
        Ok(removed)
    }
}
