//! The callback contract `spec.md` §4.7 and §9 impose on host-supplied
//! functions: extractors, merge functions, and modify functions.
//!
//! All three are modeled as owned-byte-vector-in, owned-byte-vector-out
//! functions rather than the raw-pointer-with-manual-free C signature the
//! original interface implies (§9 DESIGN NOTES): "model these as 'return
//! an owned byte-vector' [...]; sparse-absence and modify-abort are
//! carried by the option variant, not by returning a null sentinel
//! pointer." They must be `Send + Sync` since the registry — and hence
//! these functions — are invoked from the writer thread and, during
//! `populate_index`/`verify_indexes`, from reader threads as well.

use std::fmt;
use std::sync::Arc;

/// A pure function `(value bytes, user-data bytes) -> optional index-key
/// bytes`, as `spec.md` §4.7 specifies.
///
/// Returning `None` signals "absent": permitted only for sparse indexes.
/// Must be pure — same inputs, same output — since violations corrupt
/// the index in ways only `verify_indexes` can detect after the fact.
#[derive(Clone)]
pub struct Extractor(Arc<dyn Fn(&[u8], &[u8]) -> Option<Vec<u8>> + Send + Sync>);

impl Extractor {
    /// Wraps a plain function or closure as an extractor.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[u8], &[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Applies the extractor to `value` with the index's `user_data`.
    pub fn extract(&self, value: &[u8], user_data: &[u8]) -> Option<Vec<u8>> {
        (self.0)(value, user_data)
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Extractor(..)")
    }
}

/// A function combining an existing value and an incoming value into a
/// single new value, invoked by `upsert` when the key already exists
/// (`spec.md` §3, §4.5). Returning `None` aborts the upsert with
/// `ErrorKind::Callback`.
#[derive(Clone)]
pub struct MergeFn(Arc<dyn Fn(&[u8], &[u8], &[u8]) -> Option<Vec<u8>> + Send + Sync>);

impl MergeFn {
    /// Wraps a plain function or closure as a merge function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[u8], &[u8], &[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Merges `old` and `new` using `user_data` as configured on the tree.
    pub fn merge(&self, old: &[u8], new: &[u8], user_data: &[u8]) -> Option<Vec<u8>> {
        (self.0)(old, new, user_data)
    }
}

impl fmt::Debug for MergeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MergeFn(..)")
    }
}

/// The atomic read-modify-write callback used by `Tree::modify`
/// (`spec.md` §4.5). `current` is `None` when the key is absent;
/// returning `None` deletes (or no-ops, if `current` was already `None`).
#[derive(Clone)]
pub struct ModifyFn(Arc<dyn Fn(Option<&[u8]>, &[u8]) -> Option<Vec<u8>> + Send + Sync>);

impl ModifyFn {
    /// Wraps a plain function or closure as a modify function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<&[u8]>, &[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Computes the next value given the current one (if any).
    pub fn apply(&self, current: Option<&[u8]>, user_data: &[u8]) -> Option<Vec<u8>> {
        (self.0)(current, user_data)
    }
}

impl fmt::Debug for ModifyFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModifyFn(..)")
    }
}
