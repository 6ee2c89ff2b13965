//! The extractor registry.
//!
//! Per `spec.md` §9 DESIGN NOTES: the reference implementation keeps this
//! as process-global mutable state; here it is a field of [`Database`]
//! instead, so its lifetime is tied to one environment handle rather than
//! the process, which keeps tests hermetic and lets two databases in the
//! same process register independent extractors for the same
//! `(version, flags)` pair.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Error;
use crate::extractor::Extractor;

/// Two-bit flag encoding carried alongside an extractor's schema version.
pub const FLAG_UNIQUE: u8 = 0x01;
/// See [`FLAG_UNIQUE`].
pub const FLAG_SPARSE: u8 = 0x02;

/// The 64-bit key under which an extractor is looked up:
/// `(version << 32) | flags`, per `spec.md` §3.
pub fn composite_key(version: u32, flags: u8) -> u64 {
    ((version as u64) << 32) | (flags as u64)
}

/// Splits a composite key back into `(version, flags)`.
pub fn split_composite_key(key: u64) -> (u32, u8) {
    ((key >> 32) as u32, key as u8)
}

/// A process-lifetime-scoped (here: database-lifetime-scoped), thread-safe
/// mapping from `(version, flags)` to an extractor function.
///
/// Registered by the host program before any tree referencing that
/// `(version, flags)` pair is opened or mutated (`spec.md` §4.2). Read
/// from many threads on every insert/update; written only during
/// start-up, via a `parking_lot::RwLock` so concurrent readers never
/// block each other.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    inner: Arc<RwLock<HashMap<u64, Extractor>>>,
}

impl ExtractorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `extractor` under `(version, flags)`.
    ///
    /// Fails with [`crate::ErrorKind::KeyExists`] if that composite key is
    /// already registered — the double-registration spec.md §4.2 forbids.
    pub fn register(&self, version: u32, flags: u8, extractor: Extractor) -> Result<(), Error> {
        let key = composite_key(version, flags);
        let mut map = self.inner.write();
        if map.contains_key(&key) {
            return Err(Error::key_exists(
                "registry",
                format!("extractor already registered for version={version} flags={flags:#x}"),
            ));
        }
        map.insert(key, extractor);
        Ok(())
    }

    /// Looks up the extractor for `(version, flags)`.
    pub fn get(&self, version: u32, flags: u8) -> Option<Extractor> {
        self.inner.read().get(&composite_key(version, flags)).cloned()
    }

    /// Looks up the extractor for a composite key directly, as read back
    /// from a persisted index-metadata record.
    pub fn get_by_key(&self, key: u64) -> Option<Extractor> {
        self.inner.read().get(&key).cloned()
    }

    /// Number of registered extractors. Exposed for diagnostics and tests.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// `true` if no extractors are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Extractor;

    fn noop_extractor() -> Extractor {
        Extractor::new(|_value, _user_data| None)
    }

    #[test]
    fn composite_key_round_trips() {
        let key = composite_key(0x0001_0000, FLAG_UNIQUE | FLAG_SPARSE);
        assert_eq!(split_composite_key(key), (0x0001_0000, FLAG_UNIQUE | FLAG_SPARSE));
    }

    #[test]
    fn double_registration_fails() {
        let registry = ExtractorRegistry::new();
        registry.register(1, FLAG_UNIQUE, noop_extractor()).unwrap();
        let err = registry.register(1, FLAG_UNIQUE, noop_extractor()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::KeyExists);
    }

    #[test]
    fn lookup_misses_return_none() {
        let registry = ExtractorRegistry::new();
        assert!(registry.get(1, FLAG_UNIQUE).is_none());
    }
}
