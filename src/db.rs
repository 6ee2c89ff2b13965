//! The database handle (`spec.md` §4.2).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::instrument;

use crate::backend::{self, Env, EnvStats};
use crate::error::Error;
use crate::extractor::Extractor;
use crate::options::DbOptions;
use crate::registry::ExtractorRegistry;
use crate::txn::Transaction;

struct Shared {
    env: Env,
    path: PathBuf,
    options: Mutex<DbOptions>,
    registry: ExtractorRegistry,
}

/// A directory-addressed environment: a maximum map size (growable via
/// [`resize`](Database::resize)), a cap on named sub-collections, a
/// schema version, an extractor registry, and (implicitly, via
/// [`Tree::open`](crate::Tree::open)) a table of open tree handles.
///
/// Cheap to clone — internally an `Arc` — so it can be shared across
/// threads for read operations, per `spec.md` §5.
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
}

impl Database {
    /// Opens (or creates, per `options.create_if_missing`) the
    /// environment at `path`.
    ///
    /// Only one writer process may have the environment open writable at
    /// a time; the backend serializes on this. Surfaces `MapFull` if
    /// `options.map_size` cannot be mapped, `InvalidArg` on a malformed
    /// path or options.
    #[instrument(skip(options), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P, options: DbOptions) -> Result<Self, Error> {
        let path = path.as_ref();
        if options.map_size == 0 {
            return Err(Error::invalid_arg("db", "map_size must be non-zero"));
        }
        let env = backend::open_env(path, &options)?;
        tracing::debug!(map_size = options.map_size, max_trees = options.max_trees, "opened database");
        Ok(Self {
            shared: Arc::new(Shared {
                env,
                path: path.to_path_buf(),
                options: Mutex::new(options),
                registry: ExtractorRegistry::new(),
            }),
        })
    }

    /// The directory this environment was opened at.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// The options this environment was opened with.
    pub fn options(&self) -> DbOptions {
        *self.shared.options.lock()
    }

    /// The extractor registry backing this database's trees.
    pub fn registry(&self) -> &ExtractorRegistry {
        &self.shared.registry
    }

    pub(crate) fn env(&self) -> &Env {
        &self.shared.env
    }

    /// Registers `extractor` under `(version, flags)`. Must happen
    /// before any tree referencing that pair is opened or mutated.
    /// Fails `KeyExists` on double-registration.
    pub fn register_extractor(&self, version: u32, flags: u8, extractor: Extractor) -> Result<(), Error> {
        self.shared.registry.register(version, flags, extractor)
    }

    /// Begins a new transaction against this environment.
    pub fn begin(&self, write: bool) -> Result<Transaction<'_>, Error> {
        Transaction::begin(&self.shared.env, write)
    }

    /// Opens (or, inside a write transaction, creates) the named tree,
    /// rehydrating any indexes persisted from a previous session via this
    /// environment's extractor registry.
    pub fn open_tree(&self, txn: &mut Transaction<'_>, name: &str) -> Result<crate::tree::Tree, Error> {
        crate::tree::Tree::open(&self.shared.env, txn, name, &self.shared.registry)
    }

    /// Opens a tree that must already exist, without creating it. Unlike
    /// [`open_tree`](Self::open_tree), this works under a read-only
    /// transaction; fails `NotFound` if the tree hasn't been created yet.
    pub fn open_tree_existing(&self, txn: &Transaction<'_>, name: &str) -> Result<crate::tree::Tree, Error> {
        crate::tree::Tree::open_existing(&self.shared.env, txn, name, &self.shared.registry)
    }

    /// Flushes buffered writes to disk. `force = false` defers entirely
    /// to the backend's own sync policy (`spec.md` §4.2/§9: the core does
    /// not define its own fsync policy).
    #[instrument(skip(self))]
    pub fn sync(&self, force: bool) -> Result<(), Error> {
        backend::sync(&self.shared.env, force)
    }

    /// Grows the environment's map size. Only valid when no write
    /// transaction is active in this process; existing tree handles
    /// remain valid (the environment is reference-counted underneath).
    #[instrument(skip(self))]
    pub fn resize(&self, new_mapsize: usize) -> Result<(), Error> {
        if new_mapsize == 0 {
            return Err(Error::invalid_arg("db", "new_mapsize must be non-zero"));
        }
        // SAFETY: the environment handle is only shared within this
        // process and `Database::resize`'s contract (no active writer)
        // is documented on the public method.
        unsafe { backend::resize(&self.shared.env, new_mapsize) }?;
        self.shared.options.lock().map_size = new_mapsize;
        Ok(())
    }

    /// Runtime statistics: page size, B+-tree depth, entry count, and
    /// configured map size.
    pub fn stats(&self) -> Result<EnvStats, Error> {
        backend::env_stats(&self.shared.env)
    }

    /// Closing is idempotent: dropping the last clone of this handle
    /// releases the environment. `close` exists as an explicit, early
    /// alternative for callers that want to free the mmap deterministically.
    pub fn close(self) {
        drop(self);
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.shared.path)
            .finish_non_exhaustive()
    }
}
