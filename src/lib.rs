//! An embedded, transactional key-value storage engine with automatically
//! maintained secondary indexes.
//!
//! # Database and Tree
//!
//! A [`Database`] is a directory-addressed, memory-mapped environment: a
//! copy-on-write B+-tree with MVCC transactions, opened once per process
//! and cheap to clone thereafter. Within it, a [`Tree`] is a named
//! sub-collection of byte-string keys to byte-string values, similar to
//! a column family or a table.
//!
//! # Transactions
//!
//! All reads and writes happen inside a [`Transaction`]: either a single
//! active writer (serialized per environment) or any number of
//! concurrent readers, each pinned to a consistent snapshot for its
//! lifetime. A transaction is explicitly [`commit`][Transaction::commit]ed
//! or [`abort`][Transaction::abort]ed; dropping it without either aborts.
//!
//! # Secondary indexes
//!
//! A [`Tree`] can have any number of secondary indexes attached via
//! [`Tree::add_index`], each driven by a user-supplied [`Extractor`] —
//! a pure function from a stored value to an optional index key. Every
//! [`insert`][Tree::insert], [`update`][Tree::update],
//! [`upsert`][Tree::upsert], [`delete`][Tree::delete] and
//! [`modify`][Tree::modify] maintains every attached index atomically,
//! in the same underlying transaction as the main-tree write, so that
//! index contents always equal the image of the main tree under each
//! extractor. [`Tree::verify_indexes`] checks that invariant by brute
//! force; it is a debug operation, not something the write path leans on.
//!
//! Extractors are registered once, ahead of any tree that uses them, in
//! an [`ExtractorRegistry`] shared by the owning [`Database`] — this is
//! what lets a closed-and-reopened tree rehydrate its indexes without
//! the caller re-supplying the extractor functions by hand.
//!
//! # Cursors and scans
//!
//! [`Tree::cursor`] and [`Tree::index_cursor`] open a repositionable
//! [`Cursor`]/[`IndexCursor`] for interleaved traversal; [`Tree::scan_forward`],
//! [`Tree::scan_prefix`] and friends are one-shot convenience wrappers
//! for the common case of collecting a whole range at once.

#![warn(missing_debug_implementations, bare_trait_objects, missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub use self::{
    backend::EnvStats,
    comparator::CompareFn,
    cursor::{Cursor, IndexCursor},
    db::Database,
    error::{Error, ErrorKind},
    extractor::{Extractor, MergeFn, ModifyFn},
    index::{IndexConfig, IndexHandle},
    metadata::{IndexMetadata, TreeMetadata},
    options::{DbOptions, SyncMode},
    registry::{ExtractorRegistry, FLAG_SPARSE, FLAG_UNIQUE},
    tree::Tree,
    txn::{Transaction, TxnState},
};

mod backend;
mod comparator;
mod cursor;
mod db;
mod error;
mod extractor;
mod index;
mod metadata;
mod mutate;
mod options;
mod registry;
mod scan;
mod tree;
mod txn;

/// A specialized `Result` type for storage operations.
pub type Result<T> = std::result::Result<T, Error>;
