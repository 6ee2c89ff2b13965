//! The transaction handle and its state machine (`spec.md` §4.3).
//!
//! Modeled per `spec.md` §9 DESIGN NOTES as a newtype-wrapped resource
//! handle with a scoped destructor around `heed::{RoTxn, RwTxn}`, rather
//! than an opaque pointer the caller must remember to free.

use tracing::instrument;

use crate::backend::{self, Env, RoTxn as BackendRoTxn, RwTxn as BackendRwTxn};
use crate::error::Error;

/// The five states a transaction can occupy, per `spec.md` §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    ActiveWrite,
    ActiveRead,
    ReadReset,
    Committed,
    Aborted,
}

enum Inner<'e> {
    Write(BackendRwTxn<'e>),
    Read(BackendRoTxn<'e>),
    /// A reset read transaction: the MVCC snapshot has been released but
    /// the handle (and its back-pointer to the environment) is retained
    /// so `renew` can cheaply reacquire one, per `spec.md` §4.3.
    ReadReset,
    Done,
}

/// A read-only or read-write transaction borrowed from a [`crate::Database`].
///
/// Carries a back-pointer to its environment, per `spec.md` §3. Dropping
/// a non-terminal transaction aborts it, mirroring the teacher's
/// scoped-destructor pattern for resource handles.
pub struct Transaction<'e> {
    env: &'e Env,
    state: TxnState,
    inner: Inner<'e>,
    was_write: bool,
}

impl<'e> Transaction<'e> {
    /// Begins a new transaction. `write = true` requests the single
    /// process-wide writer slot and blocks until it is free; `write =
    /// false` takes an immediate MVCC snapshot.
    #[instrument(skip(env), level = "debug")]
    pub fn begin(env: &'e Env, write: bool) -> Result<Self, Error> {
        if write {
            let txn = backend::write_txn(env)?;
            Ok(Self {
                env,
                state: TxnState::ActiveWrite,
                inner: Inner::Write(txn),
                was_write: true,
            })
        } else {
            let txn = backend::read_txn(env)?;
            Ok(Self {
                env,
                state: TxnState::ActiveRead,
                inner: Inner::Read(txn),
                was_write: false,
            })
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// `true` for a write transaction, active or not.
    pub fn is_write(&self) -> bool {
        self.was_write
    }

    /// Borrows the backend read transaction, for use by scans, cursors
    /// and gets. Works on both active reads and active writes (a write
    /// transaction can always read its own uncommitted state).
    pub(crate) fn as_read(&self) -> Result<&BackendRoTxn<'e>, Error> {
        match &self.inner {
            Inner::Read(txn) => Ok(txn),
            Inner::Write(txn) => Ok(&*txn),
            Inner::ReadReset => Err(Error::invalid_arg(
                "txn",
                "transaction was reset; call renew before reading",
            )),
            Inner::Done => Err(Error::invalid_arg("txn", "transaction already finished")),
        }
    }

    /// Borrows the backend write transaction; fails `InvalidArg` on a
    /// read transaction, matching `spec.md`'s "wrong txn kind" case.
    pub(crate) fn as_write_mut(&mut self) -> Result<&mut BackendRwTxn<'e>, Error> {
        match &mut self.inner {
            Inner::Write(txn) => Ok(txn),
            _ => Err(Error::invalid_arg(
                "txn",
                "operation requires a write transaction",
            )),
        }
    }

    /// Commits the transaction. Durability depends on the environment's
    /// configured sync mode, per `spec.md` §4.3.
    #[instrument(skip(self), level = "debug")]
    pub fn commit(mut self) -> Result<(), Error> {
        let inner = std::mem::replace(&mut self.inner, Inner::Done);
        let result = match inner {
            Inner::Write(txn) => txn.commit().map_err(|e| Error::from_heed("txn", e)),
            Inner::Read(txn) => txn.commit().map_err(|e| Error::from_heed("txn", e)),
            Inner::ReadReset => Err(Error::invalid_arg("txn", "cannot commit a reset transaction")),
            Inner::Done => Err(Error::invalid_arg("txn", "transaction already finished")),
        };
        self.state = TxnState::Committed;
        result
    }

    /// Aborts the transaction, discarding any writes. Valid from any
    /// non-terminal state.
    #[instrument(skip(self), level = "debug")]
    pub fn abort(mut self) {
        self.inner = Inner::Done;
        self.state = TxnState::Aborted;
    }

    /// Releases the MVCC snapshot of a read transaction while keeping its
    /// slot, per `spec.md` §4.3. No-op/invalid on a write transaction.
    pub fn reset(&mut self) -> Result<(), Error> {
        match &self.inner {
            Inner::Read(_) => {
                self.inner = Inner::ReadReset;
                self.state = TxnState::ReadReset;
                Ok(())
            }
            Inner::ReadReset => Ok(()),
            _ => Err(Error::invalid_arg("txn", "reset is only valid on a read transaction")),
        }
    }

    /// Reacquires a fresh MVCC snapshot after [`reset`](Self::reset).
    pub fn renew(&mut self) -> Result<(), Error> {
        match self.inner {
            Inner::ReadReset => {
                let txn = backend::read_txn(self.env)?;
                self.inner = Inner::Read(txn);
                self.state = TxnState::ActiveRead;
                Ok(())
            }
            Inner::Write(_) | Inner::Read(_) => {
                Err(Error::invalid_arg("txn", "renew is only valid on a reset read transaction"))
            }
            Inner::Done => Err(Error::invalid_arg("txn", "transaction already finished")),
        }
    }
}

impl<'e> Drop for Transaction<'e> {
    fn drop(&mut self) {
        // Scoped destructor: an un-committed, un-aborted transaction is
        // aborted implicitly, the way the underlying `heed` handles drop.
        if matches!(self.state, TxnState::ActiveRead | TxnState::ActiveWrite) {
            tracing::debug!(state = ?self.state, "dropping live transaction, aborting");
        }
    }
}
