//! The uniform error type returned by every public operation.

use thiserror::Error;

/// The taxonomy of outcomes a storage operation can produce.
///
/// `KeyExists`, `NotFound` and `IndexError` are expected business
/// outcomes, not bugs. `MapFull` and `TxnFull` are [recoverable](Error::recoverable):
/// the caller should abort the enclosing transaction, take corrective
/// action (resize the map, shrink the batch), and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unclassified internal or backend-level failure.
    Generic,
    /// A null/zero-length key, a batch of size zero, or a write issued
    /// against a read-only transaction.
    InvalidArg,
    /// The backend allocator could not satisfy a request.
    OutOfMemory,
    /// Insert found the key already present in the main tree.
    KeyExists,
    /// The requested key is absent from the main tree.
    NotFound,
    /// The environment's map size is exhausted.
    MapFull,
    /// The write transaction's dirty-page budget is exhausted.
    TxnFull,
    /// A secondary-index precondition failed (unique conflict, or a
    /// non-sparse extractor returned "absent").
    IndexError,
    /// A user-supplied comparator, merge function or extractor returned
    /// an application-level failure.
    Callback,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::InvalidArg => "invalid argument",
            Self::OutOfMemory => "out of memory",
            Self::KeyExists => "key already exists",
            Self::NotFound => "not found",
            Self::MapFull => "map full",
            Self::TxnFull => "transaction full",
            Self::IndexError => "index error",
            Self::Callback => "callback error",
        }
    }
}

/// The error carrier returned by every fallible `ixtree` operation.
///
/// Mirrors the "code + library + message" shape `spec.md` assumes is
/// available externally: `kind` is the code, `library` names the
/// subsystem that raised it (`"db"`, `"tree"`, `"index"`, `"txn"`,
/// `"cursor"`, `"backend"`), and `message` is a human-readable string
/// meant for logs, never for control flow.
#[derive(Debug, Clone, Error)]
#[error("[{library}] {kind_str}: {message}", kind_str = kind.as_str())]
pub struct Error {
    kind: ErrorKind,
    library: &'static str,
    message: String,
}

impl Error {
    /// Creates a new error tagged with the subsystem that raised it.
    pub fn new<T: Into<String>>(kind: ErrorKind, library: &'static str, message: T) -> Self {
        Self {
            kind,
            library,
            message: message.into(),
        }
    }

    /// The classified outcome.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The subsystem that raised the error.
    pub fn library(&self) -> &'static str {
        self.library
    }

    /// `true` for `MapFull` and `TxnFull`: the caller should abort,
    /// correct the condition, and retry rather than treat this as fatal.
    pub fn recoverable(&self) -> bool {
        matches!(self.kind, ErrorKind::MapFull | ErrorKind::TxnFull)
    }

    pub(crate) fn invalid_arg<T: Into<String>>(library: &'static str, message: T) -> Self {
        Self::new(ErrorKind::InvalidArg, library, message)
    }

    pub(crate) fn not_found<T: Into<String>>(library: &'static str, message: T) -> Self {
        Self::new(ErrorKind::NotFound, library, message)
    }

    pub(crate) fn key_exists<T: Into<String>>(library: &'static str, message: T) -> Self {
        Self::new(ErrorKind::KeyExists, library, message)
    }

    pub(crate) fn index_error<T: Into<String>>(library: &'static str, message: T) -> Self {
        Self::new(ErrorKind::IndexError, library, message)
    }

    pub(crate) fn callback<T: Into<String>>(library: &'static str, message: T) -> Self {
        Self::new(ErrorKind::Callback, library, message)
    }

    pub(crate) fn generic<T: Into<String>>(library: &'static str, message: T) -> Self {
        Self::new(ErrorKind::Generic, library, message)
    }

    /// Translates a `heed`/LMDB-level error into the taxonomy above.
    ///
    /// `library` should name the subsystem issuing the backend call so
    /// the message stays attributable (`"tree"`, `"index"`, `"cursor"`...).
    pub(crate) fn from_heed(library: &'static str, err: heed::Error) -> Self {
        use heed::Error as HeedError;
        use heed::MdbError;

        let kind = match &err {
            HeedError::Mdb(MdbError::KeyExist) => ErrorKind::KeyExists,
            HeedError::Mdb(MdbError::NotFound) => ErrorKind::NotFound,
            HeedError::Mdb(MdbError::MapFull) => ErrorKind::MapFull,
            HeedError::Mdb(MdbError::TxnFull) => ErrorKind::TxnFull,
            HeedError::Mdb(MdbError::Invalid) => ErrorKind::InvalidArg,
            HeedError::Io(io_err) if io_err.kind() == std::io::ErrorKind::OutOfMemory => {
                ErrorKind::OutOfMemory
            }
            _ => ErrorKind::Generic,
        };
        Self::new(kind, library, err.to_string())
    }
}
