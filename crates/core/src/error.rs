//! Error types for the MVCC store
//!
//! One error enum is shared by every layer. Conflict variants carry what the
//! caller (or its coordination layer) needs to retry or resolve; storage I/O
//! errors are wrapped unmodified.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

use crate::key::Key;
use crate::limits::LimitError;
use crate::stats::MvccStats;
use crate::timestamp::Timestamp;
use crate::txn::TxnMeta;

/// Result type alias for MVCC operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the MVCC store
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the storage backend
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Invalid argument supplied by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Key or value size limit exceeded
    #[error("Limit exceeded: {0}")]
    Limit(#[from] LimitError),

    /// A committed version at or above the write timestamp already exists
    #[error("write too old for key {key}: existing version at {existing}, write at {requested}")]
    WriteTooOld {
        /// Key being written
        key: Key,
        /// Timestamp of the newest committed version
        existing: Timestamp,
        /// Timestamp of the rejected write
        requested: Timestamp,
    },

    /// ConditionalPut's expected value did not match
    #[error("condition failed for key {key}: actual value {actual:?}")]
    ConditionFailed {
        /// Key being written
        key: Key,
        /// Value observed at the write timestamp (`None` if absent)
        actual: Option<Vec<u8>>,
    },

    /// A foreign, unresolved intent blocks the operation
    #[error("conflicting intent on key {key}: {txn}")]
    WriteIntentConflict {
        /// Key holding the intent
        key: Key,
        /// Transaction owning the intent
        txn: TxnMeta,
    },

    /// InitPut's existence/equality precondition was violated
    #[error("init put failed for key {key}: existing value {actual:?}")]
    InitPutFailed {
        /// Key being written
        key: Key,
        /// Existing value (`None` for a tombstone)
        actual: Option<Vec<u8>>,
    },

    /// Incremental stats diverged from a full recomputation
    ///
    /// Fatal: signals corruption and is never repaired automatically.
    #[error("stats inconsistency: recorded {recorded:?}, computed {computed:?}")]
    StatsInconsistency {
        /// Incrementally maintained stats
        recorded: Box<MvccStats>,
        /// Stats recomputed by full scan
        computed: Box<MvccStats>,
    },

    /// Latch on a key could not be acquired in time
    #[error("timed out waiting for latch on key {key}")]
    LatchTimeout {
        /// Key whose latch was contended
        key: Key,
    },

    /// The storage engine has been closed
    #[error("storage engine is closed")]
    Closed,

    /// A fault injected by a test crash point
    #[error("injected fault: {0}")]
    InjectedFault(String),
}

impl Error {
    /// True for the conflict family a caller may retry after resolution
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::WriteTooOld { .. } | Error::WriteIntentConflict { .. } | Error::LatchTimeout { .. }
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
