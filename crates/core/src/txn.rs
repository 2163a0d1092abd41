//! Transaction references
//!
//! The MVCC layer never owns transactions. An intent records only the
//! identity, epoch and provisional timestamp of its writer (`TxnMeta`); the
//! coordination layer looks transactions up by id when it needs more.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::key::Key;
use crate::timestamp::Timestamp;

/// Unique transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(Uuid);

impl TxnId {
    /// Generate a random transaction id
    pub fn new() -> Self {
        TxnId(Uuid::new_v4())
    }

    /// Build an id from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        TxnId(Uuid::from_bytes(bytes))
    }

    /// Raw id bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a transaction: identity, epoch and write timestamp
///
/// Readers use it to decide whether an intent is their own (same id and
/// epoch) or a conflict. The epoch is bumped by the coordinator each time a
/// transaction restarts; intents from earlier epochs are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnMeta {
    /// Transaction identity
    pub id: TxnId,
    /// Restart counter
    pub epoch: u32,
    /// Provisional commit timestamp used for the transaction's writes
    pub write_timestamp: Timestamp,
}

impl TxnMeta {
    /// Create a new transaction reference at epoch zero
    pub fn new(write_timestamp: Timestamp) -> Self {
        TxnMeta {
            id: TxnId::new(),
            epoch: 0,
            write_timestamp,
        }
    }

    /// Same transaction, restarted at a later epoch and timestamp
    pub fn restart(&self, write_timestamp: Timestamp) -> Self {
        TxnMeta {
            id: self.id,
            epoch: self.epoch + 1,
            write_timestamp,
        }
    }

    /// Same transaction and epoch, pushed to a new write timestamp
    pub fn with_write_timestamp(&self, write_timestamp: Timestamp) -> Self {
        TxnMeta {
            write_timestamp,
            ..*self
        }
    }

    /// True when `other` refers to the same transaction, regardless of epoch
    #[inline]
    pub fn same_txn(&self, other: &TxnMeta) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for TxnMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "txn {} (epoch {}, ts {})",
            self.id, self.epoch, self.write_timestamp
        )
    }
}

/// An unresolved intent observed by a reader or writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    /// Logical key holding the intent
    pub key: Key,
    /// Owning transaction
    pub txn: TxnMeta,
}

/// Outcome signalled by the coordinator when resolving an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    /// Transaction committed; the provisional value becomes a committed version
    Committed {
        /// Final commit timestamp (may be above the provisional timestamp)
        commit_timestamp: Timestamp,
    },
    /// Transaction aborted; the provisional value is discarded
    Aborted,
}
