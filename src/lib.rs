//! Strata MVCC - multi-version concurrency control over an ordered byte store
//!
//! Every logical key holds a history of timestamped versions plus at most one
//! provisional write (an intent) owned by a transaction. Reads at a timestamp
//! see the newest committed version at or below it.
//!
//! # Quick Start
//!
//! ```ignore
//! use strata_mvcc::{MvccConfig, MvccStore, Timestamp};
//!
//! let store = MvccStore::open(MvccConfig::in_memory())?;
//! store.put(b"a", b"v1", Timestamp::from_wall(10), None)?;
//! store.put(b"a", b"v2", Timestamp::from_wall(20), None)?;
//!
//! let v = store.get(b"a", Timestamp::from_wall(15), None)?.unwrap();
//! assert_eq!(v.value, b"v1");
//! ```
//!
//! # Architecture
//!
//! - `strata-core`: keys, timestamps, transaction metadata, stats, errors
//! - `strata-storage`: the ordered byte engine with atomic batches and the
//!   batch representation codec
//! - `strata-concurrency`: the MVCC layer itself

pub use strata_concurrency::*;
pub use strata_core::{
    Error, Intent, Key, LimitError, Limits, MvccStats, Result, Timestamp, TxnId, TxnMeta,
    TxnStatus,
};
pub use strata_storage::{EngineKind, StorageConfig};
