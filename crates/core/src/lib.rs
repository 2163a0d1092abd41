//! Core types for Strata MVCC
//!
//! This crate defines the foundational types used throughout the system:
//! - Key: opaque, byte-ordered logical key
//! - Timestamp: hybrid-logical (wall + logical) version timestamp
//! - TxnMeta: transaction reference carried by intents
//! - MvccStats: aggregate byte/key counters of a key range
//! - Limits: key and value size limits
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod key;
pub mod limits;
pub mod stats;
pub mod timestamp;
pub mod txn;

pub use error::{Error, Result};
pub use key::Key;
pub use limits::{LimitError, Limits};
pub use stats::MvccStats;
pub use timestamp::Timestamp;
pub use txn::{Intent, TxnId, TxnMeta, TxnStatus};
