//! Storage layer for Strata MVCC
//!
//! This crate implements the ordered byte-keyed store the MVCC layer runs on:
//! - Engine: closed set of backends {in-memory, persistent}
//! - Snapshot: copy-on-write point-in-time view of the keyspace
//! - WriteBatch: atomic mutation batch, optionally indexed for read-your-writes
//! - Batch representation: serialized form of a batch, the unit of replay
//! - Wal: append-only, checksummed batch log behind the persistent engine
//! - MergeOperator: engine-level merge hook

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod config;
pub mod engine;
pub mod merge;
pub mod reader;
pub mod snapshot;
pub mod testing;
pub mod wal;

pub use batch::repr::ReprError;
pub use batch::{BatchOp, BatchView, WriteBatch};
pub use config::{EngineKind, StorageConfig};
pub use engine::Engine;
pub use merge::MergeOperator;
pub use reader::{Direction, KvPair, Reader, ScanIter};
pub use snapshot::Snapshot;
