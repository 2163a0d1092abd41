//! MVCC layer for Strata
//!
//! This crate implements multi-version concurrency control over the ordered
//! byte store of `strata-storage`:
//! - keys: logical key + timestamp codec, newest version first
//! - reader: Get/Scan/ReverseScan with intent handling and merge reduction
//! - writer: Put, BlindPut, ConditionalPut, InitPut, Delete, Merge and intent
//!   resolution on `MvccBatch`
//! - merge: counter and time-series merge reducer
//! - gc: version garbage collection below a threshold
//! - stats: incremental range stats and their full-scan recomputation
//! - split: balanced split key search
//! - store: `MvccStore`, the facade owning engine, latches and config

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod config;
pub mod gc;
pub mod gc_task;
pub mod keys;
pub mod latch;
pub mod merge;
pub mod payload;
pub mod reader;
pub mod split;
pub mod stats;
pub mod store;
mod writer;

pub use batch::MvccBatch;
pub use config::{ConfigError, MvccConfig};
pub use gc::{CancelSignal, GcOutcome};
pub use gc_task::GcTask;
pub use latch::{LatchGuard, LatchManager};
pub use merge::{MergeValue, MvccMergeOperator, Sample};
pub use payload::{IntentMeta, VersionPayload};
pub use reader::{GetOptions, KeyRead, MvccScanner, MvccValue, ScanOptions, ScanResult};
pub use stats::compute_stats;
pub use split::find_split_key;
pub use store::MvccStore;
