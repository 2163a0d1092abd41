//! MVCC Integration Tests
//!
//! End-to-end behaviour of `MvccStore`: acceptance scenarios, intents,
//! merges, the stats invariant, GC and persistence.

#[path = "../common/mod.rs"]
mod common;

mod gc;
mod intents;
mod invariants;
mod persistence;
mod scenarios;
