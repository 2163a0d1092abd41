//! Shared test utilities for the integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use strata_mvcc::{MvccConfig, MvccStore, MvccValue, Timestamp};
use tempfile::TempDir;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness once per binary.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Wall-clock-only timestamp.
pub fn ts(wall: u64) -> Timestamp {
    Timestamp::from_wall(wall)
}

/// Fresh in-memory store.
pub fn memory_store() -> MvccStore {
    init_tracing();
    MvccStore::open(MvccConfig::in_memory()).unwrap()
}

/// Fresh in-memory store shared across threads.
pub fn shared_store() -> Arc<MvccStore> {
    Arc::new(memory_store())
}

/// Value bytes of a read result.
pub fn value_of(read: Option<MvccValue>) -> Option<Vec<u8>> {
    read.map(|v| v.value)
}

// ============================================================================
// TestStore - persistent store in a temp directory
// ============================================================================

/// Persistent store whose directory outlives reopen.
pub struct TestStore {
    pub store: MvccStore,
    pub dir: TempDir,
}

impl TestStore {
    pub fn new() -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let store = MvccStore::open(MvccConfig::persistent(dir.path())).unwrap();
        TestStore { store, dir }
    }

    /// Close and reopen on the same directory.
    pub fn reopen(self) -> Self {
        let TestStore { store, dir } = self;
        store.close().unwrap();
        drop(store);
        let store = MvccStore::open(MvccConfig::persistent(dir.path())).unwrap();
        TestStore { store, dir }
    }
}
