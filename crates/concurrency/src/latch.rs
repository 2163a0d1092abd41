//! Per-key latches
//!
//! A latch gives one MVCC batch exclusive use of a logical key from its first
//! read until commit, which makes read-check-write sequences (conditional
//! puts, intent resolution, GC) atomic and keeps the incremental stats delta
//! exact. Latches are held in memory only and never outlive the process.
//!
//! Waiting is bounded: a latch that cannot be acquired within the configured
//! timeout fails with `LatchTimeout`. This also breaks cycles between batches
//! that extend their latch sets incrementally.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashSet;
use tracing::debug;

use strata_core::{Error, Key, Result};

/// Table of latched logical keys
#[derive(Debug)]
pub struct LatchManager {
    held: Mutex<FxHashSet<Vec<u8>>>,
    released: Condvar,
    timeout: Duration,
}

impl LatchManager {
    /// Create a manager whose acquisitions wait at most `timeout`
    pub fn new(timeout: Duration) -> Self {
        LatchManager {
            held: Mutex::new(FxHashSet::default()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Acquire all of `keys` atomically
    ///
    /// Either every key is latched or none is.
    pub fn acquire<I, K>(&self, keys: I) -> Result<LatchGuard<'_>>
    where
        I: IntoIterator<Item = K>,
        K: Into<Vec<u8>>,
    {
        let mut guard = self.guard();
        guard.extend(keys)?;
        Ok(guard)
    }

    /// An empty guard to be extended later
    pub fn guard(&self) -> LatchGuard<'_> {
        LatchGuard {
            manager: self,
            keys: Vec::new(),
        }
    }

    /// Number of latched keys
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }

    fn lock_all(&self, keys: &[Vec<u8>]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let deadline = Instant::now() + self.timeout;
        let mut held = self.held.lock();
        loop {
            let Some(busy) = keys.iter().find(|k| held.contains(k.as_slice())) else {
                held.extend(keys.iter().cloned());
                return Ok(());
            };
            if self.released.wait_until(&mut held, deadline).timed_out()
                && held.contains(busy.as_slice())
            {
                debug!(target: "strata::latch", key = %Key::from(busy.as_slice()), "Latch wait timed out");
                return Err(Error::LatchTimeout {
                    key: Key::from(busy.as_slice()),
                });
            }
        }
    }

    fn unlock_all(&self, keys: &[Vec<u8>]) {
        if keys.is_empty() {
            return;
        }
        let mut held = self.held.lock();
        for key in keys {
            held.remove(key);
        }
        drop(held);
        self.released.notify_all();
    }
}

/// Latches held by one batch; released on drop
#[derive(Debug)]
pub struct LatchGuard<'a> {
    manager: &'a LatchManager,
    keys: Vec<Vec<u8>>,
}

impl LatchGuard<'_> {
    /// Latch additional keys; keys this guard already holds are skipped
    pub fn extend<I, K>(&mut self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = K>,
        K: Into<Vec<u8>>,
    {
        let mut wanted: Vec<Vec<u8>> = keys
            .into_iter()
            .map(Into::into)
            .filter(|k| !self.keys.contains(k))
            .collect();
        wanted.sort();
        wanted.dedup();
        self.manager.lock_all(&wanted)?;
        self.keys.extend(wanted);
        Ok(())
    }

    /// True when this guard holds `key`
    pub fn holds(&self, key: &[u8]) -> bool {
        self.keys.iter().any(|k| k.as_slice() == key)
    }

    /// Latched keys
    pub fn keys(&self) -> &[Vec<u8>] {
        &self.keys
    }
}

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.manager.unlock_all(&self.keys);
    }
}
