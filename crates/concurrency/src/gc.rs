//! Garbage collector
//!
//! Removes versions no read at or above the GC threshold can observe. Per
//! logical key, walking versions newest to oldest:
//!
//! - versions above the threshold are kept
//! - the frontier (the first committed version at or below the threshold) is
//!   kept; a merge-delta frontier also keeps the rest of its chain down to and
//!   including the version that ends it
//! - everything older is removed
//!
//! Intents and provisional versions are never removed.
//!
//! Candidates are found on a snapshot, then collected in batches of whole
//! keys: each batch latches its keys, re-plans them through the batch and
//! commits. A failure or cancellation therefore leaves a clean prefix, and
//! rerunning with the same threshold removes nothing more.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use strata_core::{Key, Result, Timestamp};
use strata_storage::{Direction, Reader, ScanIter};

use crate::batch::{MvccBatch, Staged};
use crate::keys::{self, key_end, version_key};
use crate::payload::{kind_of, PayloadKind};
use crate::reader::{read_intent, MvccScanner, ScanOptions};
use crate::store::MvccStore;

/// Cooperative cancellation flag shared with a running GC pass
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    /// A signal that has not fired
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the pass to stop before its next batch
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// True once `cancel` was called
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Summary of one GC pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcOutcome {
    /// Logical keys examined
    pub keys_scanned: u64,
    /// Version records removed
    pub versions_removed: u64,
    /// Key and value bytes removed
    pub bytes_reclaimed: u64,
    /// True when the pass stopped early on its cancel signal
    pub cancelled: bool,
}

/// Physical keys of `key` that GC at `threshold` removes, with their sizes
pub(crate) fn plan_key<R: Reader>(
    reader: &R,
    key: &[u8],
    threshold: Timestamp,
) -> Result<Vec<(Vec<u8>, u64)>> {
    let provisional = read_intent(reader, key)?.map(|txn| txn.write_timestamp);
    let start = version_key(key, threshold);
    let end = key_end(key);

    let mut removable = Vec::new();
    let mut frontier_seen = false;
    let mut chain_open = false;
    for kv in ScanIter::new(reader, &start, Some(&end), Direction::Forward) {
        let (physical, value) = kv?;
        let ts = keys::decode(&physical)?.timestamp;
        if ts.is_some() && ts == provisional {
            continue;
        }
        if !frontier_seen {
            frontier_seen = true;
            chain_open = kind_of(&value)? == PayloadKind::Merge;
        } else if chain_open {
            chain_open = kind_of(&value)? == PayloadKind::Merge;
        } else {
            let bytes = (physical.len() + value.len()) as u64;
            removable.push((physical, bytes));
        }
    }
    Ok(removable)
}

impl MvccBatch<'_> {
    /// Stage the removal of `key`'s collectible versions
    ///
    /// Returns the number of versions and bytes removed.
    pub(crate) fn collect_key(&mut self, key: &[u8], threshold: Timestamp) -> Result<(u64, u64)> {
        self.latch(key)?;
        let plan = plan_key(&self.view()?, key, threshold)?;
        if plan.is_empty() {
            return Ok((0, 0));
        }
        let versions = plan.len() as u64;
        let bytes = plan.iter().map(|(_, b)| b).sum();
        let ops = plan.into_iter().map(|(physical, _)| Staged::Delete(physical)).collect();
        self.stage(key, ops)?;
        Ok((versions, bytes))
    }
}

/// Collect garbage in the logical range `[start, end)` at `threshold`
pub(crate) fn collect(
    store: &MvccStore,
    start: &[u8],
    end: Option<&[u8]>,
    threshold: Timestamp,
    cancel: &CancelSignal,
) -> Result<GcOutcome> {
    let batch_keys = store.config().gc_batch_keys.max(1);
    let snapshot = store.engine().snapshot()?;
    let mut cursor = MvccScanner::new(&snapshot, start, end, threshold, &ScanOptions::default());

    let mut outcome = GcOutcome::default();
    let mut pending: Vec<Key> = Vec::with_capacity(batch_keys);
    let mut exhausted = false;
    while !exhausted {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }
        match cursor.next_key()? {
            Some(key) => {
                outcome.keys_scanned += 1;
                if !plan_key(&snapshot, &key, threshold)?.is_empty() {
                    pending.push(key);
                }
            }
            None => exhausted = true,
        }
        if pending.len() < batch_keys && !exhausted {
            continue;
        }
        if pending.is_empty() {
            continue;
        }
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }

        let mut batch = store.batch();
        batch.latch_all(pending.iter().map(|k| k.as_bytes()))?;
        let mut removed = 0;
        let mut bytes = 0;
        for key in pending.drain(..) {
            let (v, b) = batch.collect_key(&key, threshold)?;
            removed += v;
            bytes += b;
        }
        batch.commit()?;
        outcome.versions_removed += removed;
        outcome.bytes_reclaimed += bytes;
        debug!(
            target: "strata::gc",
            versions = removed,
            bytes,
            "Committed GC batch"
        );
    }

    info!(
        target: "strata::gc",
        threshold = %threshold,
        keys_scanned = outcome.keys_scanned,
        versions_removed = outcome.versions_removed,
        bytes_reclaimed = outcome.bytes_reclaimed,
        cancelled = outcome.cancelled,
        "GC pass finished"
    );
    Ok(outcome)
}
