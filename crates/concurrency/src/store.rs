//! MVCC store
//!
//! `MvccStore` owns the storage engine, the latch table and the
//! configuration, and exposes every MVCC operation. Single-operation writes
//! each run in their own `MvccBatch`; use `batch()` to group writes
//! atomically.
//!
//! # Example
//!
//! ```ignore
//! let store = MvccStore::open(MvccConfig::in_memory())?;
//! store.put(b"a", b"v1", Timestamp::from_wall(10), None)?;
//! assert!(store.get(b"a", Timestamp::from_wall(5), None)?.is_none());
//! ```

use std::sync::Arc;

use tracing::{error, info, warn};

use strata_core::{Error, Key, MvccStats, Result, Timestamp, TxnMeta, TxnStatus};
use strata_storage::{Engine, Reader, Snapshot};

use crate::batch::MvccBatch;
use crate::config::MvccConfig;
use crate::gc::{self, CancelSignal, GcOutcome};
use crate::keys::STATS_KEY;
use crate::latch::LatchManager;
use crate::merge::{MergeValue, MvccMergeOperator};
use crate::reader::{self, GetOptions, KeyRead, MvccScanner, MvccValue, ScanOptions, ScanResult};
use crate::split;
use crate::stats;

/// Multi-version key-value store
pub struct MvccStore {
    engine: Engine,
    latches: LatchManager,
    config: MvccConfig,
}

impl std::fmt::Debug for MvccStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MvccStore")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish()
    }
}

impl MvccStore {
    /// Open a store with the given configuration
    pub fn open(config: MvccConfig) -> Result<Self> {
        config.validate()?;
        let engine = Engine::open(&config.storage, Some(Arc::new(MvccMergeOperator)))?;
        info!(
            target: "strata::mvcc",
            engine = ?config.storage.engine,
            gc_batch_keys = config.gc_batch_keys,
            latch_timeout_ms = config.latch_timeout_ms,
            "Opened MVCC store"
        );
        Ok(MvccStore {
            engine,
            latches: LatchManager::new(config.latch_timeout()),
            config,
        })
    }

    /// Underlying storage engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Store configuration
    pub fn config(&self) -> &MvccConfig {
        &self.config
    }

    pub(crate) fn latches(&self) -> &LatchManager {
        &self.latches
    }

    /// Start an atomic batch of MVCC writes
    pub fn batch(&self) -> MvccBatch<'_> {
        MvccBatch::new(self)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Visible value of `key` at `read_ts`
    ///
    /// Fails with `WriteIntentConflict` on a foreign intent at or below
    /// `read_ts`.
    pub fn get(&self, key: &[u8], read_ts: Timestamp, txn: Option<&TxnMeta>) -> Result<Option<MvccValue>> {
        let opts = GetOptions {
            txn: txn.copied(),
            inconsistent: false,
        };
        Ok(self.get_with_options(key, read_ts, &opts)?.value)
    }

    /// Point read with full options and result
    pub fn get_with_options(&self, key: &[u8], read_ts: Timestamp, opts: &GetOptions) -> Result<KeyRead> {
        reader::read_key(&self.engine.snapshot()?, key, read_ts, opts)
    }

    /// Visible contents of `[start, end)` at `read_ts`
    pub fn scan(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        read_ts: Timestamp,
        opts: &ScanOptions,
    ) -> Result<ScanResult> {
        reader::scan(self.engine.snapshot()?, start, end, read_ts, opts)
    }

    /// `scan` in descending key order
    pub fn reverse_scan(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        read_ts: Timestamp,
        opts: &ScanOptions,
    ) -> Result<ScanResult> {
        let opts = ScanOptions {
            reverse: true,
            ..opts.clone()
        };
        self.scan(start, end, read_ts, &opts)
    }

    /// Lazy iterator over the visible contents of `[start, end)`
    ///
    /// The iterator reads a snapshot taken now; `max_keys` is ignored.
    pub fn scanner(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        read_ts: Timestamp,
        opts: &ScanOptions,
    ) -> Result<MvccScanner<Snapshot>> {
        Ok(MvccScanner::new(self.engine.snapshot()?, start, end, read_ts, opts))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write `value` at `ts`; see `MvccBatch::put`
    pub fn put(&self, key: &[u8], value: &[u8], ts: Timestamp, txn: Option<&TxnMeta>) -> Result<()> {
        let mut batch = self.batch();
        batch.put(key, value, ts, txn)?;
        batch.commit()
    }

    /// Write without conflict checks; see `MvccBatch::blind_put`
    pub fn blind_put(&self, key: &[u8], value: &[u8], ts: Timestamp, txn: Option<&TxnMeta>) -> Result<()> {
        let mut batch = self.batch();
        batch.blind_put(key, value, ts, txn)?;
        batch.commit()
    }

    /// Compare-and-set; see `MvccBatch::conditional_put`
    pub fn conditional_put(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        value: &[u8],
        ts: Timestamp,
        txn: Option<&TxnMeta>,
    ) -> Result<()> {
        let mut batch = self.batch();
        batch.conditional_put(key, expected, value, ts, txn)?;
        batch.commit()
    }

    /// Compare-and-set writing blindly; see `MvccBatch::blind_conditional_put`
    pub fn blind_conditional_put(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        value: &[u8],
        ts: Timestamp,
        txn: Option<&TxnMeta>,
    ) -> Result<()> {
        let mut batch = self.batch();
        batch.blind_conditional_put(key, expected, value, ts, txn)?;
        batch.commit()
    }

    /// Write-if-absent; see `MvccBatch::init_put`
    pub fn init_put(
        &self,
        key: &[u8],
        value: &[u8],
        fail_on_tombstones: bool,
        ts: Timestamp,
        txn: Option<&TxnMeta>,
    ) -> Result<()> {
        let mut batch = self.batch();
        batch.init_put(key, value, fail_on_tombstones, ts, txn)?;
        batch.commit()
    }

    /// Write-if-absent writing blindly; see `MvccBatch::blind_init_put`
    pub fn blind_init_put(
        &self,
        key: &[u8],
        value: &[u8],
        fail_on_tombstones: bool,
        ts: Timestamp,
        txn: Option<&TxnMeta>,
    ) -> Result<()> {
        let mut batch = self.batch();
        batch.blind_init_put(key, value, fail_on_tombstones, ts, txn)?;
        batch.commit()
    }

    /// Write a tombstone at `ts`; see `MvccBatch::delete`
    pub fn delete(&self, key: &[u8], ts: Timestamp, txn: Option<&TxnMeta>) -> Result<()> {
        let mut batch = self.batch();
        batch.delete(key, ts, txn)?;
        batch.commit()
    }

    /// Append a merge delta; see `MvccBatch::merge`
    pub fn merge(&self, key: &[u8], delta: &MergeValue, ts: Timestamp) -> Result<()> {
        let mut batch = self.batch();
        batch.merge(key, delta, ts)?;
        batch.commit()
    }

    /// Commit or abort the intent of `txn` on `key`
    ///
    /// Returns `false` when the key holds no intent of `txn`.
    pub fn resolve_intent(&self, key: &[u8], txn: &TxnMeta, status: TxnStatus) -> Result<bool> {
        let mut batch = self.batch();
        let resolved = batch.resolve_intent(key, txn, status)?;
        batch.commit()?;
        Ok(resolved)
    }

    /// Apply a batch representation atomically
    ///
    /// See `Engine::apply_batch_repr`. Representations produced by
    /// `MvccBatch::into_repr` carry their stats update.
    pub fn apply_batch_repr(&self, bytes: &[u8], indexed: bool, sequential: bool) -> Result<usize> {
        self.engine.apply_batch_repr(bytes, indexed, sequential)
    }

    // =========================================================================
    // Stats
    // =========================================================================

    /// Incrementally maintained stats of the whole keyspace
    pub fn stats(&self) -> Result<MvccStats> {
        read_recorded(&self.engine.snapshot()?)
    }

    /// Stats of `[start, end)` recomputed by full scan
    pub fn compute_stats(&self, start: &[u8], end: Option<&[u8]>) -> Result<MvccStats> {
        stats::compute_stats(&self.engine.snapshot()?, start, end)
    }

    /// Check the recorded stats against a full recomputation
    ///
    /// Divergence is fatal and returned as `StatsInconsistency`; it is never
    /// repaired here.
    pub fn verify_stats(&self) -> Result<MvccStats> {
        let snapshot = self.engine.snapshot()?;
        let recorded = read_recorded(&snapshot)?;
        let computed = stats::compute_stats(&snapshot, &[], None)?;
        if recorded != computed {
            error!(
                target: "strata::mvcc",
                ?recorded,
                ?computed,
                "Stats inconsistency"
            );
            return Err(Error::StatsInconsistency {
                recorded: Box::new(recorded),
                computed: Box::new(computed),
            });
        }
        Ok(recorded)
    }

    /// Reset the recorded stats to a full recomputation
    ///
    /// Operator action for recovery after out-of-band mutation. Returns the
    /// correction applied.
    pub fn recompute_stats(&self) -> Result<MvccStats> {
        let snapshot = self.engine.snapshot()?;
        let recorded = read_recorded(&snapshot)?;
        let computed = stats::compute_stats(&snapshot, &[], None)?;
        let correction = computed - recorded;
        if !correction.is_zero() {
            // The merge is relative, so commits racing with the scan keep
            // their own deltas.
            let mut batch = self.engine.new_batch();
            batch.merge(STATS_KEY.to_vec(), correction.encode()?);
            self.engine.commit(batch)?;
            warn!(target: "strata::mvcc", ?correction, "Recomputed stats");
        }
        Ok(correction)
    }

    // =========================================================================
    // Space management
    // =========================================================================

    /// Remove versions unreachable at or above `threshold` in `[start, end)`
    pub fn gc(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        threshold: Timestamp,
        cancel: &CancelSignal,
    ) -> Result<GcOutcome> {
        let result = gc::collect(self, start, end, threshold, cancel);
        if let Err(e) = &result {
            warn!(
                target: "strata::gc",
                error = %e,
                start = %Key::from(start),
                threshold = %threshold,
                "GC pass failed"
            );
        }
        result
    }

    /// Split key for a target weight; see `split::find_split_key`
    pub fn find_split_key(&self, start: &[u8], end: Option<&[u8]>, target_bytes: u64) -> Result<Option<Key>> {
        split::find_split_key(&self.engine.snapshot()?, start, end, target_bytes)
    }

    /// Split key dividing `[start, end)` into two halves by weight
    pub fn find_balanced_split_key(&self, start: &[u8], end: Option<&[u8]>) -> Result<Option<Key>> {
        let snapshot = self.engine.snapshot()?;
        let total = stats::compute_stats(&snapshot, start, end)?.total_bytes();
        split::find_split_key(&snapshot, start, end, (total / 2).max(0) as u64)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the store; later operations fail with `Error::Closed`
    pub fn close(&self) -> Result<()> {
        self.engine.close()
    }
}

fn read_recorded(snapshot: &Snapshot) -> Result<MvccStats> {
    match snapshot.get(STATS_KEY)? {
        Some(bytes) => MvccStats::decode(&bytes),
        None => Ok(MvccStats::zero()),
    }
}
