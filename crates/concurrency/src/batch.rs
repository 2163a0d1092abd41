//! MVCC batch
//!
//! `MvccBatch` is the unit of atomic multi-key MVCC mutation. It wraps an
//! indexed engine batch, so reads through it see its own pending writes, and
//! carries:
//!
//! - the latches of every logical key it has written or read for a check
//! - the exact stats delta of its staged writes, merged into the range stats
//!   record when the batch is sealed
//!
//! Every write goes through `stage`, which measures the written key before
//! and after the change. Stats therefore stay exact for any combination of
//! writes, blind or not, within one batch.

use strata_core::{Error, Limits, MvccStats, Result, Timestamp};
use strata_storage::{BatchView, Reader, WriteBatch};

use crate::keys::{meta_key, STATS_KEY};
use crate::latch::LatchGuard;
use crate::reader::{read_key, scan, GetOptions, KeyRead, ScanOptions, ScanResult};
use crate::stats::{record_stats, HeadSummary};
use crate::store::MvccStore;

/// One physical mutation of a logical key
#[derive(Debug, Clone)]
pub(crate) enum Staged {
    Set(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
    Merge(Vec<u8>, Vec<u8>),
}

impl Staged {
    fn physical_key(&self) -> &[u8] {
        match self {
            Staged::Set(k, _) | Staged::Delete(k) | Staged::Merge(k, _) => k,
        }
    }
}

/// Atomic batch of MVCC writes
///
/// Created by `MvccStore::batch`. Nothing is visible to other readers until
/// `commit`. Dropping the batch discards it and releases its latches.
pub struct MvccBatch<'s> {
    store: &'s MvccStore,
    batch: WriteBatch,
    latches: LatchGuard<'s>,
    delta: MvccStats,
    poisoned: bool,
}

impl<'s> MvccBatch<'s> {
    pub(crate) fn new(store: &'s MvccStore) -> Self {
        MvccBatch {
            store,
            batch: store.engine().new_indexed_batch(),
            latches: store.latches().guard(),
            delta: MvccStats::zero(),
            poisoned: false,
        }
    }

    /// Point read through the batch, seeing its pending writes
    pub fn get(&self, key: &[u8], read_ts: Timestamp, opts: &GetOptions) -> Result<KeyRead> {
        read_key(&self.view()?, key, read_ts, opts)
    }

    /// Range read through the batch, seeing its pending writes
    pub fn scan(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        read_ts: Timestamp,
        opts: &ScanOptions,
    ) -> Result<ScanResult> {
        scan(self.view()?, start, end, read_ts, opts)
    }

    /// Stats change the batch will apply on commit
    pub fn stats_delta(&self) -> MvccStats {
        self.delta
    }

    /// Number of staged engine records
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// True when nothing has been staged
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Apply the batch atomically, then release its latches
    pub fn commit(mut self) -> Result<()> {
        self.seal()?;
        let MvccBatch {
            store,
            batch,
            latches,
            ..
        } = self;
        let result = store.engine().commit(batch);
        drop(latches);
        result
    }

    /// Serialize the batch, stats record update included, without applying it
    ///
    /// The representation can be applied later with `apply_batch_repr`.
    /// Latches are released on return, so the caller is responsible for the
    /// keys not changing in between.
    pub fn into_repr(mut self) -> Result<Vec<u8>> {
        self.seal()?;
        Ok(self.batch.to_repr())
    }

    fn seal(&mut self) -> Result<()> {
        if self.poisoned {
            return Err(Error::InvalidOperation(
                "batch is unusable after a failed write".to_string(),
            ));
        }
        if !self.delta.is_zero() {
            self.batch.merge(STATS_KEY.to_vec(), self.delta.encode()?);
            self.delta = MvccStats::zero();
        }
        Ok(())
    }

    pub(crate) fn limits(&self) -> &Limits {
        &self.store.config().limits
    }

    pub(crate) fn latch(&mut self, key: &[u8]) -> Result<()> {
        self.latches.extend([key])
    }

    pub(crate) fn latch_all<'k>(&mut self, keys: impl IntoIterator<Item = &'k [u8]>) -> Result<()> {
        self.latches.extend(keys)
    }

    pub(crate) fn view(&self) -> Result<BatchView<'_>> {
        self.store.engine().view(&self.batch)
    }

    /// Stage `ops`, all records of the logical `key`, and account for them
    ///
    /// `key` must be latched. A failure after the ops reached the engine batch
    /// poisons the batch.
    pub(crate) fn stage(&mut self, key: &[u8], ops: Vec<Staged>) -> Result<()> {
        if self.poisoned {
            return Err(Error::InvalidOperation(
                "batch is unusable after a failed write".to_string(),
            ));
        }
        debug_assert!(self.latches.holds(key));

        let mut touched: Vec<Vec<u8>> = ops.iter().map(|op| op.physical_key().to_vec()).collect();
        touched.sort();
        touched.dedup();

        let before = self.measure(key, &touched)?;
        self.poisoned = true;
        for op in ops {
            match op {
                Staged::Set(k, v) => self.batch.set(k, v),
                Staged::Delete(k) => self.batch.delete(k),
                Staged::Merge(k, v) => self.batch.merge(k, v),
            }
        }
        let after = self.measure(key, &touched)?;
        self.poisoned = false;

        self.delta += after - before;
        Ok(())
    }

    /// Stats of `key`'s head plus the records at `touched`
    fn measure(&self, key: &[u8], touched: &[Vec<u8>]) -> Result<MvccStats> {
        let view = self.view()?;
        let meta = meta_key(key);
        let mut stats = HeadSummary::read(&view, key)?.head_stats();
        for physical in touched {
            if let Some(value) = view.get(physical)? {
                stats += record_stats(physical, &value, *physical == meta);
            }
        }
        Ok(stats)
    }
}

impl std::fmt::Debug for MvccBatch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MvccBatch")
            .field("records", &self.batch.len())
            .field("latched_keys", &self.latches.keys().len())
            .field("delta", &self.delta)
            .finish()
    }
}
