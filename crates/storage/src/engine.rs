//! Engine: the ordered byte store the MVCC layer runs on
//!
//! This module implements the consumed storage capability using:
//! - `BTreeMap<Vec<u8>, Vec<u8>>` behind an `Arc` for copy-on-write snapshots
//! - `parking_lot::RwLock` guarding the current map
//! - a commit `Mutex` serializing resolve → log → apply
//! - an optional append-only batch log (`Wal`) for the persistent variant
//!
//! # Commit Protocol
//!
//! 1. Under the commit lock, take the current snapshot.
//! 2. Resolve the batch against it: merges are folded through the merge
//!    operator. Any error here leaves the store untouched.
//! 3. Persistent engines append the resolved batch to the log. This is the
//!    durability point.
//! 4. Swap the resolved records into the map. This step cannot fail.
//!
//! Readers holding an older snapshot keep seeing it; `Arc::make_mut` copies
//! the map only while such a snapshot is alive.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use strata_core::{Error, Result};

use crate::batch::{repr, BatchIndex, BatchOp, BatchView, ResolvedBatch, WriteBatch};
use crate::config::{EngineKind, StorageConfig};
use crate::merge::MergeOperator;
use crate::reader::{Direction, Reader, ScanIter};
use crate::snapshot::{KvMap, Snapshot};
use crate::testing::CrashPoint;
use crate::wal::Wal;

/// State owned by the committer
struct CommitState {
    /// Batch log, for persistent engines
    wal: Option<Wal>,
    /// Armed crash point, fires once
    crash_point: Option<CrashPoint>,
    /// Batches committed since open
    commits: u64,
}

/// Ordered byte-keyed store with atomic batches
///
/// Thread-safe: reads take a snapshot under a short read lock; commits are
/// serialized by the commit lock.
pub struct Engine {
    /// Current map; replaced copy-on-write by commits
    data: RwLock<Arc<KvMap>>,
    /// Serializes commits and owns the log
    commit: Mutex<CommitState>,
    /// Backend variant
    kind: EngineKind,
    /// Engine-level merge hook
    merge_operator: Option<Arc<dyn MergeOperator>>,
    /// Set by `close()` or a crash point that kills the engine
    closed: AtomicBool,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("kind", &self.kind)
            .field(
                "merge_operator",
                &self.merge_operator.as_ref().map(|m| m.name().to_string()),
            )
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl Engine {
    /// Open the engine selected by `config`
    ///
    /// Persistent engines replay their batch log; a torn tail is truncated.
    pub fn open(
        config: &StorageConfig,
        merge_operator: Option<Arc<dyn MergeOperator>>,
    ) -> Result<Self> {
        let (map, wal) = match &config.engine {
            EngineKind::InMemory => (KvMap::new(), None),
            EngineKind::Persistent { dir } => {
                let (wal, replay) = Wal::open(dir, config.sync_writes)?;
                let mut map = KvMap::new();
                for record in &replay.records {
                    replay_record(&mut map, record)?;
                }
                info!(
                    target: "strata::storage",
                    dir = %dir.display(),
                    batches = replay.records.len(),
                    keys = map.len(),
                    truncated_bytes = replay.truncated_bytes,
                    "Opened persistent engine"
                );
                (map, Some(wal))
            }
        };

        Ok(Engine {
            data: RwLock::new(Arc::new(map)),
            commit: Mutex::new(CommitState {
                wal,
                crash_point: None,
                commits: 0,
            }),
            kind: config.engine.clone(),
            merge_operator,
            closed: AtomicBool::new(false),
        })
    }

    /// Create an empty in-memory engine
    pub fn in_memory(merge_operator: Option<Arc<dyn MergeOperator>>) -> Self {
        Engine {
            data: RwLock::new(Arc::new(KvMap::new())),
            commit: Mutex::new(CommitState {
                wal: None,
                crash_point: None,
                commits: 0,
            }),
            kind: EngineKind::InMemory,
            merge_operator,
            closed: AtomicBool::new(false),
        }
    }

    /// Backend variant
    pub fn kind(&self) -> &EngineKind {
        &self.kind
    }

    /// The configured merge operator
    pub fn merge_operator(&self) -> Option<&dyn MergeOperator> {
        self.merge_operator.as_deref()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Point-in-time view of the whole keyspace
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.check_open()?;
        Ok(self.current())
    }

    /// Point lookup against the current state
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.snapshot()?.get(key)
    }

    /// Lazily iterate `[start, end)` of the current state
    pub fn iter(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        direction: Direction,
    ) -> Result<ScanIter<Snapshot>> {
        Ok(ScanIter::new(self.snapshot()?, start, end, direction))
    }

    /// Read view of an indexed batch over the current state
    pub fn view<'a>(&'a self, batch: &'a WriteBatch) -> Result<BatchView<'a>> {
        let index = batch.index().ok_or_else(|| {
            Error::InvalidOperation("reads require an indexed batch".to_string())
        })?;
        Ok(BatchView::new(
            self.snapshot()?,
            index,
            self.merge_operator(),
        ))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Create an unindexed batch
    pub fn new_batch(&self) -> WriteBatch {
        WriteBatch::new()
    }

    /// Create an indexed batch
    pub fn new_indexed_batch(&self) -> WriteBatch {
        WriteBatch::indexed()
    }

    /// Commit a batch atomically
    pub fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut state = self.commit.lock();
        self.check_open()?;
        let snapshot = self.current();
        let (ops, index) = batch.into_parts();
        let resolved = match index {
            Some(index) => index.resolve(&snapshot, self.merge_operator())?,
            None => {
                let mut index = BatchIndex::default();
                for op in &ops {
                    index.apply(op);
                }
                index.resolve(&snapshot, self.merge_operator())?
            }
        };
        self.write_resolved(&mut state, resolved)
    }

    /// Decode a batch representation and apply it atomically
    ///
    /// - `indexed`: build the batch index while decoding
    /// - `sequential`: require strictly ascending keys and apply without an
    ///   index; takes precedence over `indexed`
    ///
    /// The whole representation is decoded and validated before anything is
    /// applied. Returns the number of records applied.
    pub fn apply_batch_repr(&self, bytes: &[u8], indexed: bool, sequential: bool) -> Result<usize> {
        let ops = repr::decode(bytes)?;
        let count = ops.len();

        if sequential {
            repr::check_ascending(&ops)?;
            let mut state = self.commit.lock();
            self.check_open()?;
            let snapshot = self.current();
            let resolved = ResolvedBatch::sequential(ops, &snapshot, self.merge_operator())?;
            self.write_resolved(&mut state, resolved)?;
        } else {
            let mut batch = if indexed {
                WriteBatch::indexed()
            } else {
                WriteBatch::new()
            };
            for op in ops {
                batch.push(op);
            }
            self.commit(batch)?;
        }

        debug!(
            target: "strata::storage",
            records = count,
            indexed,
            sequential,
            "Applied batch repr"
        );
        Ok(count)
    }

    fn write_resolved(&self, state: &mut CommitState, resolved: ResolvedBatch) -> Result<()> {
        if resolved.len() == 0 {
            return Ok(());
        }

        self.fire(state, CrashPoint::BeforeLogAppend)?;
        if let Some(wal) = state.wal.as_mut() {
            wal.append(&repr::encode(&resolved.to_ops()))?;
        }
        self.fire(state, CrashPoint::AfterLogAppend)?;

        let mut data = self.data.write();
        resolved.apply_to(Arc::make_mut(&mut data));
        state.commits += 1;
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flush the log (persistent engines)
    pub fn sync(&self) -> Result<()> {
        let mut state = self.commit.lock();
        if let Some(wal) = state.wal.as_mut() {
            wal.sync()?;
        }
        Ok(())
    }

    /// Close the engine; later operations fail with `Error::Closed`
    ///
    /// Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut state = self.commit.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(wal) = state.wal.as_mut() {
            wal.sync()?;
        }
        debug!(target: "strata::storage", commits = state.commits, "Closed engine");
        Ok(())
    }

    /// True once closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Arm a one-shot crash point on the commit path
    pub fn arm_crash_point(&self, point: CrashPoint) {
        self.commit.lock().crash_point = Some(point);
    }

    fn fire(&self, state: &mut CommitState, point: CrashPoint) -> Result<()> {
        if state.crash_point != Some(point) {
            return Ok(());
        }
        state.crash_point = None;
        if point.closes_engine() {
            self.closed.store(true, Ordering::Release);
        }
        warn!(target: "strata::storage", ?point, "Injected crash fired");
        Err(Error::InjectedFault(point.description().to_string()))
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn current(&self) -> Snapshot {
        Snapshot::new(Arc::clone(&self.data.read()))
    }
}

/// Apply one logged batch in record order
fn replay_record(map: &mut KvMap, record: &[u8]) -> Result<()> {
    for op in repr::decode(record)? {
        match op {
            BatchOp::Set { key, value } => {
                map.insert(key, value);
            }
            BatchOp::Delete { key } => {
                map.remove(&key);
            }
            BatchOp::RangeDelete { start, end } => {
                let tail: BTreeMap<Vec<u8>, Vec<u8>> = map.split_off(&start);
                map.extend(
                    tail.into_iter()
                        .filter(|(k, _)| k.as_slice() >= end.as_slice()),
                );
            }
            BatchOp::Merge { .. } => {
                return Err(Error::Corruption(
                    "unresolved merge record in batch log".to_string(),
                ));
            }
        }
    }
    Ok(())
}
