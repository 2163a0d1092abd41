//! Stats accumulator
//!
//! The range stats record (`STATS_KEY`) is maintained incrementally: every
//! MVCC batch stages its writes, measures the affected logical keys before and
//! after, and merges the difference into the record in the same atomic batch.
//! `compute_stats` is the full-scan recomputation the record must always
//! agree with.
//!
//! Both paths share `HeadSummary`, which condenses the records of one logical
//! key into the quantities the accounting needs (meta, head, merge chain,
//! provisional version). Physical totals come from `record_stats`.

use strata_core::{Key, MvccStats, Result, Timestamp, TxnMeta};
use strata_storage::{Direction, Reader, ScanIter};

use crate::keys::{self, is_local, key_end, meta_key};
use crate::payload::{kind_of, IntentMeta, PayloadKind};

/// Physical contribution of one record
///
/// Every record is garbage until `HeadSummary::head_stats` claims its bytes
/// as live or intent bytes.
pub(crate) fn record_stats(physical_key: &[u8], value: &[u8], is_meta: bool) -> MvccStats {
    let key_bytes = physical_key.len() as i64;
    let val_bytes = value.len() as i64;
    MvccStats {
        key_bytes,
        val_bytes,
        val_count: i64::from(!is_meta),
        gc_bytes: key_bytes + val_bytes,
        ..MvccStats::zero()
    }
}

/// Accounting summary of one logical key
///
/// Built by feeding the key's records in physical order (meta first, then
/// versions newest to oldest). Only the head region matters, so feeding can
/// stop once `complete()` holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct HeadSummary {
    exists: bool,
    meta_bytes: i64,
    intent: Option<TxnMeta>,
    provisional_bytes: i64,
    provisional_settled: bool,
    head: Option<PayloadKind>,
    head_bytes: i64,
    chain_open: bool,
}

impl HeadSummary {
    /// Summarize `key` as seen through `reader`
    pub(crate) fn read<R: Reader>(reader: &R, key: &[u8]) -> Result<HeadSummary> {
        let mut summary = HeadSummary::default();
        let start = meta_key(key);
        let end = key_end(key);
        for kv in ScanIter::new(reader, &start, Some(&end), Direction::Forward) {
            let (physical, value) = kv?;
            let timestamp = if physical == start {
                None
            } else {
                keys::decode(&physical)?.timestamp
            };
            summary.feed(timestamp, (physical.len() + value.len()) as i64, &value)?;
            if summary.complete() {
                break;
            }
        }
        Ok(summary)
    }

    /// Account one record of the key
    pub(crate) fn feed(
        &mut self,
        timestamp: Option<Timestamp>,
        record_bytes: i64,
        value: &[u8],
    ) -> Result<()> {
        self.exists = true;
        let Some(ts) = timestamp else {
            self.meta_bytes = record_bytes;
            self.intent = Some(IntentMeta::decode(value)?.txn);
            return Ok(());
        };

        if let Some(txn) = &self.intent {
            if !self.provisional_settled && ts <= txn.write_timestamp {
                if ts == txn.write_timestamp {
                    self.provisional_bytes = record_bytes;
                }
                self.provisional_settled = true;
            }
        }

        match self.head {
            None => {
                let kind = kind_of(value)?;
                self.head = Some(kind);
                self.head_bytes = record_bytes;
                self.chain_open = kind == PayloadKind::Merge;
            }
            Some(_) if self.chain_open => match kind_of(value)? {
                PayloadKind::Merge => self.head_bytes += record_bytes,
                PayloadKind::Value => {
                    self.head_bytes += record_bytes;
                    self.chain_open = false;
                }
                PayloadKind::Tombstone => self.chain_open = false,
            },
            Some(_) => {}
        }
        Ok(())
    }

    /// True once further records cannot change the summary
    pub(crate) fn complete(&self) -> bool {
        self.head.is_some()
            && !self.chain_open
            && (self.intent.is_none() || self.provisional_settled)
    }

    /// True when the newest version is not a tombstone
    pub(crate) fn is_live(&self) -> bool {
        matches!(self.head, Some(PayloadKind::Value | PayloadKind::Merge))
    }

    /// Non-physical contribution of the key
    ///
    /// Added to the sum of `record_stats` over the key's records this gives
    /// the key's full stats.
    pub(crate) fn head_stats(&self) -> MvccStats {
        let live = self.is_live();
        let live_bytes = if live {
            self.meta_bytes + self.head_bytes
        } else {
            0
        };
        let intent_bytes = if self.intent.is_some() {
            self.meta_bytes + self.provisional_bytes
        } else {
            0
        };
        MvccStats {
            key_count: i64::from(self.exists),
            live_count: i64::from(live),
            live_bytes,
            intent_count: i64::from(self.intent.is_some()),
            intent_bytes,
            gc_bytes: -live_bytes - if live { 0 } else { intent_bytes },
            ..MvccStats::zero()
        }
    }
}

/// Recompute the stats of the logical range `[start, end)` by full scan
///
/// `end = None` means unbounded. Local records are not counted.
pub fn compute_stats<R: Reader>(reader: &R, start: &[u8], end: Option<&[u8]>) -> Result<MvccStats> {
    let lower = meta_key(start);
    let upper = end.map(meta_key);

    let mut total = MvccStats::zero();
    let mut current: Option<(Key, HeadSummary)> = None;
    for kv in ScanIter::new(reader, &lower, upper.as_deref(), Direction::Forward) {
        let (physical, value) = kv?;
        if is_local(&physical) {
            continue;
        }
        let decoded = keys::decode(&physical)?;
        let same_key = matches!(&current, Some((key, _)) if *key == decoded.key);
        if !same_key {
            if let Some((_, done)) = current.take() {
                total += done.head_stats();
            }
            current = Some((decoded.key.clone(), HeadSummary::default()));
        }
        if let Some((_, summary)) = current.as_mut() {
            let record_bytes = (physical.len() + value.len()) as i64;
            summary.feed(decoded.timestamp, record_bytes, &value)?;
        }
        total += record_stats(&physical, &value, decoded.is_meta());
    }
    if let Some((_, done)) = current {
        total += done.head_stats();
    }
    Ok(total)
}
