//! Merge reducer
//!
//! A merge delta is a partial update that combines with the value beneath it
//! instead of replacing it. Two kinds are supported:
//!
//! - `Counter`: deltas are summed (wrapping on overflow)
//! - `TimeSeries`: samples are unioned by offset; samples sharing an offset
//!   combine (`count` and `sum` add, `max`/`min` keep the extreme)
//!
//! Both combinations are commutative and associative, so the order in which
//! deltas are folded never changes the result. Mixing kinds is an error.
//!
//! `MvccMergeOperator` plugs the reducer into the storage engine, which
//! resolves same-timestamp merges in place, and also sums the deltas written to
//! the range stats record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use strata_core::{Error, MvccStats, Result};
use strata_storage::MergeOperator;

use crate::keys::STATS_KEY;
use crate::payload::VersionPayload;

/// One time-series bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Bucket offset (e.g. seconds since series start)
    pub offset: i64,
    /// Number of observations
    pub count: u64,
    /// Sum of observations
    pub sum: i64,
    /// Largest observation
    pub max: i64,
    /// Smallest observation
    pub min: i64,
}

impl Sample {
    /// A bucket holding one observation
    pub fn observe(offset: i64, value: i64) -> Self {
        Sample {
            offset,
            count: 1,
            sum: value,
            max: value,
            min: value,
        }
    }

    fn absorb(&mut self, other: &Sample) {
        self.count = self.count.wrapping_add(other.count);
        self.sum = self.sum.wrapping_add(other.sum);
        self.max = self.max.max(other.max);
        self.min = self.min.min(other.min);
    }
}

/// A mergeable value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeValue {
    /// Integer counter
    Counter(i64),
    /// Samples sorted by offset
    TimeSeries(Vec<Sample>),
}

impl MergeValue {
    /// Build a time series, combining samples that share an offset
    pub fn time_series(samples: impl IntoIterator<Item = Sample>) -> Self {
        MergeValue::TimeSeries(union_samples(Vec::new(), samples))
    }

    /// Combine two values of the same kind
    pub fn combine(self, other: MergeValue) -> Result<MergeValue> {
        match (self, other) {
            (MergeValue::Counter(a), MergeValue::Counter(b)) => {
                Ok(MergeValue::Counter(a.wrapping_add(b)))
            }
            (MergeValue::TimeSeries(a), MergeValue::TimeSeries(b)) => {
                Ok(MergeValue::TimeSeries(union_samples(a, b)))
            }
            (a, b) => Err(Error::InvalidArgument(format!(
                "cannot merge {} with {}",
                a.kind_name(),
                b.kind_name()
            ))),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            MergeValue::Counter(_) => "counter",
            MergeValue::TimeSeries(_) => "time series",
        }
    }

    /// Serialize (bincode)
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize (bincode)
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Corruption(format!("merge value: {}", e)))
    }
}

fn union_samples(a: Vec<Sample>, b: impl IntoIterator<Item = Sample>) -> Vec<Sample> {
    let mut by_offset: BTreeMap<i64, Sample> = BTreeMap::new();
    for sample in a.into_iter().chain(b) {
        by_offset
            .entry(sample.offset)
            .and_modify(|s| s.absorb(&sample))
            .or_insert(sample);
    }
    by_offset.into_values().collect()
}

/// Fold `deltas` into `base`
///
/// `base` is the value beneath the deltas, if any. Returns `None` only when
/// there is neither a base nor a delta.
pub fn reduce(
    base: Option<MergeValue>,
    deltas: impl IntoIterator<Item = MergeValue>,
) -> Result<Option<MergeValue>> {
    let mut acc = base;
    for delta in deltas {
        acc = Some(match acc {
            Some(value) => value.combine(delta)?,
            None => delta,
        });
    }
    Ok(acc)
}

/// Combine merge operands with the payload already stored at the same
/// physical key (same key and timestamp)
///
/// - absent or tombstone: the operands combined, as a merge delta
/// - merge delta: the deltas combined, still a delta
/// - value: the value is treated as a base and the result is a value
pub fn combine_payloads(existing: Option<&[u8]>, operands: &[Vec<u8>]) -> Result<Vec<u8>> {
    let mut deltas = Vec::with_capacity(operands.len());
    for operand in operands {
        match VersionPayload::decode(operand)? {
            VersionPayload::Merge(delta) => deltas.push(delta),
            other => {
                return Err(Error::InvalidArgument(format!(
                    "merge operand must be a merge delta, got {:?}",
                    other.kind()
                )))
            }
        }
    }

    let existing = existing.map(VersionPayload::decode).transpose()?;
    let combined = match existing {
        None | Some(VersionPayload::Tombstone) => {
            reduce(None, deltas)?.map(VersionPayload::Merge)
        }
        Some(VersionPayload::Merge(prior)) => reduce(Some(prior), deltas)?.map(VersionPayload::Merge),
        Some(VersionPayload::Value(bytes)) => {
            let base = MergeValue::decode(&bytes)?;
            reduce(Some(base), deltas)?
                .map(|v| v.encode().map(VersionPayload::Value))
                .transpose()?
        }
    };

    combined
        .ok_or_else(|| Error::InvalidArgument("merge without operands".to_string()))?
        .encode()
}

/// Engine merge operator for the MVCC keyspace
///
/// Merges on the range stats record add stats deltas; merges anywhere else
/// combine version payloads with `combine_payloads`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MvccMergeOperator;

impl MergeOperator for MvccMergeOperator {
    fn name(&self) -> &str {
        "strata.mvcc"
    }

    fn full_merge(
        &self,
        key: &[u8],
        existing: Option<&[u8]>,
        operands: &[Vec<u8>],
    ) -> Result<Vec<u8>> {
        if key == STATS_KEY {
            let mut total = match existing {
                Some(bytes) => MvccStats::decode(bytes)?,
                None => MvccStats::zero(),
            };
            for operand in operands {
                total += MvccStats::decode(operand)?;
            }
            return total.encode();
        }
        combine_payloads(existing, operands)
    }
}
