//! Aggregate MVCC statistics
//!
//! `MvccStats` holds the byte and key counters of a key range. The counters
//! are signed so that deltas (the difference a single mutation makes) share
//! the type with absolute values; an absolute value is just the sum of every
//! delta applied to an empty range.
//!
//! ## Accounting
//!
//! For every logical key with at least one physical record:
//!
//! - `key_count` counts the key once; `key_bytes`/`val_bytes` sum every
//!   physical key and value length; `val_count` counts versioned records
//! - an intent adds one to `intent_count` and the bytes of its meta record and
//!   provisional version to `intent_bytes`
//! - a key whose newest version is not a tombstone is live: `live_count` counts
//!   it and `live_bytes` holds the bytes of the records that make up its
//!   current value
//! - `gc_bytes` holds the bytes of everything else that is not an intent: the
//!   versions that no longer contribute to the latest value

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use crate::error::{Error, Result};

/// Aggregate key/byte counters of a key range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MvccStats {
    /// Number of live logical keys
    pub live_count: i64,
    /// Bytes of records contributing to live values
    pub live_bytes: i64,
    /// Number of logical keys with any record
    pub key_count: i64,
    /// Total bytes of physical keys
    pub key_bytes: i64,
    /// Number of versioned records
    pub val_count: i64,
    /// Total bytes of physical values
    pub val_bytes: i64,
    /// Number of unresolved intents
    pub intent_count: i64,
    /// Bytes of intent meta records plus their provisional versions
    pub intent_bytes: i64,
    /// Bytes of versions that no longer contribute to the latest value
    pub gc_bytes: i64,
}

impl MvccStats {
    /// All-zero stats
    pub const fn zero() -> Self {
        MvccStats {
            live_count: 0,
            live_bytes: 0,
            key_count: 0,
            key_bytes: 0,
            val_count: 0,
            val_bytes: 0,
            intent_count: 0,
            intent_bytes: 0,
            gc_bytes: 0,
        }
    }

    /// True when every counter is zero
    pub fn is_zero(&self) -> bool {
        *self == MvccStats::zero()
    }

    /// Total physical bytes accounted (keys plus values)
    #[inline]
    pub fn total_bytes(&self) -> i64 {
        self.key_bytes + self.val_bytes
    }

    /// Encode for storage in the local keyspace
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a stored stats record
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Corruption(format!("stats record: {}", e)))
    }
}

impl AddAssign for MvccStats {
    fn add_assign(&mut self, o: MvccStats) {
        self.live_count += o.live_count;
        self.live_bytes += o.live_bytes;
        self.key_count += o.key_count;
        self.key_bytes += o.key_bytes;
        self.val_count += o.val_count;
        self.val_bytes += o.val_bytes;
        self.intent_count += o.intent_count;
        self.intent_bytes += o.intent_bytes;
        self.gc_bytes += o.gc_bytes;
    }
}

impl SubAssign for MvccStats {
    fn sub_assign(&mut self, o: MvccStats) {
        *self += -o;
    }
}

impl Add for MvccStats {
    type Output = MvccStats;

    fn add(mut self, o: MvccStats) -> MvccStats {
        self += o;
        self
    }
}

impl Sub for MvccStats {
    type Output = MvccStats;

    fn sub(mut self, o: MvccStats) -> MvccStats {
        self -= o;
        self
    }
}

impl Neg for MvccStats {
    type Output = MvccStats;

    fn neg(self) -> MvccStats {
        MvccStats {
            live_count: -self.live_count,
            live_bytes: -self.live_bytes,
            key_count: -self.key_count,
            key_bytes: -self.key_bytes,
            val_count: -self.val_count,
            val_bytes: -self.val_bytes,
            intent_count: -self.intent_count,
            intent_bytes: -self.intent_bytes,
            gc_bytes: -self.gc_bytes,
        }
    }
}

impl std::iter::Sum for MvccStats {
    fn sum<I: Iterator<Item = MvccStats>>(iter: I) -> Self {
        iter.fold(MvccStats::zero(), |acc, s| acc + s)
    }
}
