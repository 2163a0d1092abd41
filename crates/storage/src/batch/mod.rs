//! Atomic mutation batches
//!
//! A `WriteBatch` collects Set/Delete/Merge/RangeDelete records and is
//! committed by the engine as one atomic unit. Two flavours exist:
//!
//! - unindexed: records are only accumulated; cheapest to build
//! - indexed: every record is also folded into a `BatchIndex`, so reads through
//!   the batch (`Engine::view`) see its own pending writes
//!
//! Either flavour serializes to the batch representation (`repr`).

mod index;
pub mod repr;

pub(crate) use index::{BatchIndex, ResolvedBatch};
pub use index::BatchView;

/// A single mutation record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Write `value` at `key`
    Set {
        /// Physical key
        key: Vec<u8>,
        /// Value bytes
        value: Vec<u8>,
    },
    /// Remove `key`
    Delete {
        /// Physical key
        key: Vec<u8>,
    },
    /// Fold `value` into the existing value at `key` with the merge operator
    Merge {
        /// Physical key
        key: Vec<u8>,
        /// Merge operand
        value: Vec<u8>,
    },
    /// Remove every key in `[start, end)`
    RangeDelete {
        /// Inclusive start key
        start: Vec<u8>,
        /// Exclusive end key
        end: Vec<u8>,
    },
}

impl BatchOp {
    /// The record's key (start key for range deletes)
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Set { key, .. } | BatchOp::Delete { key } | BatchOp::Merge { key, .. } => key,
            BatchOp::RangeDelete { start, .. } => start,
        }
    }

    /// Size of the record in the batch representation
    pub fn encoded_len(&self) -> usize {
        match self {
            BatchOp::Delete { key } => 1 + 4 + key.len(),
            BatchOp::Set { key, value } | BatchOp::Merge { key, value } => {
                1 + 4 + key.len() + 4 + value.len()
            }
            BatchOp::RangeDelete { start, end } => 1 + 4 + start.len() + 4 + end.len(),
        }
    }
}

/// Atomic batch of mutation records
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
    index: Option<BatchIndex>,
    data_size: usize,
}

impl WriteBatch {
    /// Create an unindexed batch
    pub fn new() -> Self {
        WriteBatch::default()
    }

    /// Create an indexed batch supporting reads of its pending writes
    pub fn indexed() -> Self {
        WriteBatch {
            index: Some(BatchIndex::default()),
            ..WriteBatch::default()
        }
    }

    /// Rebuild a batch from its representation
    pub fn from_repr(bytes: &[u8], indexed: bool) -> Result<Self, repr::ReprError> {
        let mut batch = if indexed {
            WriteBatch::indexed()
        } else {
            WriteBatch::new()
        };
        for op in repr::decode(bytes)? {
            batch.push(op);
        }
        Ok(batch)
    }

    /// Write `value` at `key`
    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.push(BatchOp::Set {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Remove `key`
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.push(BatchOp::Delete { key: key.into() });
    }

    /// Queue a merge operand for `key`
    pub fn merge(&mut self, key: impl Into<Vec<u8>>, operand: impl Into<Vec<u8>>) {
        self.push(BatchOp::Merge {
            key: key.into(),
            value: operand.into(),
        });
    }

    /// Remove every key in `[start, end)`
    pub fn delete_range(&mut self, start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) {
        self.push(BatchOp::RangeDelete {
            start: start.into(),
            end: end.into(),
        });
    }

    /// Append a record
    pub fn push(&mut self, op: BatchOp) {
        if let Some(index) = &mut self.index {
            index.apply(&op);
        }
        self.data_size += op.encoded_len();
        self.ops.push(op);
    }

    /// Records in insertion order
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when the batch holds no records
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// True when reads through the batch are supported
    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    /// Size of the batch representation in bytes
    pub fn repr_len(&self) -> usize {
        repr::REPR_HEADER_SIZE + self.data_size
    }

    /// Serialize to the batch representation
    pub fn to_repr(&self) -> Vec<u8> {
        repr::encode(&self.ops)
    }

    /// Discard all records
    pub fn clear(&mut self) {
        self.ops.clear();
        self.data_size = 0;
        if let Some(index) = &mut self.index {
            *index = BatchIndex::default();
        }
    }

    pub(crate) fn index(&self) -> Option<&BatchIndex> {
        self.index.as_ref()
    }

    pub(crate) fn into_parts(self) -> (Vec<BatchOp>, Option<BatchIndex>) {
        (self.ops, self.index)
    }
}
