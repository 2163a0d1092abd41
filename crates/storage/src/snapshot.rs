//! Point-in-time views of the keyspace
//!
//! The engine keeps its ordered map behind an `Arc`. A snapshot is a clone of
//! that `Arc`; commits copy the map only while a snapshot is still alive
//! (`Arc::make_mut`), so readers never block writers and never observe a
//! partially applied batch.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use strata_core::Result;

use crate::reader::{KvPair, Reader};

/// Shared ordered map type backing the engine
pub(crate) type KvMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Immutable point-in-time view of the engine
///
/// # Example
///
/// ```ignore
/// let snapshot = engine.snapshot()?;
/// // Writes after snapshot creation are not visible
/// engine.commit(batch)?;
/// assert!(snapshot.get(b"k")?.is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    data: Arc<KvMap>,
}

impl Snapshot {
    pub(crate) fn new(data: Arc<KvMap>) -> Self {
        Snapshot { data }
    }

    /// Number of physical keys
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the keyspace is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Reader for Snapshot {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn seek_ge(&self, key: &[u8]) -> Result<Option<KvPair>> {
        Ok(self
            .data
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone())))
    }

    fn seek_lt(&self, key: Option<&[u8]>) -> Result<Option<KvPair>> {
        let entry = match key {
            Some(key) => self
                .data
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
                .next_back(),
            None => self.data.iter().next_back(),
        };
        Ok(entry.map(|(k, v)| (k.clone(), v.clone())))
    }
}
