//! Read access to the ordered keyspace
//!
//! `Reader` is the seek-based read interface shared by engine snapshots and by
//! indexed batches layered over a snapshot. Range iteration (`ScanIter`) is
//! built on the two seek primitives, so every reader gets lazy forward and
//! reverse iteration for free.

use strata_core::Result;

/// A physical key and its value
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Iteration direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending key order
    Forward,
    /// Descending key order
    Reverse,
}

/// Seek-based read access to an ordered byte keyspace
pub trait Reader {
    /// Point lookup
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// First entry with key `>= key`
    fn seek_ge(&self, key: &[u8]) -> Result<Option<KvPair>>;

    /// Last entry with key `< key`, or the last entry overall when `key` is `None`
    fn seek_lt(&self, key: Option<&[u8]>) -> Result<Option<KvPair>>;

    /// Lazily iterate `[start, end)` in the given direction
    ///
    /// `end = None` means unbounded.
    fn iter(&self, start: &[u8], end: Option<&[u8]>, direction: Direction) -> ScanIter<&Self>
    where
        Self: Sized,
    {
        ScanIter::new(self, start, end, direction)
    }
}

impl<R: Reader + ?Sized> Reader for &R {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn seek_ge(&self, key: &[u8]) -> Result<Option<KvPair>> {
        (**self).seek_ge(key)
    }

    fn seek_lt(&self, key: Option<&[u8]>) -> Result<Option<KvPair>> {
        (**self).seek_lt(key)
    }
}

/// Lazy range iterator over any `Reader`
///
/// Each step is one seek, so the iterator holds no borrow of the underlying
/// map between steps and never materializes the range. `R` is either an owned
/// reader (a `Snapshot`) or a reference to one.
pub struct ScanIter<R: Reader> {
    reader: R,
    lower: Vec<u8>,
    upper: Option<Vec<u8>>,
    direction: Direction,
    done: bool,
}

impl<R: Reader> ScanIter<R> {
    /// Create an iterator over `[start, end)`
    pub fn new(reader: R, start: &[u8], end: Option<&[u8]>, direction: Direction) -> Self {
        ScanIter {
            reader,
            lower: start.to_vec(),
            upper: end.map(|e| e.to_vec()),
            direction,
            done: false,
        }
    }

    fn step(&mut self) -> Result<Option<KvPair>> {
        match self.direction {
            Direction::Forward => {
                let Some((key, value)) = self.reader.seek_ge(&self.lower)? else {
                    return Ok(None);
                };
                if let Some(upper) = &self.upper {
                    if key.as_slice() >= upper.as_slice() {
                        return Ok(None);
                    }
                }
                self.lower = successor(&key);
                Ok(Some((key, value)))
            }
            Direction::Reverse => {
                let Some((key, value)) = self.reader.seek_lt(self.upper.as_deref())? else {
                    return Ok(None);
                };
                if key.as_slice() < self.lower.as_slice() {
                    return Ok(None);
                }
                self.upper = Some(key.clone());
                Ok(Some((key, value)))
            }
        }
    }
}

impl<R: Reader> Iterator for ScanIter<R> {
    type Item = Result<KvPair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(kv)) => Some(Ok(kv)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// The smallest byte string strictly greater than `key`
#[inline]
pub fn successor(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0);
    next
}
