//! Version reader
//!
//! Resolves point and range reads against the coded keyspace:
//!
//! - a read at `ts` sees the newest version at or below `ts`
//! - a foreign intent at or below `ts` blocks the read with
//!   `WriteIntentConflict`, unless the read is inconsistent, in which case the
//!   intent is reported and the committed history beneath it is read
//! - the reader's own intent (same transaction and epoch) is always visible
//! - merge deltas are folded down to their base with the merge reducer
//!
//! Scans discover logical keys with one seek per key and resolve each key
//! like a point read, so they never materialize a key's full history.

use strata_core::{Error, Intent, Key, Result, Timestamp, TxnMeta};
use strata_storage::{Direction, Reader, ScanIter};

use crate::keys::{self, is_local, key_end, meta_key, version_key, LOCAL_END, LOCAL_PREFIX};
use crate::merge::{reduce, MergeValue};
use crate::payload::{IntentMeta, VersionPayload};

/// A visible value and the timestamp of the version that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MvccValue {
    /// Value bytes; for merge-valued keys the encoded reduced `MergeValue`
    pub value: Vec<u8>,
    /// Timestamp of the newest version contributing to the value
    pub timestamp: Timestamp,
}

/// Options for point reads
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Reading transaction, whose own intents are visible
    pub txn: Option<TxnMeta>,
    /// Report foreign intents instead of failing on them
    pub inconsistent: bool,
}

impl GetOptions {
    /// Read on behalf of `txn`
    pub fn with_txn(mut self, txn: TxnMeta) -> Self {
        self.txn = Some(txn);
        self
    }

    /// Best-effort read that reports blocking intents
    pub fn inconsistent(mut self) -> Self {
        self.inconsistent = true;
        self
    }
}

/// Result of a point read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRead {
    /// Visible value, if any
    pub value: Option<MvccValue>,
    /// True when the visible version is a tombstone
    pub deleted: bool,
    /// Foreign intent skipped by an inconsistent read
    pub intent: Option<Intent>,
}

/// Options for range reads
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Maximum number of keys returned; 0 means unlimited
    pub max_keys: usize,
    /// Iterate in descending key order
    pub reverse: bool,
    /// Reading transaction, whose own intents are visible
    pub txn: Option<TxnMeta>,
    /// Report foreign intents instead of failing on them
    pub inconsistent: bool,
}

impl ScanOptions {
    /// Limit the number of keys returned
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    /// Scan in descending key order
    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Read on behalf of `txn`
    pub fn with_txn(mut self, txn: TxnMeta) -> Self {
        self.txn = Some(txn);
        self
    }

    /// Best-effort scan that reports blocking intents
    pub fn inconsistent(mut self) -> Self {
        self.inconsistent = true;
        self
    }
}

/// Result of a range read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Visible key/value pairs in scan order
    pub kvs: Vec<(Key, MvccValue)>,
    /// Where to continue when the scan stopped at `max_keys`
    ///
    /// Forward scans continue with `start = resume_key`; reverse scans with
    /// `end = resume_key.next()`.
    pub resume_key: Option<Key>,
    /// Foreign intents skipped by an inconsistent scan
    pub intents: Vec<Intent>,
}

/// Intent recorded in the meta slot of `key`, if any
pub(crate) fn read_intent<R: Reader>(reader: &R, key: &[u8]) -> Result<Option<TxnMeta>> {
    reader
        .get(&meta_key(key))?
        .map(|bytes| IntentMeta::decode(&bytes).map(|meta| meta.txn))
        .transpose()
}

/// Timestamp of the newest version of `key`, ignoring the version at `skip`
pub(crate) fn newest_version<R: Reader>(
    reader: &R,
    key: &[u8],
    skip: Option<Timestamp>,
) -> Result<Option<Timestamp>> {
    let start = version_key(key, Timestamp::MAX);
    let end = key_end(key);
    for kv in ScanIter::new(reader, &start, Some(&end), Direction::Forward) {
        let (physical, _) = kv?;
        let ts = version_timestamp(&physical)?;
        if Some(ts) != skip {
            return Ok(Some(ts));
        }
    }
    Ok(None)
}

fn version_timestamp(physical: &[u8]) -> Result<Timestamp> {
    keys::decode(physical)?.timestamp.ok_or_else(|| {
        Error::Corruption(format!(
            "meta record {} inside version range",
            Key::from(physical)
        ))
    })
}

/// Resolve `key` as of `read_ts`
pub fn read_key<R: Reader>(
    reader: &R,
    key: &[u8],
    read_ts: Timestamp,
    opts: &GetOptions,
) -> Result<KeyRead> {
    let mut read_ts = read_ts;
    let mut skip = None;
    let mut intent = None;

    if let Some(owner) = read_intent(reader, key)? {
        match &opts.txn {
            Some(own) if own.same_txn(&owner) => {
                if own.epoch < owner.epoch {
                    return Err(Error::InvalidOperation(format!(
                        "{} reading at epoch {} found its intent from epoch {}",
                        own.id, own.epoch, owner.epoch
                    )));
                }
                if own.epoch == owner.epoch {
                    read_ts = read_ts.forward(owner.write_timestamp);
                } else {
                    skip = Some(owner.write_timestamp);
                }
            }
            _ if owner.write_timestamp <= read_ts => {
                if !opts.inconsistent {
                    return Err(Error::WriteIntentConflict {
                        key: Key::from(key),
                        txn: owner,
                    });
                }
                intent = Some(Intent {
                    key: Key::from(key),
                    txn: owner,
                });
                skip = Some(owner.write_timestamp);
            }
            // Intents above the read timestamp are invisible.
            _ => {}
        }
    }

    let mut read = resolve_versions(reader, key, read_ts, skip)?;
    read.intent = intent;
    Ok(read)
}

fn resolve_versions<R: Reader>(
    reader: &R,
    key: &[u8],
    read_ts: Timestamp,
    skip: Option<Timestamp>,
) -> Result<KeyRead> {
    let start = version_key(key, read_ts);
    let end = key_end(key);

    let mut deltas: Vec<MergeValue> = Vec::new();
    let mut head_ts = None;
    let mut base = None;
    for kv in ScanIter::new(reader, &start, Some(&end), Direction::Forward) {
        let (physical, bytes) = kv?;
        let ts = version_timestamp(&physical)?;
        if Some(ts) == skip {
            continue;
        }
        match VersionPayload::decode(&bytes)? {
            VersionPayload::Value(value) if deltas.is_empty() => {
                return Ok(KeyRead {
                    value: Some(MvccValue {
                        value,
                        timestamp: ts,
                    }),
                    ..KeyRead::default()
                });
            }
            VersionPayload::Tombstone if deltas.is_empty() => {
                return Ok(KeyRead {
                    deleted: true,
                    ..KeyRead::default()
                });
            }
            VersionPayload::Value(value) => {
                base = Some(MergeValue::decode(&value)?);
                break;
            }
            VersionPayload::Tombstone => break,
            VersionPayload::Merge(delta) => {
                head_ts.get_or_insert(ts);
                deltas.push(delta);
            }
        }
    }

    let (Some(timestamp), Some(reduced)) = (head_ts, reduce(base, deltas.into_iter().rev())?) else {
        return Ok(KeyRead::default());
    };
    Ok(KeyRead {
        value: Some(MvccValue {
            value: reduced.encode()?,
            timestamp,
        }),
        ..KeyRead::default()
    })
}

/// Lazy MVCC range iterator
///
/// Yields the visible `(key, value)` pairs of `[start, end)` in scan order.
/// Keys without a visible value are skipped. Foreign intents skipped by an
/// inconsistent scan accumulate in `intents()`.
pub struct MvccScanner<R: Reader> {
    reader: R,
    lower: Vec<u8>,
    upper: Option<Vec<u8>>,
    direction: Direction,
    read_ts: Timestamp,
    opts: GetOptions,
    intents: Vec<Intent>,
    done: bool,
}

impl<R: Reader> MvccScanner<R> {
    /// Scan `[start, end)` as of `read_ts`; `end = None` means unbounded
    pub fn new(
        reader: R,
        start: &[u8],
        end: Option<&[u8]>,
        read_ts: Timestamp,
        opts: &ScanOptions,
    ) -> Self {
        MvccScanner {
            reader,
            lower: meta_key(start),
            upper: end.map(meta_key),
            direction: if opts.reverse {
                Direction::Reverse
            } else {
                Direction::Forward
            },
            read_ts,
            opts: GetOptions {
                txn: opts.txn,
                inconsistent: opts.inconsistent,
            },
            intents: Vec::new(),
            done: false,
        }
    }

    /// Next logical key in scan order, without reading it
    pub(crate) fn next_key(&mut self) -> Result<Option<Key>> {
        loop {
            let found = match self.direction {
                Direction::Forward => self.reader.seek_ge(&self.lower)?,
                Direction::Reverse => self.reader.seek_lt(self.upper.as_deref())?,
            };
            let Some((physical, _)) = found else {
                return Ok(None);
            };
            let in_range = match self.direction {
                Direction::Forward => self
                    .upper
                    .as_deref()
                    .map_or(true, |upper| physical.as_slice() < upper),
                Direction::Reverse => physical.as_slice() >= self.lower.as_slice(),
            };
            if !in_range {
                return Ok(None);
            }

            if is_local(&physical) {
                match self.direction {
                    Direction::Forward => self.lower = LOCAL_END.to_vec(),
                    Direction::Reverse => self.upper = Some(LOCAL_PREFIX.to_vec()),
                }
                continue;
            }

            let key = keys::decode(&physical)?.key;
            match self.direction {
                Direction::Forward => self.lower = key_end(&key),
                Direction::Reverse => self.upper = Some(meta_key(&key)),
            }
            return Ok(Some(key));
        }
    }

    /// Foreign intents skipped so far
    pub fn intents(&self) -> &[Intent] {
        &self.intents
    }

    /// Consume the scanner, returning the skipped intents
    pub fn into_intents(self) -> Vec<Intent> {
        self.intents
    }

    fn step(&mut self) -> Result<Option<(Key, MvccValue)>> {
        while let Some(key) = self.next_key()? {
            let read = read_key(&self.reader, &key, self.read_ts, &self.opts)?;
            if let Some(intent) = read.intent {
                self.intents.push(intent);
            }
            if let Some(value) = read.value {
                return Ok(Some((key, value)));
            }
        }
        Ok(None)
    }
}

impl<R: Reader> Iterator for MvccScanner<R> {
    type Item = Result<(Key, MvccValue)>;

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

/// Read the visible contents of `[start, end)` as of `read_ts`
pub fn scan<R: Reader>(
    reader: R,
    start: &[u8],
    end: Option<&[u8]>,
    read_ts: Timestamp,
    opts: &ScanOptions,
) -> Result<ScanResult> {
    let mut scanner = MvccScanner::new(reader, start, end, read_ts, opts);
    let mut kvs = Vec::new();
    while opts.max_keys == 0 || kvs.len() < opts.max_keys {
        match scanner.next() {
            Some(kv) => kvs.push(kv?),
            None => break,
        }
    }
    let resume_key = if opts.max_keys > 0 && kvs.len() == opts.max_keys {
        scanner.next_key()?
    } else {
        None
    };
    Ok(ScanResult {
        kvs,
        resume_key,
        intents: scanner.into_intents(),
    })
}
