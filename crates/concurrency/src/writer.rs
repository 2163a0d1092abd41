//! Version writer
//!
//! Write operations on `MvccBatch`. Each one latches its key, checks for
//! conflicts against the state seen through the batch, and stages the new
//! records:
//!
//! - a foreign intent fails the write with `WriteIntentConflict`
//! - a committed version at or above the write timestamp fails it with
//!   `WriteTooOld`
//! - transactional writes leave an intent: the meta record naming the
//!   transaction plus a provisional version at its write timestamp
//!
//! Blind writes skip the existing-version check; the caller guarantees the
//! timestamp is above every existing version. Foreign intents still conflict.

use strata_core::{Error, Key, Result, Timestamp, TxnMeta, TxnStatus};
use strata_storage::Reader;

use crate::batch::{MvccBatch, Staged};
use crate::keys::{meta_key, version_key};
use crate::merge::MergeValue;
use crate::payload::{IntentMeta, VersionPayload};
use crate::reader::{newest_version, read_intent, read_key, GetOptions, KeyRead};

impl MvccBatch<'_> {
    /// Write `value` at `ts`, as an intent of `txn` if given
    pub fn put(
        &mut self,
        key: &[u8],
        value: &[u8],
        ts: Timestamp,
        txn: Option<&TxnMeta>,
    ) -> Result<()> {
        self.write_version(key, VersionPayload::Value(value.to_vec()), ts, txn, false)
    }

    /// `put` without the existing-version check
    pub fn blind_put(
        &mut self,
        key: &[u8],
        value: &[u8],
        ts: Timestamp,
        txn: Option<&TxnMeta>,
    ) -> Result<()> {
        self.write_version(key, VersionPayload::Value(value.to_vec()), ts, txn, true)
    }

    /// Write a tombstone at `ts` under `put`'s rules
    pub fn delete(&mut self, key: &[u8], ts: Timestamp, txn: Option<&TxnMeta>) -> Result<()> {
        self.write_version(key, VersionPayload::Tombstone, ts, txn, false)
    }

    /// Write `value` if the latest visible value equals `expected`
    ///
    /// `expected = None` requires the key to be absent or deleted. A mismatch
    /// fails with `ConditionFailed` carrying the actual value.
    pub fn conditional_put(
        &mut self,
        key: &[u8],
        expected: Option<&[u8]>,
        value: &[u8],
        ts: Timestamp,
        txn: Option<&TxnMeta>,
    ) -> Result<()> {
        self.check_condition(key, expected, txn)?;
        self.write_version(key, VersionPayload::Value(value.to_vec()), ts, txn, false)
    }

    /// `conditional_put` writing with `blind_put`
    pub fn blind_conditional_put(
        &mut self,
        key: &[u8],
        expected: Option<&[u8]>,
        value: &[u8],
        ts: Timestamp,
        txn: Option<&TxnMeta>,
    ) -> Result<()> {
        self.check_condition(key, expected, txn)?;
        self.write_version(key, VersionPayload::Value(value.to_vec()), ts, txn, true)
    }

    /// Write `value` unless the key already holds a different one
    ///
    /// An equal existing value is written again like a `put`, so a
    /// transaction still leaves its intent. A tombstone counts as absent
    /// unless `fail_on_tombstones`.
    pub fn init_put(
        &mut self,
        key: &[u8],
        value: &[u8],
        fail_on_tombstones: bool,
        ts: Timestamp,
        txn: Option<&TxnMeta>,
    ) -> Result<()> {
        self.check_init(key, value, fail_on_tombstones, txn)?;
        self.write_version(key, VersionPayload::Value(value.to_vec()), ts, txn, false)
    }

    /// `init_put` writing with `blind_put`
    pub fn blind_init_put(
        &mut self,
        key: &[u8],
        value: &[u8],
        fail_on_tombstones: bool,
        ts: Timestamp,
        txn: Option<&TxnMeta>,
    ) -> Result<()> {
        self.check_init(key, value, fail_on_tombstones, txn)?;
        self.write_version(key, VersionPayload::Value(value.to_vec()), ts, txn, true)
    }

    /// Append a merge delta at `ts`
    ///
    /// Deltas are never checked against each other; two merges at the same
    /// timestamp combine in place. A key holding an intent rejects merges.
    pub fn merge(&mut self, key: &[u8], delta: &MergeValue, ts: Timestamp) -> Result<()> {
        let payload = VersionPayload::Merge(delta.clone()).encode()?;
        self.check_write(key, payload.len(), ts)?;
        self.latch(key)?;
        if let Some(owner) = read_intent(&self.view()?, key)? {
            return Err(Error::WriteIntentConflict {
                key: Key::from(key),
                txn: owner,
            });
        }
        self.stage(key, vec![Staged::Merge(version_key(key, ts), payload)])
    }

    /// Resolve the intent of `txn` on `key`
    ///
    /// Returns `false` when the key holds no intent of `txn`.
    pub fn resolve_intent(&mut self, key: &[u8], txn: &TxnMeta, status: TxnStatus) -> Result<bool> {
        self.latch(key)?;
        let (intent, provisional) = {
            let view = self.view()?;
            let Some(intent) = read_intent(&view, key)?.filter(|owner| owner.same_txn(txn)) else {
                return Ok(false);
            };
            let provisional = version_key(key, intent.write_timestamp);
            let value = view.get(&provisional)?;
            (intent, (provisional, value))
        };

        let (provisional_key, provisional_value) = provisional;
        let mut ops = vec![Staged::Delete(meta_key(key))];
        match status {
            TxnStatus::Committed { commit_timestamp } => {
                if commit_timestamp.is_empty() {
                    return Err(Error::InvalidArgument(
                        "commit timestamp must be non-zero".to_string(),
                    ));
                }
                if commit_timestamp < intent.write_timestamp {
                    return Err(Error::InvalidArgument(format!(
                        "commit timestamp {} is below the intent's write timestamp {}",
                        commit_timestamp, intent.write_timestamp
                    )));
                }
                let value = provisional_value.ok_or_else(|| {
                    Error::Corruption(format!(
                        "intent on {} has no provisional version at {}",
                        Key::from(key),
                        intent.write_timestamp
                    ))
                })?;
                if commit_timestamp != intent.write_timestamp {
                    ops.push(Staged::Delete(provisional_key));
                    ops.push(Staged::Set(version_key(key, commit_timestamp), value));
                }
            }
            TxnStatus::Aborted => ops.push(Staged::Delete(provisional_key)),
        }
        self.stage(key, ops)?;
        Ok(true)
    }

    fn check_write(&self, key: &[u8], value_len: usize, ts: Timestamp) -> Result<()> {
        if ts.is_empty() {
            return Err(Error::InvalidArgument(
                "versioned writes require a non-zero timestamp".to_string(),
            ));
        }
        let limits = self.limits();
        limits.validate_key_length(key.len())?;
        limits.validate_value_length(value_len)?;
        Ok(())
    }

    fn check_condition(
        &mut self,
        key: &[u8],
        expected: Option<&[u8]>,
        txn: Option<&TxnMeta>,
    ) -> Result<()> {
        self.latch(key)?;
        let actual = self.latest(key, txn)?.value.map(|v| v.value);
        if actual.as_deref() != expected {
            return Err(Error::ConditionFailed {
                key: Key::from(key),
                actual,
            });
        }
        Ok(())
    }

    fn check_init(
        &mut self,
        key: &[u8],
        value: &[u8],
        fail_on_tombstones: bool,
        txn: Option<&TxnMeta>,
    ) -> Result<()> {
        self.latch(key)?;
        let current = self.latest(key, txn)?;
        match current.value {
            Some(existing) if existing.value == value => Ok(()),
            Some(existing) => Err(Error::InitPutFailed {
                key: Key::from(key),
                actual: Some(existing.value),
            }),
            None if current.deleted && fail_on_tombstones => Err(Error::InitPutFailed {
                key: Key::from(key),
                actual: None,
            }),
            None => Ok(()),
        }
    }

    fn latest(&self, key: &[u8], txn: Option<&TxnMeta>) -> Result<KeyRead> {
        let opts = GetOptions {
            txn: txn.copied(),
            inconsistent: false,
        };
        read_key(&self.view()?, key, Timestamp::MAX, &opts)
    }

    pub(crate) fn write_version(
        &mut self,
        key: &[u8],
        payload: VersionPayload,
        ts: Timestamp,
        txn: Option<&TxnMeta>,
        blind: bool,
    ) -> Result<()> {
        let value_len = match &payload {
            VersionPayload::Value(value) => value.len(),
            _ => 0,
        };
        self.check_write(key, value_len, ts)?;
        let payload = payload.encode()?;
        self.latch(key)?;

        let owner = read_intent(&self.view()?, key)?;
        let own_intent = match (&owner, txn) {
            (Some(owner), Some(own)) if owner.same_txn(own) => Some(*owner),
            _ => None,
        };

        if let Some(owner) = owner {
            match txn {
                Some(own) if own.same_txn(&owner) => {
                    if own.epoch < owner.epoch {
                        return Err(Error::InvalidOperation(format!(
                            "{} writing at epoch {} found its intent from epoch {}",
                            own.id, own.epoch, owner.epoch
                        )));
                    }
                }
                _ => {
                    return Err(Error::WriteIntentConflict {
                        key: Key::from(key),
                        txn: owner,
                    })
                }
            }
        }

        if !blind {
            let skip = own_intent.map(|intent| intent.write_timestamp);
            if let Some(existing) = newest_version(&self.view()?, key, skip)? {
                if existing >= ts {
                    return Err(Error::WriteTooOld {
                        key: Key::from(key),
                        existing,
                        requested: ts,
                    });
                }
            }
        }

        let mut ops = Vec::with_capacity(3);
        if let Some(own) = txn {
            if let Some(previous) = own_intent.filter(|intent| intent.write_timestamp != ts) {
                ops.push(Staged::Delete(version_key(key, previous.write_timestamp)));
            }
            let meta = IntentMeta {
                txn: own.with_write_timestamp(ts),
            };
            ops.push(Staged::Set(meta_key(key), meta.encode()?));
        }
        ops.push(Staged::Set(version_key(key, ts), payload));
        self.stage(key, ops)
    }
}
