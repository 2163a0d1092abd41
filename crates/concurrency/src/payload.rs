//! Version payloads and intent metadata
//!
//! Every version record stores one tag byte followed by its payload:
//!
//! ```text
//! 0x01 value bytes      committed or provisional value
//! 0x02                  tombstone
//! 0x03 merge value      bincode-encoded `MergeValue` delta
//! ```
//!
//! The meta slot of a key holds an `IntentMeta` (bincode) while an intent is
//! outstanding.

use serde::{Deserialize, Serialize};

use strata_core::{Error, Result, TxnMeta};

use crate::merge::MergeValue;

const TAG_VALUE: u8 = 0x01;
const TAG_TOMBSTONE: u8 = 0x02;
const TAG_MERGE: u8 = 0x03;

/// Payload of a version record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionPayload {
    /// Plain value bytes
    Value(Vec<u8>),
    /// Deletion marker
    Tombstone,
    /// Partial update folded by the merge reducer
    Merge(MergeValue),
}

/// Payload kind, without the bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Plain value
    Value,
    /// Deletion marker
    Tombstone,
    /// Merge delta
    Merge,
}

impl VersionPayload {
    /// Serialize with its tag byte
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(match self {
            VersionPayload::Value(v) => {
                let mut out = Vec::with_capacity(1 + v.len());
                out.push(TAG_VALUE);
                out.extend_from_slice(v);
                out
            }
            VersionPayload::Tombstone => vec![TAG_TOMBSTONE],
            VersionPayload::Merge(m) => {
                let mut out = vec![TAG_MERGE];
                out.extend_from_slice(&m.encode()?);
                out
            }
        })
    }

    /// Deserialize a stored payload
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (kind, body) = split(bytes)?;
        Ok(match kind {
            PayloadKind::Value => VersionPayload::Value(body.to_vec()),
            PayloadKind::Tombstone => VersionPayload::Tombstone,
            PayloadKind::Merge => VersionPayload::Merge(MergeValue::decode(body)?),
        })
    }

    /// Kind of this payload
    pub fn kind(&self) -> PayloadKind {
        match self {
            VersionPayload::Value(_) => PayloadKind::Value,
            VersionPayload::Tombstone => PayloadKind::Tombstone,
            VersionPayload::Merge(_) => PayloadKind::Merge,
        }
    }
}

/// Kind of a stored payload, without decoding its body
pub fn kind_of(bytes: &[u8]) -> Result<PayloadKind> {
    split(bytes).map(|(kind, _)| kind)
}

fn split(bytes: &[u8]) -> Result<(PayloadKind, &[u8])> {
    let Some((&tag, body)) = bytes.split_first() else {
        return Err(Error::Corruption("empty version payload".to_string()));
    };
    let kind = match tag {
        TAG_VALUE => PayloadKind::Value,
        TAG_TOMBSTONE if body.is_empty() => PayloadKind::Tombstone,
        TAG_MERGE => PayloadKind::Merge,
        other => {
            return Err(Error::Corruption(format!(
                "invalid version payload tag {:#04x}",
                other
            )))
        }
    };
    Ok((kind, body))
}

/// Contents of a key's meta slot while an intent is outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentMeta {
    /// Owning transaction; its write timestamp locates the provisional version
    pub txn: TxnMeta,
}

impl IntentMeta {
    /// Serialize for the meta slot
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize a meta slot
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Corruption(format!("intent meta: {}", e)))
    }
}
