//! Key codec: logical key + timestamp → sortable physical key
//!
//! ## Layout
//!
//! ```text
//! meta key:     escaped(key) 0x00 0x00
//! version key:  escaped(key) 0x00 0x00 !wall (8, BE) !logical (4, BE)
//! ```
//!
//! `escaped` replaces every `0x00` byte with `0x00 0xFF`, so the `0x00 0x00`
//! terminator can never occur inside a key and byte-lexicographic order of
//! physical keys follows the order of logical keys. Timestamps are stored
//! complemented, so for one logical key the meta key sorts first, followed by
//! versions from newest to oldest.
//!
//! ## Local keyspace
//!
//! No escaped key starts with `0x00 0x01`; physical keys with that prefix form
//! the local (system) keyspace, which holds the range stats record. Scanners
//! skip it.

use byteorder::{BigEndian, ByteOrder};

use strata_core::{Error, Key, Result, Timestamp};

/// Prefix of the local keyspace
pub const LOCAL_PREFIX: &[u8] = &[0x00, 0x01];

/// First physical key after the local keyspace
pub const LOCAL_END: &[u8] = &[0x00, 0x02];

/// Physical key of the range stats record
pub const STATS_KEY: &[u8] = b"\x00\x01stats";

/// Length of the encoded timestamp suffix
pub const TIMESTAMP_SUFFIX_LEN: usize = 12;

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x00;
const KEY_END: u8 = 0x01;

fn escape_into(out: &mut Vec<u8>, key: &[u8]) {
    for &b in key {
        out.push(b);
        if b == ESCAPE {
            out.push(ESCAPED_ZERO);
        }
    }
}

fn escaped_capacity(key: &[u8]) -> usize {
    key.len() + key.iter().filter(|b| **b == ESCAPE).count() + 2
}

/// Physical key of the meta (intent) slot of `key`
pub fn meta_key(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(escaped_capacity(key));
    escape_into(&mut out, key);
    out.push(ESCAPE);
    out.push(TERMINATOR);
    out
}

/// Physical key of the version of `key` at `ts`
pub fn version_key(key: &[u8], ts: Timestamp) -> Vec<u8> {
    let mut out = Vec::with_capacity(escaped_capacity(key) + TIMESTAMP_SUFFIX_LEN);
    escape_into(&mut out, key);
    out.push(ESCAPE);
    out.push(TERMINATOR);
    let mut suffix = [0u8; TIMESTAMP_SUFFIX_LEN];
    BigEndian::write_u64(&mut suffix[..8], !ts.wall);
    BigEndian::write_u32(&mut suffix[8..], !ts.logical);
    out.extend_from_slice(&suffix);
    out
}

/// First physical key after every record of `key`
///
/// Seeking here skips the remaining versions of `key`.
pub fn key_end(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(escaped_capacity(key));
    escape_into(&mut out, key);
    out.push(ESCAPE);
    out.push(KEY_END);
    out
}

/// True for physical keys of the local keyspace
#[inline]
pub fn is_local(physical: &[u8]) -> bool {
    physical.starts_with(LOCAL_PREFIX)
}

/// A decoded physical key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    /// Logical key
    pub key: Key,
    /// Version timestamp; `None` for the meta slot
    pub timestamp: Option<Timestamp>,
}

impl DecodedKey {
    /// True for the meta slot
    pub fn is_meta(&self) -> bool {
        self.timestamp.is_none()
    }
}

/// Decode a physical key
///
/// Rejects local keys, malformed escapes, a missing terminator and any
/// suffix that is not empty or a full timestamp.
pub fn decode(physical: &[u8]) -> Result<DecodedKey> {
    let mut key = Vec::with_capacity(physical.len());
    let mut i = 0;
    loop {
        let Some(&b) = physical.get(i) else {
            return Err(corrupt(physical, "missing terminator"));
        };
        if b != ESCAPE {
            key.push(b);
            i += 1;
            continue;
        }
        match physical.get(i + 1) {
            Some(&ESCAPED_ZERO) => {
                key.push(0);
                i += 2;
            }
            Some(&TERMINATOR) => {
                i += 2;
                break;
            }
            _ => return Err(corrupt(physical, "invalid escape")),
        }
    }

    let suffix = &physical[i..];
    let timestamp = match suffix.len() {
        0 => None,
        TIMESTAMP_SUFFIX_LEN => Some(Timestamp::new(
            !BigEndian::read_u64(&suffix[..8]),
            !BigEndian::read_u32(&suffix[8..]),
        )),
        n => return Err(corrupt(physical, &format!("{} byte timestamp suffix", n))),
    };

    Ok(DecodedKey {
        key: Key::new(key),
        timestamp,
    })
}

fn corrupt(physical: &[u8], what: &str) -> Error {
    Error::Corruption(format!(
        "physical key {}: {}",
        Key::from(physical),
        what
    ))
}
