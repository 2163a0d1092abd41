//! Split key finder
//!
//! Picks a logical key that divides a range into two parts of roughly the
//! requested weight, where the weight of a record is its key plus value
//! length. Splits only happen between logical keys, so all versions of a key
//! stay on one side.

use strata_core::{Key, Result};
use strata_storage::{Direction, Reader, ScanIter};

use crate::keys::{self, is_local, meta_key};

/// First logical key in `[start, end)` preceded by at least `target_bytes`
///
/// Never returns the range's first key. `None` when the range ends before
/// the weight is reached or holds fewer than two keys.
pub fn find_split_key<R: Reader>(
    reader: &R,
    start: &[u8],
    end: Option<&[u8]>,
    target_bytes: u64,
) -> Result<Option<Key>> {
    let lower = meta_key(start);
    let upper = end.map(meta_key);

    let mut current: Option<Key> = None;
    let mut weight: u64 = 0;
    for kv in ScanIter::new(reader, &lower, upper.as_deref(), Direction::Forward) {
        let (physical, value) = kv?;
        if is_local(&physical) {
            continue;
        }
        let key = keys::decode(&physical)?.key;
        if current.as_ref() != Some(&key) {
            if current.is_some() && weight >= target_bytes {
                return Ok(Some(key));
            }
            current = Some(key);
        }
        weight += (physical.len() + value.len()) as u64;
    }
    Ok(None)
}
