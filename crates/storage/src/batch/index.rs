//! Batch index and merge resolution
//!
//! `BatchIndex` is the per-key summary of a batch: the final pending state of
//! every key it touches, plus the ranges it deletes. It serves two purposes:
//!
//! - reads through an indexed batch (`BatchView`) consult it before the
//!   snapshot underneath
//! - at commit it is resolved against the current snapshot into a
//!   `ResolvedBatch`, which contains no merges and applies infallibly

use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::ops::Bound;

use strata_core::{Error, Result};

use super::BatchOp;
use crate::merge::MergeOperator;
use crate::reader::{successor, KvPair, Reader};
use crate::snapshot::{KvMap, Snapshot};

/// Operand stack of a pending merge
type Operands = SmallVec<[Vec<u8>; 2]>;

/// Value a pending merge folds into
#[derive(Debug, Clone)]
enum MergeBase {
    /// Determined by earlier records of this batch
    Known(Option<Vec<u8>>),
    /// Whatever the engine holds at commit
    Engine,
}

/// Final pending state of one key
#[derive(Debug, Clone)]
enum PendingEntry {
    Set(Vec<u8>),
    Delete,
    Merge { base: MergeBase, operands: Operands },
}

/// Per-key summary of a batch
#[derive(Debug, Clone, Default)]
pub(crate) struct BatchIndex {
    entries: BTreeMap<Vec<u8>, PendingEntry>,
    ranges: Vec<(Vec<u8>, Vec<u8>)>,
}

impl BatchIndex {
    /// Fold one record into the index
    pub(crate) fn apply(&mut self, op: &BatchOp) {
        match op {
            BatchOp::Set { key, value } => {
                self.entries
                    .insert(key.clone(), PendingEntry::Set(value.clone()));
            }
            BatchOp::Delete { key } => {
                self.entries.insert(key.clone(), PendingEntry::Delete);
            }
            BatchOp::Merge { key, value } => {
                let covered = self.covered(key);
                match self.entries.get_mut(key) {
                    Some(PendingEntry::Merge { operands, .. }) => operands.push(value.clone()),
                    Some(entry) => {
                        let base = match entry {
                            PendingEntry::Set(v) => Some(v.clone()),
                            _ => None,
                        };
                        *entry = PendingEntry::Merge {
                            base: MergeBase::Known(base),
                            operands: smallvec::smallvec![value.clone()],
                        };
                    }
                    None => {
                        let base = if covered {
                            MergeBase::Known(None)
                        } else {
                            MergeBase::Engine
                        };
                        self.entries.insert(
                            key.clone(),
                            PendingEntry::Merge {
                                base,
                                operands: smallvec::smallvec![value.clone()],
                            },
                        );
                    }
                }
            }
            BatchOp::RangeDelete { start, end } => {
                if start >= end {
                    return;
                }
                let doomed: Vec<Vec<u8>> = self
                    .entries
                    .range::<[u8], _>((Bound::Included(start.as_slice()), Bound::Excluded(end.as_slice())))
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in doomed {
                    self.entries.remove(&key);
                }
                self.ranges.push((start.clone(), end.clone()));
            }
        }
    }

    /// Range delete covering `key`, if any
    fn covering_range(&self, key: &[u8]) -> Option<&(Vec<u8>, Vec<u8>)> {
        self.ranges
            .iter()
            .find(|(start, end)| start.as_slice() <= key && key < end.as_slice())
    }

    fn covered(&self, key: &[u8]) -> bool {
        self.covering_range(key).is_some()
    }

    /// Resolve the pending state of `key` over `base`
    ///
    /// Returns `None` when the batch has no say about the key.
    fn lookup<R: Reader + ?Sized>(
        &self,
        key: &[u8],
        base: &R,
        merge: Option<&dyn MergeOperator>,
    ) -> Result<Option<Option<Vec<u8>>>> {
        match self.entries.get(key) {
            Some(entry) => Ok(Some(resolve_entry(key, entry, base, merge)?)),
            None if self.covered(key) => Ok(Some(None)),
            None => Ok(None),
        }
    }

    /// Resolve every pending merge against `base`
    pub(crate) fn resolve<R: Reader + ?Sized>(
        &self,
        base: &R,
        merge: Option<&dyn MergeOperator>,
    ) -> Result<ResolvedBatch> {
        let mut resolved = ResolvedBatch {
            ranges: self.ranges.clone(),
            ..ResolvedBatch::default()
        };
        for (key, entry) in &self.entries {
            match resolve_entry(key, entry, base, merge)? {
                Some(value) => {
                    resolved.sets.insert(key.clone(), value);
                }
                None => resolved.deletes.push(key.clone()),
            }
        }
        Ok(resolved)
    }
}

fn resolve_entry<R: Reader + ?Sized>(
    key: &[u8],
    entry: &PendingEntry,
    base: &R,
    merge: Option<&dyn MergeOperator>,
) -> Result<Option<Vec<u8>>> {
    match entry {
        PendingEntry::Set(value) => Ok(Some(value.clone())),
        PendingEntry::Delete => Ok(None),
        PendingEntry::Merge { base: merge_base, operands } => {
            let operator = merge.ok_or_else(|| {
                Error::InvalidOperation("merge record without a merge operator".to_string())
            })?;
            let existing = match merge_base {
                MergeBase::Known(value) => value.clone(),
                MergeBase::Engine => base.get(key)?,
            };
            Ok(Some(operator.full_merge(key, existing.as_deref(), operands)?))
        }
    }
}

/// A batch with merges resolved, ready to apply
///
/// Applying removes `ranges`, then `deletes`, then inserts `sets`; the point
/// records always postdate the range deletes they overlap.
#[derive(Debug, Default)]
pub(crate) struct ResolvedBatch {
    pub(crate) ranges: Vec<(Vec<u8>, Vec<u8>)>,
    pub(crate) deletes: Vec<Vec<u8>>,
    pub(crate) sets: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl ResolvedBatch {
    /// Resolve a batch whose records are in strictly ascending key order
    ///
    /// No key repeats, so no index is needed: each merge reads the snapshot
    /// directly unless an earlier range delete covers it.
    pub(crate) fn sequential(
        ops: Vec<BatchOp>,
        base: &Snapshot,
        merge: Option<&dyn MergeOperator>,
    ) -> Result<Self> {
        let mut resolved = ResolvedBatch::default();
        let mut run: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        for op in ops {
            match op {
                BatchOp::Set { key, value } => run.push((key, value)),
                BatchOp::Delete { key } => resolved.deletes.push(key),
                BatchOp::Merge { key, value } => {
                    let existing = if resolved
                        .ranges
                        .iter()
                        .any(|(s, e)| s.as_slice() <= key.as_slice() && key.as_slice() < e.as_slice())
                    {
                        None
                    } else {
                        base.get(&key)?
                    };
                    let operator = merge.ok_or_else(|| {
                        Error::InvalidOperation("merge record without a merge operator".to_string())
                    })?;
                    let merged = operator.full_merge(&key, existing.as_deref(), &[value])?;
                    run.push((key, merged));
                }
                BatchOp::RangeDelete { start, end } => {
                    if start < end {
                        resolved.ranges.push((start, end));
                    }
                }
            }
        }
        // Ascending input: the run is already sorted, so this is a linear bulk build.
        resolved.sets = run.into_iter().collect();
        Ok(resolved)
    }

    /// Records equivalent to this batch, for the persistent log
    pub(crate) fn to_ops(&self) -> Vec<BatchOp> {
        let mut ops = Vec::with_capacity(self.ranges.len() + self.deletes.len() + self.sets.len());
        ops.extend(self.ranges.iter().map(|(start, end)| BatchOp::RangeDelete {
            start: start.clone(),
            end: end.clone(),
        }));
        ops.extend(
            self.deletes
                .iter()
                .map(|key| BatchOp::Delete { key: key.clone() }),
        );
        ops.extend(self.sets.iter().map(|(key, value)| BatchOp::Set {
            key: key.clone(),
            value: value.clone(),
        }));
        ops
    }

    /// Number of point and range records
    pub(crate) fn len(&self) -> usize {
        self.ranges.len() + self.deletes.len() + self.sets.len()
    }

    /// Apply to the map; infallible
    pub(crate) fn apply_to(self, map: &mut KvMap) {
        for (start, end) in &self.ranges {
            let doomed: Vec<Vec<u8>> = map
                .range::<[u8], _>((Bound::Included(start.as_slice()), Bound::Excluded(end.as_slice())))
                .map(|(k, _)| k.clone())
                .collect();
            for key in doomed {
                map.remove(&key);
            }
        }
        for key in &self.deletes {
            map.remove(key);
        }
        let mut sets = self.sets;
        map.append(&mut sets);
    }
}

/// Read view of an indexed batch layered over a snapshot
///
/// Keys written by the batch take their pending value; keys deleted by it
/// (directly or by range) are hidden; everything else reads through.
pub struct BatchView<'a> {
    snapshot: Snapshot,
    index: &'a BatchIndex,
    merge: Option<&'a dyn MergeOperator>,
}

impl<'a> BatchView<'a> {
    pub(crate) fn new(
        snapshot: Snapshot,
        index: &'a BatchIndex,
        merge: Option<&'a dyn MergeOperator>,
    ) -> Self {
        BatchView {
            snapshot,
            index,
            merge,
        }
    }

    /// First snapshot entry `>= key` not shadowed by the batch
    fn snapshot_ge(&self, key: &[u8]) -> Result<Option<KvPair>> {
        let mut cursor = key.to_vec();
        loop {
            let Some((k, v)) = self.snapshot.seek_ge(&cursor)? else {
                return Ok(None);
            };
            if let Some((_, end)) = self.index.covering_range(&k) {
                cursor = end.clone();
            } else if self.index.entries.contains_key(&k) {
                cursor = successor(&k);
            } else {
                return Ok(Some((k, v)));
            }
        }
    }

    /// Last snapshot entry `< key` not shadowed by the batch
    fn snapshot_lt(&self, key: Option<&[u8]>) -> Result<Option<KvPair>> {
        let mut cursor = key.map(|k| k.to_vec());
        loop {
            let Some((k, v)) = self.snapshot.seek_lt(cursor.as_deref())? else {
                return Ok(None);
            };
            if let Some((start, _)) = self.index.covering_range(&k) {
                cursor = Some(start.clone());
            } else if self.index.entries.contains_key(&k) {
                cursor = Some(k);
            } else {
                return Ok(Some((k, v)));
            }
        }
    }

    /// Resolve index entries in the given order, returning the first live one
    fn first_live<'i>(
        &self,
        entries: impl Iterator<Item = (&'i Vec<u8>, &'i PendingEntry)>,
    ) -> Result<Option<KvPair>> {
        for (key, entry) in entries {
            if let Some(value) = resolve_entry(key, entry, &self.snapshot, self.merge)? {
                return Ok(Some((key.clone(), value)));
            }
        }
        Ok(None)
    }
}

impl Reader for BatchView<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.index.lookup(key, &self.snapshot, self.merge)? {
            Some(pending) => Ok(pending),
            None => self.snapshot.get(key),
        }
    }

    fn seek_ge(&self, key: &[u8]) -> Result<Option<KvPair>> {
        let pending = self.first_live(
            self.index
                .entries
                .range::<[u8], _>((Bound::Included(key), Bound::Unbounded)),
        )?;
        let stored = self.snapshot_ge(key)?;
        Ok(match (pending, stored) {
            (Some(p), Some(s)) => Some(if p.0 <= s.0 { p } else { s }),
            (p, s) => p.or(s),
        })
    }

    fn seek_lt(&self, key: Option<&[u8]>) -> Result<Option<KvPair>> {
        let pending = match key {
            Some(key) => self.first_live(
                self.index
                    .entries
                    .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
                    .rev(),
            )?,
            None => self.first_live(self.index.entries.iter().rev())?,
        };
        let stored = self.snapshot_lt(key)?;
        Ok(match (pending, stored) {
            (Some(p), Some(s)) => Some(if p.0 >= s.0 { p } else { s }),
            (p, s) => p.or(s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Direction;
    use std::sync::Arc;

    /// Concatenates operands onto the existing value
    struct Concat;

    impl MergeOperator for Concat {
        fn name(&self) -> &str {
            "concat"
        }

        fn full_merge(
            &self,
            _key: &[u8],
            existing: Option<&[u8]>,
            operands: &[Vec<u8>],
        ) -> Result<Vec<u8>> {
            let mut out = existing.map(|e| e.to_vec()).unwrap_or_default();
            for op in operands {
                out.extend_from_slice(op);
            }
            Ok(out)
        }
    }

    fn base(pairs: &[(&str, &str)]) -> Snapshot {
        let map: KvMap = pairs
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect();
        Snapshot::new(Arc::new(map))
    }

    fn index(ops: Vec<BatchOp>) -> BatchIndex {
        let mut index = BatchIndex::default();
        for op in &ops {
            index.apply(op);
        }
        index
    }

    fn set(k: &str, v: &str) -> BatchOp {
        BatchOp::Set {
            key: k.into(),
            value: v.into(),
        }
    }

    fn merge(k: &str, v: &str) -> BatchOp {
        BatchOp::Merge {
            key: k.into(),
            value: v.into(),
        }
    }

    fn range_delete(s: &str, e: &str) -> BatchOp {
        BatchOp::RangeDelete {
            start: s.into(),
            end: e.into(),
        }
    }

    fn scan(view: &BatchView<'_>, direction: Direction) -> Vec<(String, String)> {
        view.iter(b"", None, direction)
            .map(|kv| {
                let (k, v) = kv.unwrap();
                (String::from_utf8(k).unwrap(), String::from_utf8(v).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_view_reads_own_writes() {
        let snap = base(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let idx = index(vec![set("b", "20"), BatchOp::Delete { key: "c".into() }, set("d", "4")]);
        let view = BatchView::new(snap, &idx, None);

        assert_eq!(view.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(view.get(b"b").unwrap(), Some(b"20".to_vec()));
        assert_eq!(view.get(b"c").unwrap(), None);
        assert_eq!(
            scan(&view, Direction::Forward),
            vec![
                ("a".into(), "1".into()),
                ("b".into(), "20".into()),
                ("d".into(), "4".into())
            ]
        );
    }

    #[test]
    fn test_view_reverse_matches_forward() {
        let snap = base(&[("a", "1"), ("c", "3"), ("e", "5"), ("g", "7")]);
        let idx = index(vec![range_delete("b", "f"), set("d", "x"), set("h", "y")]);
        let view = BatchView::new(snap, &idx, None);

        let forward = scan(&view, Direction::Forward);
        let mut reverse = scan(&view, Direction::Reverse);
        reverse.reverse();
        assert_eq!(forward, reverse);
        let keys: Vec<_> = forward.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "d", "g", "h"]);
    }

    #[test]
    fn test_merge_folds_over_engine_value() {
        let snap = base(&[("k", "base")]);
        let idx = index(vec![merge("k", "+1"), merge("k", "+2")]);
        let view = BatchView::new(snap.clone(), &idx, Some(&Concat));
        assert_eq!(view.get(b"k").unwrap(), Some(b"base+1+2".to_vec()));

        let resolved = idx.resolve(&snap, Some(&Concat)).unwrap();
        assert_eq!(resolved.sets.get(b"k".as_slice()), Some(&b"base+1+2".to_vec()));
    }

    #[test]
    fn test_merge_after_set_and_delete() {
        let snap = base(&[("k", "old")]);
        let idx = index(vec![set("k", "new"), merge("k", "!")]);
        let view = BatchView::new(snap.clone(), &idx, Some(&Concat));
        assert_eq!(view.get(b"k").unwrap(), Some(b"new!".to_vec()));

        let idx = index(vec![BatchOp::Delete { key: "k".into() }, merge("k", "!")]);
        let view = BatchView::new(snap.clone(), &idx, Some(&Concat));
        assert_eq!(view.get(b"k").unwrap(), Some(b"!".to_vec()));

        let idx = index(vec![range_delete("a", "z"), merge("k", "!")]);
        let view = BatchView::new(snap, &idx, Some(&Concat));
        assert_eq!(view.get(b"k").unwrap(), Some(b"!".to_vec()));
    }

    #[test]
    fn test_merge_without_operator_fails() {
        let snap = base(&[]);
        let idx = index(vec![merge("k", "1")]);
        assert!(matches!(
            idx.resolve(&snap, None),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_set_after_range_delete_survives() {
        let snap = base(&[("b", "old")]);
        let idx = index(vec![set("c", "gone"), range_delete("a", "d"), set("b", "kept")]);
        let resolved = idx.resolve(&snap, None).unwrap();

        let mut map: KvMap = [(b"b".to_vec(), b"old".to_vec())].into_iter().collect();
        resolved.apply_to(&mut map);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(b"b".as_slice()), Some(&b"kept".to_vec()));
    }

    #[test]
    fn test_sequential_resolution() {
        let snap = base(&[("a", "x"), ("c", "y")]);
        let ops = vec![set("a", "1"), range_delete("b", "d"), merge("c", "m"), set("e", "5")];
        let resolved = ResolvedBatch::sequential(ops, &snap, Some(&Concat)).unwrap();
        assert_eq!(resolved.sets.get(b"c".as_slice()), Some(&b"m".to_vec()));

        let mut map: KvMap = [(b"a".to_vec(), b"x".to_vec()), (b"c".to_vec(), b"y".to_vec())]
            .into_iter()
            .collect();
        resolved.apply_to(&mut map);
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec(), b"e".to_vec()]);
    }
}
