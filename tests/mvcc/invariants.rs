//! Properties that must hold after any sequence of operations:
//! - recorded stats equal a full recomputation
//! - forward and reverse scans see the same set
//! - paged scans see the same set as unpaged ones
//! - scans agree with point reads

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::*;
use strata_mvcc::{
    CancelSignal, Error, Key, MergeValue, MvccStore, ScanOptions, Timestamp, TxnMeta, TxnStatus,
};

const KEYS: usize = 12;

fn key(i: usize) -> Vec<u8> {
    format!("k{:02}", i).into_bytes()
}

fn counter_key(i: usize) -> Vec<u8> {
    format!("m{:02}", i % 3).into_bytes()
}

/// Run a random mix of every write operation. Conflicts are expected and
/// must leave no trace; any other error fails the test.
fn random_workload(store: &MvccStore, rng: &mut StdRng, steps: usize) {
    let mut open: Vec<(Vec<u8>, TxnMeta)> = Vec::new();
    for step in 0..steps {
        let wall = 10 + step as u64;
        let k = key(rng.gen_range(0..KEYS));
        let value = format!("v{}", rng.gen_range(0..4)).into_bytes();
        let result = match rng.gen_range(0..11) {
            0 | 1 => store.put(&k, &value, ts(wall), None),
            2 => store.delete(&k, ts(wall), None),
            3 => store.conditional_put(&k, Some(b"v1"), &value, ts(wall), None),
            4 => store.init_put(&k, &value, rng.gen_bool(0.5), ts(wall), None),
            5 => store.merge(&counter_key(step), &MergeValue::Counter(1), ts(wall)),
            6 => {
                let txn = TxnMeta::new(ts(wall));
                let result = store.put(&k, &value, ts(wall), Some(&txn));
                if result.is_ok() {
                    open.push((k, txn));
                }
                result
            }
            7 if !open.is_empty() => {
                let (k, txn) = open.swap_remove(rng.gen_range(0..open.len()));
                let status = if rng.gen_bool(0.5) {
                    TxnStatus::Committed {
                        commit_timestamp: ts(wall),
                    }
                } else {
                    TxnStatus::Aborted
                };
                store.resolve_intent(&k, &txn, status).map(|_| ())
            }
            8 => store
                .gc(b"", None, ts(wall.saturating_sub(5)), &CancelSignal::new())
                .map(|_| ()),
            9 => {
                let txn = TxnMeta::new(ts(wall));
                let result = store.blind_put(&k, &value, ts(wall), Some(&txn));
                if result.is_ok() {
                    open.push((k, txn));
                }
                result
            }
            _ => store.blind_put(&k, &value, ts(wall), None),
        };
        if let Err(e) = result {
            assert!(
                matches!(
                    e,
                    Error::WriteTooOld { .. }
                        | Error::ConditionFailed { .. }
                        | Error::InitPutFailed { .. }
                        | Error::WriteIntentConflict { .. }
                ),
                "step {step}: {e}"
            );
        }
    }
}

#[test]
fn stats_match_recomputation_after_random_workload() {
    for seed in 0..8u64 {
        let store = memory_store();
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..10 {
            random_workload(&store, &mut rng, 30);
            store
                .verify_stats()
                .unwrap_or_else(|e| panic!("seed {seed}: {e}"));
        }
    }
}

#[test]
fn stats_of_subranges_add_up() {
    let store = memory_store();
    random_workload(&store, &mut StdRng::seed_from_u64(7), 200);

    let whole = store.compute_stats(b"", None).unwrap();
    let left = store.compute_stats(b"", Some(b"k06")).unwrap();
    let right = store.compute_stats(b"k06", None).unwrap();
    assert_eq!(left + right, whole);
    assert_eq!(store.stats().unwrap(), whole);
}

#[test]
fn recompute_stats_repairs_out_of_band_damage() {
    let store = memory_store();
    store.put(b"a", b"v", ts(10), None).unwrap();

    // Write a raw record the incremental stats never saw
    let mut raw = store.engine().new_batch();
    raw.set(
        strata_mvcc::keys::version_key(b"b", ts(5)),
        strata_mvcc::VersionPayload::Value(b"x".to_vec()).encode().unwrap(),
    );
    store.engine().commit(raw).unwrap();
    assert!(matches!(
        store.verify_stats(),
        Err(Error::StatsInconsistency { .. })
    ));

    let correction = store.recompute_stats().unwrap();
    assert_eq!(correction.key_count, 1);
    store.verify_stats().unwrap();
}

fn populate(store: &MvccStore, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for step in 0..150u64 {
        let k = key(rng.gen_range(0..KEYS));
        let wall = 10 + step;
        let _ = if rng.gen_bool(0.2) {
            store.delete(&k, ts(wall), None)
        } else {
            store.put(&k, format!("v{step}").as_bytes(), ts(wall), None)
        };
    }
}

fn keys_of(result: &strata_mvcc::ScanResult) -> Vec<Key> {
    result.kvs.iter().map(|(k, _)| k.clone()).collect()
}

#[test]
fn reverse_scan_is_forward_scan_reversed() {
    let store = memory_store();
    populate(&store, 3);

    for wall in [5, 40, 90, 200] {
        let forward = store.scan(b"", None, ts(wall), &ScanOptions::default()).unwrap();
        let reverse = store
            .reverse_scan(b"", None, ts(wall), &ScanOptions::default())
            .unwrap();
        let mut reversed = reverse.kvs.clone();
        reversed.reverse();
        assert_eq!(forward.kvs, reversed, "read ts {wall}");

        // Every key agrees with a point read
        for i in 0..KEYS {
            let point = store.get(&key(i), ts(wall), None).unwrap();
            let scanned = forward
                .kvs
                .iter()
                .find(|(k, _)| k.as_bytes() == key(i).as_slice())
                .map(|(_, v)| v.clone());
            assert_eq!(point, scanned);
        }
    }
}

#[test]
fn paged_scans_cover_the_same_keys() {
    let store = memory_store();
    populate(&store, 11);
    let read_ts = Timestamp::from_wall(500);
    let full = store.scan(b"", None, read_ts, &ScanOptions::default()).unwrap();

    let mut forward = Vec::new();
    let mut start = Key::min();
    loop {
        let page = store
            .scan(&start, None, read_ts, &ScanOptions::default().with_max_keys(3))
            .unwrap();
        assert!(page.kvs.len() <= 3);
        forward.extend(keys_of(&page));
        match page.resume_key {
            Some(resume) => start = resume,
            None => break,
        }
    }
    assert_eq!(forward, keys_of(&full));

    let mut backward = Vec::new();
    let mut end: Option<Key> = None;
    loop {
        let page = store
            .reverse_scan(b"", end.as_deref(), read_ts, &ScanOptions::default().with_max_keys(2))
            .unwrap();
        backward.extend(keys_of(&page));
        match page.resume_key {
            Some(resume) => end = Some(resume.next()),
            None => break,
        }
    }
    backward.reverse();
    assert_eq!(backward, keys_of(&full));
}

#[test]
fn scanner_iterates_lazily_in_both_directions() {
    let store = memory_store();
    populate(&store, 5);
    let read_ts = ts(500);
    let full = store.scan(b"", None, read_ts, &ScanOptions::default()).unwrap();

    let lazy: Vec<Key> = store
        .scanner(b"", None, read_ts, &ScanOptions::default())
        .unwrap()
        .map(|kv| kv.unwrap().0)
        .collect();
    assert_eq!(lazy, keys_of(&full));

    let bounded = store
        .scan(b"k03", Some(b"k07"), read_ts, &ScanOptions::default())
        .unwrap();
    assert!(bounded
        .kvs
        .iter()
        .all(|(k, _)| k.as_bytes() >= b"k03".as_slice() && k.as_bytes() < b"k07".as_slice()));
}

#[test]
fn split_key_balances_weight() {
    let store = memory_store();
    for i in 0..10 {
        store.put(&key(i), &[b'x'; 100], ts(10), None).unwrap();
    }

    let split = store.find_balanced_split_key(b"", None).unwrap().unwrap();
    assert!(split.as_bytes() > key(3).as_slice() && split.as_bytes() < key(7).as_slice());

    let left = store.compute_stats(b"", Some(&split)).unwrap().total_bytes();
    let right = store.compute_stats(&split, None).unwrap().total_bytes();
    assert!((left - right).abs() <= 2 * (left / 5).max(1));

    // A single key never splits
    let single = memory_store();
    single.put(b"only", b"v", ts(1), None).unwrap();
    assert!(single.find_balanced_split_key(b"", None).unwrap().is_none());
}
