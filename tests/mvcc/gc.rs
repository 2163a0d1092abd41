//! Garbage collection through the store.

use std::sync::Arc;
use std::thread;

use crate::common::*;
use strata_mvcc::{
    CancelSignal, GcTask, Key, MergeValue, MvccConfig, MvccStore, TxnMeta,
};

#[test]
fn gc_keeps_everything_readable_at_or_above_threshold() {
    let store = memory_store();
    for wall in [10, 20, 30, 40] {
        store
            .put(b"a", format!("v{wall}").as_bytes(), ts(wall), None)
            .unwrap();
    }

    let outcome = store.gc(b"", None, ts(25), &CancelSignal::new()).unwrap();
    assert_eq!(outcome.versions_removed, 1);

    for (wall, expected) in [(25, "v20"), (30, "v30"), (45, "v40")] {
        assert_eq!(
            value_of(store.get(b"a", ts(wall), None).unwrap()),
            Some(expected.as_bytes().to_vec())
        );
    }
    store.verify_stats().unwrap();
}

#[test]
fn gc_is_idempotent() {
    let store = memory_store();
    for i in 0..20u64 {
        let key = format!("k{}", i % 5);
        store.put(key.as_bytes(), b"v", ts(i + 1), None).unwrap();
    }

    let first = store.gc(b"", None, ts(100), &CancelSignal::new()).unwrap();
    assert_eq!(first.versions_removed, 15);
    let stats = store.verify_stats().unwrap();

    let second = store.gc(b"", None, ts(100), &CancelSignal::new()).unwrap();
    assert_eq!(second.versions_removed, 0);
    assert_eq!(second.keys_scanned, 5);
    assert_eq!(store.stats().unwrap(), stats);
}

#[test]
fn gc_respects_range_bounds() {
    let store = memory_store();
    for key in [b"a", b"b", b"c"] {
        store.put(key, b"1", ts(1), None).unwrap();
        store.put(key, b"2", ts(2), None).unwrap();
    }

    let outcome = store
        .gc(b"b", Some(b"c"), ts(10), &CancelSignal::new())
        .unwrap();
    assert_eq!(outcome.keys_scanned, 1);
    assert_eq!(outcome.versions_removed, 1);
    assert_eq!(
        value_of(store.get(b"a", ts(1), None).unwrap()),
        Some(b"1".to_vec())
    );
    assert!(store.get(b"b", ts(1), None).unwrap().is_none());
    store.verify_stats().unwrap();
}

#[test]
fn gc_keeps_merge_chain_and_its_base() {
    let store = memory_store();
    store
        .put(b"n", &MergeValue::Counter(1).encode().unwrap(), ts(5), None)
        .unwrap();
    store
        .put(b"n", &MergeValue::Counter(100).encode().unwrap(), ts(10), None)
        .unwrap();
    store.merge(b"n", &MergeValue::Counter(2), ts(20)).unwrap();
    store.merge(b"n", &MergeValue::Counter(3), ts(30)).unwrap();

    let outcome = store.gc(b"", None, ts(30), &CancelSignal::new()).unwrap();
    assert_eq!(outcome.versions_removed, 1);

    let read = store.get(b"n", ts(30), None).unwrap().unwrap();
    assert_eq!(MergeValue::decode(&read.value).unwrap(), MergeValue::Counter(105));
    store.verify_stats().unwrap();
}

#[test]
fn gc_never_removes_intents() {
    let store = memory_store();
    store.put(b"a", b"old", ts(10), None).unwrap();
    let txn = TxnMeta::new(ts(20));
    store.put(b"a", b"p", ts(20), Some(&txn)).unwrap();

    let outcome = store.gc(b"", None, ts(50), &CancelSignal::new()).unwrap();
    assert_eq!(outcome.versions_removed, 0);
    assert_eq!(
        value_of(store.get(b"a", ts(50), Some(&txn)).unwrap()),
        Some(b"p".to_vec())
    );
    assert_eq!(store.verify_stats().unwrap().intent_count, 1);
}

#[test]
fn gc_in_small_batches_runs_alongside_writers() {
    init_tracing();
    let store = Arc::new(
        MvccStore::open(MvccConfig::in_memory().with_gc_batch_keys(2)).unwrap(),
    );
    for i in 0..10u64 {
        for wall in 1..=3 {
            store
                .put(format!("g{i}").as_bytes(), b"old", ts(wall), None)
                .unwrap();
        }
    }

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for wall in 100..150u64 {
                store
                    .put(format!("w{}", wall % 7).as_bytes(), b"new", ts(wall), None)
                    .unwrap();
            }
        })
    };
    let task = GcTask::spawn(Arc::clone(&store), Key::from("g"), Some(Key::from("h")), ts(50));
    let outcome = task.join().unwrap();
    writer.join().unwrap();

    assert_eq!(outcome.versions_removed, 20);
    assert!(!outcome.cancelled);
    store.verify_stats().unwrap();
}

#[test]
fn cancelled_pass_stops_scanning_clean_keys() {
    let store = memory_store();
    for i in 0..50u64 {
        store
            .put(format!("c{i:02}").as_bytes(), b"v", ts(1), None)
            .unwrap();
    }

    let cancel = CancelSignal::new();
    cancel.cancel();
    let outcome = store.gc(b"", None, ts(10), &cancel).unwrap();
    assert!(outcome.cancelled);
    assert_eq!(outcome.keys_scanned, 0);
}

#[test]
fn failed_pass_reports_error_and_leaves_data() {
    init_tracing();
    let test = TestStore::new();
    test.store.put(b"a", b"1", ts(1), None).unwrap();
    test.store.put(b"a", b"2", ts(2), None).unwrap();
    test.store.close().unwrap();

    assert!(matches!(
        test.store.gc(b"", None, ts(10), &CancelSignal::new()),
        Err(strata_mvcc::Error::Closed)
    ));

    let test = test.reopen();
    let store = &test.store;
    assert_eq!(
        value_of(store.get(b"a", ts(1), None).unwrap()),
        Some(b"1".to_vec())
    );
    let outcome = store.gc(b"", None, ts(10), &CancelSignal::new()).unwrap();
    assert_eq!(outcome.versions_removed, 1);
    store.verify_stats().unwrap();
}
