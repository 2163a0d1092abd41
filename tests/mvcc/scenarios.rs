//! Acceptance scenarios on a single key `a`.

use crate::common::*;
use strata_mvcc::{CancelSignal, Error, Key, MergeValue, ScanOptions};
use strata_storage::testing::CrashPoint;

#[test]
fn scenario_a_reads_respect_timestamps() {
    let store = memory_store();
    store.put(b"a", b"v1", ts(10), None).unwrap();

    assert!(store.get(b"a", ts(5), None).unwrap().is_none());
    let read = store.get(b"a", ts(10), None).unwrap().unwrap();
    assert_eq!(read.value, b"v1");
    assert_eq!(read.timestamp, ts(10));
}

#[test]
fn scenario_b_write_below_existing_is_too_old() {
    let store = memory_store();
    store.put(b"a", b"v1", ts(10), None).unwrap();

    let err = store.put(b"a", b"v2", ts(5), None).unwrap_err();
    assert!(err.is_retryable());
    match err {
        Error::WriteTooOld {
            key,
            existing,
            requested,
        } => {
            assert_eq!(key, Key::from("a"));
            assert_eq!(existing, ts(10));
            assert_eq!(requested, ts(5));
        }
        other => panic!("expected WriteTooOld, got {other:?}"),
    }
    // Equal timestamps conflict too
    assert!(matches!(
        store.put(b"a", b"v2", ts(10), None),
        Err(Error::WriteTooOld { .. })
    ));
    store.verify_stats().unwrap();
}

#[test]
fn scenario_c_conditional_put_replaces_expected_value() {
    let store = memory_store();
    store.put(b"a", b"v1", ts(10), None).unwrap();

    store
        .conditional_put(b"a", Some(b"v1"), b"v3", ts(20), None)
        .unwrap();
    assert_eq!(value_of(store.get(b"a", ts(20), None).unwrap()), Some(b"v3".to_vec()));
    assert_eq!(value_of(store.get(b"a", ts(15), None).unwrap()), Some(b"v1".to_vec()));

    // A stale expectation fails and reports the actual value
    let err = store
        .conditional_put(b"a", Some(b"v1"), b"v4", ts(30), None)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ConditionFailed { actual: Some(ref v), .. } if v == b"v3"
    ));
}

#[test]
fn scenario_d_gc_removes_shadowed_version() {
    let store = memory_store();
    store.put(b"a", b"v1", ts(10), None).unwrap();
    store
        .conditional_put(b"a", Some(b"v1"), b"v3", ts(20), None)
        .unwrap();

    let outcome = store.gc(b"", None, ts(20), &CancelSignal::new()).unwrap();
    assert_eq!(outcome.versions_removed, 1);
    assert!(outcome.bytes_reclaimed > 0);

    assert!(store.get(b"a", ts(12), None).unwrap().is_none());
    assert_eq!(value_of(store.get(b"a", ts(20), None).unwrap()), Some(b"v3".to_vec()));
    store.verify_stats().unwrap();
}

#[test]
fn scenario_e_failed_batch_repr_applies_nothing() {
    let store = memory_store();
    let repr = {
        let mut batch = store.batch();
        batch.put(b"x", b"1", ts(10), None).unwrap();
        batch.put(b"y", b"2", ts(10), None).unwrap();
        batch.put(b"z", b"3", ts(10), None).unwrap();
        batch.into_repr().unwrap()
    };

    store.engine().arm_crash_point(CrashPoint::BeforeLogAppend);
    let err = store.apply_batch_repr(&repr, true, false).unwrap_err();
    assert!(matches!(err, Error::InjectedFault(_)));

    let scan = store.scan(b"", None, ts(100), &ScanOptions::default()).unwrap();
    assert!(scan.kvs.is_empty());
    assert!(store.stats().unwrap().is_zero());

    // The representation still applies once the fault is gone
    store.apply_batch_repr(&repr, true, false).unwrap();
    let scan = store.scan(b"", None, ts(100), &ScanOptions::default()).unwrap();
    assert_eq!(scan.kvs.len(), 3);
    store.verify_stats().unwrap();
}

#[test]
fn init_put_and_tombstones() {
    let store = memory_store();
    store.init_put(b"i", b"v", false, ts(10), None).unwrap();
    // An equal value is rewritten, so it must still be newer
    assert!(matches!(
        store.init_put(b"i", b"v", false, ts(5), None),
        Err(Error::WriteTooOld { .. })
    ));
    store.init_put(b"i", b"v", false, ts(15), None).unwrap();
    assert!(matches!(
        store.init_put(b"i", b"other", false, ts(20), None),
        Err(Error::InitPutFailed { .. })
    ));

    store.delete(b"i", ts(30), None).unwrap();
    assert!(matches!(
        store.init_put(b"i", b"w", true, ts(40), None),
        Err(Error::InitPutFailed { actual: None, .. })
    ));
    store.init_put(b"i", b"w", false, ts(40), None).unwrap();
    assert_eq!(value_of(store.get(b"i", ts(40), None).unwrap()), Some(b"w".to_vec()));
    store.verify_stats().unwrap();
}

#[test]
fn merges_reduce_onto_base_value() {
    let store = memory_store();
    store
        .put(b"n", &MergeValue::Counter(10).encode().unwrap(), ts(5), None)
        .unwrap();
    store.merge(b"n", &MergeValue::Counter(2), ts(10)).unwrap();
    store.merge(b"n", &MergeValue::Counter(3), ts(20)).unwrap();

    let at = |wall| {
        let read = store.get(b"n", ts(wall), None).unwrap().unwrap();
        MergeValue::decode(&read.value).unwrap()
    };
    assert_eq!(at(5), MergeValue::Counter(10));
    assert_eq!(at(15), MergeValue::Counter(12));
    assert_eq!(at(25), MergeValue::Counter(15));
    store.verify_stats().unwrap();
}

#[test]
fn zero_timestamp_and_limits_are_rejected() {
    let store = memory_store();
    assert!(matches!(
        store.put(b"a", b"v", strata_mvcc::Timestamp::ZERO, None),
        Err(Error::InvalidArgument(_))
    ));

    let small = strata_mvcc::MvccStore::open(
        strata_mvcc::MvccConfig::in_memory().with_limits(strata_mvcc::Limits::with_small_limits()),
    )
    .unwrap();
    assert!(matches!(
        small.put(&[b'k'; 101], b"v", ts(1), None),
        Err(Error::Limit(_))
    ));
    assert!(matches!(
        small.put(b"k", &[0u8; 1001], ts(1), None),
        Err(Error::Limit(_))
    ));
    assert!(small.stats().unwrap().is_zero());
}
