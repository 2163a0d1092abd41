//! Provisional writes: visibility, conflicts and resolution.

use crate::common::*;
use strata_mvcc::{Error, GetOptions, Key, ScanOptions, TxnMeta, TxnStatus};

#[test]
fn foreign_intent_blocks_reads_at_or_above_it() {
    let store = memory_store();
    store.put(b"a", b"committed", ts(10), None).unwrap();
    let txn = TxnMeta::new(ts(20));
    store.put(b"a", b"provisional", ts(20), Some(&txn)).unwrap();

    // Below the intent the committed value is visible
    assert_eq!(
        value_of(store.get(b"a", ts(15), None).unwrap()),
        Some(b"committed".to_vec())
    );
    // At or above it, a foreign reader conflicts
    assert!(matches!(
        store.get(b"a", ts(25), None),
        Err(Error::WriteIntentConflict { txn: owner, .. }) if owner.same_txn(&txn)
    ));
    // The owner reads its own write
    assert_eq!(
        value_of(store.get(b"a", ts(25), Some(&txn)).unwrap()),
        Some(b"provisional".to_vec())
    );
    // An inconsistent read skips the intent and reports it
    let read = store
        .get_with_options(b"a", ts(25), &GetOptions::default().inconsistent())
        .unwrap();
    assert_eq!(read.value.unwrap().value, b"committed");
    assert_eq!(read.intent.unwrap().key, Key::from("a"));
    store.verify_stats().unwrap();
}

#[test]
fn foreign_writers_conflict_on_intent() {
    let store = memory_store();
    let txn = TxnMeta::new(ts(20));
    store.put(b"a", b"p", ts(20), Some(&txn)).unwrap();

    assert!(matches!(
        store.put(b"a", b"x", ts(30), None),
        Err(Error::WriteIntentConflict { .. })
    ));
    assert!(matches!(
        store.put(b"a", b"x", ts(30), Some(&TxnMeta::new(ts(30)))),
        Err(Error::WriteIntentConflict { .. })
    ));
    assert!(matches!(
        store.merge(b"a", &strata_mvcc::MergeValue::Counter(1), ts(30)),
        Err(Error::WriteIntentConflict { .. })
    ));
}

#[test]
fn conditional_writes_conflict_on_foreign_intent() {
    let store = memory_store();
    store.put(b"a", b"v", ts(10), None).unwrap();
    let owner = TxnMeta::new(ts(20));
    store.init_put(b"a", b"v", false, ts(20), Some(&owner)).unwrap();
    assert_eq!(store.stats().unwrap().intent_count, 1);

    let other = TxnMeta::new(ts(30));
    assert!(matches!(
        store.init_put(b"a", b"v", false, ts(30), Some(&other)),
        Err(Error::WriteIntentConflict { txn: found, .. }) if found.same_txn(&owner)
    ));
    assert!(matches!(
        store.conditional_put(b"a", Some(b"v"), b"w", ts(30), Some(&other)),
        Err(Error::WriteIntentConflict { .. })
    ));
    assert!(matches!(
        store.put(b"a", b"w", ts(30), None),
        Err(Error::WriteIntentConflict { .. })
    ));
    store.verify_stats().unwrap();
}

#[test]
fn blind_writes_never_replace_a_foreign_intent() {
    let store = memory_store();
    let owner = TxnMeta::new(ts(10));
    store.put(b"k", b"uncommitted", ts(10), Some(&owner)).unwrap();

    let other = TxnMeta::new(ts(20));
    assert!(matches!(
        store.blind_put(b"k", b"B", ts(20), Some(&other)),
        Err(Error::WriteIntentConflict { .. })
    ));
    assert!(!store.resolve_intent(b"k", &other, TxnStatus::Aborted).unwrap());

    // The provisional value is still owned and hidden from committed reads
    assert!(matches!(
        store.get(b"k", ts(15), None),
        Err(Error::WriteIntentConflict { .. })
    ));
    assert!(store.resolve_intent(b"k", &owner, TxnStatus::Aborted).unwrap());
    assert!(store.get(b"k", ts(15), None).unwrap().is_none());
    store.verify_stats().unwrap();
}

#[test]
fn commit_moves_provisional_to_commit_timestamp() {
    let store = memory_store();
    let txn = TxnMeta::new(ts(20));
    store.put(b"a", b"p", ts(20), Some(&txn)).unwrap();

    let resolved = store
        .resolve_intent(
            b"a",
            &txn,
            TxnStatus::Committed {
                commit_timestamp: ts(25),
            },
        )
        .unwrap();
    assert!(resolved);

    assert!(store.get(b"a", ts(22), None).unwrap().is_none());
    let read = store.get(b"a", ts(30), None).unwrap().unwrap();
    assert_eq!(read.value, b"p");
    assert_eq!(read.timestamp, ts(25));
    assert_eq!(store.stats().unwrap().intent_count, 0);
    store.verify_stats().unwrap();

    // Resolving again finds nothing
    assert!(!store.resolve_intent(b"a", &txn, TxnStatus::Aborted).unwrap());
}

#[test]
fn abort_restores_previous_value() {
    let store = memory_store();
    store.put(b"a", b"old", ts(10), None).unwrap();
    let txn = TxnMeta::new(ts(20));
    store.delete(b"a", ts(20), Some(&txn)).unwrap();
    assert_eq!(store.stats().unwrap().intent_count, 1);

    assert!(store.resolve_intent(b"a", &txn, TxnStatus::Aborted).unwrap());
    assert_eq!(
        value_of(store.get(b"a", ts(30), None).unwrap()),
        Some(b"old".to_vec())
    );
    let stats = store.verify_stats().unwrap();
    assert_eq!(stats.intent_count, 0);
    assert_eq!(stats.live_count, 1);
}

#[test]
fn rewriting_own_intent_replaces_provisional() {
    let store = memory_store();
    let txn = TxnMeta::new(ts(20));
    store.put(b"a", b"first", ts(20), Some(&txn)).unwrap();
    let pushed = txn.with_write_timestamp(ts(30));
    store.put(b"a", b"second", ts(30), Some(&pushed)).unwrap();

    let read = store.get(b"a", ts(40), Some(&pushed)).unwrap().unwrap();
    assert_eq!(read.value, b"second");
    assert_eq!(read.timestamp, ts(30));
    let stats = store.verify_stats().unwrap();
    assert_eq!(stats.val_count, 1);
    assert_eq!(stats.intent_count, 1);
}

#[test]
fn stale_epoch_writer_is_rejected() {
    let store = memory_store();
    let txn = TxnMeta::new(ts(20));
    let restarted = txn.restart(ts(30));
    store.put(b"a", b"new", ts(30), Some(&restarted)).unwrap();

    assert!(matches!(
        store.put(b"a", b"old", ts(35), Some(&txn)),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn inconsistent_scan_reports_intents() {
    let store = memory_store();
    store.put(b"a", b"1", ts(10), None).unwrap();
    store.put(b"b", b"2", ts(10), None).unwrap();
    let txn = TxnMeta::new(ts(20));
    store.put(b"b", b"3", ts(20), Some(&txn)).unwrap();

    assert!(matches!(
        store.scan(b"", None, ts(30), &ScanOptions::default()),
        Err(Error::WriteIntentConflict { .. })
    ));
    let result = store
        .scan(b"", None, ts(30), &ScanOptions::default().inconsistent())
        .unwrap();
    assert_eq!(result.kvs.len(), 2);
    assert_eq!(result.kvs[1].1.value, b"2");
    assert_eq!(result.intents.len(), 1);
    assert_eq!(result.intents[0].key, Key::from("b"));
}
