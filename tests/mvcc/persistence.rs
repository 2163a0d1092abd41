//! Persistent stores survive reopen with data and stats intact.

use crate::common::*;
use strata_mvcc::{MergeValue, MvccConfig, MvccStore, ScanOptions, TxnMeta, TxnStatus};
use strata_storage::testing::{CrashPoint, LogCorruptionTester};

#[test]
fn reopen_preserves_versions_intents_and_stats() {
    let test = TestStore::new();
    let txn = TxnMeta::new(ts(30));
    {
        let store = &test.store;
        store.put(b"a", b"v1", ts(10), None).unwrap();
        store.put(b"a", b"v2", ts(20), None).unwrap();
        store.delete(b"b", ts(15), None).unwrap();
        store.merge(b"n", &MergeValue::Counter(4), ts(10)).unwrap();
        store.merge(b"n", &MergeValue::Counter(5), ts(11)).unwrap();
        store.put(b"c", b"p", ts(30), Some(&txn)).unwrap();
    }
    let before = test.store.verify_stats().unwrap();

    let test = test.reopen();
    let store = &test.store;
    assert_eq!(store.verify_stats().unwrap(), before);
    assert_eq!(value_of(store.get(b"a", ts(15), None).unwrap()), Some(b"v1".to_vec()));
    assert_eq!(value_of(store.get(b"a", ts(25), None).unwrap()), Some(b"v2".to_vec()));
    let n = store.get(b"n", ts(20), None).unwrap().unwrap();
    assert_eq!(MergeValue::decode(&n.value).unwrap(), MergeValue::Counter(9));

    // The intent survived and can still be resolved
    assert!(store
        .resolve_intent(
            b"c",
            &txn,
            TxnStatus::Committed {
                commit_timestamp: ts(30)
            }
        )
        .unwrap());
    assert_eq!(value_of(store.get(b"c", ts(30), None).unwrap()), Some(b"p".to_vec()));
    store.verify_stats().unwrap();
}

#[test]
fn crash_after_log_append_is_durable_on_reopen() {
    let test = TestStore::new();
    test.store.put(b"a", b"v1", ts(10), None).unwrap();

    test.store.engine().arm_crash_point(CrashPoint::AfterLogAppend);
    assert!(test.store.put(b"b", b"v2", ts(10), None).is_err());
    assert!(test.store.engine().is_closed());

    let TestStore { store, dir } = test;
    drop(store);
    let store = MvccStore::open(MvccConfig::persistent(dir.path())).unwrap();
    let all = store.scan(b"", None, ts(100), &ScanOptions::default()).unwrap();
    assert_eq!(all.kvs.len(), 2);
    store.verify_stats().unwrap();
}

#[test]
fn torn_log_tail_loses_only_the_last_write() {
    let test = TestStore::new();
    test.store.put(b"a", b"v1", ts(10), None).unwrap();
    test.store.put(b"b", b"v2", ts(10), None).unwrap();
    let TestStore { store, dir } = test;
    store.close().unwrap();
    drop(store);

    LogCorruptionTester::new(dir.path()).truncate_tail(3).unwrap();

    let store = MvccStore::open(MvccConfig::persistent(dir.path())).unwrap();
    assert!(store.get(b"a", ts(10), None).unwrap().is_some());
    assert!(store.get(b"b", ts(10), None).unwrap().is_none());
    store.verify_stats().unwrap();
}

#[test]
fn config_file_opens_persistent_store() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("strata.toml");
    let data = dir.path().join("data");
    std::fs::write(
        &path,
        format!(
            "gc_batch_keys = 8\n\n[storage.engine]\nkind = \"persistent\"\ndir = {:?}\n",
            data.display().to_string()
        ),
    )
    .unwrap();

    let config = MvccConfig::from_file(&path).unwrap();
    assert_eq!(config.gc_batch_keys, 8);
    let store = MvccStore::open(config).unwrap();
    store.put(b"k", b"v", ts(1), None).unwrap();
    store.close().unwrap();
    assert!(data.join(strata_storage::wal::WAL_FILE_NAME).exists());
}
