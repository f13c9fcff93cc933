use std::sync::Arc;

use buffer::BufferPoolManager;
use clog::LogHandler;
use common::{BufferPoolId, PageId, RecordId};
use tempfile::tempdir;
use types::{SqlType, Value};

use super::*;

fn index(dir: &std::path::Path, log: Arc<LogHandler>) -> BTreeIndex {
    let buffer = Arc::new(BufferPoolManager::new(dir, 64, log, None));
    BTreeIndex::create(buffer, BufferPoolId(1), "idx.tbl", SqlType::Int, 0).unwrap()
}

fn rid(n: u64) -> RecordId {
    RecordId::new(PageId(n), 0)
}

#[test]
fn search_on_empty_index_returns_nothing() {
    let dir = tempdir().unwrap();
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let idx = index(dir.path(), log);
    assert!(idx.search(&[Value::Int(1)]).unwrap().is_empty());
}

#[test]
fn insert_and_search_single_key() {
    let dir = tempdir().unwrap();
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let idx = index(dir.path(), log);

    idx.insert(vec![Value::Int(42)], rid(1)).unwrap();
    let found = idx.search(&[Value::Int(42)]).unwrap();
    assert_eq!(found, vec![rid(1)]);
    assert!(idx.search(&[Value::Int(7)]).unwrap().is_empty());
}

#[test]
fn insert_multiple_keys_search_each() {
    let dir = tempdir().unwrap();
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let idx = index(dir.path(), log);

    for i in 0..20 {
        idx.insert(vec![Value::Int(i)], rid(i as u64)).unwrap();
    }
    for i in 0..20 {
        let found = idx.search(&[Value::Int(i)]).unwrap();
        assert_eq!(found, vec![rid(i as u64)]);
    }
}

#[test]
fn duplicate_keys_all_returned() {
    let dir = tempdir().unwrap();
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let idx = index(dir.path(), log);

    idx.insert(vec![Value::Int(5)], rid(1)).unwrap();
    idx.insert(vec![Value::Int(5)], rid(2)).unwrap();
    idx.insert(vec![Value::Int(5)], rid(3)).unwrap();

    let mut found = idx.search(&[Value::Int(5)]).unwrap();
    found.sort_by_key(|r| r.page_id.0);
    assert_eq!(found, vec![rid(1), rid(2), rid(3)]);
}

#[test]
fn bulk_insert_out_of_order_scans_sorted() {
    let dir = tempdir().unwrap();
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let idx = index(dir.path(), log);

    // Enough entries to force several leaf splits and at least one level
    // of internal-node splitting above the root.
    let mut order: Vec<i64> = (0..500).collect();
    order.reverse();
    for (i, v) in order.iter().enumerate() {
        idx.insert(vec![Value::Int(*v)], rid(i as u64)).unwrap();
    }

    let scanned = idx.scan_all().unwrap();
    assert_eq!(scanned.len(), 500);
    let values: Vec<i64> = scanned
        .iter()
        .map(|(k, _)| match k[0] {
            Value::Int(n) => n,
            _ => panic!("unexpected key"),
        })
        .collect();
    let mut sorted = values.clone();
    sorted.sort();
    assert_eq!(values, sorted);
    assert_eq!(values.first(), Some(&0));
    assert_eq!(values.last(), Some(&499));

    for v in 0..500 {
        assert!(!idx.search(&[Value::Int(v)]).unwrap().is_empty());
    }
}

#[test]
fn range_scan_respects_bounds() {
    let dir = tempdir().unwrap();
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let idx = index(dir.path(), log);

    for v in 0..100 {
        idx.insert(vec![Value::Int(v)], rid(v as u64)).unwrap();
    }

    let mut cursor = idx
        .range_scan(Some(&[Value::Int(10)]), Some(&[Value::Int(15)]))
        .unwrap();
    let mut got = Vec::new();
    while let Some((key, _)) = cursor.next().unwrap() {
        match key[0] {
            Value::Int(n) => got.push(n),
            _ => panic!("unexpected key"),
        }
    }
    assert_eq!(got, vec![10, 11, 12, 13, 14, 15]);
}

#[test]
fn delete_then_search_absent() {
    let dir = tempdir().unwrap();
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let idx = index(dir.path(), log);

    idx.insert(vec![Value::Int(1)], rid(1)).unwrap();
    idx.insert(vec![Value::Int(2)], rid(2)).unwrap();

    assert!(idx.delete(&[Value::Int(1)], rid(1)).unwrap());
    assert!(idx.search(&[Value::Int(1)]).unwrap().is_empty());
    assert_eq!(idx.search(&[Value::Int(2)]).unwrap(), vec![rid(2)]);

    // Deleting something that isn't there reports no match, not an error.
    assert!(!idx.delete(&[Value::Int(1)], rid(1)).unwrap());
}

#[test]
fn delete_sequence_triggers_sibling_merge() {
    let dir = tempdir().unwrap();
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let idx = index(dir.path(), log);

    for v in 0..300 {
        idx.insert(vec![Value::Int(v)], rid(v as u64)).unwrap();
    }

    // Remove most of the low end, which should force the right-sibling
    // leaf merge path once consecutive leaves both drop under half-full.
    for v in 0..250 {
        assert!(idx.delete(&[Value::Int(v)], rid(v as u64)).unwrap());
    }

    let remaining = idx.scan_all().unwrap();
    assert_eq!(remaining.len(), 50);
    for (k, _) in &remaining {
        match k[0] {
            Value::Int(n) => assert!(n >= 250),
            _ => panic!("unexpected key"),
        }
    }
    for v in 250..300 {
        assert!(!idx.search(&[Value::Int(v)]).unwrap().is_empty());
    }
}

#[test]
fn replay_reapplies_inserts_after_reopen() {
    let dir = tempdir().unwrap();
    {
        let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
        let idx = index(dir.path(), log.clone());
        for v in 0..80 {
            idx.insert(vec![Value::Int(v)], rid(v as u64)).unwrap();
        }
        log.flush().unwrap();
    }

    // Reopen against a fresh buffer pool and replay the log from scratch,
    // simulating recovery after a crash with no page flush.
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let buffer = Arc::new(BufferPoolManager::new(dir.path(), 64, log.clone(), None));
    buffer.open_file(BufferPoolId(1), "idx.tbl").unwrap();
    let mut replayer = BplusTreeLogReplayer::new(buffer.clone(), vec![BufferPoolId(1)]);
    log.replay(&mut replayer, 0).unwrap();

    let idx = BTreeIndex::open(buffer, BufferPoolId(1), "idx.tbl").unwrap();
    for v in 0..80 {
        assert_eq!(idx.search(&[Value::Int(v)]).unwrap(), vec![rid(v as u64)]);
    }
    let scanned = idx.scan_all().unwrap();
    assert_eq!(scanned.len(), 80);
}
