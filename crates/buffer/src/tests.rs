use std::sync::Arc;

use clog::{LogHandler, LogModule, VacuousLogHandler};
use common::{BufferPoolId, PageId};
use tempfile::tempdir;

use super::*;

fn manager(dir: &std::path::Path, capacity: usize) -> BufferPoolManager {
    BufferPoolManager::new(dir, capacity, Arc::new(VacuousLogHandler::new()), None)
}

#[test]
fn allocate_and_fetch_round_trips_payload() {
    let dir = tempdir().unwrap();
    let mgr = manager(dir.path(), 8);
    mgr.open_file(BufferPoolId(1), "t1.tbl").unwrap();

    let page_id = {
        let mut guard = mgr.allocate_page(BufferPoolId(1)).unwrap();
        guard.payload_mut()[0..5].copy_from_slice(b"hello");
        guard.page_id()
    };

    let guard = mgr.fetch_page(BufferPoolId(1), page_id).unwrap();
    assert_eq!(&guard.payload()[0..5], b"hello");
}

#[test]
fn allocate_page_skips_header_and_reuses_disposed_slots() {
    let dir = tempdir().unwrap();
    let mgr = manager(dir.path(), 8);
    mgr.open_file(BufferPoolId(1), "t1.tbl").unwrap();

    let p1 = mgr.allocate_page(BufferPoolId(1)).unwrap().page_id();
    assert_ne!(p1, PageId(0));

    let p2 = mgr.allocate_page(BufferPoolId(1)).unwrap().page_id();
    assert_ne!(p1, p2);

    mgr.dispose_page(BufferPoolId(1), p2).unwrap();
    let p3 = mgr.allocate_page(BufferPoolId(1)).unwrap().page_id();
    assert_eq!(p2, p3);
}

#[test]
fn dispose_of_pinned_page_is_rejected() {
    let dir = tempdir().unwrap();
    let mgr = manager(dir.path(), 8);
    mgr.open_file(BufferPoolId(1), "t1.tbl").unwrap();

    let guard = mgr.allocate_page(BufferPoolId(1)).unwrap();
    let page_id = guard.page_id();
    assert!(mgr.dispose_page(BufferPoolId(1), page_id).is_err());
    drop(guard);
    assert!(mgr.dispose_page(BufferPoolId(1), page_id).is_ok());
}

#[test]
fn lru_eviction_flushes_dirty_pages_to_disk() {
    let dir = tempdir().unwrap();
    let mgr = manager(dir.path(), 2);
    mgr.open_file(BufferPoolId(1), "t1.tbl").unwrap();

    let mut ids = Vec::new();
    for i in 0..3u8 {
        let mut guard = mgr.allocate_page(BufferPoolId(1)).unwrap();
        guard.payload_mut()[0] = i + 1;
        ids.push(guard.page_id());
    }

    // Pool capacity is 2; the third allocation must have evicted the first
    // page, flushing its dirty payload straight to disk.
    let reread = mgr.fetch_page(BufferPoolId(1), ids[0]).unwrap();
    assert_eq!(reread.payload()[0], 1);
}

#[test]
fn flush_page_writes_through_and_clears_dirty_flag() {
    let dir = tempdir().unwrap();
    let log = Arc::new(VacuousLogHandler::new());
    log.append(LogModule::BufferPool, b"noop").unwrap();
    let mgr = BufferPoolManager::new(dir.path(), 8, log, None);
    mgr.open_file(BufferPoolId(1), "t1.tbl").unwrap();

    let page_id = {
        let mut guard = mgr.allocate_page(BufferPoolId(1)).unwrap();
        guard.payload_mut()[0] = 42;
        guard.page_id()
    };

    mgr.flush_page(BufferPoolId(1), page_id).unwrap();

    let file = dir.path().join("t1.tbl");
    assert!(file.exists());
}

#[test]
fn fetching_unopened_file_errors_instead_of_panicking() {
    let dir = tempdir().unwrap();
    let mgr = manager(dir.path(), 8);
    assert!(mgr.fetch_page(BufferPoolId(99), PageId(1)).is_err());
}

#[test]
fn page_count_grows_with_allocations() {
    let dir = tempdir().unwrap();
    let mgr = manager(dir.path(), 8);
    mgr.open_file(BufferPoolId(1), "t1.tbl").unwrap();
    let before = mgr.page_count(BufferPoolId(1)).unwrap();

    mgr.allocate_page(BufferPoolId(1)).unwrap();
    mgr.allocate_page(BufferPoolId(1)).unwrap();

    let after = mgr.page_count(BufferPoolId(1)).unwrap();
    assert_eq!(after, before + 2);
}

#[test]
fn allocation_state_survives_data_file_deletion_via_replay() {
    let log_dir = tempdir().unwrap();
    let data_dir = tempdir().unwrap();
    let id = BufferPoolId(1);

    let log = Arc::new(LogHandler::init(log_dir.path(), 10_000).unwrap());
    let mgr = BufferPoolManager::new(data_dir.path(), 256, log.clone(), None);
    mgr.open_file(id, "t1.tbl").unwrap();

    let mut ids = Vec::new();
    for _ in 0..100 {
        ids.push(mgr.allocate_page(id).unwrap().page_id());
    }
    // Every third iteration disposes the most recently allocated page
    // instead of allocating a new one: 100 allocations, 50 disposals.
    for i in 0..150 {
        if i % 3 == 2 {
            let popped = ids.pop().unwrap();
            mgr.dispose_page(id, popped).unwrap();
        } else {
            ids.push(mgr.allocate_page(id).unwrap().page_id());
        }
    }
    let before = mgr.allocated_page_count(id).unwrap();
    assert_eq!(before, 1 + 150); // header page + (100 + 100 - 50) user pages

    drop(mgr);
    std::fs::remove_file(data_dir.path().join("t1.tbl")).unwrap();

    let mgr = Arc::new(BufferPoolManager::new(data_dir.path(), 256, log.clone(), None));
    mgr.open_file(id, "t1.tbl").unwrap();
    let mut replayer = BufferPoolLogReplayer::new(mgr.clone(), vec![id]);
    log.replay(&mut replayer, 0).unwrap();

    let after = mgr.allocated_page_count(id).unwrap();
    assert_eq!(after, before);
}

#[test]
fn checksum_mismatch_on_home_page_is_repaired_from_the_double_write_buffer() {
    let dir = tempdir().unwrap();
    let log = Arc::new(VacuousLogHandler::new());
    let dwb = Arc::new(dwb::DoubleWriteBuffer::open(dir.path().join("dwb.stage"), 8).unwrap());
    let id = BufferPoolId(1);

    let mgr = BufferPoolManager::new(dir.path(), 8, log.clone(), Some(dwb.clone()));
    mgr.open_file(id, "t1.tbl").unwrap();
    let page_id = {
        let mut guard = mgr.allocate_page(id).unwrap();
        guard.payload_mut()[0..5].copy_from_slice(b"hello");
        guard.page_id()
    };
    mgr.flush_page(id, page_id).unwrap();

    // Tear the home copy by corrupting a payload byte directly on disk.
    let path = dir.path().join("t1.tbl");
    let mut bytes = std::fs::read(&path).unwrap();
    let offset = page_id.0 as usize * storage::PAGE_SIZE + storage::PAGE_HEADER_SIZE;
    bytes[offset] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    // A fresh manager shares the double-write buffer but not the frame
    // cache, so this fetch is forced to actually read (and checksum) disk.
    let mgr2 = BufferPoolManager::new(dir.path(), 8, log, Some(dwb));
    mgr2.open_file(id, "t1.tbl").unwrap();
    let guard = mgr2.fetch_page(id, page_id).unwrap();
    assert_eq!(&guard.payload()[0..5], b"hello");
}

#[test]
fn checksum_mismatch_with_no_staged_copy_escalates_as_internal_error() {
    let dir = tempdir().unwrap();
    let mgr = manager(dir.path(), 8);
    let id = BufferPoolId(1);
    mgr.open_file(id, "t1.tbl").unwrap();
    let page_id = mgr.allocate_page(id).unwrap().page_id();

    let path = dir.path().join("t1.tbl");
    let mut bytes = std::fs::read(&path).unwrap();
    let offset = page_id.0 as usize * storage::PAGE_SIZE + storage::PAGE_HEADER_SIZE;
    bytes[offset] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let mgr2 = manager(dir.path(), 8);
    mgr2.open_file(id, "t1.tbl").unwrap();
    let err = mgr2.fetch_page(id, page_id).unwrap_err();
    assert!(matches!(err, common::DbError::Internal(_)));
}
