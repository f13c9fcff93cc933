use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use common::PageId;
use parking_lot::RwLock;
use storage::Page;

/// An in-memory slot holding one resident page, its pin count, and its
/// dirty flag. The `RwLock` around the page itself doubles as the frame's
/// latch: a shared guard lets concurrent readers in, an exclusive guard
/// blocks everyone else out.
pub struct Frame {
    pub page_id: PageId,
    pin_count: AtomicI32,
    dirty: AtomicBool,
    page: RwLock<Page>,
}

impl Frame {
    pub fn new(page: Page) -> Self {
        Self {
            page_id: page.id,
            pin_count: AtomicI32::new(0),
            dirty: AtomicBool::new(false),
            page: RwLock::new(page),
        }
    }

    pub fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn unpin(&self) {
        self.pin_count.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn pin_count(&self) -> i32 {
        self.pin_count.load(Ordering::SeqCst)
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn page(&self) -> &RwLock<Page> {
        &self.page
    }
}
