use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use common::PageId;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use storage::Page;

use crate::frame::Frame;

/// A pinned, shared (read) handle on a resident page. Unpins the frame and
/// releases the latch when dropped.
pub struct PageGuard {
    guard: RwLockReadGuard<'static, Page>,
    frame: Arc<Frame>,
}

impl PageGuard {
    pub(crate) fn new(frame: Arc<Frame>) -> Self {
        frame.pin();
        // SAFETY: `guard` borrows `frame.page()`, which lives inside the
        // `Arc<Frame>` we hold alongside it. The guard is declared first so
        // it is dropped before the `Arc`, and the `Arc` keeps the `Frame`
        // (and therefore the `RwLock`) at a fixed heap address for as long
        // as this struct exists.
        let guard: RwLockReadGuard<'_, Page> = frame.page().read();
        let guard: RwLockReadGuard<'static, Page> = unsafe { std::mem::transmute(guard) };
        Self { guard, frame }
    }

    pub fn page_id(&self) -> PageId {
        self.frame.page_id
    }
}

impl Deref for PageGuard {
    type Target = Page;

    fn deref(&self) -> &Page {
        &self.guard
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.frame.unpin();
    }
}

/// A pinned, exclusive (write) handle on a resident page. Marks the frame
/// dirty on first mutable access; unpins and releases the latch on drop.
pub struct PageGuardMut {
    guard: RwLockWriteGuard<'static, Page>,
    frame: Arc<Frame>,
}

impl PageGuardMut {
    pub(crate) fn new(frame: Arc<Frame>) -> Self {
        frame.pin();
        let guard: RwLockWriteGuard<'_, Page> = frame.page().write();
        let guard: RwLockWriteGuard<'static, Page> = unsafe { std::mem::transmute(guard) };
        Self { guard, frame }
    }

    pub fn page_id(&self) -> PageId {
        self.frame.page_id
    }
}

impl Deref for PageGuardMut {
    type Target = Page;

    fn deref(&self) -> &Page {
        &self.guard
    }
}

impl DerefMut for PageGuardMut {
    fn deref_mut(&mut self) -> &mut Page {
        self.frame.mark_dirty();
        &mut self.guard
    }
}

impl Drop for PageGuardMut {
    fn drop(&mut self) {
        self.frame.unpin();
    }
}
