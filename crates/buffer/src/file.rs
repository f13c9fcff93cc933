use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use bincode::config;
use bincode::serde::{decode_from_slice, encode_to_vec};
use clog::{LogModule, LogSink};
use common::{BufferPoolId, DbError, DbResult, PageId};
use dwb::DoubleWriteBuffer;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use storage::{PAGE_SIZE, Page};

use crate::wire::{BufferPoolLogPayload, BufferPoolOp};

fn bincode_config() -> impl config::Config {
    config::legacy()
}

use crate::frame::Frame;
use crate::guard::{PageGuard, PageGuardMut};

#[derive(Default, serde::Serialize, serde::Deserialize)]
struct AllocationBitmap {
    allocated: Vec<bool>,
}

/// Buffer pool over a single backing file. Page 0 is reserved for the
/// allocation bitmap; user pages start at page 1.
pub struct BufferPoolFile {
    id: BufferPoolId,
    disk: Mutex<File>,
    capacity: usize,
    log: Arc<dyn LogSink>,
    dwb: Option<Arc<DoubleWriteBuffer>>,
    frames: RwLock<HashMap<PageId, Arc<Frame>>>,
    lru: Mutex<LruCache<PageId, ()>>,
    alloc_lock: Mutex<()>,
}

impl BufferPoolFile {
    pub fn open(id: BufferPoolId, path: PathBuf, capacity: usize) -> DbResult<Self> {
        Self::open_with_log(id, path, capacity, Arc::new(clog::VacuousLogHandler::new()), None)
    }

    pub fn open_with_log(
        id: BufferPoolId,
        path: PathBuf,
        capacity: usize,
        log: Arc<dyn LogSink>,
        dwb: Option<Arc<DoubleWriteBuffer>>,
    ) -> DbResult<Self> {
        let is_new = !path.exists();
        let disk = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let pool = Self {
            id,
            disk: Mutex::new(disk),
            capacity: capacity.max(1),
            log,
            dwb,
            frames: RwLock::new(HashMap::new()),
            lru: Mutex::new(LruCache::unbounded()),
            alloc_lock: Mutex::new(()),
        };
        if is_new {
            pool.write_page_to_disk(&Page::new(PageId(0)))?;
            pool.write_header(&AllocationBitmap { allocated: vec![true] }, 0)?;
        }
        Ok(pool)
    }

    fn file_key(&self) -> String {
        self.id.0.to_string()
    }

    fn read_header_page(&self) -> DbResult<Page> {
        self.read_page_from_disk(PageId(0))
    }

    fn decode_bitmap(page: &Page) -> DbResult<AllocationBitmap> {
        let non_zero_len = page
            .payload()
            .iter()
            .rposition(|&b| b != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        if non_zero_len == 0 {
            return Ok(AllocationBitmap { allocated: vec![true] });
        }
        let (bitmap, _) = decode_from_slice(&page.payload()[..non_zero_len], bincode_config())
            .map_err(|e| DbError::Storage(format!("decode allocation bitmap failed: {e}")))?;
        Ok(bitmap)
    }

    fn header(&self) -> DbResult<AllocationBitmap> {
        Self::decode_bitmap(&self.read_header_page()?)
    }

    fn write_header(&self, bitmap: &AllocationBitmap, lsn: u64) -> DbResult<()> {
        let mut page = Page::new(PageId(0));
        page.set_lsn(lsn);
        let bytes = encode_to_vec(bitmap, bincode_config())
            .map_err(|e| DbError::Storage(format!("encode allocation bitmap failed: {e}")))?;
        if bytes.len() > page.payload().len() {
            return Err(DbError::Storage("allocation bitmap exceeds page size".into()));
        }
        page.payload_mut()[..bytes.len()].copy_from_slice(&bytes);
        self.write_page_to_disk(&page)
    }

    /// Append a `BUFFER_POOL` log entry for `op`/`page_num` and block until
    /// it is durable, honoring the write-ahead rule before the header
    /// bitmap itself is mutated on disk.
    fn log_bufferpool_op(&self, op: BufferPoolOp, page_num: u64) -> DbResult<u64> {
        let payload = BufferPoolLogPayload {
            buffer_pool_id: self.id.0,
            op,
            page_num,
        };
        let bytes = encode_to_vec(&payload, bincode_config())
            .map_err(|e| DbError::Wal(format!("encode buffer pool log entry failed: {e}")))?;
        let lsn = self.log.append(LogModule::BufferPool, &bytes)?;
        self.log.wait_lsn(lsn)?;
        Ok(lsn)
    }

    /// Number of pages currently marked allocated in the header bitmap.
    pub fn allocated_count(&self) -> DbResult<usize> {
        Ok(self.header()?.allocated.iter().filter(|&&b| b).count())
    }

    pub fn page_count(&self) -> usize {
        let len = self.disk.lock().metadata().map(|m| m.len()).unwrap_or(0);
        (len as usize) / PAGE_SIZE
    }

    pub fn write_page_to_disk(&self, page: &Page) -> DbResult<()> {
        let mut page = page.clone();
        page.recompute_checksum();
        let mut file = self.disk.lock();
        file.seek(SeekFrom::Start(page.id.0 * PAGE_SIZE as u64))?;
        file.write_all(page.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    pub fn read_page_from_disk(&self, page_id: PageId) -> DbResult<Page> {
        let page = self.read_raw_page(page_id)?;
        if page.verify_checksum() {
            return Ok(page);
        }
        if let Some(dwb) = &self.dwb {
            if let Some(staged) = dwb.read_page(&self.file_key(), page_id.0) {
                return Ok(staged);
            }
        }
        Err(DbError::Internal(format!(
            "page {} in buffer pool {} failed checksum verification and no staged copy exists",
            page_id.0, self.id.0
        )))
    }

    fn read_raw_page(&self, page_id: PageId) -> DbResult<Page> {
        let mut file = self.disk.lock();
        file.seek(SeekFrom::Start(page_id.0 * PAGE_SIZE as u64))?;
        let mut raw = [0u8; PAGE_SIZE];
        file.read_exact(&mut raw)?;
        Ok(Page::from_bytes(page_id, raw))
    }

    pub fn allocate_page(&self) -> DbResult<PageGuardMut> {
        let _guard = self.alloc_lock.lock();
        let mut bitmap = self.header()?;
        let page_num = match bitmap.allocated.iter().position(|&b| !b) {
            Some(idx) => {
                bitmap.allocated[idx] = true;
                idx as u64
            }
            None => {
                bitmap.allocated.push(true);
                (bitmap.allocated.len() - 1) as u64
            }
        };
        let lsn = self.log_bufferpool_op(BufferPoolOp::Allocate, page_num)?;
        self.write_header(&bitmap, lsn)?;

        let page_id = PageId(page_num);
        let page = Page::new(page_id);
        self.write_page_to_disk(&page)?;

        let frame = self.evict_if_needed_then_insert(page)?;
        Ok(PageGuardMut::new(frame))
    }

    /// Redo an `ALLOCATE` log entry against the header bitmap only, gated
    /// by the header page's own LSN so already-applied entries are skipped.
    pub fn redo_allocate_page(&self, lsn: u64, page_num: u64) -> DbResult<()> {
        let _guard = self.alloc_lock.lock();
        let header_page = self.read_header_page()?;
        if lsn <= header_page.lsn() {
            return Ok(());
        }
        let mut bitmap = Self::decode_bitmap(&header_page)?;
        let idx = page_num as usize;
        if idx >= bitmap.allocated.len() {
            bitmap.allocated.resize(idx + 1, false);
        }
        bitmap.allocated[idx] = true;
        self.write_header(&bitmap, lsn)
    }

    /// Redo a `DEALLOCATE` log entry against the header bitmap only, gated
    /// the same way as [`Self::redo_allocate_page`].
    pub fn redo_deallocate_page(&self, lsn: u64, page_num: u64) -> DbResult<()> {
        let _guard = self.alloc_lock.lock();
        let header_page = self.read_header_page()?;
        if lsn <= header_page.lsn() {
            return Ok(());
        }
        let mut bitmap = Self::decode_bitmap(&header_page)?;
        if let Some(slot) = bitmap.allocated.get_mut(page_num as usize) {
            *slot = false;
        }
        self.write_header(&bitmap, lsn)
    }

    pub fn fetch_page(&self, page_id: PageId) -> DbResult<PageGuard> {
        if let Some(frame) = self.touch(page_id) {
            return Ok(PageGuard::new(frame));
        }
        let page = self.read_page_from_disk(page_id)?;
        let frame = self.evict_if_needed_then_insert(page)?;
        Ok(PageGuard::new(frame))
    }

    pub fn fetch_page_mut(&self, page_id: PageId) -> DbResult<PageGuardMut> {
        if let Some(frame) = self.touch(page_id) {
            return Ok(PageGuardMut::new(frame));
        }
        let page = self.read_page_from_disk(page_id)?;
        let frame = self.evict_if_needed_then_insert(page)?;
        Ok(PageGuardMut::new(frame))
    }

    fn touch(&self, page_id: PageId) -> Option<Arc<Frame>> {
        let frame = self.frames.read().get(&page_id).cloned();
        if frame.is_some() {
            self.lru.lock().put(page_id, ());
        }
        frame
    }

    pub fn dispose_page(&self, page_id: PageId) -> DbResult<()> {
        let _guard = self.alloc_lock.lock();
        {
            let frames = self.frames.read();
            if let Some(frame) = frames.get(&page_id) {
                if frame.is_pinned() {
                    return Err(DbError::Internal(format!(
                        "cannot dispose pinned page {}",
                        page_id.0
                    )));
                }
            }
        }
        self.frames.write().remove(&page_id);
        self.lru.lock().pop(&page_id);

        let mut bitmap = self.header()?;
        if let Some(slot) = bitmap.allocated.get_mut(page_id.0 as usize) {
            *slot = false;
        }
        let lsn = self.log_bufferpool_op(BufferPoolOp::Deallocate, page_id.0)?;
        self.write_header(&bitmap, lsn)
    }

    pub fn snapshot_page(&self, page_id: PageId) -> DbResult<Page> {
        if let Some(frame) = self.frames.read().get(&page_id) {
            return Ok(frame.page().read().clone());
        }
        self.read_page_from_disk(page_id)
    }

    pub fn clear_dirty(&self, page_id: PageId) {
        if let Some(frame) = self.frames.read().get(&page_id) {
            frame.clear_dirty();
        }
    }

    pub fn dirty_page_ids(&self) -> Vec<PageId> {
        self.frames
            .read()
            .values()
            .filter(|f| f.is_dirty())
            .map(|f| f.page_id)
            .collect()
    }

    /// Insert a freshly-read or newly-allocated page into the frame table,
    /// evicting the least-recently-used unpinned frame first if the pool is
    /// at capacity. A dirty evictee is flushed straight to its home file
    /// after its LSN is confirmed durable (bypassing the double-write
    /// buffer, which only the explicit flush path uses).
    fn evict_if_needed_then_insert(&self, page: Page) -> DbResult<Arc<Frame>> {
        let page_id = page.id;
        loop {
            {
                let frames = self.frames.read();
                if frames.len() < self.capacity || frames.contains_key(&page_id) {
                    break;
                }
            }
            if !self.evict_one()? {
                return Err(DbError::BufferPoolNoBuf);
            }
        }

        let mut frames = self.frames.write();
        let frame = frames
            .entry(page_id)
            .or_insert_with(|| Arc::new(Frame::new(page)))
            .clone();
        self.lru.lock().put(page_id, ());
        Ok(frame)
    }

    fn evict_one(&self) -> DbResult<bool> {
        let candidates: Vec<PageId> = self.lru.lock().iter().map(|(k, _)| *k).collect();
        // `iter()` yields most-recently-used first; scan in reverse for LRU order.
        for page_id in candidates.into_iter().rev() {
            let frame = match self.frames.read().get(&page_id).cloned() {
                Some(f) => f,
                None => continue,
            };
            if frame.is_pinned() {
                continue;
            }
            if frame.is_dirty() {
                let page = frame.page().read().clone();
                self.log.wait_lsn(page.lsn())?;
                self.write_page_to_disk(&page)?;
            }
            self.frames.write().remove(&page_id);
            self.lru.lock().pop(&page_id);
            return Ok(true);
        }
        Ok(false)
    }
}
