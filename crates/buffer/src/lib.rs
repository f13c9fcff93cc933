//! The buffer pool: pins fixed-size pages from disk into memory frames,
//! serializes concurrent access to each frame behind a latch, and evicts
//! the least-recently-used unpinned frame when a file's pool is full.
//!
//! Every dirty page must have its LSN durably flushed to the write-ahead
//! log before the page itself reaches disk (`wait_lsn` below) — this is
//! the write-ahead rule that makes the log authoritative for recovery.
//! Pages optionally pass through a [`dwb::DoubleWriteBuffer`] on their way
//! to the home file, so a crash mid-write never leaves a torn page there.

mod file;
mod frame;
mod guard;
mod replay;
mod wire;

pub use file::BufferPoolFile;
pub use frame::Frame;
pub use guard::{PageGuard, PageGuardMut};
pub use replay::BufferPoolLogReplayer;
pub use wire::{BufferPoolLogPayload, BufferPoolOp};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use common::{BufferPoolId, DbError, DbResult, PageId};
use dwb::{DoubleWriteBuffer, HomeWriter};
use parking_lot::RwLock;
use storage::Page;

/// Owns one [`BufferPoolFile`] per open table/index file and optionally
/// routes their dirty-page flushes through a shared double-write buffer.
pub struct BufferPoolManager {
    dir: PathBuf,
    capacity_per_file: usize,
    log: Arc<dyn clog::LogSink>,
    dwb: Option<Arc<DoubleWriteBuffer>>,
    files: RwLock<HashMap<BufferPoolId, Arc<BufferPoolFile>>>,
}

impl BufferPoolManager {
    pub fn new(
        dir: impl Into<PathBuf>,
        capacity_per_file: usize,
        log: Arc<dyn clog::LogSink>,
        dwb: Option<Arc<DoubleWriteBuffer>>,
    ) -> Self {
        Self {
            dir: dir.into(),
            capacity_per_file,
            log,
            dwb,
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Open (creating if needed) the backing file for `id`, named `file_name`
    /// under this manager's directory.
    pub fn open_file(&self, id: BufferPoolId, file_name: &str) -> DbResult<()> {
        if self.files.read().contains_key(&id) {
            return Ok(());
        }
        let path = self.dir.join(file_name);
        let pool = BufferPoolFile::open_with_log(
            id,
            path,
            self.capacity_per_file,
            self.log.clone(),
            self.dwb.clone(),
        )?;
        self.files.write().insert(id, Arc::new(pool));
        Ok(())
    }

    fn file(&self, id: BufferPoolId) -> DbResult<Arc<BufferPoolFile>> {
        self.files
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::Internal(format!("buffer pool file {} not open", id.0)))
    }

    pub fn allocate_page(&self, id: BufferPoolId) -> DbResult<PageGuardMut> {
        self.file(id)?.allocate_page()
    }

    pub fn fetch_page(&self, id: BufferPoolId, page_id: PageId) -> DbResult<PageGuard> {
        self.file(id)?.fetch_page(page_id)
    }

    pub fn fetch_page_mut(&self, id: BufferPoolId, page_id: PageId) -> DbResult<PageGuardMut> {
        self.file(id)?.fetch_page_mut(page_id)
    }

    /// Mark `page_id` free to reuse; invoked after a record manager or
    /// B+tree page is deallocated.
    pub fn dispose_page(&self, id: BufferPoolId, page_id: PageId) -> DbResult<()> {
        self.file(id)?.dispose_page(page_id)
    }

    /// Durably flush a single dirty page: waits for its LSN to be flushed to
    /// the log, then writes it home (through the double-write buffer, if
    /// configured).
    pub fn flush_page(&self, id: BufferPoolId, page_id: PageId) -> DbResult<()> {
        let file = self.file(id)?;
        let page = file.snapshot_page(page_id)?;
        self.log.wait_lsn(page.lsn())?;
        match &self.dwb {
            Some(dwb) => dwb.add_page(id.0.to_string(), page, self)?,
            None => self.write_home(&id.0.to_string(), &page)?,
        }
        file.clear_dirty(page_id);
        Ok(())
    }

    pub fn flush_all_pages(&self, id: BufferPoolId) -> DbResult<()> {
        for page_id in self.file(id)?.dirty_page_ids() {
            self.flush_page(id, page_id)?;
        }
        if let Some(dwb) = &self.dwb {
            dwb.flush_pages(self)?;
        }
        Ok(())
    }

    pub fn page_count(&self, id: BufferPoolId) -> DbResult<usize> {
        Ok(self.file(id)?.page_count())
    }

    /// Number of pages currently marked allocated in `id`'s header bitmap,
    /// as distinct from `page_count`'s raw file extent.
    pub fn allocated_page_count(&self, id: BufferPoolId) -> DbResult<usize> {
        self.file(id)?.allocated_count()
    }

    /// Redo a `BUFFER_POOL` log entry against `id`'s header bitmap only.
    /// Used by [`BufferPoolLogReplayer`] during recovery.
    pub fn redo_allocate_page(&self, id: BufferPoolId, lsn: u64, page_num: u64) -> DbResult<()> {
        self.file(id)?.redo_allocate_page(lsn, page_num)
    }

    pub fn redo_deallocate_page(&self, id: BufferPoolId, lsn: u64, page_num: u64) -> DbResult<()> {
        self.file(id)?.redo_deallocate_page(lsn, page_num)
    }

    /// The log sink this manager enforces the write-ahead rule against.
    /// Higher layers (record manager, B+tree) share it so every mutation's
    /// LSN is drawn from the same stream the buffer pool waits on at flush.
    pub fn log_sink(&self) -> Arc<dyn clog::LogSink> {
        self.log.clone()
    }

    /// Recover any page left staged in the double-write buffer from an
    /// unclean shutdown, writing it back to its home file.
    pub fn recover_dwb(&self) -> DbResult<usize> {
        match &self.dwb {
            Some(dwb) => dwb.recover(self),
            None => Ok(0),
        }
    }
}

impl HomeWriter for BufferPoolManager {
    fn write_home(&self, file_key: &str, page: &Page) -> DbResult<()> {
        let id = BufferPoolId(
            file_key
                .parse()
                .map_err(|_| DbError::Internal(format!("invalid buffer pool file key {file_key}")))?,
        );
        self.file(id)?.write_page_to_disk(page)
    }
}

#[cfg(test)]
mod tests;
