//! Double-write buffer: stage dirty pages to a single append file before
//! scattering them to their home locations, so a crash mid-write never
//! leaves a torn page as the only copy on disk.
//!
//! Every page handed to [`DoubleWriteBuffer::add_page`] is checksummed and
//! appended to an in-memory staged batch. Once the batch is full (or a
//! caller asks explicitly) the whole batch is fsynced to the staging file,
//! then each page is written to its home file through the caller-supplied
//! [`HomeWriter`], and only then is the staging file cleared. On startup,
//! [`DoubleWriteBuffer::recover`] replays whatever is left in the staging
//! file, re-applying any page whose checksum still verifies.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use bincode::config;
use bincode::serde::{decode_from_slice, encode_to_vec};
use common::{DbError, DbResult};
use parking_lot::Mutex;
use storage::{PAGE_SIZE, Page};

fn bincode_config() -> impl config::Config {
    config::legacy()
}

/// Callers implement this to let the double-write buffer deliver a page to
/// its true home location once the page is safely staged.
pub trait HomeWriter: Send + Sync {
    fn write_home(&self, file_key: &str, page: &Page) -> DbResult<()>;
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
struct StagedEntry {
    file_key: String,
    page_id: u64,
    bytes: Vec<u8>,
}

/// Staging area for pages awaiting a durable, torn-write-safe flush.
pub struct DoubleWriteBuffer {
    staging_path: PathBuf,
    capacity: usize,
    staged: Mutex<Vec<StagedEntry>>,
}

impl DoubleWriteBuffer {
    pub fn open(staging_path: impl Into<PathBuf>, capacity: usize) -> DbResult<Self> {
        let staging_path = staging_path.into();
        if !staging_path.exists() {
            File::create(&staging_path)?;
        }
        Ok(Self {
            staging_path,
            capacity: capacity.max(1),
            staged: Mutex::new(Vec::new()),
        })
    }

    /// Number of pages currently staged but not yet flushed.
    pub fn staged_len(&self) -> usize {
        self.staged.lock().len()
    }

    /// Stage a page for durable flush. Recomputes the page's checksum
    /// before staging. Auto-flushes once the batch reaches capacity.
    pub fn add_page(
        &self,
        file_key: impl Into<String>,
        mut page: Page,
        home: &dyn HomeWriter,
    ) -> DbResult<()> {
        page.recompute_checksum();
        let entry = StagedEntry {
            file_key: file_key.into(),
            page_id: page.id.0,
            bytes: page.as_bytes().to_vec(),
        };
        let should_flush = {
            let mut staged = self.staged.lock();
            staged.push(entry);
            staged.len() >= self.capacity
        };
        if should_flush {
            self.flush_pages(home)?;
        }
        Ok(())
    }

    /// Look up a page staged for `file_key`/`page_id`, most recent entry
    /// first. Used by the buffer pool when a home page's checksum fails.
    pub fn read_page(&self, file_key: &str, page_id: u64) -> Option<Page> {
        self.staged
            .lock()
            .iter()
            .rev()
            .find(|e| e.file_key == file_key && e.page_id == page_id)
            .map(decode_staged_page)
    }

    /// Force a flush of whatever is currently staged.
    pub fn flush_pages(&self, home: &dyn HomeWriter) -> DbResult<()> {
        let mut staged = self.staged.lock();
        if staged.is_empty() {
            return Ok(());
        }
        Self::write_staging_file(&self.staging_path, &staged)?;
        for entry in staged.iter() {
            let page = decode_staged_page(entry);
            home.write_home(&entry.file_key, &page)?;
        }
        Self::clear_staging_file(&self.staging_path)?;
        staged.clear();
        Ok(())
    }

    /// Replay whatever is left in the staging file after an unclean
    /// shutdown, re-applying every page whose checksum still verifies.
    /// Returns the number of pages repaired.
    pub fn recover(&self, home: &dyn HomeWriter) -> DbResult<usize> {
        let entries = Self::read_staging_file(&self.staging_path)?;
        let mut repaired = 0;
        for entry in &entries {
            let page = decode_staged_page(entry);
            if page.verify_checksum() {
                home.write_home(&entry.file_key, &page)?;
                repaired += 1;
            }
        }
        Self::clear_staging_file(&self.staging_path)?;
        Ok(repaired)
    }

    fn write_staging_file(path: &Path, entries: &[StagedEntry]) -> DbResult<()> {
        let bytes = encode_to_vec(entries, bincode_config())
            .map_err(|e| DbError::Storage(format!("encode staging batch failed: {e}")))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&(bytes.len() as u64).to_le_bytes())?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    }

    fn read_staging_file(path: &Path) -> DbResult<Vec<StagedEntry>> {
        let mut file = match OpenOptions::new().read(true).open(path) {
            Ok(f) => f,
            Err(_) => return Ok(Vec::new()),
        };
        let mut len_buf = [0u8; 8];
        if file.read_exact(&mut len_buf).is_err() {
            return Ok(Vec::new());
        }
        let len = u64::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        if file.read_exact(&mut buf).is_err() {
            return Ok(Vec::new());
        }
        match decode_from_slice::<Vec<StagedEntry>, _>(&buf, bincode_config()) {
            Ok((entries, _)) => Ok(entries),
            Err(_) => Ok(Vec::new()),
        }
    }

    fn clear_staging_file(path: &Path) -> DbResult<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(0)?;
        file.sync_all()?;
        Ok(())
    }
}

fn decode_staged_page(entry: &StagedEntry) -> Page {
    let mut raw = [0u8; PAGE_SIZE];
    raw.copy_from_slice(&entry.bytes);
    Page::from_bytes(common::PageId(entry.page_id), raw)
}

/// A `DoubleWriteBuffer` stand-in that forwards straight to the home
/// location, used when `Config::dwb_enabled` is false.
pub struct VacuousDoubleWriteBuffer;

impl VacuousDoubleWriteBuffer {
    pub fn add_page(
        &self,
        file_key: impl Into<String>,
        mut page: Page,
        home: &dyn HomeWriter,
    ) -> DbResult<()> {
        page.recompute_checksum();
        home.write_home(&file_key.into(), &page)
    }
}
