use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use common::DbResult;
use parking_lot::{Condvar, Mutex};

use crate::entry::LogEntry;
use crate::file::LogFileManager;
use crate::module::LogModule;

/// Something that can absorb and durably flush log entries, implemented by
/// both the real [`LogHandler`] and [`VacuousLogHandler`].
pub trait LogSink: Send + Sync {
    /// Assign the next LSN, buffer the entry, and return the LSN assigned.
    /// Does not guarantee durability until a flush (explicit, background,
    /// or via `wait_lsn`) has happened.
    fn append(&self, module: LogModule, payload: &[u8]) -> DbResult<u64>;

    /// Block until every entry up to and including `lsn` has been flushed
    /// to disk. This is how callers enforce write-ahead ordering: a page
    /// must not reach its home location until its LSN is durable.
    fn wait_lsn(&self, lsn: u64) -> DbResult<()>;

    /// The LSN that would be assigned to the next appended entry.
    fn current_lsn(&self) -> u64;

    /// The highest LSN flushed to disk so far.
    fn current_flushed_lsn(&self) -> u64;
}

/// Implemented by each module (buffer pool, record manager, B+tree,
/// transaction manager) to replay its own entries during recovery.
pub trait LogReplayer {
    fn replay(&mut self, entry: &LogEntry) -> DbResult<()>;

    /// Called once after every entry has been replayed, so a replayer can
    /// clean up state left behind by transactions that never committed.
    fn on_done(&mut self) -> DbResult<()> {
        Ok(())
    }
}

struct Inner {
    buffered: Vec<LogEntry>,
    current_file: File,
    current_file_first_lsn: u64,
    entries_in_current_file: u64,
}

struct Shared {
    dir_manager: LogFileManager,
    max_entries_per_file: u64,
    next_lsn: AtomicU64,
    flushed_lsn: AtomicU64,
    running: AtomicBool,
    inner: Mutex<Inner>,
    flushed_cv: Condvar,
}

/// Durable, LSN-ordered append log shared by every recovery-sensitive
/// module. Entries are buffered in memory and flushed either by an explicit
/// call, a background thread started with [`LogHandler::start`], or
/// implicitly whenever a caller waits on an LSN with `wait_lsn`.
pub struct LogHandler {
    shared: Arc<Shared>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl LogHandler {
    /// Open (or create) the log directory, recovering `next_lsn` from
    /// whatever entries are already on disk.
    pub fn init(dir: impl Into<std::path::PathBuf>, max_entries_per_file: u64) -> DbResult<Self> {
        let dir_manager = LogFileManager::new(dir)?;
        let files = dir_manager.files()?;

        let mut next_lsn = 1u64;
        let mut flushed_lsn = 0u64;
        for (_, path) in &files {
            let bytes = std::fs::read(path)?;
            let mut offset = 0;
            while let Some((entry, consumed)) = LogEntry::decode(&bytes[offset..])? {
                next_lsn = next_lsn.max(entry.lsn + 1);
                flushed_lsn = flushed_lsn.max(entry.lsn);
                offset += consumed;
            }
        }

        let (current_file_first_lsn, current_file, entries_in_current_file) = match files.last() {
            Some((first_lsn, path)) => {
                let file = OpenOptions::new().append(true).read(true).open(path)?;
                let count = count_entries(path)?;
                if count >= max_entries_per_file {
                    let new_first = next_lsn;
                    let path = dir_manager.path_for(new_first);
                    (new_first, OpenOptions::new().create(true).append(true).open(path)?, 0)
                } else {
                    (*first_lsn, file, count)
                }
            }
            None => {
                let path = dir_manager.path_for(next_lsn);
                (next_lsn, OpenOptions::new().create(true).append(true).open(path)?, 0)
            }
        };

        Ok(Self {
            shared: Arc::new(Shared {
                dir_manager,
                max_entries_per_file,
                next_lsn: AtomicU64::new(next_lsn),
                flushed_lsn: AtomicU64::new(flushed_lsn),
                running: AtomicBool::new(false),
                inner: Mutex::new(Inner {
                    buffered: Vec::new(),
                    current_file,
                    current_file_first_lsn,
                    entries_in_current_file,
                }),
                flushed_cv: Condvar::new(),
            }),
            flusher: Mutex::new(None),
        })
    }

    /// Start the background flusher thread.
    pub fn start(&self) {
        let shared = Arc::clone(&self.shared);
        shared.running.store(true, Ordering::SeqCst);
        let handle = std::thread::spawn(move || {
            while shared.running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(20));
                let _ = flush_pending(&shared);
            }
        });
        *self.flusher.lock() = Some(handle);
    }

    /// Stop the background flusher thread and perform one last flush.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.flusher.lock().take() {
            let _ = handle.join();
        }
        let _ = flush_pending(&self.shared);
    }

    /// Force a flush of whatever is currently buffered.
    pub fn flush(&self) -> DbResult<()> {
        flush_pending(&self.shared)
    }

    /// Replay every entry from `start_lsn` onward against `replayer`, then
    /// call `replayer.on_done()`.
    pub fn replay(&self, replayer: &mut dyn LogReplayer, start_lsn: u64) -> DbResult<()> {
        for (_, path) in self.shared.dir_manager.files()? {
            let bytes = std::fs::read(&path)?;
            let mut offset = 0;
            while let Some((entry, consumed)) = LogEntry::decode(&bytes[offset..])? {
                if entry.lsn >= start_lsn {
                    replayer.replay(&entry)?;
                }
                offset += consumed;
            }
        }
        replayer.on_done()
    }
}

impl LogSink for LogHandler {
    fn append(&self, module: LogModule, payload: &[u8]) -> DbResult<u64> {
        let lsn = self.shared.next_lsn.fetch_add(1, Ordering::SeqCst);
        let entry = LogEntry::new(lsn, module, payload.to_vec())?;
        self.shared.inner.lock().buffered.push(entry);
        Ok(lsn)
    }

    fn wait_lsn(&self, lsn: u64) -> DbResult<()> {
        if lsn == 0 {
            return Ok(());
        }
        flush_pending(&self.shared)?;
        let mut guard = self.shared.inner.lock();
        while self.shared.flushed_lsn.load(Ordering::SeqCst) < lsn {
            self.shared.flushed_cv.wait_for(&mut guard, Duration::from_millis(50));
            if self.shared.flushed_lsn.load(Ordering::SeqCst) < lsn {
                drop(guard);
                flush_pending(&self.shared)?;
                guard = self.shared.inner.lock();
            }
        }
        Ok(())
    }

    fn current_lsn(&self) -> u64 {
        self.shared.next_lsn.load(Ordering::SeqCst)
    }

    fn current_flushed_lsn(&self) -> u64 {
        self.shared.flushed_lsn.load(Ordering::SeqCst)
    }
}

impl Drop for LogHandler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn flush_pending(shared: &Shared) -> DbResult<()> {
    let mut inner = shared.inner.lock();
    if inner.buffered.is_empty() {
        return Ok(());
    }
    let entries = std::mem::take(&mut inner.buffered);
    let mut max_lsn = shared.flushed_lsn.load(Ordering::SeqCst);
    for entry in &entries {
        max_lsn = max_lsn.max(entry.lsn);
        inner.current_file.write_all(&entry.encode())?;
        inner.entries_in_current_file += 1;
    }
    inner.current_file.sync_all()?;

    if inner.entries_in_current_file >= shared.max_entries_per_file {
        let next_first = max_lsn + 1;
        let path = shared.dir_manager.path_for(next_first);
        inner.current_file = OpenOptions::new().create(true).append(true).open(path)?;
        inner.current_file_first_lsn = next_first;
        inner.entries_in_current_file = 0;
    }

    shared.flushed_lsn.store(max_lsn, Ordering::SeqCst);
    shared.flushed_cv.notify_all();
    Ok(())
}

fn count_entries(path: &std::path::Path) -> DbResult<u64> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let mut offset = 0;
    let mut count = 0u64;
    while let Some((_, consumed)) = LogEntry::decode(&bytes[offset..])? {
        offset += consumed;
        count += 1;
    }
    Ok(count)
}

/// A [`LogSink`] that discards every entry, used when `Config::wal_enabled`
/// is false.
pub struct VacuousLogHandler {
    next_lsn: AtomicU64,
}

impl VacuousLogHandler {
    pub fn new() -> Self {
        Self {
            next_lsn: AtomicU64::new(1),
        }
    }
}

impl Default for VacuousLogHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for VacuousLogHandler {
    fn append(&self, _module: LogModule, _payload: &[u8]) -> DbResult<u64> {
        Ok(self.next_lsn.fetch_add(1, Ordering::SeqCst))
    }

    fn wait_lsn(&self, _lsn: u64) -> DbResult<()> {
        Ok(())
    }

    fn current_lsn(&self) -> u64 {
        self.next_lsn.load(Ordering::SeqCst)
    }

    fn current_flushed_lsn(&self) -> u64 {
        self.next_lsn.load(Ordering::SeqCst).saturating_sub(1)
    }
}
