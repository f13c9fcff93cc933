#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, io, path::PathBuf};
use thiserror::Error;
use types::Value;

/// Identifier for a column within a table schema.
pub type ColumnId = u16;

/// Logical identifier for a page in the storage layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u64);

/// Logical identifier for a table registered in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId(pub u64);

/// Identifies a single open buffer-pool file. Distinct files may reuse the
/// same page numbers, so `(BufferPoolId, PageId)` is the real page identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferPoolId(pub i32);

/// Fully-qualified identifier for a record within a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

/// Positional row representation backed by `types::Value`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
    #[serde(skip)]
    #[serde(default)]
    rid: Option<RecordId>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, rid: None }
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self::new(values)
    }

    pub fn with_rid(mut self, rid: RecordId) -> Self {
        self.rid = Some(rid);
        self
    }

    pub fn set_rid(&mut self, rid: Option<RecordId>) {
        self.rid = rid;
    }

    pub fn rid(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

/// Named projection of a row keyed by column name.
pub type RowMap = HashMap<String, Value>;

/// Rectangular result set carrying column labels and rows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Result codes surfaced across the storage and recovery core.
///
/// Every fallible operation in the engine returns one of these through
/// [`DbError`] rather than unwinding; callers match on the variant to decide
/// whether a failure is a normal outcome (`RecordEof`), a policy decision
/// (`RecordInvisible`) or a genuine I/O problem.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("catalog: {0}")]
    Catalog(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("wal: {0}")]
    Wal(String),
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("buffer pool out of frames")]
    BufferPoolNoBuf,
    #[error("invalid page number {0}")]
    BufferPoolInvalidPageNum(u64),
    #[error("log file is full")]
    LogFileFull,
    #[error("duplicate key on unique index")]
    RecordDuplicateKey,
    #[error("record does not exist")]
    RecordNotExist,
    #[error("end of scan")]
    RecordEof,
    #[error("record not visible to this transaction")]
    RecordInvisible,
    #[error("record is locked by a concurrent transaction")]
    LockedConcurrencyConflict,
    #[error("read error: {0}")]
    IoErrRead(String),
    #[error("write error: {0}")]
    IoErrWrite(String),
    #[error("seek error: {0}")]
    IoErrSeek(String),
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DbError {
    /// Map onto the result-code name used in logs and external interfaces.
    pub fn code(&self) -> &'static str {
        match self {
            DbError::Catalog(_) => "CATALOG_ERROR",
            DbError::Storage(_) => "STORAGE_ERROR",
            DbError::Wal(_) => "WAL_ERROR",
            DbError::Constraint(_) => "CONSTRAINT_VIOLATION",
            DbError::BufferPoolNoBuf => "BUFFERPOOL_NOBUF",
            DbError::BufferPoolInvalidPageNum(_) => "BUFFERPOOL_INVALID_PAGE_NUM",
            DbError::LogFileFull => "LOG_FILE_FULL",
            DbError::RecordDuplicateKey => "RECORD_DUPLICATE_KEY",
            DbError::RecordNotExist => "RECORD_NOT_EXIST",
            DbError::RecordEof => "RECORD_EOF",
            DbError::RecordInvisible => "RECORD_INVISIBLE",
            DbError::LockedConcurrencyConflict => "LOCKED_CONCURRENCY_CONFLICT",
            DbError::IoErrRead(_) => "IOERR_READ",
            DbError::IoErrWrite(_) => "IOERR_WRITE",
            DbError::IoErrSeek(_) => "IOERR_SEEK",
            DbError::Internal(_) => "INTERNAL",
            DbError::Io(_) => "IOERR_READ",
        }
    }
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the storage and recovery core.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .page_size(8192)
///     .buffer_pool_pages(512)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where table data, catalog metadata, and log files live.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Fixed-size page allocation in bytes.
    #[builder(default = 8192)]
    pub page_size: usize,
    /// Number of frames the buffer pool keeps resident per file.
    #[builder(default = 256)]
    pub buffer_pool_pages: usize,
    /// Controls whether the write-ahead log is enabled.
    #[builder(default = true)]
    pub wal_enabled: bool,
    /// Controls whether the double-write buffer stages pages before they
    /// reach their home location.
    #[builder(default = true)]
    pub dwb_enabled: bool,
    /// Maximum number of log entries a single log file holds before the
    /// log file manager rolls to the next one.
    #[builder(default = 10_000)]
    pub max_log_entries_per_file: u64,
    /// Back-pressure threshold for the log handler's in-memory append
    /// buffer, in bytes.
    #[builder(default = 32 * 1024 * 1024)]
    pub log_buffer_max_bytes: usize,
    /// Number of staged pages the double-write buffer holds before an
    /// automatic flush.
    #[builder(default = 128)]
    pub dwb_max_staged_pages: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            page_size: 8192,
            buffer_pool_pages: 256,
            wal_enabled: true,
            dwb_enabled: true,
            max_log_entries_per_file: 10_000,
            log_buffer_max_bytes: 32 * 1024 * 1024,
            dwb_max_staged_pages: 128,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{
        BufferPoolId, Config, DbError, DbResult, PageId, RecordBatch, RecordId, Row, RowMap,
        TableId,
    };
    pub use types::{SqlType, Value};
}
