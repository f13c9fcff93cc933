//! The write-ahead log shared by every recovery-sensitive module.
//!
//! Each mutation to a page, a B+tree node, or a transaction's visibility
//! fields is first appended here as a [`LogEntry`] tagged with a
//! [`LogModule`]; the page (or node, or record) itself is only allowed to
//! reach disk once its LSN has been durably flushed. After a crash, the log
//! is replayed from the oldest unflushed checkpoint and each entry is
//! dispatched, by module, back to the component that produced it.

mod entry;
mod file;
mod handler;
mod module;

pub use entry::{LogEntry, LOG_HEADER_SIZE, LOG_TRAILER_SIZE, MAX_LOG_ENTRY_SIZE, MAX_LOG_PAYLOAD_SIZE};
pub use file::LogFileManager;
pub use handler::{LogHandler, LogReplayer, LogSink, VacuousLogHandler};
pub use module::LogModule;

#[cfg(test)]
mod tests;
