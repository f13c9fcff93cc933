//! Replays `BUFFER_POOL` log entries during recovery.
//!
//! Unlike the record-manager and B+tree replayers, this one never goes
//! through the frame cache: allocation and disposal already mutate the
//! header bitmap with a direct synchronous disk write (see `file.rs`), so
//! redo follows that same path rather than the fetch/guard one.

use std::sync::Arc;

use bincode::config::{self, Config};
use bincode::serde::decode_from_slice;
use clog::{LogEntry, LogModule, LogReplayer};
use common::{BufferPoolId, DbResult};

use crate::BufferPoolManager;
use crate::wire::{BufferPoolLogPayload, BufferPoolOp};

fn bincode_config() -> impl Config {
    config::legacy()
}

/// Rebuilds each targeted file's allocation bitmap from its `BUFFER_POOL`
/// log entries, gated by the header page's own LSN so already-applied
/// entries are skipped. This is what lets a file that was deleted (but
/// whose log survived) come back with the same allocated-page count.
pub struct BufferPoolLogReplayer {
    buffer: Arc<BufferPoolManager>,
    files: Vec<BufferPoolId>,
}

impl BufferPoolLogReplayer {
    pub fn new(buffer: Arc<BufferPoolManager>, files: Vec<BufferPoolId>) -> Self {
        Self { buffer, files }
    }
}

impl LogReplayer for BufferPoolLogReplayer {
    fn replay(&mut self, entry: &LogEntry) -> DbResult<()> {
        if entry.module != LogModule::BufferPool {
            return Ok(());
        }
        let (payload, _): (BufferPoolLogPayload, usize) =
            decode_from_slice(&entry.payload, bincode_config())
                .map_err(|e| common::DbError::Wal(format!("bad buffer pool log payload: {e}")))?;
        let id = BufferPoolId(payload.buffer_pool_id);
        if !self.files.contains(&id) {
            return Ok(());
        }
        match payload.op {
            BufferPoolOp::Allocate => {
                self.buffer.redo_allocate_page(id, entry.lsn, payload.page_num)?
            }
            BufferPoolOp::Deallocate => {
                self.buffer.redo_deallocate_page(id, entry.lsn, payload.page_num)?
            }
        }
        Ok(())
    }
}
