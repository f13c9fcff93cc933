//! `BplusTreeMiniTransaction`: batches the WAL entries for one tree
//! operation and, on drop, either commits them or replays their pre-images
//! in reverse to undo a partial mutation.

use std::sync::Arc;

use bincode::config::{self, Config};
use bincode::serde::encode_to_vec;
use buffer::BufferPoolManager;
use clog::LogModule;
use common::{BufferPoolId, DbError, DbResult, PageId};

use crate::wire::{BTreeLogPayload, BTreeOp};

fn bincode_config() -> impl Config {
    config::legacy()
}

struct Entry {
    page_id: PageId,
    before: Vec<u8>,
    op: BTreeOp,
}

/// Every B+tree mutation primitive runs through one of these. The caller
/// applies its change to the page directly, then calls `record` with the
/// page's pre-image bytes and the log op describing the change. Dropping
/// the transaction without calling `fail` commits every buffered entry to
/// the log; calling `fail` first makes the drop restore every touched
/// page's pre-image instead, in reverse order.
pub struct BplusTreeMiniTransaction<'a> {
    buffer: &'a Arc<BufferPoolManager>,
    index_id: BufferPoolId,
    entries: Vec<Entry>,
    failed: bool,
    finished: bool,
}

impl<'a> BplusTreeMiniTransaction<'a> {
    pub fn new(buffer: &'a Arc<BufferPoolManager>, index_id: BufferPoolId) -> Self {
        Self {
            buffer,
            index_id,
            entries: Vec::new(),
            failed: false,
            finished: false,
        }
    }

    pub fn record(&mut self, page_id: PageId, before: Vec<u8>, op: BTreeOp) {
        self.entries.push(Entry { page_id, before, op });
    }

    /// Mark this mini-transaction as failed: on drop its entries are undone
    /// instead of committed.
    pub fn fail(&mut self) {
        self.failed = true;
    }

    /// Commit every buffered entry to the log now, stamping each touched
    /// page with the LSN it was assigned.
    pub fn commit(mut self) -> DbResult<()> {
        self.commit_entries()?;
        self.finished = true;
        Ok(())
    }

    fn commit_entries(&mut self) -> DbResult<()> {
        for entry in self.entries.drain(..) {
            let payload = BTreeLogPayload {
                buffer_pool_id: self.index_id.0,
                page_num: entry.page_id.0,
                op: entry.op,
            };
            let bytes = encode_to_vec(&payload, bincode_config())
                .map_err(|e| DbError::Wal(format!("encode btree log entry failed: {e}")))?;
            let lsn = self.buffer.log_sink().append(LogModule::BplusTree, &bytes)?;
            let mut page = self.buffer.fetch_page_mut(self.index_id, entry.page_id)?;
            page.set_lsn(lsn);
        }
        Ok(())
    }

    fn rollback_entries(&mut self) {
        for entry in self.entries.drain(..).rev() {
            if let Ok(mut page) = self.buffer.fetch_page_mut(self.index_id, entry.page_id) {
                page.payload_mut()[..entry.before.len()].copy_from_slice(&entry.before);
            }
        }
    }
}

impl<'a> Drop for BplusTreeMiniTransaction<'a> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.failed {
            self.rollback_entries();
        } else {
            let _ = self.commit_entries();
        }
    }
}
