use std::collections::VecDeque;

use catalog::StorageFormat;
use common::{DbResult, PageId, RecordId};
use types::Value;

use crate::codec;
use crate::file::RecordFileHandler;
use crate::pax_page::PaxPage;
use crate::row_page::RowPage;

/// Read/write intent for a scan: shared latches for `Read`, exclusive for `Write`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanMode {
    Read,
    Write,
}

/// Walks every live record in a file, page-then-slot order.
pub struct RecordFileScanner<'a> {
    handler: &'a RecordFileHandler,
    mode: ScanMode,
    next_page: u64,
    total_pages: u64,
    pending: VecDeque<(PageId, u16)>,
}

impl<'a> RecordFileScanner<'a> {
    pub fn open(handler: &'a RecordFileHandler, mode: ScanMode) -> DbResult<Self> {
        let total_pages = handler.buffer().page_count(handler.buffer_pool_id())? as u64;
        Ok(Self {
            handler,
            mode,
            next_page: 1, // page 0 is the buffer pool file header
            total_pages,
            pending: VecDeque::new(),
        })
    }

    fn refill(&mut self) -> DbResult<()> {
        while self.pending.is_empty() && self.next_page < self.total_pages {
            let page_id = PageId(self.next_page);
            self.next_page += 1;
            let slots = match self.mode {
                ScanMode::Read => {
                    let page = self.handler.buffer().fetch_page(self.handler.buffer_pool_id(), page_id)?;
                    match self.handler.format() {
                        StorageFormat::Row => RowPage::occupied_slots(&page),
                        StorageFormat::Pax => PaxPage::occupied_slots(&page),
                    }
                }
                ScanMode::Write => {
                    let page =
                        self.handler.buffer().fetch_page_mut(self.handler.buffer_pool_id(), page_id)?;
                    match self.handler.format() {
                        StorageFormat::Row => RowPage::occupied_slots(&page),
                        StorageFormat::Pax => PaxPage::occupied_slots(&page),
                    }
                }
            };
            self.pending
                .extend(slots.into_iter().map(|slot| (page_id, slot)));
        }
        Ok(())
    }

    /// Returns the next live `(RecordId, values)` pair, or `None` at EOF.
    pub fn next(&mut self) -> DbResult<Option<(RecordId, Vec<Value>)>> {
        self.refill()?;
        let Some((page_id, slot)) = self.pending.pop_front() else {
            return Ok(None);
        };
        let rid = RecordId::new(page_id, slot);
        let values = self.handler.get_record(rid)?;
        Ok(Some((rid, values)))
    }
}

/// One page's worth of PAX columns, plus which slots within it are live.
pub struct Chunk {
    pub page_id: PageId,
    pub occupied: Vec<u16>,
    pub columns: Vec<Vec<u8>>,
}

/// Walks every page of a PAX file, yielding whole-page column chunks.
pub struct ChunkFileScanner<'a> {
    handler: &'a RecordFileHandler,
    next_page: u64,
    total_pages: u64,
}

impl<'a> ChunkFileScanner<'a> {
    pub fn open(handler: &'a RecordFileHandler) -> DbResult<Self> {
        let total_pages = handler.buffer().page_count(handler.buffer_pool_id())? as u64;
        Ok(Self {
            handler,
            next_page: 1,
            total_pages,
        })
    }

    pub fn next(&mut self) -> DbResult<Option<Chunk>> {
        while self.next_page < self.total_pages {
            let page_id = PageId(self.next_page);
            self.next_page += 1;
            let page = self
                .handler
                .buffer()
                .fetch_page(self.handler.buffer_pool_id(), page_id)?;
            let occupied = PaxPage::occupied_slots(&page);
            if occupied.is_empty() {
                continue;
            }
            let columns = (0..self.handler.columns().len())
                .map(|i| PaxPage::column_chunk(&page, i).to_vec())
                .collect();
            return Ok(Some(Chunk {
                page_id,
                occupied,
                columns,
            }));
        }
        Ok(None)
    }
}

/// Decode one field's value out of a chunk column for the given slot index.
pub fn chunk_field(
    chunk: &Chunk,
    handler: &RecordFileHandler,
    field_idx: usize,
    slot: u16,
) -> DbResult<Value> {
    let column = &handler.columns()[field_idx];
    let width = codec::field_width(column);
    let start = slot as usize * width;
    codec::decode_field(&chunk.columns[field_idx][start..start + width], column)
}
