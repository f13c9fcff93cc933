use std::collections::VecDeque;
use std::sync::Arc;

use bincode::config;
use bincode::serde::encode_to_vec;
use buffer::BufferPoolManager;
use catalog::{Column, StorageFormat};
use clog::LogModule;
use common::{BufferPoolId, DbError, DbResult, PageId, RecordId};
use parking_lot::Mutex;
use types::Value;

use crate::codec;
use crate::pax_page::PaxPage;
use crate::row_page::RowPage;
use crate::wire::{RecordLogPayload, RecordOp};

fn bincode_config() -> impl config::Config {
    config::legacy()
}

fn pax_widths(columns: &[Column]) -> Vec<usize> {
    columns.iter().map(codec::field_width).collect()
}

/// File-level record API over one buffer-pool file: finds a page with a
/// free slot (or allocates one), and dispatches row/PAX page operations.
pub struct RecordFileHandler {
    buffer: Arc<BufferPoolManager>,
    id: BufferPoolId,
    format: StorageFormat,
    columns: Vec<Column>,
    free_pages: Mutex<VecDeque<PageId>>,
}

impl RecordFileHandler {
    pub fn new(
        buffer: Arc<BufferPoolManager>,
        id: BufferPoolId,
        format: StorageFormat,
        columns: Vec<Column>,
    ) -> Self {
        Self {
            buffer,
            id,
            format,
            columns,
            free_pages: Mutex::new(VecDeque::new()),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn log_and_stamp(
        &self,
        page: &mut buffer::PageGuardMut,
        page_num: u64,
        op: RecordOp,
    ) -> DbResult<()> {
        let payload = RecordLogPayload {
            buffer_pool_id: self.id.0,
            page_num,
            op,
        };
        let bytes = encode_to_vec(&payload, bincode_config())
            .map_err(|e| DbError::Wal(format!("encode record log entry failed: {e}")))?;
        let lsn = self.buffer.log_sink().append(LogModule::RecordManager, &bytes)?;
        page.set_lsn(lsn);
        Ok(())
    }

    fn init_row_page(&self, page: &mut buffer::PageGuardMut, record_size: usize) -> DbResult<()> {
        RowPage::init(page, record_size)?;
        self.log_and_stamp(
            page,
            page.page_id().0,
            RecordOp::InitPage {
                widths: vec![record_size as u32],
            },
        )
    }

    fn init_pax_page(&self, page: &mut buffer::PageGuardMut, widths: &[usize]) -> DbResult<()> {
        PaxPage::init(page, widths)?;
        self.log_and_stamp(
            page,
            page.page_id().0,
            RecordOp::InitPage {
                widths: widths.iter().map(|&w| w as u32).collect(),
            },
        )
    }

    /// Find a page with a free slot, initializing a new one if none exists.
    fn page_with_space(&self) -> DbResult<PageId> {
        loop {
            let candidate = self.free_pages.lock().front().copied();
            if let Some(page_id) = candidate {
                let full = {
                    let page = self.buffer.fetch_page(self.id, page_id)?;
                    match self.format {
                        StorageFormat::Row => RowPage::is_full(&page),
                        StorageFormat::Pax => PaxPage::is_full(&page),
                    }
                };
                if full {
                    self.free_pages.lock().pop_front();
                    continue;
                }
                return Ok(page_id);
            }

            let mut page = self.buffer.allocate_page(self.id)?;
            let page_id = page.page_id();
            match self.format {
                StorageFormat::Row => {
                    self.init_row_page(&mut page, codec::record_width(&self.columns))?
                }
                StorageFormat::Pax => self.init_pax_page(&mut page, &pax_widths(&self.columns))?,
            }
            drop(page);
            self.free_pages.lock().push_back(page_id);
            return Ok(page_id);
        }
    }

    pub fn insert_record(&self, values: &[Value]) -> DbResult<RecordId> {
        let page_id = self.page_with_space()?;
        let mut page = self.buffer.fetch_page_mut(self.id, page_id)?;
        let slot = match self.format {
            StorageFormat::Row => {
                let bytes = codec::encode_record(&self.columns, values)?;
                RowPage::insert(&mut page, &bytes)?
            }
            StorageFormat::Pax => {
                let mut fields = Vec::with_capacity(self.columns.len());
                for (column, value) in self.columns.iter().zip(values) {
                    let mut buf = vec![0u8; codec::field_width(column)];
                    codec::encode_field(&mut buf, column, value)?;
                    fields.push(buf);
                }
                PaxPage::insert(&mut page, &fields)?
            }
        };
        let data = match self.format {
            StorageFormat::Row => RowPage::get(&page, slot)?,
            StorageFormat::Pax => PaxPage::get_row(&page, slot)?.concat(),
        };
        self.log_and_stamp(&mut page, page_id.0, RecordOp::Insert { slot, data })?;

        let full = match self.format {
            StorageFormat::Row => RowPage::is_full(&page),
            StorageFormat::Pax => PaxPage::is_full(&page),
        };
        drop(page);
        if full {
            self.free_pages.lock().retain(|&p| p != page_id);
        }
        Ok(RecordId::new(page_id, slot))
    }

    pub fn delete_record(&self, rid: RecordId) -> DbResult<()> {
        let mut page = self.buffer.fetch_page_mut(self.id, rid.page_id)?;
        match self.format {
            StorageFormat::Row => RowPage::delete(&mut page, rid.slot)?,
            StorageFormat::Pax => PaxPage::delete(&mut page, rid.slot)?,
        }
        self.log_and_stamp(
            &mut page,
            rid.page_id.0,
            RecordOp::Delete { slot: rid.slot },
        )?;
        drop(page);
        let mut free = self.free_pages.lock();
        if !free.contains(&rid.page_id) {
            free.push_back(rid.page_id);
        }
        Ok(())
    }

    pub fn update_record(&self, rid: RecordId, values: &[Value]) -> DbResult<()> {
        let mut page = self.buffer.fetch_page_mut(self.id, rid.page_id)?;
        let data = match self.format {
            StorageFormat::Row => {
                let bytes = codec::encode_record(&self.columns, values)?;
                RowPage::update(&mut page, rid.slot, &bytes)?;
                bytes
            }
            StorageFormat::Pax => {
                let mut fields = Vec::with_capacity(self.columns.len());
                for (column, value) in self.columns.iter().zip(values) {
                    let mut buf = vec![0u8; codec::field_width(column)];
                    codec::encode_field(&mut buf, column, value)?;
                    fields.push(buf);
                }
                PaxPage::update(&mut page, rid.slot, &fields)?;
                fields.concat()
            }
        };
        self.log_and_stamp(&mut page, rid.page_id.0, RecordOp::Update { slot: rid.slot, data })
    }

    /// Latch the page exclusively for the duration of `visitor`, which
    /// receives the current typed values and returns the new ones to write
    /// back. The page stays exclusively latched from read through write, so
    /// no other transaction can interleave a mutation in between.
    pub fn visit_record(
        &self,
        rid: RecordId,
        visitor: impl FnOnce(&[Value]) -> DbResult<Vec<Value>>,
    ) -> DbResult<()> {
        let mut page = self.buffer.fetch_page_mut(self.id, rid.page_id)?;
        let current = match self.format {
            StorageFormat::Row => {
                let bytes = RowPage::get(&page, rid.slot)?;
                codec::decode_record(&self.columns, &bytes)?
            }
            StorageFormat::Pax => {
                let fields = PaxPage::get_row(&page, rid.slot)?;
                self.columns
                    .iter()
                    .zip(fields)
                    .map(|(column, bytes)| codec::decode_field(&bytes, column))
                    .collect::<DbResult<Vec<_>>>()?
            }
        };
        let updated = visitor(&current)?;
        let data = match self.format {
            StorageFormat::Row => {
                let bytes = codec::encode_record(&self.columns, &updated)?;
                RowPage::update(&mut page, rid.slot, &bytes)?;
                bytes
            }
            StorageFormat::Pax => {
                let mut fields = Vec::with_capacity(self.columns.len());
                for (column, value) in self.columns.iter().zip(&updated) {
                    let mut buf = vec![0u8; codec::field_width(column)];
                    codec::encode_field(&mut buf, column, value)?;
                    fields.push(buf);
                }
                PaxPage::update(&mut page, rid.slot, &fields)?;
                fields.concat()
            }
        };
        self.log_and_stamp(&mut page, rid.page_id.0, RecordOp::Update { slot: rid.slot, data })
    }

    pub fn get_record(&self, rid: RecordId) -> DbResult<Vec<Value>> {
        let page = self.buffer.fetch_page(self.id, rid.page_id)?;
        match self.format {
            StorageFormat::Row => {
                let bytes = RowPage::get(&page, rid.slot)?;
                codec::decode_record(&self.columns, &bytes)
            }
            StorageFormat::Pax => {
                let fields = PaxPage::get_row(&page, rid.slot)?;
                self.columns
                    .iter()
                    .zip(fields)
                    .map(|(column, bytes)| codec::decode_field(&bytes, column))
                    .collect()
            }
        }
    }

    pub fn buffer_pool_id(&self) -> BufferPoolId {
        self.id
    }

    pub fn format(&self) -> StorageFormat {
        self.format
    }

    pub fn buffer(&self) -> &Arc<BufferPoolManager> {
        &self.buffer
    }
}
