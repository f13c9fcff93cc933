use std::collections::HashMap;
use std::sync::Arc;

use bincode::config;
use bincode::serde::decode_from_slice;
use buffer::BufferPoolManager;
use catalog::{Column, StorageFormat};
use clog::{LogEntry, LogModule, LogReplayer};
use common::{BufferPoolId, DbResult, PageId};

use crate::codec;
use crate::pax_page::PaxPage;
use crate::row_page::RowPage;
use crate::wire::{RecordLogPayload, RecordOp};

fn bincode_config() -> impl config::Config {
    config::legacy()
}

/// Enough schema information to interpret `RECORD_MANAGER` log entries for
/// one file during recovery. Supplied by whatever owns the table catalog
/// (the `db` crate) before replay starts.
#[derive(Clone)]
pub struct RecordFileDescriptor {
    pub format: StorageFormat,
    pub columns: Vec<Column>,
}

/// Replays `RECORD_MANAGER` log entries against their buffer-pool files,
/// gated by each page's own LSN so already-applied entries are skipped.
pub struct RecordLogReplayer {
    buffer: Arc<BufferPoolManager>,
    descriptors: HashMap<BufferPoolId, RecordFileDescriptor>,
}

impl RecordLogReplayer {
    pub fn new(
        buffer: Arc<BufferPoolManager>,
        descriptors: HashMap<BufferPoolId, RecordFileDescriptor>,
    ) -> Self {
        Self { buffer, descriptors }
    }
}

impl LogReplayer for RecordLogReplayer {
    fn replay(&mut self, entry: &LogEntry) -> DbResult<()> {
        if entry.module != LogModule::RecordManager {
            return Ok(());
        }
        let (payload, _): (RecordLogPayload, usize) =
            decode_from_slice(&entry.payload, bincode_config())
                .map_err(|e| common::DbError::Wal(format!("bad record log payload: {e}")))?;
        let id = BufferPoolId(payload.buffer_pool_id);
        let Some(descriptor) = self.descriptors.get(&id) else {
            return Ok(());
        };
        let page_id = PageId(payload.page_num);
        let mut page = self.buffer.fetch_page_mut(id, page_id)?;
        if entry.lsn <= page.lsn() {
            return Ok(());
        }

        match payload.op {
            RecordOp::InitPage { widths } => match descriptor.format {
                StorageFormat::Row => {
                    RowPage::init(&mut page, widths[0] as usize)?;
                }
                StorageFormat::Pax => {
                    let widths: Vec<usize> = widths.into_iter().map(|w| w as usize).collect();
                    PaxPage::init(&mut page, &widths)?;
                }
            },
            RecordOp::Insert { slot, data } => match descriptor.format {
                StorageFormat::Row => RowPage::insert_at(&mut page, slot, &data)?,
                StorageFormat::Pax => {
                    let fields = split_pax_fields(&descriptor.columns, &data);
                    PaxPage::insert_at(&mut page, slot, &fields)?;
                }
            },
            RecordOp::Delete { slot } => match descriptor.format {
                StorageFormat::Row => RowPage::delete(&mut page, slot)?,
                StorageFormat::Pax => PaxPage::delete(&mut page, slot)?,
            },
            RecordOp::Update { slot, data } => match descriptor.format {
                StorageFormat::Row => RowPage::update(&mut page, slot, &data)?,
                StorageFormat::Pax => {
                    let fields = split_pax_fields(&descriptor.columns, &data);
                    PaxPage::update(&mut page, slot, &fields)?;
                }
            },
        }
        page.set_lsn(entry.lsn);
        Ok(())
    }
}

/// Chops a flattened PAX row buffer back into its per-field byte slices.
fn split_pax_fields(columns: &[Column], data: &[u8]) -> Vec<Vec<u8>> {
    let mut fields = Vec::with_capacity(columns.len());
    let mut offset = 0;
    for column in columns {
        let width = codec::field_width(column);
        fields.push(data[offset..offset + width].to_vec());
        offset += width;
    }
    fields
}
