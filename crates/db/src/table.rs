//! A `Table` owns one record file handler over its heap file, zero or more
//! B+tree indexes, and the catalog metadata describing its columns and
//! storage format. Every write goes through a transaction so the hidden
//! version fields stay consistent with the heap row.

use std::sync::Arc;

use btree::BTreeIndex;
use buffer::BufferPoolManager;
use catalog::{StorageFormat, TableMeta};
use common::{BufferPoolId, ColumnId, DbError, DbResult, RecordId};
use mvcc::Trx;
use recordmgr::{ChunkFileScanner, RecordFileHandler, RecordFileScanner, ScanMode};
use types::Value;

/// One B+tree index bound to a single table column.
struct TableIndex {
    name: String,
    column: ColumnId,
    tree: BTreeIndex,
}

pub struct Table {
    meta: TableMeta,
    handler: Arc<RecordFileHandler>,
    indexes: Vec<TableIndex>,
}

/// Derives the buffer-pool file identifier for a table's heap file directly
/// from its catalog id, and for an index from its catalog id offset well
/// past the range any table id will reach. Avoids persisting a separate
/// id-to-file mapping table.
const INDEX_BUFFER_POOL_OFFSET: i32 = 1_000_000;

pub fn table_buffer_pool_id(table_id: common::TableId) -> BufferPoolId {
    BufferPoolId(table_id.0 as i32)
}

pub fn index_buffer_pool_id(index_id: catalog::IndexId) -> BufferPoolId {
    BufferPoolId(INDEX_BUFFER_POOL_OFFSET + index_id.0 as i32)
}

fn heap_file_name(meta: &TableMeta) -> String {
    format!("{}.tbl", meta.name)
}

fn index_file_name(meta: &TableMeta, index_name: &str) -> String {
    format!("{}__{}.idx", meta.name, index_name)
}

impl Table {
    /// Allocate a fresh heap file and every index declared in `meta`.
    pub fn create(buffer: Arc<BufferPoolManager>, meta: TableMeta) -> DbResult<Self> {
        let id = table_buffer_pool_id(meta.id);
        buffer.open_file(id, &heap_file_name(&meta))?;
        let handler = Arc::new(RecordFileHandler::new(
            buffer.clone(),
            id,
            meta.storage_format,
            meta.schema.columns.clone(),
        ));

        let mut indexes = Vec::with_capacity(meta.indexes().len());
        for index_meta in meta.indexes() {
            let column = *index_meta.columns.first().ok_or_else(|| {
                DbError::Catalog(format!("index '{}' has no columns", index_meta.name))
            })?;
            let column_def = &meta.schema.columns[column as usize];
            let tree = BTreeIndex::create(
                buffer.clone(),
                index_buffer_pool_id(index_meta.id),
                &index_file_name(&meta, &index_meta.name),
                column_def.ty,
                column_def.len,
            )?;
            indexes.push(TableIndex { name: index_meta.name.clone(), column, tree });
        }

        Ok(Self { meta, handler, indexes })
    }

    /// Reopen a table's existing heap file and indexes after a restart.
    pub fn open(buffer: Arc<BufferPoolManager>, meta: TableMeta) -> DbResult<Self> {
        let id = table_buffer_pool_id(meta.id);
        buffer.open_file(id, &heap_file_name(&meta))?;
        let handler = Arc::new(RecordFileHandler::new(
            buffer.clone(),
            id,
            meta.storage_format,
            meta.schema.columns.clone(),
        ));

        let mut indexes = Vec::with_capacity(meta.indexes().len());
        for index_meta in meta.indexes() {
            let column = *index_meta.columns.first().ok_or_else(|| {
                DbError::Catalog(format!("index '{}' has no columns", index_meta.name))
            })?;
            let tree = BTreeIndex::open(
                buffer.clone(),
                index_buffer_pool_id(index_meta.id),
                &index_file_name(&meta, &index_meta.name),
            )?;
            indexes.push(TableIndex { name: index_meta.name.clone(), column, tree });
        }

        Ok(Self { meta, handler, indexes })
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    pub fn handler(&self) -> &Arc<RecordFileHandler> {
        &self.handler
    }

    pub fn buffer_pool_id(&self) -> BufferPoolId {
        table_buffer_pool_id(self.meta.id)
    }

    pub fn index_buffer_pool_ids(&self) -> Vec<BufferPoolId> {
        self.meta.indexes().iter().map(|i| index_buffer_pool_id(i.id)).collect()
    }

    fn begin_end_ordinals(&self) -> (ColumnId, ColumnId) {
        (
            self.meta.begin_xid_ordinal().unwrap_or(0),
            self.meta.end_xid_ordinal().unwrap_or(0),
        )
    }

    /// Insert `values` (user columns only, hidden version fields excluded)
    /// into the heap and every index. If an index insert fails partway
    /// through, the indexes already updated and the heap row are rolled
    /// back so the table is left exactly as it was before the call.
    pub fn insert_record(&self, trx: &mut dyn Trx, values: Vec<Value>) -> DbResult<RecordId> {
        let (begin_ordinal, end_ordinal) = self.begin_end_ordinals();
        let rid = trx.insert_record(&self.handler, self.buffer_pool_id(), begin_ordinal, end_ordinal, values)?;

        let full_row = self.handler.get_record(rid)?;
        let mut applied = Vec::with_capacity(self.indexes.len());
        for index in &self.indexes {
            let key = vec![full_row[index.column as usize].clone()];
            match index.tree.insert(key.clone(), rid) {
                Ok(()) => applied.push((index, key)),
                Err(err) => {
                    for (done_index, done_key) in applied.into_iter().rev() {
                        let _ = done_index.tree.delete(&done_key, rid);
                    }
                    let _ = self.handler.delete_record(rid);
                    return Err(err);
                }
            }
        }
        Ok(rid)
    }

    /// Mark `rid` deleted under `trx`. Index entries are left pointing at
    /// the row: older snapshots may still need them, and a deleted row's
    /// physical slot is only freed once `trx` commits and nothing else
    /// references it. Reclaiming dead index entries for committed deletes
    /// is a vacuum concern this engine does not implement.
    pub fn delete_record(&self, trx: &mut dyn Trx, rid: RecordId) -> DbResult<()> {
        let (begin_ordinal, end_ordinal) = self.begin_end_ordinals();
        trx.delete_record(&self.handler, self.buffer_pool_id(), begin_ordinal, end_ordinal, rid)
    }

    fn visibility_of(&self, row: &[Value]) -> Option<(i64, i64)> {
        let begin_ordinal = self.meta.begin_xid_ordinal()?;
        let end_ordinal = self.meta.end_xid_ordinal()?;
        let begin = match row[begin_ordinal as usize] {
            Value::Int(n) => n,
            _ => return None,
        };
        let end = match row[end_ordinal as usize] {
            Value::Int(n) => n,
            _ => return None,
        };
        Some((begin, end))
    }

    fn user_columns(&self, row: Vec<Value>) -> Vec<Value> {
        let user_len = row.len() - self.meta.sys_field_count as usize;
        row.into_iter().take(user_len).collect()
    }

    /// Scan every live record visible to `trx`, stripping the hidden
    /// version columns before handing rows back.
    pub fn get_record_scanner<'a>(&'a self, trx: &'a dyn Trx, mode: ScanMode) -> DbResult<TableScanner<'a>> {
        Ok(TableScanner {
            table: self,
            trx,
            readonly: mode == ScanMode::Read,
            inner: RecordFileScanner::open(&self.handler, mode)?,
        })
    }

    /// Look up matching record ids through a named index. Returned ids may
    /// reference rows not visible to any particular transaction; callers
    /// filter by visibility themselves (e.g. via `handler().get_record`).
    pub fn search_index(&self, index_name: &str, key: &[Value]) -> DbResult<Vec<RecordId>> {
        let index = self
            .indexes
            .iter()
            .find(|i| i.name == index_name)
            .ok_or_else(|| DbError::Catalog(format!("unknown index '{index_name}'")))?;
        index.tree.search(key)
    }

    pub fn get_chunk_scanner<'a>(&'a self, trx: &'a dyn Trx) -> DbResult<TableChunkScanner<'a>> {
        if self.meta.storage_format != StorageFormat::Pax {
            return Err(DbError::Storage("chunk scans require a PAX table".into()));
        }
        Ok(TableChunkScanner { table: self, trx, inner: ChunkFileScanner::open(&self.handler)? })
    }
}

pub struct TableScanner<'a> {
    table: &'a Table,
    trx: &'a dyn Trx,
    readonly: bool,
    inner: RecordFileScanner<'a>,
}

impl<'a> TableScanner<'a> {
    /// Returns the next record visible to the scanning transaction, or
    /// `None` at end of file. Invisible versions are skipped transparently.
    pub fn next(&mut self) -> DbResult<Option<(RecordId, Vec<Value>)>> {
        loop {
            let Some((rid, row)) = self.inner.next()? else {
                return Ok(None);
            };
            match self.table.visibility_of(&row) {
                Some((begin, end)) => match self.trx.check_visibility(begin, end, self.readonly) {
                    Ok(()) => return Ok(Some((rid, self.table.user_columns(row)))),
                    Err(DbError::RecordInvisible) => continue,
                    Err(err) => return Err(err),
                },
                None => return Ok(Some((rid, row))),
            }
        }
    }
}

pub struct TableChunkScanner<'a> {
    table: &'a Table,
    trx: &'a dyn Trx,
    inner: ChunkFileScanner<'a>,
}

impl<'a> TableChunkScanner<'a> {
    /// Returns the next page's worth of visible rows, decoded and filtered
    /// one slot at a time. PAX's columnar layout means visibility can't be
    /// checked without first decoding each occupied slot's hidden fields.
    pub fn next(&mut self) -> DbResult<Option<Vec<(RecordId, Vec<Value>)>>> {
        let Some(chunk) = self.inner.next()? else {
            return Ok(None);
        };
        let begin_ordinal = self.table.meta.begin_xid_ordinal();
        let end_ordinal = self.table.meta.end_xid_ordinal();
        let mut rows = Vec::with_capacity(chunk.occupied.len());
        for slot in &chunk.occupied {
            let mut values = Vec::with_capacity(self.table.handler.columns().len());
            for field_idx in 0..self.table.handler.columns().len() {
                values.push(recordmgr::chunk_field(&chunk, &self.table.handler, field_idx, *slot)?);
            }
            let visible = match (begin_ordinal, end_ordinal) {
                (Some(b), Some(e)) => {
                    let begin = match values[b as usize] {
                        Value::Int(n) => n,
                        _ => 0,
                    };
                    let end = match values[e as usize] {
                        Value::Int(n) => n,
                        _ => 0,
                    };
                    self.trx.check_visibility(begin, end, true).is_ok()
                }
                _ => true,
            };
            if visible {
                let rid = RecordId::new(chunk.page_id, *slot);
                rows.push((rid, self.table.user_columns(values)));
            }
        }
        Ok(Some(rows))
    }
}
