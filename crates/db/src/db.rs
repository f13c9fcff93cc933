//! `Db` owns the catalog, the shared buffer pool and log, the transaction
//! kit, and every open `Table`. `Db::init` wires all of that together and
//! runs crash recovery before the log handler starts accepting new writes.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use buffer::{BufferPoolLogReplayer, BufferPoolManager};
use btree::BplusTreeLogReplayer;
use catalog::{Catalog, Column, IndexKind, StorageFormat, TableId};
use clog::{LogHandler, LogSink, VacuousLogHandler};
use common::{BufferPoolId, DbError, DbResult};
use dwb::DoubleWriteBuffer;
use mvcc::{MvccTrxKit, MvccTrxLogReplayer, Trx, TrxKit, TrxTableHandle, TrxTableSource, VacuousTrxKit};
use parking_lot::{Mutex, RwLock};
use recordmgr::{RecordFileDescriptor, RecordLogReplayer};
use types::SqlType;

use crate::table::Table;

pub struct Db {
    #[allow(dead_code)]
    dir: PathBuf,
    catalog_path: PathBuf,
    buffer: Arc<BufferPoolManager>,
    log: Arc<dyn LogSink>,
    log_handler: Option<Arc<LogHandler>>,
    trx_kit: Arc<dyn TrxKit>,
    mvcc: bool,
    catalog: Mutex<Catalog>,
    tables: RwLock<HashMap<String, Arc<Table>>>,
}

impl Db {
    /// Construct (or reopen) a database rooted at `path`: loads the
    /// catalog, builds the buffer pool and log, replays the WAL against
    /// every already-registered table and index, then starts the log
    /// handler so new writes can be appended.
    pub fn init(
        name: &str,
        path: impl Into<PathBuf>,
        trx_kit_name: &str,
        log_handler_name: &str,
    ) -> DbResult<Self> {
        let dir = path.into();
        fs::create_dir_all(&dir)?;
        let catalog_path = dir.join(format!("{name}.catalog.json"));
        let catalog = Catalog::load(&catalog_path)?;

        let (log, log_handler): (Arc<dyn LogSink>, Option<Arc<LogHandler>>) = match log_handler_name {
            "vacuous" => (Arc::new(VacuousLogHandler::new()), None),
            "disk" => {
                let handler = Arc::new(LogHandler::init(&dir, 10_000)?);
                (handler.clone(), Some(handler))
            }
            other => {
                return Err(DbError::Catalog(format!("unknown log handler '{other}'")));
            }
        };

        let dwb = match &log_handler {
            Some(_) => Some(Arc::new(DoubleWriteBuffer::open(dir.join("dwb.stage"), 128)?)),
            None => None,
        };
        let buffer = Arc::new(BufferPoolManager::new(&dir, 256, log.clone(), dwb));
        buffer.recover_dwb()?;

        let mvcc = match trx_kit_name {
            "mvcc" => true,
            "vacuous" => false,
            other => return Err(DbError::Catalog(format!("unknown transaction kit '{other}'"))),
        };
        let trx_kit: Arc<dyn TrxKit> = if mvcc {
            Arc::new(MvccTrxKit::new(log.clone()))
        } else {
            Arc::new(VacuousTrxKit::new())
        };

        let mut tables = HashMap::new();
        for meta in catalog.tables() {
            let table = Table::open(buffer.clone(), meta.clone())?;
            tables.insert(meta.name.clone(), Arc::new(table));
        }

        let db = Self {
            dir,
            catalog_path,
            buffer,
            log,
            log_handler: log_handler.clone(),
            trx_kit,
            mvcc,
            catalog: Mutex::new(catalog),
            tables: RwLock::new(tables),
        };

        if let Some(handler) = &log_handler {
            db.replay(handler)?;
            handler.start();
        }

        Ok(db)
    }

    fn replay(&self, handler: &LogHandler) -> DbResult<()> {
        let mut descriptors = HashMap::new();
        let mut index_ids = Vec::new();
        let mut all_ids = Vec::new();
        for table in self.tables.read().values() {
            all_ids.push(table.buffer_pool_id());
            descriptors.insert(
                table.buffer_pool_id(),
                RecordFileDescriptor {
                    format: table.meta().storage_format,
                    columns: table.meta().schema.columns.clone(),
                },
            );
            index_ids.extend(table.index_buffer_pool_ids());
        }
        all_ids.extend(index_ids.iter().copied());

        // Rebuild allocation bitmaps first: record/B+tree replay below
        // fetches pages by id, which only makes sense once a file's
        // allocation state (rebuilt here if the data file itself was lost)
        // agrees with what was logged.
        let mut bufferpool_replayer = BufferPoolLogReplayer::new(self.buffer.clone(), all_ids);
        handler.replay(&mut bufferpool_replayer, 0)?;

        let mut record_replayer = RecordLogReplayer::new(self.buffer.clone(), descriptors);
        handler.replay(&mut record_replayer, 0)?;

        let mut btree_replayer = BplusTreeLogReplayer::new(self.buffer.clone(), index_ids);
        handler.replay(&mut btree_replayer, 0)?;

        if self.mvcc {
            let mut trx_replayer = MvccTrxLogReplayer::new(self);
            handler.replay(&mut trx_replayer, 0)?;
        }
        Ok(())
    }

    /// Begin a new transaction against this database.
    pub fn begin(&self) -> Box<dyn Trx> {
        self.trx_kit.create_trx()
    }

    fn save_catalog(&self, catalog: &Catalog) -> DbResult<()> {
        catalog.save(&self.catalog_path)
    }

    /// Declare a new table. `columns` are `(name, type, len)` triples; `len`
    /// only matters for `SqlType::Text`. If this database runs the MVCC
    /// transaction kit, two hidden version columns are appended to the
    /// schema before the heap file is created.
    pub fn create_table(
        &self,
        name: &str,
        columns: Vec<(String, SqlType, u32)>,
        storage_format: StorageFormat,
    ) -> DbResult<TableId> {
        let columns: Vec<Column> = columns
            .into_iter()
            .map(|(name, ty, len)| Column::new(name, ty).with_len(len))
            .collect();

        let mut catalog = self.catalog.lock();
        let table_id = catalog.create_table(name, columns, storage_format)?;
        if self.mvcc {
            catalog.table_mut(name)?.append_trx_fields()?;
        }
        let meta = catalog.table(name)?.clone();
        self.save_catalog(&catalog)?;
        drop(catalog);

        let table = Table::create(self.buffer.clone(), meta)?;
        self.tables.write().insert(name.to_string(), Arc::new(table));
        Ok(table_id)
    }

    /// Add a single-column B+tree index to an existing table.
    pub fn create_index(&self, table_name: &str, index_name: &str, column: &str) -> DbResult<()> {
        let mut catalog = self.catalog.lock();
        catalog.create_index(table_name, index_name, &[column], IndexKind::BTree)?;
        let meta = catalog.table(table_name)?.clone();
        self.save_catalog(&catalog)?;
        drop(catalog);

        let table = Table::open(self.buffer.clone(), meta)?;
        self.tables.write().insert(table_name.to_string(), Arc::new(table));
        Ok(())
    }

    pub fn table(&self, name: &str) -> DbResult<Arc<Table>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))
    }

    /// Stop the log handler's flusher thread, if one is running. Call
    /// before dropping the database to guarantee every buffered entry is
    /// durable.
    pub fn shutdown(&self) {
        if let Some(handler) = &self.log_handler {
            handler.stop();
        }
    }
}

impl TrxTableSource for Db {
    fn table(&self, table_id: BufferPoolId) -> DbResult<TrxTableHandle> {
        let tables = self.tables.read();
        let table = tables
            .values()
            .find(|t| t.buffer_pool_id() == table_id)
            .ok_or_else(|| DbError::Catalog(format!("no table open for buffer pool {}", table_id.0)))?;
        let meta = table.meta();
        Ok(TrxTableHandle {
            handler: table.handler().clone(),
            begin_ordinal: meta.begin_xid_ordinal().unwrap_or(0),
            end_ordinal: meta.end_xid_ordinal().unwrap_or(0),
        })
    }
}
