//! The real MVCC transaction: stamps `begin_xid`/`end_xid` on every row it
//! touches, tracks the touched RIDs so `commit`/`rollback` can finalize
//! them, and appends a logical `TRANSACTION` log entry per operation.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use bincode::config::{self, Config};
use bincode::serde::encode_to_vec;
use clog::{LogModule, LogSink};
use common::{BufferPoolId, ColumnId, DbError, DbResult, RecordId};
use types::Value;

use crate::operation::{Operation, OperationKind, OperationSet};
use crate::trx::{Trx, TrxKit, TrxTableSource};
use crate::wire::{TrxLogOp, TrxLogPayload};

fn bincode_config() -> impl Config {
    config::legacy()
}

pub(crate) const MAX_TRX_ID: i64 = i64::MAX;

/// Hands out monotonically increasing transaction ids and builds `MvccTrx`
/// instances wired to a shared log sink.
pub struct MvccTrxKit {
    log: Arc<dyn LogSink>,
    next_trx_id: Arc<AtomicI64>,
}

impl MvccTrxKit {
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self {
            log,
            next_trx_id: Arc::new(AtomicI64::new(0)),
        }
    }
}

impl TrxKit for MvccTrxKit {
    fn create_trx(&self) -> Box<dyn Trx> {
        let trx_id = self.next_trx_id.fetch_add(1, Ordering::SeqCst) + 1;
        Box::new(MvccTrx::new(trx_id, self.log.clone(), self.next_trx_id.clone()))
    }

    fn recover_trx(&self, trx_id: i64) -> Box<dyn Trx> {
        Box::new(MvccTrx::recovering(trx_id, self.log.clone(), self.next_trx_id.clone()))
    }

    fn max_trx_id(&self) -> i64 {
        MAX_TRX_ID
    }
}

pub struct MvccTrx {
    trx_id: i64,
    log: Arc<dyn LogSink>,
    next_trx_id: Arc<AtomicI64>,
    operations: OperationSet,
    recovering: bool,
}

impl MvccTrx {
    fn new(trx_id: i64, log: Arc<dyn LogSink>, next_trx_id: Arc<AtomicI64>) -> Self {
        Self {
            trx_id,
            log,
            next_trx_id,
            operations: OperationSet::new(),
            recovering: false,
        }
    }

    /// Built only by `MvccTrxLogReplayer`: reconstructs a transaction whose
    /// id is already known from the log, without appending anything.
    fn recovering(trx_id: i64, log: Arc<dyn LogSink>, next_trx_id: Arc<AtomicI64>) -> Self {
        Self {
            trx_id,
            log,
            next_trx_id,
            operations: OperationSet::new(),
            recovering: true,
        }
    }

    fn append_log(&self, op: TrxLogOp) -> DbResult<()> {
        if self.recovering {
            return Ok(());
        }
        let payload = TrxLogPayload { trx_id: self.trx_id, op };
        let bytes = encode_to_vec(&payload, bincode_config())
            .map_err(|e| DbError::Wal(format!("encode trx log entry failed: {e}")))?;
        self.log.append(LogModule::Transaction, &bytes)?;
        Ok(())
    }

    fn next_xid(&self) -> i64 {
        self.next_trx_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Trx for MvccTrx {
    fn id(&self) -> i64 {
        self.trx_id
    }

    fn check_visibility(&self, begin_xid: i64, end_xid: i64, readonly: bool) -> DbResult<()> {
        if begin_xid > 0 && end_xid > 0 {
            if self.trx_id >= begin_xid && self.trx_id < end_xid {
                Ok(())
            } else {
                Err(DbError::RecordInvisible)
            }
        } else if begin_xid < 0 {
            if -begin_xid == self.trx_id {
                Ok(())
            } else {
                Err(DbError::RecordInvisible)
            }
        } else if end_xid < 0 {
            let mine = -end_xid == self.trx_id;
            if readonly {
                if mine { Err(DbError::RecordInvisible) } else { Ok(()) }
            } else if mine {
                Err(DbError::RecordInvisible)
            } else {
                Err(DbError::LockedConcurrencyConflict)
            }
        } else {
            Err(DbError::RecordInvisible)
        }
    }

    fn insert_record(
        &mut self,
        handler: &recordmgr::RecordFileHandler,
        table: BufferPoolId,
        begin_ordinal: ColumnId,
        end_ordinal: ColumnId,
        values: Vec<Value>,
    ) -> DbResult<RecordId> {
        let mut row = values;
        let needed = end_ordinal as usize + 1;
        if row.len() < needed {
            row.resize(needed, Value::Null);
        }
        row[begin_ordinal as usize] = Value::Int(-self.trx_id);
        row[end_ordinal as usize] = Value::Int(MAX_TRX_ID);

        let rid = handler.insert_record(&row)?;
        self.operations.insert(Operation::new(OperationKind::Insert, table, rid));
        self.append_log(TrxLogOp::record(OperationKind::Insert, table, rid))?;
        Ok(rid)
    }

    fn delete_record(
        &mut self,
        handler: &recordmgr::RecordFileHandler,
        table: BufferPoolId,
        _begin_ordinal: ColumnId,
        end_ordinal: ColumnId,
        rid: RecordId,
    ) -> DbResult<()> {
        let trx_id = self.trx_id;
        handler.visit_record(rid, |current| {
            let mut updated = current.to_vec();
            updated[end_ordinal as usize] = Value::Int(-trx_id);
            Ok(updated)
        })?;
        self.operations.insert(Operation::new(OperationKind::Delete, table, rid));
        self.append_log(TrxLogOp::record(OperationKind::Delete, table, rid))?;
        Ok(())
    }

    fn commit(&mut self, tables: &dyn TrxTableSource) -> DbResult<()> {
        let commit_xid = self.next_xid();
        for operation in self.operations.drain() {
            let handle = tables.table(operation.table)?;
            match operation.kind {
                OperationKind::Insert => {
                    handle.handler.visit_record(operation.rid, |current| {
                        let mut updated = current.to_vec();
                        updated[handle.begin_ordinal as usize] = Value::Int(commit_xid);
                        Ok(updated)
                    })?;
                }
                OperationKind::Delete => {
                    handle.handler.visit_record(operation.rid, |current| {
                        let mut updated = current.to_vec();
                        updated[handle.end_ordinal as usize] = Value::Int(commit_xid);
                        Ok(updated)
                    })?;
                }
            }
        }

        if !self.recovering {
            let lsn = {
                let payload = TrxLogPayload {
                    trx_id: self.trx_id,
                    op: TrxLogOp::Commit { commit_trx_id: commit_xid },
                };
                let bytes = encode_to_vec(&payload, bincode_config())
                    .map_err(|e| DbError::Wal(format!("encode trx commit entry failed: {e}")))?;
                self.log.append(LogModule::Transaction, &bytes)?
            };
            self.log.wait_lsn(lsn)?;
        }
        Ok(())
    }

    fn rollback(&mut self, tables: &dyn TrxTableSource) -> DbResult<()> {
        for operation in self.operations.drain() {
            let handle = tables.table(operation.table)?;
            match operation.kind {
                OperationKind::Insert => {
                    handle.handler.delete_record(operation.rid)?;
                }
                OperationKind::Delete => {
                    handle.handler.visit_record(operation.rid, |current| {
                        let mut updated = current.to_vec();
                        updated[handle.end_ordinal as usize] = Value::Int(MAX_TRX_ID);
                        Ok(updated)
                    })?;
                }
            }
        }
        self.append_log(TrxLogOp::Rollback)?;
        Ok(())
    }
}
