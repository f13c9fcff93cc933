//! Replays `TRANSACTION` log entries during recovery.
//!
//! These entries are purely bookkeeping: the row bytes themselves are
//! restored by the record manager's own physical replay. What this replayer
//! needs to reconstruct is which transactions never reached a `Commit` or
//! `Rollback` entry, so their half-finished writes can be undone the same
//! way an explicit `rollback()` would.

use std::collections::HashMap;

use bincode::config::{self, Config};
use bincode::serde::decode_from_slice;
use clog::{LogEntry, LogModule, LogReplayer};
use common::DbResult;
use types::Value;

use crate::mvcc_trx::MAX_TRX_ID;
use crate::operation::{Operation, OperationKind, OperationSet};
use crate::trx::TrxTableSource;
use crate::wire::{TrxLogOp, TrxLogPayload};

fn bincode_config() -> impl Config {
    config::legacy()
}

pub struct MvccTrxLogReplayer<'a> {
    tables: &'a dyn TrxTableSource,
    pending: HashMap<i64, OperationSet>,
}

impl<'a> MvccTrxLogReplayer<'a> {
    pub fn new(tables: &'a dyn TrxTableSource) -> Self {
        Self { tables, pending: HashMap::new() }
    }
}

impl LogReplayer for MvccTrxLogReplayer<'_> {
    fn replay(&mut self, entry: &LogEntry) -> DbResult<()> {
        if entry.module != LogModule::Transaction {
            return Ok(());
        }
        let (payload, _): (TrxLogPayload, usize) = decode_from_slice(&entry.payload, bincode_config())
            .map_err(|e| common::DbError::Wal(format!("bad trx log payload: {e}")))?;

        match payload.op {
            TrxLogOp::InsertRecord { table, rid } => {
                self.pending.entry(payload.trx_id).or_default().insert(Operation::new(
                    OperationKind::Insert,
                    common::BufferPoolId(table),
                    rid,
                ));
            }
            TrxLogOp::DeleteRecord { table, rid } => {
                self.pending.entry(payload.trx_id).or_default().insert(Operation::new(
                    OperationKind::Delete,
                    common::BufferPoolId(table),
                    rid,
                ));
            }
            TrxLogOp::Commit { .. } | TrxLogOp::Rollback => {
                self.pending.remove(&payload.trx_id);
            }
        }
        Ok(())
    }

    fn on_done(&mut self) -> DbResult<()> {
        for (_trx_id, operations) in self.pending.drain() {
            for operation in operations {
                let handle = self.tables.table(operation.table)?;
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
        }
        Ok(())
    }
}
