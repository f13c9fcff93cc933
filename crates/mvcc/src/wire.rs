//! Log payloads for `TRANSACTION` WAL entries. These are logical, not
//! physical: they record which transaction touched which row, so recovery
//! can tell which transactions never reached a `Commit`/`Rollback` entry.
//! The row bytes themselves are restored by the record manager's own
//! physical replay.

use common::{BufferPoolId, RecordId};
use serde::{Deserialize, Serialize};

use crate::operation::OperationKind;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum TrxLogOp {
    InsertRecord {
        table: i32,
        rid: RecordId,
    },
    DeleteRecord {
        table: i32,
        rid: RecordId,
    },
    Commit {
        commit_trx_id: i64,
    },
    Rollback,
}

impl TrxLogOp {
    pub fn record(kind: OperationKind, table: BufferPoolId, rid: RecordId) -> Self {
        match kind {
            OperationKind::Insert => TrxLogOp::InsertRecord { table: table.0, rid },
            OperationKind::Delete => TrxLogOp::DeleteRecord { table: table.0, rid },
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TrxLogPayload {
    pub trx_id: i64,
    pub op: TrxLogOp,
}
