//! The `Trx`/`TrxKit` abstraction: every table operation in the engine goes
//! through some transaction, whether or not it tracks anything. `VacuousTrx`
//! is the no-op implementation used by tables with no MVCC fields; `MvccTrx`
//! is the real one.

use std::sync::Arc;

use common::{BufferPoolId, ColumnId, DbResult, RecordId};
use recordmgr::RecordFileHandler;
use types::Value;

/// Resolves a table identifier to the record handler and hidden-field
/// ordinals a transaction needs to finalize operations against it at commit
/// or rollback time. Implemented by the `Db` façade, which owns the table
/// registry; kept as a trait here so `mvcc` does not depend on it.
pub trait TrxTableSource: Send + Sync {
    fn table(&self, table_id: BufferPoolId) -> DbResult<TrxTableHandle>;
}

#[derive(Clone)]
pub struct TrxTableHandle {
    pub handler: Arc<RecordFileHandler>,
    pub begin_ordinal: ColumnId,
    pub end_ordinal: ColumnId,
}

/// One running (or recovering) transaction.
pub trait Trx: Send + Sync {
    fn id(&self) -> i64;

    /// Checks whether a record stamped with `(begin_xid, end_xid)` is
    /// visible to this transaction. `readonly` distinguishes a plain read
    /// from a write attempt, which surfaces a conflict instead of simply
    /// skipping an invisible row.
    fn check_visibility(&self, begin_xid: i64, end_xid: i64, readonly: bool) -> DbResult<()>;

    /// Insert `values` into `handler`, stamping the hidden begin/end xid
    /// columns at `begin_ordinal`/`end_ordinal` before the row is written.
    fn insert_record(
        &mut self,
        handler: &RecordFileHandler,
        table: BufferPoolId,
        begin_ordinal: ColumnId,
        end_ordinal: ColumnId,
        values: Vec<Value>,
    ) -> DbResult<RecordId>;

    /// Mark a record deleted by stamping its end xid field in place; the
    /// physical slot is freed only once the deleting transaction commits.
    fn delete_record(
        &mut self,
        handler: &RecordFileHandler,
        table: BufferPoolId,
        begin_ordinal: ColumnId,
        end_ordinal: ColumnId,
        rid: RecordId,
    ) -> DbResult<()>;

    fn commit(&mut self, tables: &dyn TrxTableSource) -> DbResult<()>;

    fn rollback(&mut self, tables: &dyn TrxTableSource) -> DbResult<()>;
}

/// Produces transactions. `VacuousTrxKit` is used by tables that carry no
/// hidden MVCC fields; `MvccTrxKit` is the real one.
pub trait TrxKit: Send + Sync {
    fn create_trx(&self) -> Box<dyn Trx>;

    /// Construct a transaction bound to a specific, already-known id, used
    /// only while replaying the log during recovery.
    fn recover_trx(&self, trx_id: i64) -> Box<dyn Trx>;

    fn max_trx_id(&self) -> i64;
}
