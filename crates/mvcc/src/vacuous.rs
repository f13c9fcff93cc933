use common::{BufferPoolId, ColumnId, DbResult, RecordId};
use recordmgr::RecordFileHandler;
use types::Value;

use crate::trx::{Trx, TrxKit, TrxTableSource};

/// A transaction kit for tables with no hidden MVCC fields: every record is
/// always visible, writes commit instantly, and there is nothing to roll
/// back. Used for scratch tables and in tests that don't need snapshots.
pub struct VacuousTrxKit;

impl VacuousTrxKit {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VacuousTrxKit {
    fn default() -> Self {
        Self::new()
    }
}

impl TrxKit for VacuousTrxKit {
    fn create_trx(&self) -> Box<dyn Trx> {
        Box::new(VacuousTrx)
    }

    fn recover_trx(&self, _trx_id: i64) -> Box<dyn Trx> {
        Box::new(VacuousTrx)
    }

    fn max_trx_id(&self) -> i64 {
        i64::MAX
    }
}

pub struct VacuousTrx;

impl Trx for VacuousTrx {
    fn id(&self) -> i64 {
        0
    }

    fn check_visibility(&self, _begin_xid: i64, _end_xid: i64, _readonly: bool) -> DbResult<()> {
        Ok(())
    }

    fn insert_record(
        &mut self,
        handler: &RecordFileHandler,
        _table: BufferPoolId,
        _begin_ordinal: ColumnId,
        _end_ordinal: ColumnId,
        values: Vec<Value>,
    ) -> DbResult<RecordId> {
        handler.insert_record(&values)
    }

    fn delete_record(
        &mut self,
        handler: &RecordFileHandler,
        _table: BufferPoolId,
        _begin_ordinal: ColumnId,
        _end_ordinal: ColumnId,
        rid: RecordId,
    ) -> DbResult<()> {
        handler.delete_record(rid)
    }

    fn commit(&mut self, _tables: &dyn TrxTableSource) -> DbResult<()> {
        Ok(())
    }

    fn rollback(&mut self, _tables: &dyn TrxTableSource) -> DbResult<()> {
        Ok(())
    }
}
