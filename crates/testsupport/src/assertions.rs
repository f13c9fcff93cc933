//! Custom assertion helpers for the storage and recovery crates.

use common::{DbResult, RecordId};
use mvcc::Trx;
use recordmgr::ScanMode;
use types::Value;

use crate::context::TestContext;

/// Collect every record visible to `trx` in `table`, in scan order.
pub fn scan_visible(ctx: &TestContext, table_name: &str, trx: &dyn Trx) -> DbResult<Vec<(RecordId, Vec<Value>)>> {
    let table = ctx.db().table(table_name)?;
    let mut scanner = table.get_record_scanner(trx, ScanMode::Read)?;
    let mut rows = Vec::new();
    while let Some(entry) = scanner.next()? {
        rows.push(entry);
    }
    Ok(rows)
}

/// Assert an operation returns an error whose `Display` contains `expected`.
pub fn assert_error_contains<T>(result: DbResult<T>, expected: &str) {
    match result {
        Ok(_) => panic!("expected error containing '{expected}', got Ok"),
        Err(e) => {
            let msg = e.to_string();
            assert!(msg.contains(expected), "expected error to contain '{expected}', got: {msg}");
        }
    }
}
