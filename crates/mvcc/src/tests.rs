use std::sync::Arc;

use buffer::BufferPoolManager;
use catalog::{Column, StorageFormat};
use clog::LogHandler;
use common::BufferPoolId;
use recordmgr::RecordFileHandler;
use tempfile::tempdir;
use types::{SqlType, Value};

use super::*;

fn user_columns() -> Vec<Column> {
    vec![
        Column::new("id", SqlType::Int),
        Column::new("name", SqlType::Text).with_len(16),
    ]
}

fn versioned_columns() -> Vec<Column> {
    let mut columns = user_columns();
    columns.push(Column::new("__begin_xid", SqlType::Int));
    columns.push(Column::new("__end_xid", SqlType::Int));
    columns
}

const BEGIN_ORDINAL: u16 = 2;
const END_ORDINAL: u16 = 3;
const TABLE: BufferPoolId = BufferPoolId(1);

struct SingleTable {
    handler: Arc<RecordFileHandler>,
}

impl TrxTableSource for SingleTable {
    fn table(&self, table_id: BufferPoolId) -> DbResult<TrxTableHandle> {
        assert_eq!(table_id, TABLE);
        Ok(TrxTableHandle {
            handler: self.handler.clone(),
            begin_ordinal: BEGIN_ORDINAL,
            end_ordinal: END_ORDINAL,
        })
    }
}

fn harness(dir: &std::path::Path, log: Arc<LogHandler>) -> SingleTable {
    let buffer = Arc::new(BufferPoolManager::new(dir, 16, log, None));
    buffer.open_file(TABLE, "t1.tbl").unwrap();
    let handler = Arc::new(RecordFileHandler::new(buffer, TABLE, StorageFormat::Row, versioned_columns()));
    SingleTable { handler }
}

fn row(id: i64, name: &str) -> Vec<Value> {
    vec![Value::Int(id), Value::Text(name.into())]
}

#[test]
fn vacuous_trx_inserts_and_deletes_without_hidden_fields() {
    let dir = tempdir().unwrap();
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let buffer = Arc::new(BufferPoolManager::new(dir.path(), 16, log, None));
    buffer.open_file(TABLE, "t1.tbl").unwrap();
    let handler = RecordFileHandler::new(buffer, TABLE, StorageFormat::Row, user_columns());

    let kit = VacuousTrxKit::new();
    let mut trx = kit.create_trx();
    let rid = trx
        .insert_record(&handler, TABLE, 0, 1, row(1, "Ada"))
        .unwrap();
    assert_eq!(handler.get_record(rid).unwrap(), row(1, "Ada"));

    trx.delete_record(&handler, TABLE, 0, 1, rid).unwrap();
    assert!(handler.get_record(rid).is_err());
}

#[test]
fn insert_is_visible_to_self_before_commit_but_not_to_others() {
    let dir = tempdir().unwrap();
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let harness = harness(dir.path(), log.clone());
    let kit = MvccTrxKit::new(log);

    let mut writer = kit.create_trx();
    let rid = writer
        .insert_record(&harness.handler, TABLE, BEGIN_ORDINAL, END_ORDINAL, row(1, "Ada"))
        .unwrap();

    let stored = harness.handler.get_record(rid).unwrap();
    let begin_xid = match stored[BEGIN_ORDINAL as usize] {
        Value::Int(n) => n,
        _ => panic!("expected int"),
    };
    let end_xid = match stored[END_ORDINAL as usize] {
        Value::Int(n) => n,
        _ => panic!("expected int"),
    };
    assert_eq!(begin_xid, -writer.id());

    writer.check_visibility(begin_xid, end_xid, false).unwrap();

    let reader = kit.create_trx();
    let err = reader.check_visibility(begin_xid, end_xid, false).unwrap_err();
    assert!(matches!(err, DbError::RecordInvisible));
}

#[test]
fn committed_insert_is_visible_to_later_transactions() {
    let dir = tempdir().unwrap();
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let harness = harness(dir.path(), log.clone());
    let kit = MvccTrxKit::new(log);

    let mut writer = kit.create_trx();
    let rid = writer
        .insert_record(&harness.handler, TABLE, BEGIN_ORDINAL, END_ORDINAL, row(1, "Ada"))
        .unwrap();
    writer.commit(&harness).unwrap();

    let reader = kit.create_trx();
    let stored = harness.handler.get_record(rid).unwrap();
    let begin_xid = match stored[BEGIN_ORDINAL as usize] {
        Value::Int(n) => n,
        _ => panic!("expected int"),
    };
    let end_xid = match stored[END_ORDINAL as usize] {
        Value::Int(n) => n,
        _ => panic!("expected int"),
    };
    reader.check_visibility(begin_xid, end_xid, false).unwrap();
}

#[test]
fn rollback_of_insert_deletes_the_record() {
    let dir = tempdir().unwrap();
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let harness = harness(dir.path(), log.clone());
    let kit = MvccTrxKit::new(log);

    let mut writer = kit.create_trx();
    let rid = writer
        .insert_record(&harness.handler, TABLE, BEGIN_ORDINAL, END_ORDINAL, row(1, "Ada"))
        .unwrap();
    writer.rollback(&harness).unwrap();

    assert!(harness.handler.get_record(rid).is_err());
}

#[test]
fn delete_marks_end_xid_negative_until_commit_then_conflicts_for_writers() {
    let dir = tempdir().unwrap();
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let harness = harness(dir.path(), log.clone());
    let kit = MvccTrxKit::new(log);

    let mut inserter = kit.create_trx();
    let rid = inserter
        .insert_record(&harness.handler, TABLE, BEGIN_ORDINAL, END_ORDINAL, row(1, "Ada"))
        .unwrap();
    inserter.commit(&harness).unwrap();

    let mut deleter = kit.create_trx();
    deleter
        .delete_record(&harness.handler, TABLE, BEGIN_ORDINAL, END_ORDINAL, rid)
        .unwrap();

    let stored = harness.handler.get_record(rid).unwrap();
    let end_xid = match stored[END_ORDINAL as usize] {
        Value::Int(n) => n,
        _ => panic!("expected int"),
    };
    assert_eq!(end_xid, -deleter.id());

    let other = kit.create_trx();
    let err = other.check_visibility(1, end_xid, false).unwrap_err();
    assert!(matches!(err, DbError::LockedConcurrencyConflict));

    let other_reader = kit.create_trx();
    other_reader.check_visibility(1, end_xid, true).unwrap();
}

#[test]
fn rollback_of_delete_restores_visibility() {
    let dir = tempdir().unwrap();
    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let harness = harness(dir.path(), log.clone());
    let kit = MvccTrxKit::new(log);

    let mut inserter = kit.create_trx();
    let rid = inserter
        .insert_record(&harness.handler, TABLE, BEGIN_ORDINAL, END_ORDINAL, row(1, "Ada"))
        .unwrap();
    inserter.commit(&harness).unwrap();

    let mut deleter = kit.create_trx();
    deleter
        .delete_record(&harness.handler, TABLE, BEGIN_ORDINAL, END_ORDINAL, rid)
        .unwrap();
    deleter.rollback(&harness).unwrap();

    let stored = harness.handler.get_record(rid).unwrap();
    let end_xid = match stored[END_ORDINAL as usize] {
        Value::Int(n) => n,
        _ => panic!("expected int"),
    };
    assert_eq!(end_xid, kit.max_trx_id());
    let reader = kit.create_trx();
    reader.check_visibility(1, end_xid, false).unwrap();
}

#[test]
fn replay_undoes_transaction_left_uncommitted() {
    let dir = tempdir().unwrap();
    let rid;
    let begin_xid_before;
    {
        let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
        let harness = harness(dir.path(), log.clone());
        let kit = MvccTrxKit::new(log);
        let mut writer = kit.create_trx();
        rid = writer
            .insert_record(&harness.handler, TABLE, BEGIN_ORDINAL, END_ORDINAL, row(1, "Ada"))
            .unwrap();
        let stored = harness.handler.get_record(rid).unwrap();
        begin_xid_before = match stored[BEGIN_ORDINAL as usize] {
            Value::Int(n) => n,
            _ => panic!("expected int"),
        };
        log.flush().unwrap();
        // Dropped without commit or rollback: simulates a crash mid-transaction.
    }

    let log = Arc::new(LogHandler::init(dir.path(), 10_000).unwrap());
    let buffer = Arc::new(BufferPoolManager::new(dir.path(), 16, log.clone(), None));
    buffer.open_file(TABLE, "t1.tbl").unwrap();
    let handler = Arc::new(RecordFileHandler::new(buffer, TABLE, StorageFormat::Row, versioned_columns()));
    let harness = SingleTable { handler: handler.clone() };

    assert!(begin_xid_before < 0);

    let mut descriptors = std::collections::HashMap::new();
    descriptors.insert(
        TABLE,
        recordmgr::RecordFileDescriptor {
            format: StorageFormat::Row,
            columns: versioned_columns(),
        },
    );
    let mut record_replayer = recordmgr::RecordLogReplayer::new(harness.handler.buffer().clone(), descriptors);
    log.replay(&mut record_replayer, 0).unwrap();

    let mut trx_replayer = MvccTrxLogReplayer::new(&harness);
    log.replay(&mut trx_replayer, 0).unwrap();

    assert!(harness.handler.get_record(rid).is_err());
}
