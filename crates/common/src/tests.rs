use super::*;
use std::io;

#[test]
fn config_defaults_are_sane() {
    let cfg = Config::default();
    assert_eq!(cfg.page_size, 8192);
    assert_eq!(cfg.buffer_pool_pages, 256);
    assert!(cfg.wal_enabled);
    assert!(cfg.dwb_enabled);
}

#[test]
fn config_builder_overrides_defaults() {
    let cfg = Config::builder()
        .data_dir(PathBuf::from("./t"))
        .page_size(4096)
        .wal_enabled(false)
        .build();
    assert_eq!(cfg.page_size, 4096);
    assert!(!cfg.wal_enabled);
    assert!(cfg.dwb_enabled);
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::Storage("corruption".into());
    assert!(format!("{err}").contains("storage"));
    assert_eq!(err.code(), "STORAGE_ERROR");
}

#[test]
fn db_error_codes_cover_record_manager_outcomes() {
    assert_eq!(DbError::RecordEof.code(), "RECORD_EOF");
    assert_eq!(DbError::RecordInvisible.code(), "RECORD_INVISIBLE");
    assert_eq!(
        DbError::LockedConcurrencyConflict.code(),
        "LOCKED_CONCURRENCY_CONFLICT"
    );
    assert_eq!(DbError::RecordDuplicateKey.code(), "RECORD_DUPLICATE_KEY");
}

#[test]
fn recordbatch_consistency() {
    let rb = RecordBatch {
        columns: vec!["id".into()],
        rows: vec![Row::new(vec![Value::Int(1)])],
    };
    assert_eq!(rb.columns.len(), 1);
    assert_eq!(rb.rows[0].values.len(), 1);
}

#[test]
fn row_carries_rid_without_serializing_it() {
    let rid = RecordId::new(PageId(3), 7);
    let row = Row::new(vec![Value::Int(1)]).with_rid(rid);
    assert_eq!(row.rid(), Some(rid));

    let json = serde_json::to_string(&row).unwrap();
    let back: Row = serde_json::from_str(&json).unwrap();
    assert_eq!(back.rid(), None);
    assert_eq!(back.values, row.values);
}

#[test]
fn io_error_converts() {
    let e = io::Error::other("oops");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::Io(_)));
}
