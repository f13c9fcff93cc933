//! Test execution context: an isolated, temp-directory-backed `Db` that
//! every test gets its own copy of.

use std::path::Path;

use catalog::StorageFormat;
use common::DbResult;
use db::Db;
use tempfile::TempDir;
use types::SqlType;

/// An isolated database instance with its own temporary data directory.
/// Dropping `TestContext` deletes the directory.
pub struct TestContext {
    _temp_dir: TempDir,
    db: Db,
}

impl TestContext {
    /// A vacuous transaction kit and a vacuous (in-memory-only) log: the
    /// cheapest setup for tests that don't care about visibility or crash
    /// recovery.
    pub fn new() -> DbResult<Self> {
        Self::with_kits("vacuous", "vacuous")
    }

    /// A real MVCC transaction kit backed by a disk-resident WAL: for tests
    /// exercising visibility, commit/rollback, or crash recovery.
    pub fn new_mvcc() -> DbResult<Self> {
        Self::with_kits("mvcc", "disk")
    }

    pub fn with_kits(trx_kit_name: &str, log_handler_name: &str) -> DbResult<Self> {
        let temp_dir = tempfile::tempdir()?;
        let db = Db::init("test", temp_dir.path(), trx_kit_name, log_handler_name)?;
        Ok(Self { _temp_dir: temp_dir, db })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn data_dir(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Create the standard `users(id INT, name TEXT, age INT)` test table.
    pub fn create_users_table(&self) -> DbResult<()> {
        self.db.create_table(
            "users",
            vec![
                ("id".into(), SqlType::Int, 0),
                ("name".into(), SqlType::Text, 32),
                ("age".into(), SqlType::Int, 0),
            ],
            StorageFormat::Row,
        )?;
        Ok(())
    }
}
