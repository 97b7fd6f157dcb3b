#![allow(dead_code)]

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tabload::db::{Database, DbColumn, DbError, DbResult, SqlDialect};
use tabload::observer::LoadObserver;
use tabload::value::SqlValue;
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directories");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }

    /// Copies a fixture from `tests/data` into the workspace.
    pub fn copy_fixture(&self, name: &str, target: &str) -> PathBuf {
        let path = self.temp_dir.path().join(target);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directories");
        }
        fs::copy(fixture_path(name), &path).expect("copy fixture");
        path
    }

    pub fn mkdir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::create_dir_all(&path).expect("create directory");
        path
    }
}

/// CSV body `id,name,score` with `rows` data rows.
pub fn numbered_csv(rows: usize) -> String {
    let mut body = String::from("id,name,score\n");
    for id in 1..=rows {
        body.push_str(&format!("{id},name {id},{}.5\n", id * 10));
    }
    body
}

/// Collects observer events as short strings.
#[derive(Default)]
pub struct RecordingObserver {
    pub events: RefCell<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.starts_with(prefix))
            .count()
    }
}

impl LoadObserver for RecordingObserver {
    fn file_started(&self, _source: &Path, table: &str, rows: usize) {
        self.events.borrow_mut().push(format!("start {table} {rows}"));
    }

    fn batch_committed(&self, table: &str, batch: usize, rows: usize, loaded: usize, total: usize) {
        self.events
            .borrow_mut()
            .push(format!("commit {table} {batch} {rows} {loaded}/{total}"));
    }

    fn batch_failed(&self, table: &str, batch: usize, _error: &DbError) {
        self.events.borrow_mut().push(format!("batch_failed {table} {batch}"));
    }

    fn duplicate_detected(&self, _source: &Path, table: &str, batch: usize) {
        self.events.borrow_mut().push(format!("duplicate {table} {batch}"));
    }

    fn row_failed(&self, table: &str, batch: usize, row: usize, _error: &DbError) {
        self.events
            .borrow_mut()
            .push(format!("row_failed {table} {batch} {row}"));
    }

    fn file_finished(&self, _source: &Path, table: &str, succeeded: usize, failed: usize) {
        self.events
            .borrow_mut()
            .push(format!("finish {table} {succeeded} {failed}"));
    }
}

/// In-memory executor with scripted failures.
///
/// `execute_many` fails with `batch_error` when set. Single-row `execute`
/// fails with `row_error` when the row's first value is in `failing_rows`.
#[derive(Default)]
pub struct ScriptedDatabase {
    pub connected: bool,
    pub batch_error: Option<String>,
    pub failing_rows: Vec<SqlValue>,
    pub row_error: String,
    pub pending: Vec<Vec<SqlValue>>,
    pub committed: Vec<Vec<SqlValue>>,
    pub calls: Vec<String>,
}

impl ScriptedDatabase {
    pub fn failing_batches(message: &str) -> Self {
        Self {
            batch_error: Some(message.to_string()),
            row_error: "row rejected".to_string(),
            ..Self::default()
        }
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| c.as_str() == call).count()
    }
}

impl Database for ScriptedDatabase {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Oracle
    }

    fn connect(&mut self) -> DbResult<()> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn ping(&mut self) -> DbResult<()> {
        Ok(())
    }

    fn table_exists(&mut self, _name: &str) -> DbResult<bool> {
        Ok(true)
    }

    fn get_columns(&mut self, _name: &str) -> DbResult<Vec<DbColumn>> {
        Ok(Vec::new())
    }

    fn execute(&mut self, _sql: &str, params: &[SqlValue]) -> DbResult<usize> {
        self.calls.push("execute".into());
        if params
            .first()
            .is_some_and(|key| self.failing_rows.contains(key))
        {
            return Err(DbError::new(self.row_error.clone()));
        }
        self.pending.push(params.to_vec());
        Ok(1)
    }

    fn execute_many(&mut self, _sql: &str, rows: &[Vec<SqlValue>]) -> DbResult<usize> {
        self.calls.push("execute_many".into());
        if let Some(message) = &self.batch_error {
            return Err(DbError::new(message.clone()));
        }
        self.pending.extend(rows.iter().cloned());
        Ok(rows.len())
    }

    fn begin(&mut self) -> DbResult<()> {
        self.calls.push("begin".into());
        Ok(())
    }

    fn commit(&mut self) -> DbResult<()> {
        self.calls.push("commit".into());
        self.committed.append(&mut self.pending);
        Ok(())
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.calls.push("rollback".into());
        self.pending.clear();
        Ok(())
    }
}
