//! Batched transactional inserts with per-row retry and the duplicate-import
//! heuristic.
//!
//! Rows are partitioned into fixed-size batches, each executed as one
//! `execute_many` call inside its own transaction. A failed batch is first
//! checked against the duplicate-import heuristic: a large enough batch whose
//! error text names a unique-key violation marks the whole file as already
//! imported. Any other failure falls back to inserting the batch's rows one
//! at a time, each in a fresh transaction.

use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    coerce::OutputRow,
    db::{Database, DbError, with_transaction},
    error::{ImportError, ImportResult},
    observer::LoadObserver,
    schema::TableSpec,
    stats::RowCounts,
    value::{SqlValue, sanitize_row},
};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_DUPLICATE_MIN_BATCH_SIZE: usize = 10;
pub const DEFAULT_DUPLICATE_ERROR_KEYWORDS: [&str; 5] = [
    "unique constraint",
    "unique key",
    "duplicate key",
    "ORA-00001",
    "violates unique constraint",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderSettings {
    pub batch_size: usize,
    pub duplicate_min_batch_size: usize,
    pub duplicate_error_keywords: Vec<String>,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            duplicate_min_batch_size: DEFAULT_DUPLICATE_MIN_BATCH_SIZE,
            duplicate_error_keywords: DEFAULT_DUPLICATE_ERROR_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

/// Result of a completed (non-duplicate) load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    pub rows: RowCounts,
    pub batches: usize,
    /// One message per row that failed during retry.
    pub errors: Vec<String>,
}

pub struct BatchLoader<'a> {
    settings: &'a LoaderSettings,
    observer: &'a dyn LoadObserver,
}

impl<'a> BatchLoader<'a> {
    pub fn new(settings: &'a LoaderSettings, observer: &'a dyn LoadObserver) -> Self {
        Self { settings, observer }
    }

    /// True when a failed batch of `batch_len` rows should be treated as a
    /// resubmission of already-loaded data.
    pub fn is_duplicate_import(&self, batch_len: usize, error: &DbError) -> bool {
        if batch_len < self.settings.duplicate_min_batch_size {
            return false;
        }
        let message = error.message.to_lowercase();
        self.settings
            .duplicate_error_keywords
            .iter()
            .any(|keyword| message.contains(&keyword.to_lowercase()))
    }

    /// Loads `rows` into `spec`'s table.
    ///
    /// Returns [`ImportError::DuplicateImport`] when the heuristic fires;
    /// batches committed before that point stay committed but are not counted.
    pub fn load<D>(
        &self,
        db: &mut D,
        spec: &TableSpec,
        rows: &[OutputRow],
        source: &Path,
    ) -> ImportResult<LoadOutcome>
    where
        D: Database + ?Sized,
    {
        let sql = db.dialect().insert_sql(spec);
        let total = rows.len();
        let batch_size = self.settings.batch_size.max(1);
        self.observer.file_started(source, &spec.name, total);
        debug!("Insert statement for {}: {sql}", spec.name);

        let mut outcome = LoadOutcome::default();
        let mut processed = 0;
        for (batch_idx, chunk) in rows.chunks(batch_size).enumerate() {
            let batch_no = batch_idx + 1;
            let params: Vec<Vec<SqlValue>> = chunk.iter().map(|row| sanitize_row(row)).collect();
            outcome.batches += 1;

            match with_transaction(db, |db| db.execute_many(&sql, &params)) {
                Ok(affected) => {
                    if affected != chunk.len() {
                        debug!(
                            "{}: batch {batch_no} reported {affected} affected row(s) for {} row(s)",
                            spec.name,
                            chunk.len()
                        );
                    }
                    outcome.rows.attempted += chunk.len();
                    outcome.rows.succeeded += chunk.len();
                    processed += chunk.len();
                    self.observer.batch_committed(
                        &spec.name,
                        batch_no,
                        chunk.len(),
                        processed,
                        total,
                    );
                }
                Err(err) => {
                    self.observer.batch_failed(&spec.name, batch_no, &err);
                    if self.is_duplicate_import(chunk.len(), &err) {
                        self.observer
                            .duplicate_detected(source, &spec.name, batch_no);
                        return Err(ImportError::DuplicateImport {
                            path: source.to_path_buf(),
                            table: spec.name.clone(),
                        });
                    }
                    self.retry_rows(db, &sql, &spec.name, batch_no, &params, &mut outcome);
                    processed += chunk.len();
                }
            }
        }

        self.observer.file_finished(
            source,
            &spec.name,
            outcome.rows.succeeded,
            outcome.rows.failed,
        );
        Ok(outcome)
    }

    fn retry_rows<D>(
        &self,
        db: &mut D,
        sql: &str,
        table: &str,
        batch_no: usize,
        params: &[Vec<SqlValue>],
        outcome: &mut LoadOutcome,
    ) where
        D: Database + ?Sized,
    {
        debug!("{table}: retrying batch {batch_no} row by row");
        for (row_idx, row) in params.iter().enumerate() {
            let row_no = row_idx + 1;
            outcome.rows.attempted += 1;
            match with_transaction(db, |db| db.execute(sql, row)) {
                Ok(_) => outcome.rows.succeeded += 1,
                Err(err) => {
                    self.observer.row_failed(table, batch_no, row_no, &err);
                    outcome.rows.failed += 1;
                    outcome.errors.push(
                        ImportError::RowInsert {
                            batch: batch_no,
                            row: row_no,
                            message: format!("{table}: {err}"),
                        }
                        .to_string(),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::SqliteDatabase,
        observer::LogObserver,
        schema::{ColumnSpec, DataKind},
        value::Cell,
    };

    fn spec() -> TableSpec {
        let mut spec = TableSpec::new(
            "ITEMS",
            vec![
                ColumnSpec::new("ID", DataKind::number(10, 0), false),
                ColumnSpec::new("NAME", DataKind::varchar(20), true),
            ],
        );
        spec.primary_key = vec!["ID".to_string()];
        spec
    }

    fn rows(ids: impl IntoIterator<Item = i64>) -> Vec<OutputRow> {
        ids.into_iter()
            .map(|id| vec![Cell::Integer(id), Cell::Text(format!("item {id}"))])
            .collect()
    }

    fn database() -> SqliteDatabase {
        let mut db = SqliteDatabase::in_memory();
        db.connect().unwrap();
        db.execute(
            &spec().create_table_sql(crate::db::SqlDialect::Sqlite),
            &[],
        )
        .unwrap();
        db
    }

    #[test]
    fn duplicate_heuristic_needs_size_and_keyword() {
        let settings = LoaderSettings::default();
        let loader = BatchLoader::new(&settings, &LogObserver);
        let unique = DbError::new("ORA-00001: UNIQUE CONSTRAINT (X.PK) violated");
        assert!(loader.is_duplicate_import(50, &unique));
        assert!(loader.is_duplicate_import(10, &unique));
        assert!(!loader.is_duplicate_import(9, &unique));
        assert!(!loader.is_duplicate_import(50, &DbError::new("value too large")));
    }

    #[test]
    fn batches_commit_and_count_every_row() {
        let settings = LoaderSettings {
            batch_size: 2,
            ..LoaderSettings::default()
        };
        let loader = BatchLoader::new(&settings, &LogObserver);
        let mut db = database();
        let outcome = loader
            .load(&mut db, &spec(), &rows(1..=5), Path::new("items.csv"))
            .unwrap();
        assert_eq!(outcome.batches, 3);
        assert_eq!(
            outcome.rows,
            RowCounts {
                attempted: 5,
                succeeded: 5,
                failed: 0
            }
        );
    }

    #[test]
    fn small_failed_batch_retries_rows() {
        let settings = LoaderSettings::default();
        let loader = BatchLoader::new(&settings, &LogObserver);
        let mut db = database();
        loader
            .load(&mut db, &spec(), &rows([2]), Path::new("a.csv"))
            .unwrap();

        let outcome = loader
            .load(&mut db, &spec(), &rows(1..=5), Path::new("b.csv"))
            .unwrap();
        assert_eq!(outcome.rows.attempted, 5);
        assert_eq!(outcome.rows.succeeded, 4);
        assert_eq!(outcome.rows.failed, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("batch 1, row 2"));
    }

    #[test]
    fn large_failed_batch_is_a_duplicate_import() {
        let settings = LoaderSettings::default();
        let loader = BatchLoader::new(&settings, &LogObserver);
        let mut db = database();
        loader
            .load(&mut db, &spec(), &rows(1..=50), Path::new("a.csv"))
            .unwrap();

        let err = loader
            .load(&mut db, &spec(), &rows(1..=50), Path::new("a.csv"))
            .unwrap_err();
        assert!(err.is_duplicate_import());
    }
}
