//! Observability collaborator handed to the load pipeline.
//!
//! The loader reports progress through a [`LoadObserver`] it is given
//! rather than through process-wide state. [`LogObserver`] forwards events
//! to the `log` facade; [`CompositeObserver`] fans out to several observers.

use std::{fmt, path::Path};

use log::{debug, info, warn};

use crate::db::DbError;

/// Receives load pipeline events. Every method defaults to a no-op.
pub trait LoadObserver {
    fn file_started(&self, _source: &Path, _table: &str, _rows: usize) {}

    /// `batch` is 1-based; `loaded` counts rows processed so far for the file.
    fn batch_committed(&self, _table: &str, _batch: usize, _rows: usize, _loaded: usize, _total: usize) {
    }

    fn batch_failed(&self, _table: &str, _batch: usize, _error: &DbError) {}

    fn duplicate_detected(&self, _source: &Path, _table: &str, _batch: usize) {}

    /// `batch` and `row` are 1-based.
    fn row_failed(&self, _table: &str, _batch: usize, _row: usize, _error: &DbError) {}

    fn file_finished(&self, _source: &Path, _table: &str, _succeeded: usize, _failed: usize) {}
}

/// Forwards events to `log`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl LoadObserver for LogObserver {
    fn file_started(&self, source: &Path, table: &str, rows: usize) {
        info!("Loading {rows} row(s) from {} into {table}", source.display());
    }

    fn batch_committed(&self, table: &str, batch: usize, rows: usize, loaded: usize, total: usize) {
        debug!("{table}: batch {batch} committed {rows} row(s) ({loaded}/{total})");
    }

    fn batch_failed(&self, table: &str, batch: usize, error: &DbError) {
        warn!("{table}: batch {batch} failed: {error}");
    }

    fn duplicate_detected(&self, source: &Path, table: &str, batch: usize) {
        warn!(
            "{} looks already imported into {table} (batch {batch}); skipping file",
            source.display()
        );
    }

    fn row_failed(&self, table: &str, batch: usize, row: usize, error: &DbError) {
        warn!("{table}: batch {batch} row {row} failed: {error}");
    }

    fn file_finished(&self, source: &Path, table: &str, succeeded: usize, failed: usize) {
        info!(
            "Finished {} into {table}: {succeeded} row(s) inserted, {failed} failed",
            source.display()
        );
    }
}

/// Fans every event out to each wrapped observer in order.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Box<dyn LoadObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Box<dyn LoadObserver>>) -> Self {
        Self { observers }
    }

    pub fn push(&mut self, observer: Box<dyn LoadObserver>) {
        self.observers.push(observer);
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl LoadObserver for CompositeObserver {
    fn file_started(&self, source: &Path, table: &str, rows: usize) {
        for o in &self.observers {
            o.file_started(source, table, rows);
        }
    }

    fn batch_committed(&self, table: &str, batch: usize, rows: usize, loaded: usize, total: usize) {
        for o in &self.observers {
            o.batch_committed(table, batch, rows, loaded, total);
        }
    }

    fn batch_failed(&self, table: &str, batch: usize, error: &DbError) {
        for o in &self.observers {
            o.batch_failed(table, batch, error);
        }
    }

    fn duplicate_detected(&self, source: &Path, table: &str, batch: usize) {
        for o in &self.observers {
            o.duplicate_detected(source, table, batch);
        }
    }

    fn row_failed(&self, table: &str, batch: usize, row: usize, error: &DbError) {
        for o in &self.observers {
            o.row_failed(table, batch, row, error);
        }
    }

    fn file_finished(&self, source: &Path, table: &str, succeeded: usize, failed: usize) {
        for o in &self.observers {
            o.file_finished(source, table, succeeded, failed);
        }
    }
}
