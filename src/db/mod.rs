//! The transactional executor the loader talks to.
//!
//! [`Database`] covers the connection lifecycle, catalog queries, statement
//! execution with positional parameters, and explicit transaction control.
//! [`with_transaction`] and [`ConnectionGuard`] release transactions and
//! connections on every exit path.

pub mod sqlite;

use std::ops::{Deref, DerefMut};

use itertools::Itertools;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    schema::{DataKind, TableSpec},
    value::SqlValue,
};

pub use sqlite::SqliteDatabase;

pub type DbResult<T> = Result<T, DbError>;

/// A driver failure. The message is the driver's text, unmodified.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct DbError {
    pub message: String,
}

impl DbError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        DbError::new(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// SQL flavour used for placeholders, defaults and column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Oracle,
    Sqlite,
}

impl SqlDialect {
    /// Positional placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::Oracle => format!(":{index}"),
            SqlDialect::Sqlite => format!("?{index}"),
        }
    }

    pub fn current_timestamp(&self) -> &'static str {
        match self {
            SqlDialect::Oracle => "SYSTIMESTAMP",
            SqlDialect::Sqlite => "CURRENT_TIMESTAMP",
        }
    }

    pub fn column_type(&self, kind: &DataKind) -> String {
        match (self, kind) {
            (SqlDialect::Oracle, DataKind::String { length, fixed: false }) => {
                format!("VARCHAR2({length})")
            }
            (SqlDialect::Sqlite, DataKind::String { length, fixed: false }) => {
                format!("VARCHAR({length})")
            }
            (_, DataKind::String { length, fixed: true }) => format!("CHAR({length})"),
            (
                SqlDialect::Oracle,
                DataKind::Numeric {
                    precision: Some(p),
                    scale: Some(s),
                },
            ) => format!("NUMBER({p},{s})"),
            (
                SqlDialect::Oracle,
                DataKind::Numeric {
                    precision: Some(p),
                    scale: None,
                },
            ) => format!("NUMBER({p})"),
            (SqlDialect::Oracle, DataKind::Numeric { .. }) => "NUMBER".to_string(),
            (SqlDialect::Sqlite, DataKind::Numeric { scale: Some(0), .. }) => {
                "INTEGER".to_string()
            }
            (
                SqlDialect::Sqlite,
                DataKind::Numeric {
                    precision: Some(p),
                    scale: Some(s),
                },
            ) => format!("NUMERIC({p},{s})"),
            (SqlDialect::Sqlite, DataKind::Numeric { .. }) => "NUMERIC".to_string(),
            (SqlDialect::Oracle, DataKind::Timestamp { precision: 0 }) => "DATE".to_string(),
            (SqlDialect::Oracle, DataKind::Timestamp { precision }) => {
                format!("TIMESTAMP({precision})")
            }
            (SqlDialect::Sqlite, DataKind::Timestamp { .. }) => "TIMESTAMP".to_string(),
        }
    }

    /// `INSERT INTO t (a, b) VALUES (:1, :2)` in table column order.
    pub fn insert_sql(&self, spec: &TableSpec) -> String {
        let columns = spec.columns.iter().map(|c| c.name.as_str()).join(", ");
        let placeholders = (1..=spec.columns.len())
            .map(|idx| self.placeholder(idx))
            .join(", ");
        format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders})",
            spec.name
        )
    }
}

pub trait Database {
    fn dialect(&self) -> SqlDialect;

    fn connect(&mut self) -> DbResult<()>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Round-trips a trivial query.
    fn ping(&mut self) -> DbResult<()>;

    /// Case-insensitive table lookup.
    fn table_exists(&mut self, name: &str) -> DbResult<bool>;

    fn get_columns(&mut self, name: &str) -> DbResult<Vec<DbColumn>>;

    /// Executes one statement and returns the affected row count.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<usize>;

    /// Executes one statement per parameter row and returns the summed count.
    fn execute_many(&mut self, sql: &str, rows: &[Vec<SqlValue>]) -> DbResult<usize>;

    fn begin(&mut self) -> DbResult<()>;

    fn commit(&mut self) -> DbResult<()>;

    fn rollback(&mut self) -> DbResult<()>;
}

/// Runs `work` inside a transaction: commit on success, rollback on failure.
pub fn with_transaction<D, T, F>(db: &mut D, work: F) -> DbResult<T>
where
    D: Database + ?Sized,
    F: FnOnce(&mut D) -> DbResult<T>,
{
    db.begin()?;
    let outcome = work(db).and_then(|value| db.commit().map(|_| value));
    if let Err(err) = &outcome {
        debug!("Rolling back transaction after error: {err}");
        if let Err(rollback_err) = db.rollback() {
            warn!("Rollback failed: {rollback_err}");
        }
    }
    outcome
}

/// Holds an open connection and disconnects when dropped.
pub struct ConnectionGuard<'a, D: Database + ?Sized> {
    db: &'a mut D,
}

impl<'a, D: Database + ?Sized> ConnectionGuard<'a, D> {
    pub fn connect(db: &'a mut D) -> DbResult<Self> {
        db.connect()?;
        Ok(Self { db })
    }
}

impl<D: Database + ?Sized> Deref for ConnectionGuard<'_, D> {
    type Target = D;

    fn deref(&self) -> &Self::Target {
        self.db
    }
}

impl<D: Database + ?Sized> DerefMut for ConnectionGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.db
    }
}

impl<D: Database + ?Sized> Drop for ConnectionGuard<'_, D> {
    fn drop(&mut self) {
        if self.db.is_connected() {
            self.db.disconnect();
        }
    }
}
