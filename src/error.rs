//! Error taxonomy for the import pipeline.
//!
//! File-level errors are fatal to the file being processed only; the
//! orchestration loop in [`crate::importer`] records them and moves on.

use std::path::PathBuf;

use thiserror::Error;

use crate::db::DbError;

pub type ImportResult<T> = Result<T, ImportError>;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("unsupported file format '{extension}' for {}", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// Every structural violation found in a table definition, reported together.
    #[error("schema validation failed: {}", .0.join("; "))]
    SchemaValidation(Vec<String>),

    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// Raised when a failed batch looks like a resubmission of already-loaded data.
    /// Callers treat the file as skipped, never as failed.
    #[error("file {} appears to be imported already into {table}", path.display())]
    DuplicateImport { path: PathBuf, table: String },

    #[error("row insert failed (batch {batch}, row {row}): {message}")]
    RowInsert {
        batch: usize,
        row: usize,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Excel(#[from] calamine::Error),

    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ImportError {
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ImportError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn is_duplicate_import(&self) -> bool {
        matches!(self, ImportError::DuplicateImport { .. })
    }
}
