//! Run-level statistics and the run report.

use std::{
    fmt::Write as _,
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{io_utils, table::render_table};

pub const DUPLICATE_IMPORT_REASON: &str = "duplicate_import";

/// A file that was recognised as already imported and left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipRecord {
    pub source: PathBuf,
    pub table: String,
    pub reason: String,
    pub timestamp: NaiveDateTime,
    /// SHA-256 of the source file contents, when readable.
    pub fingerprint: Option<String>,
}

impl SkipRecord {
    pub fn duplicate(source: &Path, table: &str) -> Self {
        Self {
            source: source.to_path_buf(),
            table: table.to_string(),
            reason: DUPLICATE_IMPORT_REASON.to_string(),
            timestamp: Local::now().naive_local(),
            fingerprint: fingerprint_file(source).ok(),
        }
    }
}

pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Loaded,
    DryRun,
    Skipped,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Loaded => "loaded",
            FileStatus::DryRun => "dry_run",
            FileStatus::Skipped => "skipped",
            FileStatus::Failed => "failed",
        }
    }
}

/// Row counts produced by loading one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RowCounts {
    pub fn add(&mut self, other: RowCounts) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub source: PathBuf,
    pub table: Option<String>,
    pub status: FileStatus,
    pub rows: RowCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatistics {
    pub run_id: Uuid,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub files_attempted: usize,
    pub files_succeeded: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub rows_attempted: usize,
    pub rows_succeeded: usize,
    pub rows_failed: usize,
    pub errors: Vec<String>,
    pub skipped_files: Vec<SkipRecord>,
    pub files: Vec<FileSummary>,
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStatistics {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Local::now().naive_local(),
            finished_at: None,
            files_attempted: 0,
            files_succeeded: 0,
            files_failed: 0,
            files_skipped: 0,
            rows_attempted: 0,
            rows_succeeded: 0,
            rows_failed: 0,
            errors: Vec::new(),
            skipped_files: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Adds row counts from a load; failed rows never make a file fail.
    pub fn record_rows(&mut self, rows: RowCounts) {
        self.rows_attempted += rows.attempted;
        self.rows_succeeded += rows.succeeded;
        self.rows_failed += rows.failed;
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn record_file_success(
        &mut self,
        source: &Path,
        table: &str,
        status: FileStatus,
        rows: RowCounts,
    ) {
        self.files_attempted += 1;
        self.files_succeeded += 1;
        self.files.push(FileSummary {
            source: source.to_path_buf(),
            table: Some(table.to_string()),
            status,
            rows,
        });
    }

    pub fn record_file_failure(&mut self, source: &Path, table: Option<&str>, error: &str) {
        self.files_attempted += 1;
        self.files_failed += 1;
        self.errors
            .push(format!("{}: {error}", source.display()));
        self.files.push(FileSummary {
            source: source.to_path_buf(),
            table: table.map(str::to_string),
            status: FileStatus::Failed,
            rows: RowCounts::default(),
        });
    }

    /// Files skipped as duplicates count as attempted but contribute no rows.
    pub fn record_skip(&mut self, record: SkipRecord) {
        self.files_attempted += 1;
        self.files_skipped += 1;
        self.files.push(FileSummary {
            source: record.source.clone(),
            table: Some(record.table.clone()),
            status: FileStatus::Skipped,
            rows: RowCounts::default(),
        });
        self.skipped_files.push(record);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now().naive_local());
    }

    pub fn has_failures(&self) -> bool {
        self.files_failed > 0
    }

    pub fn elapsed_seconds(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Serializing run statistics")
    }

    pub fn write_report(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        io_utils::write_text(path, &json)
            .with_context(|| format!("Writing run report to {path:?}"))
    }

    /// Console summary: totals followed by one line per file.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Run {}", self.run_id);
        let _ = writeln!(
            out,
            "Files: {} attempted, {} succeeded, {} failed, {} skipped",
            self.files_attempted, self.files_succeeded, self.files_failed, self.files_skipped
        );
        let _ = writeln!(
            out,
            "Rows:  {} attempted, {} succeeded, {} failed",
            self.rows_attempted, self.rows_succeeded, self.rows_failed
        );
        if let Some(seconds) = self.elapsed_seconds() {
            let _ = writeln!(out, "Elapsed: {seconds:.3}s");
        }
        if !self.files.is_empty() {
            let headers = ["file", "table", "status", "succeeded", "failed"]
                .iter()
                .map(|h| h.to_string())
                .collect::<Vec<_>>();
            let rows = self
                .files
                .iter()
                .map(|file| {
                    vec![
                        file.source.display().to_string(),
                        file.table.clone().unwrap_or_default(),
                        file.status.as_str().to_string(),
                        file.rows.succeeded.to_string(),
                        file.rows.failed.to_string(),
                    ]
                })
                .collect::<Vec<_>>();
            out.push_str(&render_table(&headers, &rows));
        }
        if !self.errors.is_empty() {
            let _ = writeln!(out, "Errors:");
            for error in &self.errors {
                let _ = writeln!(out, "  - {error}");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn totals_exclude_skipped_files() {
        let mut stats = RunStatistics::new();
        let rows = RowCounts {
            attempted: 3,
            succeeded: 2,
            failed: 1,
        };
        stats.record_rows(rows);
        stats.record_file_success(Path::new("a.csv"), "A", FileStatus::Loaded, rows);
        stats.record_skip(SkipRecord {
            source: PathBuf::from("b.csv"),
            table: "B".into(),
            reason: DUPLICATE_IMPORT_REASON.into(),
            timestamp: Local::now().naive_local(),
            fingerprint: None,
        });
        stats.record_file_failure(Path::new("c.csv"), None, "boom");

        assert_eq!(stats.files_attempted, 3);
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.rows_succeeded + stats.rows_failed, stats.rows_attempted);
        assert_eq!(stats.errors, vec!["c.csv: boom"]);
        assert!(stats.has_failures());
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.csv");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(
            fingerprint_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn report_serializes_counts_and_summary_renders() {
        let mut stats = RunStatistics::new();
        stats.record_file_success(
            Path::new("users.csv"),
            "USERS",
            FileStatus::DryRun,
            RowCounts::default(),
        );
        stats.finish();
        let json: serde_json::Value = serde_json::from_str(&stats.to_json().unwrap()).unwrap();
        assert_eq!(json["files_succeeded"], 1);
        assert_eq!(json["files"][0]["status"], "dry_run");
        assert!(json["finished_at"].is_string());

        let summary = stats.render_summary();
        assert!(summary.contains("1 attempted, 1 succeeded, 0 failed, 0 skipped"));
        assert!(summary.contains("USERS"));
    }
}
