//! Discovers importable files under a data folder.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::SystemTime,
};

use anyhow::{Context, Result, ensure};
use log::{debug, info};
use serde::Serialize;
use walkdir::WalkDir;

use crate::reader::{FileFormat, derive_table_name};

/// Prefix of office lock files left next to open workbooks.
pub const LOCK_FILE_PREFIX: &str = "~$";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub table: String,
    pub format: FileFormat,
    #[serde(skip)]
    pub modified: SystemTime,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub remove_date_suffix: bool,
    /// Uppercased table names to keep; empty keeps everything.
    pub tables: HashSet<String>,
}

impl ScanOptions {
    pub fn new(remove_date_suffix: bool, tables: &[String]) -> Self {
        Self {
            remove_date_suffix,
            tables: tables
                .iter()
                .map(|t| t.trim().to_uppercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

/// Recursively lists supported files under `root`, oldest first.
pub fn scan_directory(root: &Path, options: &ScanOptions) -> Result<Vec<ScannedFile>> {
    ensure!(root.is_dir(), "Data folder {root:?} is not a directory");
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("Walking {root:?}"))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy();
        if name.starts_with(LOCK_FILE_PREFIX) {
            debug!("Skipping lock file {path:?}");
            continue;
        }
        let Some(format) = FileFormat::from_path(path) else {
            continue;
        };
        let table = derive_table_name(path, options.remove_date_suffix);
        if !options.tables.is_empty() && !options.tables.contains(&table) {
            debug!("Skipping {path:?}: table {table} not selected");
            continue;
        }
        let modified = entry
            .metadata()
            .with_context(|| format!("Reading metadata for {path:?}"))?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push(ScannedFile {
            path: path.to_path_buf(),
            table,
            format,
            modified,
        });
    }
    files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    info!("Found {} importable file(s) under {root:?}", files.len());
    Ok(files)
}
