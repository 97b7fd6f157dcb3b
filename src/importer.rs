//! Per-file orchestration: scan, read, infer and merge, validate, ensure the
//! target table, build rows, then load or script them.
//!
//! File-level failures are recorded in [`RunStatistics`] and never stop the
//! run. Only connecting to and pinging the database are fatal.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{error, info, warn};

use crate::{
    coerce::RowBuilder,
    config::Config,
    db::{ConnectionGuard, Database, with_transaction},
    ddl::DdlRegistry,
    error::{ImportError, ImportResult},
    loader::{BatchLoader, LoaderSettings},
    observer::LoadObserver,
    reader::TabularReader,
    scan::{ScanOptions, ScannedFile, scan_directory},
    schema::{SchemaInferencer, TableSpec},
    sql_script,
    stats::{FileStatus, RowCounts, RunStatistics, SkipRecord},
    table::LoadedTable,
};

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub ddl: Option<PathBuf>,
    /// Restricts the run to these tables (case-insensitive).
    pub tables: Vec<String>,
    pub dry_run: bool,
    /// Also write INSERT scripts to the output directory.
    pub create_sql: bool,
}

/// A source file read and matched to its table definition.
#[derive(Debug, Clone)]
pub struct PreparedFile {
    pub table: LoadedTable,
    pub spec: TableSpec,
}

struct FileImport {
    status: FileStatus,
    rows: RowCounts,
    errors: Vec<String>,
}

pub struct Importer<'a> {
    reader: TabularReader,
    inferencer: SchemaInferencer,
    builder: RowBuilder,
    loader_settings: LoaderSettings,
    ddl: DdlRegistry,
    scan: ScanOptions,
    create_table: bool,
    output_dir: PathBuf,
    options: ImportOptions,
    observer: &'a dyn LoadObserver,
}

impl<'a> Importer<'a> {
    pub fn new(config: &Config, options: ImportOptions, observer: &'a dyn LoadObserver) -> Result<Self> {
        let ddl = match &options.ddl {
            Some(path) => DdlRegistry::load(path)?,
            None => DdlRegistry::default(),
        };
        Ok(Self {
            reader: TabularReader::new(config.reader_options()?),
            inferencer: config.inferencer(),
            builder: config.row_builder(),
            loader_settings: config.loader_settings(),
            ddl,
            scan: ScanOptions::new(config.import_settings.remove_date_suffix, &options.tables),
            create_table: config.import_settings.create_table_if_not_exists,
            output_dir: config.output.directory.clone(),
            options,
            observer,
        })
    }

    /// Imports every file under `root` in scan order.
    pub fn run<D>(&self, db: &mut D, root: &Path) -> Result<RunStatistics>
    where
        D: Database + ?Sized,
    {
        let files = scan_directory(root, &self.scan)?;
        let mut stats = RunStatistics::new();
        info!("Run {} started for {root:?}", stats.run_id);
        if files.is_empty() {
            warn!("No importable files found under {root:?}");
        } else if self.options.dry_run {
            info!("Dry run: tables are not checked and no rows are inserted");
            for file in &files {
                self.process_file(None::<&mut D>, file, &mut stats);
            }
        } else {
            let mut guard = ConnectionGuard::connect(db).context("Connecting to database")?;
            guard.ping().context("Database ping failed")?;
            for file in &files {
                self.process_file(Some(&mut *guard), file, &mut stats);
            }
        }
        stats.finish();
        info!(
            "Run {} finished: {} file(s) succeeded, {} failed, {} skipped",
            stats.run_id, stats.files_succeeded, stats.files_failed, stats.files_skipped
        );
        Ok(stats)
    }

    fn process_file<D>(&self, db: Option<&mut D>, file: &ScannedFile, stats: &mut RunStatistics)
    where
        D: Database + ?Sized,
    {
        info!("Processing {:?} as table {}", file.path, file.table);
        match self.import_file(db, &file.path, &file.table) {
            Ok(outcome) => {
                stats.record_rows(outcome.rows);
                for message in outcome.errors {
                    stats.record_error(message);
                }
                stats.record_file_success(&file.path, &file.table, outcome.status, outcome.rows);
            }
            Err(err) if err.is_duplicate_import() => {
                stats.record_skip(SkipRecord::duplicate(&file.path, &file.table));
            }
            Err(err) => {
                error!("Import of {:?} failed: {err}", file.path);
                stats.record_file_failure(&file.path, Some(&file.table), &err.to_string());
            }
        }
    }

    fn import_file<D>(&self, db: Option<&mut D>, path: &Path, table: &str) -> ImportResult<FileImport>
    where
        D: Database + ?Sized,
    {
        let prepared = self.prepare(path, table)?;
        let built = self.builder.build(&prepared.table, &prepared.spec);
        let mut errors = Vec::new();

        if self.options.create_sql
            && let Err(err) = sql_script::write_script(&self.output_dir, &prepared.spec, &built.rows, path)
        {
            warn!("SQL script for {table} was not written: {err:#}");
            errors.push(format!("{}: SQL script not written: {err:#}", path.display()));
        }

        let Some(db) = db else {
            return Ok(FileImport {
                status: FileStatus::DryRun,
                rows: RowCounts::default(),
                errors,
            });
        };
        self.ensure_table(db, &prepared.spec)?;
        let loader = BatchLoader::new(&self.loader_settings, self.observer);
        let outcome = loader.load(db, &prepared.spec, &built.rows, path)?;
        errors.extend(outcome.errors);
        Ok(FileImport {
            status: FileStatus::Loaded,
            rows: outcome.rows,
            errors,
        })
    }

    /// Reads `path` and produces the validated definition for `table`.
    pub fn prepare(&self, path: &Path, table: &str) -> ImportResult<PreparedFile> {
        let authoritative = self.ddl.get(table);
        let external = authoritative.map(TableSpec::data_column_names);
        let loaded = self.reader.read(path, external.as_deref())?;
        let inferred = self.inferencer.infer(&loaded, table);
        let mut spec = match authoritative {
            Some(definition) => TableSpec::merge(definition, &inferred),
            None => inferred,
        };
        spec.ensure_audit_columns();
        let violations = spec.validate();
        if !violations.is_empty() {
            return Err(ImportError::SchemaValidation(violations));
        }
        Ok(PreparedFile {
            table: loaded,
            spec,
        })
    }

    fn ensure_table<D>(&self, db: &mut D, spec: &TableSpec) -> ImportResult<()>
    where
        D: Database + ?Sized,
    {
        if db.table_exists(&spec.name)? {
            let existing = db.get_columns(&spec.name)?;
            for column in spec.columns.iter().filter(|c| !c.is_audit()) {
                if !existing.iter().any(|e| e.name.eq_ignore_ascii_case(&column.name)) {
                    warn!(
                        "Table {} has no column {} ({})",
                        spec.name, column.name, column.data_kind
                    );
                }
            }
            return Ok(());
        }
        if !self.create_table {
            return Err(ImportError::SchemaMismatch {
                message: format!(
                    "table {} does not exist and create_table_if_not_exists is disabled",
                    spec.name
                ),
            });
        }
        let sql = spec.create_table_sql(db.dialect());
        with_transaction(db, |db| db.execute(&sql, &[]))?;
        info!("Created table {}", spec.name);
        Ok(())
    }
}
