pub mod cli;
pub mod coerce;
pub mod config;
pub mod db;
pub mod ddl;
pub mod error;
pub mod header;
pub mod importer;
pub mod io_utils;
pub mod loader;
pub mod observer;
pub mod reader;
pub mod scan;
pub mod schema;
pub mod sql_script;
pub mod stats;
pub mod table;
pub mod temporal;
pub mod value;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, bail, ensure};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, ConfigCommand, OutputFormat},
    config::Config,
    db::{ConnectionGuard, Database, SqliteDatabase},
    importer::{ImportOptions, Importer},
    observer::LogObserver,
    reader::{TabularReader, derive_table_name},
    scan::{ScanOptions, scan_directory},
    table::{render_preview, render_table},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging(level: LevelFilter) {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("tabload", level);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    if let Commands::Config(args) = &cli.command {
        init_logging(LevelFilter::Info);
        return match &args.command {
            ConfigCommand::Init { output, force } => handle_config_init(output, *force),
            ConfigCommand::Validate { path } => handle_config_validate(path),
        };
    }

    let config = Config::load(&cli.config)
        .with_context(|| format!("Loading configuration {:?}", cli.config))?;
    init_logging(config.logging.level_filter().unwrap_or(LevelFilter::Info));
    debug!("Using configuration {:?}", cli.config);
    match cli.command {
        Commands::Import(args) => handle_import(config, &args),
        Commands::Scan(args) => handle_scan(&config, &args),
        Commands::Preview(args) => handle_preview(&config, &args),
        Commands::Infer(args) => handle_infer(&config, &args),
        Commands::TestDb => handle_test_db(&config),
        Commands::Config(_) => Ok(()),
    }
}

fn ensure_valid(config: &Config) -> Result<()> {
    let errors = config.validate();
    if !errors.is_empty() {
        bail!("Invalid configuration:\n  - {}", errors.join("\n  - "));
    }
    Ok(())
}

fn handle_import(mut config: Config, args: &cli::ImportArgs) -> Result<()> {
    if let Some(batch_size) = args.batch_size {
        config.import_settings.batch_size = batch_size;
    }
    if args.keep_date_suffix {
        config.import_settings.remove_date_suffix = false;
    }
    if args.create_tables {
        config.import_settings.create_table_if_not_exists = true;
    }
    if let Some(path) = &args.database {
        config.database.path = path.clone();
    }
    ensure_valid(&config)?;

    info!("Importing files from {:?}", args.data_folder);
    let options = ImportOptions {
        ddl: args.ddl.clone(),
        tables: args.tables.clone(),
        dry_run: args.dry_run,
        create_sql: args.create_sql,
    };
    let observer = LogObserver;
    let importer = Importer::new(&config, options, &observer)?;
    let mut db = SqliteDatabase::new(&config.database.path);
    let stats = importer
        .run(&mut db, &args.data_folder)
        .with_context(|| format!("Importing {:?}", args.data_folder))?;

    print!("{}", stats.render_summary());
    if let Some(report) = &args.report {
        stats.write_report(report)?;
        info!("Run report written to {report:?}");
    }
    ensure!(
        !stats.has_failures(),
        "{} of {} file(s) failed to import",
        stats.files_failed,
        stats.files_attempted
    );
    Ok(())
}

fn handle_scan(config: &Config, args: &cli::ScanArgs) -> Result<()> {
    let remove_date_suffix = config.import_settings.remove_date_suffix && !args.keep_date_suffix;
    let files = scan_directory(&args.folder, &ScanOptions::new(remove_date_suffix, &args.tables))?;
    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&files).context("Serializing scan results")?;
            println!("{json}");
        }
        OutputFormat::Table => {
            let headers = vec!["file".to_string(), "table".to_string(), "format".to_string()];
            let rows = files
                .iter()
                .map(|file| {
                    vec![
                        file.path.display().to_string(),
                        file.table.clone(),
                        file.format.as_str().to_string(),
                    ]
                })
                .collect::<Vec<_>>();
            print!("{}", render_table(&headers, &rows));
        }
    }
    Ok(())
}

fn handle_preview(config: &Config, args: &cli::PreviewArgs) -> Result<()> {
    let reader = TabularReader::new(config.reader_options()?);
    let table = reader
        .read(&args.file, None)
        .with_context(|| format!("Reading {:?}", args.file))?;
    info!(
        "{:?}: {} row(s), {} column(s)",
        args.file,
        table.row_count(),
        table.column_count()
    );
    print!("{}", render_preview(&table, args.rows));
    Ok(())
}

fn handle_infer(config: &Config, args: &cli::InferArgs) -> Result<()> {
    let options = ImportOptions {
        ddl: args.ddl.clone(),
        ..ImportOptions::default()
    };
    let observer = LogObserver;
    let importer = Importer::new(config, options, &observer)?;
    let table = match &args.table {
        Some(name) => name.trim().to_uppercase(),
        None => derive_table_name(&args.file, config.import_settings.remove_date_suffix),
    };
    let prepared = importer
        .prepare(&args.file, &table)
        .with_context(|| format!("Inferring table definition from {:?}", args.file))?;
    let yaml = prepared.spec.to_yaml_string()?;
    match &args.output {
        Some(path) => {
            io_utils::write_text(path, &yaml)?;
            info!("Table definition for {table} written to {path:?}");
        }
        None => print!("{yaml}"),
    }
    println!("{};", prepared.spec.create_table_sql(config.output.dialect));
    Ok(())
}

fn handle_config_init(output: &Path, force: bool) -> Result<()> {
    ensure!(
        force || !output.exists(),
        "{output:?} already exists; pass --force to overwrite it"
    );
    Config::default().save(output)?;
    info!("Default configuration written to {output:?}");
    Ok(())
}

fn handle_config_validate(path: &Path) -> Result<()> {
    ensure!(path.exists(), "Configuration {path:?} does not exist");
    let config = Config::load(path)?;
    ensure_valid(&config)?;
    println!("Configuration {} is valid", path.display());
    Ok(())
}

fn handle_test_db(config: &Config) -> Result<()> {
    let mut db = SqliteDatabase::new(&config.database.path);
    let mut guard = ConnectionGuard::connect(&mut db)
        .with_context(|| format!("Connecting to {:?}", config.database.path))?;
    guard.ping().context("Database ping failed")?;
    println!("Database connection OK ({})", config.database.path.display());
    Ok(())
}
