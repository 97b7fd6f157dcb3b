use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{DEFAULT_CONFIG_FILE, MAX_BATCH_SIZE};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Load spreadsheet and CSV files into database tables",
    long_about = None
)]
pub struct Cli {
    /// Configuration file (defaults are used when it does not exist)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import every supported file under a data folder
    Import(ImportArgs),
    /// List importable files and the tables they map to
    Scan(ScanArgs),
    /// Read one file and print its first rows
    Preview(PreviewArgs),
    /// Print the table definition inferred for one file
    Infer(InferArgs),
    /// Create or validate configuration files
    Config(ConfigArgs),
    /// Connect to the configured database and ping it
    TestDb,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Folder scanned recursively for .csv, .xls and .xlsx files
    pub data_folder: PathBuf,
    /// Table definition file or directory of YAML definitions
    #[arg(long)]
    pub ddl: Option<PathBuf>,
    /// Only import these tables (comma separated, case-insensitive)
    #[arg(long, value_delimiter = ',')]
    pub tables: Vec<String>,
    /// Read, infer and build rows without touching the database
    #[arg(long)]
    pub dry_run: bool,
    /// Also write INSERT scripts to the output directory
    #[arg(long)]
    pub create_sql: bool,
    /// Keep date suffixes such as _20250101 in derived table names
    #[arg(long)]
    pub keep_date_suffix: bool,
    /// Rows per insert batch
    #[arg(long, value_parser = parse_batch_size)]
    pub batch_size: Option<usize>,
    /// Create missing target tables from the inferred definition
    #[arg(long)]
    pub create_tables: bool,
    /// SQLite database file overriding the configured path
    #[arg(long)]
    pub database: Option<PathBuf>,
    /// Write the run report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Folder to scan
    pub folder: PathBuf,
    /// Only list these tables (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub tables: Vec<String>,
    /// Keep date suffixes in derived table names
    #[arg(long)]
    pub keep_date_suffix: bool,
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// File to read
    pub file: PathBuf,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
}

#[derive(Debug, Args)]
pub struct InferArgs {
    /// File to read
    pub file: PathBuf,
    /// Table definition file or directory merged with the inferred columns
    #[arg(long)]
    pub ddl: Option<PathBuf>,
    /// Table name (derived from the file name when omitted)
    #[arg(long)]
    pub table: Option<String>,
    /// Write the definition YAML to this path instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a configuration file populated with defaults
    Init {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Report every problem in a configuration file
    Validate { path: PathBuf },
}

pub fn parse_batch_size(value: &str) -> Result<usize, String> {
    let parsed = value
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("'{value}' is not a positive integer"))?;
    if !(1..=MAX_BATCH_SIZE).contains(&parsed) {
        return Err(format!("Batch size must be within 1..={MAX_BATCH_SIZE}"));
    }
    Ok(parsed)
}
