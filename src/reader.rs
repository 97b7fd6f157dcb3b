//! Loads spreadsheet and delimited-text files into a [`LoadedTable`].
//!
//! Delimited text is ambiguous in three ways: encoding, separator, and
//! whether the first row is a header. The reader resolves them in layers:
//!
//! 1. Each candidate separator is parsed with a header row; the first parse
//!    the [`HeaderDetector`] accepts wins.
//! 2. With an externally supplied column list, each separator is parsed
//!    without a header; the first parse whose width equals the list wins.
//! 3. The first separator producing any rows and columns wins.
//!
//! Whatever branch succeeds, the same cleanup follows: empty rows dropped,
//! labels normalized, duplicate labels dropped, and (without an external
//! schema) text columns converted to numbers when every value allows it.

use std::{path::Path, sync::OnceLock};

use calamine::{Data, Reader, open_workbook_auto};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info};
use regex::Regex;
use serde::Serialize;

use crate::{
    error::{ImportError, ImportResult},
    header::HeaderDetector,
    io_utils::{self, CANDIDATE_DELIMITERS},
    schema::{MAX_IDENTIFIER_LENGTH, is_audit_column},
    table::{Column, LoadedTable},
    temporal,
    value::{Cell, parse_numeric_cell},
};

/// Text read as a missing value.
pub const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub const PLACEHOLDER_LABEL: &str = "UNKNOWN_COLUMN";
pub const TABLE_NAME_PREFIX: &str = "T_";

pub fn is_na_token(value: &str) -> bool {
    NA_TOKENS.contains(&value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Spreadsheet,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(FileFormat::Csv),
            "xls" | "xlsx" => Some(FileFormat::Spreadsheet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Spreadsheet => "spreadsheet",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub default_encoding: &'static Encoding,
    pub encoding_confidence: f64,
    pub detector: HeaderDetector,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            default_encoding: UTF_8,
            encoding_confidence: 0.7,
            detector: HeaderDetector::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TabularReader {
    options: ReaderOptions,
}

/// Header labels plus data rows, before cleanup.
struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl RawTable {
    fn is_usable(&self) -> bool {
        !self.headers.is_empty() && !self.rows.is_empty()
    }

    fn into_table(self) -> LoadedTable {
        LoadedTable::from_rows(self.headers, self.rows)
    }
}

impl TabularReader {
    pub fn new(options: ReaderOptions) -> Self {
        Self { options }
    }

    /// Reads `path`. `external_columns` is the column list of an
    /// authoritative definition for the target table, if one exists.
    pub fn read(&self, path: &Path, external_columns: Option<&[String]>) -> ImportResult<LoadedTable> {
        if !path.exists() {
            return Err(ImportError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let format = FileFormat::from_path(path).ok_or_else(|| ImportError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension: path
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or_default()
                .to_string(),
        })?;

        let external: Option<Vec<String>> = external_columns.map(|names| {
            names
                .iter()
                .filter(|name| !is_audit_column(name))
                .cloned()
                .collect()
        });
        let mut table = match format {
            FileFormat::Csv => self.read_csv(path, external.as_deref())?,
            FileFormat::Spreadsheet => read_spreadsheet(path)?,
        };
        cleanup(&mut table, external.is_none());
        if table.is_empty() {
            return Err(ImportError::parse(path, "no data rows found"));
        }
        info!(
            "Read {} row(s) x {} column(s) from {}",
            table.row_count(),
            table.column_count(),
            path.display()
        );
        Ok(table)
    }

    fn read_csv(&self, path: &Path, external: Option<&[String]>) -> ImportResult<LoadedTable> {
        let text = io_utils::read_decoded(
            path,
            self.options.encoding_confidence,
            self.options.default_encoding,
        )
        .map_err(|err| ImportError::parse(path, format!("{err:#}")))?;

        for delimiter in CANDIDATE_DELIMITERS {
            let Some(raw) = parse_with_header(&text, delimiter) else {
                continue;
            };
            let columns = raw.headers.len();
            let shaped = columns > 1 || (columns == 1 && !raw.rows.is_empty());
            if shaped && self.options.detector.is_header(&raw.headers) {
                debug!(
                    "Header confirmed with separator '{}'",
                    io_utils::printable_delimiter(delimiter)
                );
                return Ok(raw.into_table());
            }
        }

        if let Some(names) = external
            && !names.is_empty()
        {
            for delimiter in CANDIDATE_DELIMITERS {
                if let Some(raw) = parse_without_header(&text, delimiter, names) {
                    debug!(
                        "Parsed without header using {} supplied column name(s) and separator '{}'",
                        names.len(),
                        io_utils::printable_delimiter(delimiter)
                    );
                    return Ok(raw.into_table());
                }
            }
        }

        for delimiter in CANDIDATE_DELIMITERS {
            if let Some(raw) = parse_with_header(&text, delimiter)
                && raw.is_usable()
            {
                debug!(
                    "Falling back to plain parse with separator '{}'",
                    io_utils::printable_delimiter(delimiter)
                );
                return Ok(raw.into_table());
            }
        }

        Err(ImportError::parse(
            path,
            "no separator produced a non-empty table",
        ))
    }
}

fn read_records(text: &str, delimiter: u8) -> Option<Vec<Vec<String>>> {
    let mut reader = io_utils::open_csv_reader(text.as_bytes(), delimiter, false);
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.ok()?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Some(records)
}

fn to_cells(record: Vec<String>, width: usize) -> Vec<Cell> {
    let mut cells: Vec<Cell> = record
        .into_iter()
        .map(|value| {
            if is_na_token(&value) {
                Cell::Empty
            } else {
                Cell::Text(value)
            }
        })
        .collect();
    cells.resize(width, Cell::Empty);
    cells
}

/// First record as labels. Fails when a data row is wider than the header.
fn parse_with_header(text: &str, delimiter: u8) -> Option<RawTable> {
    let mut records = read_records(text, delimiter)?.into_iter();
    let header = records.next()?;
    let width = header.len();
    let headers = header
        .into_iter()
        .enumerate()
        .map(|(idx, label)| {
            if label.trim().is_empty() {
                format!("Unnamed: {idx}")
            } else {
                label
            }
        })
        .collect();
    let mut rows = Vec::new();
    for record in records {
        if record.len() > width {
            return None;
        }
        rows.push(to_cells(record, width));
    }
    Some(RawTable { headers, rows })
}

fn parse_without_header(text: &str, delimiter: u8, names: &[String]) -> Option<RawTable> {
    let records = read_records(text, delimiter)?;
    let width = records.iter().map(Vec::len).max()?;
    if width != names.len() {
        return None;
    }
    let rows: Vec<Vec<Cell>> = records
        .into_iter()
        .map(|record| to_cells(record, width))
        .collect();
    if rows.is_empty() {
        return None;
    }
    Some(RawTable {
        headers: names.to_vec(),
        rows,
    })
}

/// First worksheet; the first row with any content holds the labels.
fn read_spreadsheet(path: &Path) -> ImportResult<LoadedTable> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ImportError::parse(path, "workbook has no sheets"))?;
    let range = workbook.worksheet_range(&sheet)?;
    let width = range.width();

    let mut rows = range.rows();
    let header = rows
        .by_ref()
        .find(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .ok_or_else(|| ImportError::parse(path, format!("sheet '{sheet}' is empty")))?;
    let headers: Vec<String> = (0..width)
        .map(|idx| match header.get(idx).map(header_label) {
            Some(label) if !label.trim().is_empty() => label,
            _ => format!("Unnamed: {idx}"),
        })
        .collect();
    let data: Vec<Vec<Cell>> = rows
        .map(|row| {
            let mut cells: Vec<Cell> = row.iter().map(convert_cell).collect();
            cells.resize(width, Cell::Empty);
            cells
        })
        .collect();
    debug!("Sheet '{sheet}' has {} data row(s)", data.len());
    Ok(LoadedTable::from_rows(headers, data))
}

fn header_label(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Empty | Data::Error(_) => String::new(),
        other => other.to_string(),
    }
}

fn convert_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::Int(i) => Cell::Integer(*i),
        Data::Float(f) => {
            if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Cell::Integer(*f as i64)
            } else {
                Cell::Float(*f)
            }
        }
        Data::Bool(b) => Cell::Boolean(*b),
        Data::String(s) if is_na_token(s) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::DateTime(serial) => match temporal::from_serial(serial.as_f64()) {
            Some(value) => Cell::DateTime(value),
            None => Cell::Float(serial.as_f64()),
        },
        Data::DateTimeIso(raw) => match temporal::parse_str(raw) {
            Some(value) => Cell::DateTime(value),
            None => Cell::Text(raw.clone()),
        },
        Data::DurationIso(raw) => Cell::Text(raw.clone()),
    }
}

fn cleanup(table: &mut LoadedTable, optimize_numbers: bool) {
    table.drop_empty_rows();
    table.rename_columns(normalize_label);
    table.drop_duplicate_columns();
    if optimize_numbers {
        for column in table.columns_mut() {
            optimize_numeric_column(column);
        }
    }
}

struct LabelPatterns {
    non_word: Regex,
    whitespace: Regex,
    underscores: Regex,
}

fn label_patterns() -> &'static LabelPatterns {
    static PATTERNS: OnceLock<LabelPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| LabelPatterns {
        non_word: Regex::new(r"[^\w\s]+").expect("valid non-word pattern"),
        whitespace: Regex::new(r"\s+").expect("valid whitespace pattern"),
        underscores: Regex::new(r"_+").expect("valid underscore pattern"),
    })
}

/// Normalizes a column label into an uppercase identifier. Idempotent.
pub fn normalize_label(label: &str) -> String {
    let patterns = label_patterns();
    let replaced = patterns.non_word.replace_all(label.trim(), "_");
    let replaced = patterns.whitespace.replace_all(&replaced, "_");
    let collapsed = patterns.underscores.replace_all(&replaced, "_");
    let stripped = collapsed.trim_matches('_');
    if stripped.is_empty() {
        PLACEHOLDER_LABEL.to_string()
    } else {
        stripped.to_uppercase()
    }
}

fn is_zero_padded(value: &str) -> bool {
    value.len() > 1 && value.starts_with('0') && value.chars().all(|c| c.is_ascii_digit())
}

/// Converts an all-text column to numbers when every value parses and no
/// value is a zero-padded code.
fn optimize_numeric_column(column: &mut Column) {
    let texts: Vec<&str> = column.non_empty().filter_map(Cell::as_text).collect();
    if texts.is_empty() || texts.len() != column.non_empty().count() {
        return;
    }
    if texts.iter().any(|value| is_zero_padded(value.trim())) {
        debug!("Keeping {} as text: zero-padded values present", column.name);
        return;
    }
    let Some(converted) = column
        .values
        .iter()
        .map(|cell| match cell {
            Cell::Text(value) => parse_numeric_cell(value),
            other => Some(other.clone()),
        })
        .collect::<Option<Vec<Cell>>>()
    else {
        return;
    };
    debug!("Converted {} to numeric", column.name);
    column.values = converted;
}

fn date_suffix_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"_?\d{8}$",
            r"_?\d{4}-\d{2}-\d{2}$",
            r"_?\d{4}_\d{2}_\d{2}$",
            r"_?\d{6}$",
            r"_?\d{10}$",
            r"_?\d{8}_\d+$",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid date suffix pattern"))
        .collect()
    })
}

/// Strips date-like suffixes unless that would leave fewer than two
/// meaningful characters.
pub fn strip_date_suffix(stem: &str) -> String {
    let mut current = stem.to_string();
    for pattern in date_suffix_patterns() {
        current = pattern.replace(&current, "").into_owned();
        if current.trim_matches('_').chars().count() < 2 {
            return stem.to_string();
        }
    }
    current
}

/// Derives a table name from a file name: at most 30 characters, uppercase,
/// starting with a letter.
pub fn derive_table_name(path: &Path, remove_date_suffix: bool) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = if remove_date_suffix {
        strip_date_suffix(&stem)
    } else {
        stem
    };
    sanitize_table_name(&base)
}

pub fn sanitize_table_name(raw: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let non_word = NON_WORD.get_or_init(|| Regex::new(r"[^\w]").expect("valid non-word pattern"));
    let replaced = non_word.replace_all(raw, "_");
    let collapsed = label_patterns().underscores.replace_all(&replaced, "_");
    let mut name = collapsed.trim_matches('_').to_uppercase();
    if !name.chars().next().is_some_and(char::is_alphabetic) {
        name = format!("{TABLE_NAME_PREFIX}{name}");
    }
    name.chars().take(MAX_IDENTIFIER_LENGTH).collect()
}
