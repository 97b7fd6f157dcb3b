//! Table definitions, schema inference, and structural validation.
//!
//! This module owns [`TableSpec`] (the target table for one source file),
//! [`ColumnSpec`] and the tagged [`DataKind`] enum, plus the
//! [`SchemaInferencer`] that derives a definition from a
//! [`LoadedTable`].
//!
//! ## Responsibilities
//!
//! - Per-column type inference with precision tiers and string headroom
//! - Disguised temporal column detection for text columns
//! - Audit column handling
//! - Merging an authoritative definition with the inferred one
//! - Validation that reports every violation at once
//! - YAML persistence and `CREATE TABLE` rendering

use std::{collections::HashSet, fmt, str::FromStr, sync::OnceLock};

use anyhow::{Context, Result, anyhow, bail, ensure};
use itertools::Itertools;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{
    db::SqlDialect,
    table::{Column, ColumnKind, LoadedTable},
    temporal,
    value::Cell,
};

pub const MAX_IDENTIFIER_LENGTH: usize = 30;
pub const MAX_STRING_LENGTH: u32 = 4000;
pub const MAX_NUMERIC_PRECISION: u32 = 38;
pub const MAX_TIMESTAMP_PRECISION: u32 = 9;
pub const DEFAULT_TIMESTAMP_PRECISION: u32 = 6;
pub const AUDIT_USER_LENGTH: u32 = 50;

pub const CREATED_BY: &str = "CREATED_BY";
pub const CREATE_TIMESTAMP: &str = "CREATE_TIMESTAMP";
pub const UPDATED_BY: &str = "UPDATED_BY";
pub const UPDATE_TIMESTAMP: &str = "UPDATE_TIMESTAMP";
pub const AUDIT_COLUMNS: [&str; 4] = [CREATED_BY, CREATE_TIMESTAMP, UPDATED_BY, UPDATE_TIMESTAMP];

const TEMPORAL_SAMPLE_SIZE: usize = 10;
const LENIENT_TEMPORAL_RATIO: f64 = 0.5;
const STRICT_TEMPORAL_RATIO: f64 = 0.8;
const TEMPORAL_NAME_HINTS: &[&str] = &["TIMESTAMP", "DATE", "TIME", "CREATED", "UPDATED"];
const MIN_STRING_LENGTH: u32 = 50;
const EMPTY_STRING_LENGTH: u32 = 100;

pub fn is_audit_column(name: &str) -> bool {
    AUDIT_COLUMNS.iter().any(|a| a.eq_ignore_ascii_case(name))
}

/// Relational type of a column. Each variant carries only the bounds that
/// apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    String { length: u32, fixed: bool },
    Numeric { precision: Option<u32>, scale: Option<u32> },
    Timestamp { precision: u32 },
}

impl DataKind {
    pub fn varchar(length: u32) -> Self {
        DataKind::String {
            length: length.clamp(1, MAX_STRING_LENGTH),
            fixed: false,
        }
    }

    pub fn char(length: u32) -> Self {
        DataKind::String {
            length: length.clamp(1, MAX_STRING_LENGTH),
            fixed: true,
        }
    }

    pub fn number(precision: u32, scale: u32) -> Self {
        let precision = precision.clamp(1, MAX_NUMERIC_PRECISION);
        DataKind::Numeric {
            precision: Some(precision),
            scale: Some(scale.min(precision)),
        }
    }

    pub fn timestamp() -> Self {
        DataKind::Timestamp {
            precision: DEFAULT_TIMESTAMP_PRECISION,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::String { .. } => "STRING",
            DataKind::Numeric { .. } => "NUMERIC",
            DataKind::Timestamp { .. } => "TIMESTAMP",
        }
    }

    /// Lower-case token used in YAML definitions, e.g. `number(10,0)`.
    pub fn signature(&self) -> String {
        match self {
            DataKind::String { length, fixed: false } => format!("varchar2({length})"),
            DataKind::String { length, fixed: true } => format!("char({length})"),
            DataKind::Numeric {
                precision: Some(p),
                scale: Some(s),
            } => format!("number({p},{s})"),
            DataKind::Numeric {
                precision: Some(p),
                scale: None,
            } => format!("number({p})"),
            DataKind::Numeric { .. } => "number".to_string(),
            DataKind::Timestamp { precision } => format!("timestamp({precision})"),
        }
    }

    pub fn max_length(&self) -> Option<u32> {
        match self {
            DataKind::String { length, .. } => Some(*length),
            _ => None,
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

impl FromStr for DataKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let (base, args) = split_type_arguments(&normalized)
            .with_context(|| format!("Parsing column type '{value}'"))?;
        match (base, args.as_slice()) {
            ("varchar2" | "varchar" | "nvarchar2" | "string" | "text", [length]) => {
                Ok(DataKind::String {
                    length: *length,
                    fixed: false,
                })
            }
            ("varchar2" | "varchar" | "nvarchar2" | "string" | "text", []) => {
                Ok(DataKind::String {
                    length: MAX_STRING_LENGTH,
                    fixed: false,
                })
            }
            ("char" | "nchar", [length]) => Ok(DataKind::String {
                length: *length,
                fixed: true,
            }),
            ("char" | "nchar", []) => Ok(DataKind::String {
                length: 1,
                fixed: true,
            }),
            ("number" | "numeric" | "decimal", []) => Ok(DataKind::Numeric {
                precision: None,
                scale: None,
            }),
            ("number" | "numeric" | "decimal", [precision]) => Ok(DataKind::Numeric {
                precision: Some(*precision),
                scale: None,
            }),
            ("number" | "numeric" | "decimal", [precision, scale]) => Ok(DataKind::Numeric {
                precision: Some(*precision),
                scale: Some(*scale),
            }),
            ("integer" | "int", []) => Ok(DataKind::Numeric {
                precision: None,
                scale: Some(0),
            }),
            ("float" | "double", []) => Ok(DataKind::Numeric {
                precision: None,
                scale: None,
            }),
            ("timestamp" | "datetime", []) => Ok(DataKind::timestamp()),
            ("timestamp", [precision]) => Ok(DataKind::Timestamp {
                precision: *precision,
            }),
            ("date", []) => Ok(DataKind::Timestamp { precision: 0 }),
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: varchar2(n), char(n), number(p,s), timestamp(n), date"
            )),
        }
    }
}

fn split_type_arguments(token: &str) -> Result<(&str, Vec<u32>)> {
    let Some(start) = token.find('(') else {
        return Ok((token.trim(), Vec::new()));
    };
    ensure!(token.ends_with(')'), "type arguments must close with ')'");
    let base = token[..start].trim();
    let args = token[start + 1..token.len() - 1]
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>()
                .with_context(|| format!("'{part}' is not an unsigned integer"))
        })
        .collect::<Result<Vec<_>>>()?;
    ensure!(args.len() <= 2, "at most two type arguments are supported");
    Ok((base, args))
}

impl Serialize for DataKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.signature())
    }
}

impl<'de> Deserialize<'de> for DataKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        DataKind::from_str(&token).map_err(|err| de::Error::custom(format!("{err:#}")))
    }
}

/// Column default applied by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnDefault {
    /// The dialect's current-timestamp expression.
    CurrentTimestamp,
    Literal(String),
}

impl ColumnDefault {
    pub fn render(&self, dialect: SqlDialect) -> String {
        match self {
            ColumnDefault::CurrentTimestamp => dialect.current_timestamp().to_string(),
            ColumnDefault::Literal(value) => value.clone(),
        }
    }
}

impl Serialize for ColumnDefault {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ColumnDefault::CurrentTimestamp => serializer.serialize_str("CURRENT_TIMESTAMP"),
            ColumnDefault::Literal(value) => serializer.serialize_str(value),
        }
    }
}

impl<'de> Deserialize<'de> for ColumnDefault {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let upper = raw.trim().to_ascii_uppercase();
        Ok(match upper.as_str() {
            "CURRENT_TIMESTAMP" | "SYSTIMESTAMP" | "SYSDATE" | "NOW()" => {
                ColumnDefault::CurrentTimestamp
            }
            _ => ColumnDefault::Literal(raw),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub data_kind: DataKind,
    #[serde(default = "ColumnSpec::default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ColumnDefault>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_kind: DataKind, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_kind,
            nullable,
            default: None,
        }
    }

    pub const fn default_nullable() -> bool {
        true
    }

    pub fn with_default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn is_audit(&self) -> bool {
        is_audit_column(&self.name)
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// The four audit columns appended to every table.
pub fn audit_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new(CREATED_BY, DataKind::varchar(AUDIT_USER_LENGTH), true),
        ColumnSpec::new(CREATE_TIMESTAMP, DataKind::timestamp(), true)
            .with_default(ColumnDefault::CurrentTimestamp),
        ColumnSpec::new(UPDATED_BY, DataKind::varchar(AUDIT_USER_LENGTH), true),
        ColumnSpec::new(UPDATE_TIMESTAMP, DataKind::timestamp(), true),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.matches(name))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.matches(name))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Column names a source file is expected to supply (audit columns excluded).
    pub fn data_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !c.is_audit())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Appends any audit column not already present by name.
    pub fn ensure_audit_columns(&mut self) {
        for audit in audit_columns() {
            if self.column(&audit.name).is_none() {
                self.columns.push(audit);
            }
        }
    }

    /// Authoritative columns first, then inferred columns it does not define.
    pub fn merge(authoritative: &TableSpec, inferred: &TableSpec) -> TableSpec {
        let mut merged = authoritative.clone();
        for column in &inferred.columns {
            if merged.column(&column.name).is_none() {
                debug!(
                    "Appending inferred column {} to definition of {}",
                    column.name, merged.name
                );
                merged.columns.push(column.clone());
            }
        }
        merged
    }

    /// Returns one message per structural violation; empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("table name is empty".to_string());
        } else if self.name.chars().count() > MAX_IDENTIFIER_LENGTH {
            errors.push(format!(
                "table name '{}' exceeds {MAX_IDENTIFIER_LENGTH} characters",
                self.name
            ));
        }
        if self.columns.is_empty() {
            errors.push(format!("table '{}' has no columns", self.name));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.name.trim().is_empty() {
                errors.push("column name is empty".to_string());
                continue;
            }
            if column.name.chars().count() > MAX_IDENTIFIER_LENGTH {
                errors.push(format!(
                    "column name '{}' exceeds {MAX_IDENTIFIER_LENGTH} characters",
                    column.name
                ));
            }
            if !seen.insert(column.name.to_uppercase()) {
                errors.push(format!("duplicate column name '{}'", column.name));
            }
            errors.extend(validate_kind(&column.name, &column.data_kind));
        }

        for key in &self.primary_key {
            if self.column(key).is_none() {
                errors.push(format!("primary key column '{key}' is not defined"));
            }
        }
        errors
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing table definition to YAML")
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("Parsing table definition YAML")
    }

    /// Renders a `CREATE TABLE` statement (no trailing semicolon).
    pub fn create_table_sql(&self, dialect: SqlDialect) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                let mut line = format!(
                    "    {} {}",
                    column.name,
                    dialect.column_type(&column.data_kind)
                );
                if let Some(default) = &column.default {
                    line.push_str(" DEFAULT ");
                    line.push_str(&default.render(dialect));
                }
                if !column.nullable {
                    line.push_str(" NOT NULL");
                }
                line
            })
            .collect();
        if !self.primary_key.is_empty() {
            let constraint: String = format!("PK_{}", self.name)
                .chars()
                .take(MAX_IDENTIFIER_LENGTH)
                .collect();
            lines.push(format!(
                "    CONSTRAINT {constraint} PRIMARY KEY ({})",
                self.primary_key.iter().join(", ")
            ));
        }
        format!("CREATE TABLE {} (\n{}\n)", self.name, lines.join(",\n"))
    }
}

fn validate_kind(name: &str, kind: &DataKind) -> Vec<String> {
    let mut errors = Vec::new();
    match *kind {
        DataKind::String { length, .. } => {
            if length == 0 || length > MAX_STRING_LENGTH {
                errors.push(format!(
                    "column '{name}' string length {length} is outside 1..={MAX_STRING_LENGTH}"
                ));
            }
        }
        DataKind::Numeric { precision, scale } => {
            if let Some(p) = precision
                && !(1..=MAX_NUMERIC_PRECISION).contains(&p)
            {
                errors.push(format!(
                    "column '{name}' precision {p} is outside 1..={MAX_NUMERIC_PRECISION}"
                ));
            }
            if let Some(s) = scale {
                let limit = precision.unwrap_or(MAX_NUMERIC_PRECISION);
                if s > limit {
                    errors.push(format!(
                        "column '{name}' scale {s} exceeds precision {limit}"
                    ));
                }
            }
        }
        DataKind::Timestamp { precision } => {
            if precision > MAX_TIMESTAMP_PRECISION {
                errors.push(format!(
                    "column '{name}' timestamp precision {precision} exceeds {MAX_TIMESTAMP_PRECISION}"
                ));
            }
        }
    }
    errors
}

/// Upper bounds applied during inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeLimits {
    pub string_max_length: u32,
    pub number_precision: u32,
    pub number_scale: u32,
}

impl Default for TypeLimits {
    fn default() -> Self {
        Self {
            string_max_length: MAX_STRING_LENGTH,
            number_precision: MAX_NUMERIC_PRECISION,
            number_scale: 2,
        }
    }
}

impl TypeLimits {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(1..=MAX_STRING_LENGTH).contains(&self.string_max_length) {
            errors.push(format!(
                "data_types.string_max_length must be within 1..={MAX_STRING_LENGTH}"
            ));
        }
        if !(1..=MAX_NUMERIC_PRECISION).contains(&self.number_precision) {
            errors.push(format!(
                "data_types.number_precision must be within 1..={MAX_NUMERIC_PRECISION}"
            ));
        }
        if self.number_scale > self.number_precision {
            errors.push("data_types.number_scale cannot exceed number_precision".to_string());
        }
        errors
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaInferencer {
    limits: TypeLimits,
}

impl SchemaInferencer {
    pub fn new(limits: TypeLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &TypeLimits {
        &self.limits
    }

    /// Infers a definition for `table`, audit columns included.
    pub fn infer(&self, table: &LoadedTable, table_name: &str) -> TableSpec {
        let columns = table
            .columns()
            .iter()
            .map(|column| {
                let kind = self.infer_kind(column);
                debug!("Inferred {} as {}", column.name, kind.signature());
                ColumnSpec::new(column.name.clone(), kind, column.has_missing())
            })
            .collect();
        let mut spec = TableSpec::new(table_name, columns);
        spec.ensure_audit_columns();
        spec
    }

    pub fn infer_kind(&self, column: &Column) -> DataKind {
        match column.kind() {
            ColumnKind::Empty => DataKind::varchar(self.limits.string_max_length),
            ColumnKind::Integer => {
                let max_abs = column
                    .non_empty()
                    .filter_map(|cell| match cell {
                        Cell::Integer(i) => Some(i.unsigned_abs()),
                        _ => None,
                    })
                    .max()
                    .unwrap_or(0);
                DataKind::number(self.integer_precision(max_abs), 0)
            }
            ColumnKind::Float => {
                let digits = column
                    .non_empty()
                    .map(fraction_digits)
                    .max()
                    .unwrap_or(0);
                DataKind::number(
                    self.limits.number_precision,
                    digits.min(self.limits.number_scale),
                )
            }
            ColumnKind::Boolean => DataKind::char(1),
            ColumnKind::Temporal => DataKind::timestamp(),
            ColumnKind::Text => {
                if self.is_disguised_temporal(column) {
                    DataKind::timestamp()
                } else {
                    DataKind::varchar(self.string_length(column))
                }
            }
        }
    }

    fn integer_precision(&self, max_abs: u64) -> u32 {
        if max_abs < 1_000_000_000 {
            10
        } else if max_abs < 1_000_000_000_000_000_000 {
            19
        } else {
            self.limits.number_precision
        }
    }

    fn string_length(&self, column: &Column) -> u32 {
        let cap = self.limits.string_max_length;
        let observed = column
            .non_empty()
            .map(|cell| cell.to_text().chars().count())
            .max()
            .unwrap_or(0);
        let observed = u32::try_from(observed).unwrap_or(u32::MAX);
        if observed == 0 {
            EMPTY_STRING_LENGTH.min(cap)
        } else if observed < MIN_STRING_LENGTH {
            MIN_STRING_LENGTH.min(cap)
        } else if observed > cap {
            cap
        } else {
            observed.saturating_mul(2).min(cap)
        }
    }

    /// A text column is temporal when enough sampled values parse as dates.
    /// Columns named like timestamps use a lower threshold.
    fn is_disguised_temporal(&self, column: &Column) -> bool {
        let sample: Vec<&Cell> = column.non_empty().take(TEMPORAL_SAMPLE_SIZE).collect();
        if sample.is_empty() {
            return false;
        }
        let upper = column.name.to_uppercase();
        let threshold = if TEMPORAL_NAME_HINTS.iter().any(|hint| upper.contains(hint)) {
            LENIENT_TEMPORAL_RATIO
        } else {
            STRICT_TEMPORAL_RATIO
        };
        let parsed = sample
            .iter()
            .filter(|cell| cell.as_text().is_some_and(text_is_temporal))
            .count();
        let ratio = parsed as f64 / sample.len() as f64;
        debug!(
            "Temporal check for {}: {parsed}/{} (threshold {threshold})",
            column.name,
            sample.len()
        );
        ratio >= threshold
    }
}

fn text_is_temporal(value: &str) -> bool {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    let identifier =
        IDENTIFIER.get_or_init(|| Regex::new(r"^[0-9]+-[0-9]+$").expect("valid identifier pattern"));
    let trimmed = value.trim();
    if !trimmed.contains(['/', '-', '.']) || identifier.is_match(trimmed) {
        return false;
    }
    temporal::parse_str(trimmed).is_some_and(|parsed| temporal::is_valid(&parsed))
}

fn fraction_digits(cell: &Cell) -> u32 {
    match cell {
        Cell::Decimal(d) => d.normalize().scale(),
        Cell::Float(f) if f.is_finite() => {
            let rendered = f.to_string();
            rendered
                .split_once('.')
                .map(|(_, frac)| frac.trim_end_matches('0').len() as u32)
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Loads a single table definition from a YAML file.
pub fn load_table_spec(path: &std::path::Path) -> Result<TableSpec> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Reading table definition {path:?}"))?;
    let spec = TableSpec::from_yaml_str(&raw).with_context(|| format!("Parsing {path:?}"))?;
    if spec.name.trim().is_empty() {
        bail!("Table definition {path:?} has no name");
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn text(value: &str) -> Cell {
        Cell::Text(value.to_string())
    }

    fn infer(column: Column) -> DataKind {
        SchemaInferencer::default().infer_kind(&column)
    }

    #[test]
    fn integer_precision_is_tiered() {
        assert_eq!(
            infer(Column::new("A", vec![Cell::Integer(5), Cell::Integer(-999_999_999)])),
            DataKind::number(10, 0)
        );
        assert_eq!(
            infer(Column::new("B", vec![Cell::Integer(1_000_000_000)])),
            DataKind::number(19, 0)
        );
        assert_eq!(
            infer(Column::new("C", vec![Cell::Integer(i64::MAX)])),
            DataKind::number(38, 0)
        );
    }

    #[test]
    fn float_scale_is_capped() {
        let column = Column::new(
            "PRICE",
            vec![
                Cell::Decimal(Decimal::from_str("1.50").unwrap()),
                Cell::Float(2.125),
                Cell::Integer(3),
            ],
        );
        assert_eq!(infer(column), DataKind::number(38, 2));
        let single = Column::new("RATE", vec![Cell::Decimal(Decimal::from_str("0.5").unwrap())]);
        assert_eq!(infer(single), DataKind::number(38, 1));
    }

    #[test]
    fn empty_boolean_and_temporal_columns() {
        assert_eq!(
            infer(Column::new("E", vec![Cell::Empty])),
            DataKind::varchar(4000)
        );
        assert_eq!(
            infer(Column::new("F", vec![Cell::Boolean(true)])),
            DataKind::char(1)
        );
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(
            infer(Column::new("G", vec![Cell::Date(date)])),
            DataKind::timestamp()
        );
    }

    #[test]
    fn string_length_headroom() {
        assert_eq!(
            infer(Column::new("S", vec![text("abc")])),
            DataKind::varchar(50)
        );
        let long = "x".repeat(60);
        assert_eq!(
            infer(Column::new("S", vec![text(&long)])),
            DataKind::varchar(120)
        );
        let huge = "y".repeat(3000);
        assert_eq!(
            infer(Column::new("S", vec![text(&huge)])),
            DataKind::varchar(4000)
        );
    }

    #[test]
    fn text_dates_become_timestamps() {
        let column = Column::new(
            "ORDER_DATE",
            vec![text("2024-01-01"), text("2024/02/03"), text("n/a-ish")],
        );
        assert_eq!(infer(column), DataKind::timestamp());

        let strict = Column::new(
            "LABEL",
            vec![text("2024-01-01"), text("2024/02/03"), text("n/a-ish")],
        );
        assert_eq!(infer(strict), DataKind::varchar(50));

        let identifiers = Column::new("REF_DATE", vec![text("12-34"), text("56-78")]);
        assert_eq!(infer(identifiers), DataKind::varchar(50));
    }

    #[test]
    fn inferred_tables_carry_audit_columns() {
        let table = LoadedTable::new(vec![
            Column::new("ID", vec![Cell::Integer(1), Cell::Integer(2)]),
            Column::new("NAME", vec![text("a"), Cell::Empty]),
        ]);
        let spec = SchemaInferencer::default().infer(&table, "USERS");
        assert_eq!(
            spec.column_names(),
            vec![
                "ID",
                "NAME",
                CREATED_BY,
                CREATE_TIMESTAMP,
                UPDATED_BY,
                UPDATE_TIMESTAMP
            ]
        );
        assert!(!spec.columns[0].nullable);
        assert!(spec.columns[1].nullable);
        assert_eq!(
            spec.columns[3].default,
            Some(ColumnDefault::CurrentTimestamp)
        );
        assert!(spec.validate().is_empty());
    }

    #[test]
    fn merge_prefers_authoritative_columns() {
        let authoritative = TableSpec::new(
            "USERS",
            vec![ColumnSpec::new("id", DataKind::number(5, 0), false)],
        );
        let inferred = TableSpec::new(
            "USERS",
            vec![
                ColumnSpec::new("ID", DataKind::number(10, 0), true),
                ColumnSpec::new("EMAIL", DataKind::varchar(50), true),
            ],
        );
        let merged = TableSpec::merge(&authoritative, &inferred);
        assert_eq!(merged.column_names(), vec!["id", "EMAIL"]);
        assert_eq!(merged.columns[0].data_kind, DataKind::number(5, 0));
    }

    #[test]
    fn validation_reports_every_violation() {
        let mut spec = TableSpec::new(
            "A_TABLE_NAME_THAT_IS_FAR_TOO_LONG",
            vec![
                ColumnSpec::new(
                    "TEXT",
                    DataKind::String {
                        length: 0,
                        fixed: false,
                    },
                    true,
                ),
                ColumnSpec::new(
                    "text",
                    DataKind::Numeric {
                        precision: Some(40),
                        scale: Some(2),
                    },
                    true,
                ),
                ColumnSpec::new(
                    "AMOUNT",
                    DataKind::Numeric {
                        precision: Some(4),
                        scale: Some(6),
                    },
                    true,
                ),
            ],
        );
        spec.primary_key = vec!["MISSING".to_string()];
        let errors = spec.validate();
        assert_eq!(errors.len(), 6, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("duplicate column name 'text'")));
        assert!(TableSpec::new("T", Vec::new()).validate()[0].contains("no columns"));
    }

    #[test]
    fn data_kind_tokens_parse() {
        assert_eq!(
            DataKind::from_str("VARCHAR2(20)").unwrap(),
            DataKind::varchar(20)
        );
        assert_eq!(
            DataKind::from_str("number(12, 3)").unwrap(),
            DataKind::number(12, 3)
        );
        assert_eq!(
            DataKind::from_str("date").unwrap(),
            DataKind::Timestamp { precision: 0 }
        );
        assert!(DataKind::from_str("blob").is_err());
        assert!(DataKind::from_str("number(1,2,3)").is_err());
    }

    #[test]
    fn yaml_round_trip_keeps_defaults() {
        let yaml = r#"
name: ORDERS
columns:
  - name: ORDER_ID
    type: number(10,0)
    nullable: false
  - name: PLACED_AT
    type: timestamp(6)
    default: SYSTIMESTAMP
primary_key: [ORDER_ID]
"#;
        let spec = TableSpec::from_yaml_str(yaml).unwrap();
        assert_eq!(spec.columns[1].default, Some(ColumnDefault::CurrentTimestamp));
        assert!(spec.columns[1].nullable);
        let rendered = spec.to_yaml_string().unwrap();
        assert!(rendered.contains("number(10,0)"));
        assert_eq!(TableSpec::from_yaml_str(&rendered).unwrap(), spec);
    }

    #[test]
    fn create_table_sql_renders_constraints() {
        let mut spec = TableSpec::new(
            "ORDERS",
            vec![ColumnSpec::new("ORDER_ID", DataKind::number(10, 0), false)],
        );
        spec.primary_key = vec!["ORDER_ID".to_string()];
        spec.ensure_audit_columns();
        let sql = spec.create_table_sql(SqlDialect::Oracle);
        assert!(sql.starts_with("CREATE TABLE ORDERS (\n"));
        assert!(sql.contains("ORDER_ID NUMBER(10,0) NOT NULL"));
        assert!(sql.contains("CREATE_TIMESTAMP TIMESTAMP(6) DEFAULT SYSTIMESTAMP"));
        assert!(sql.contains("CREATED_BY VARCHAR2(50)"));
        assert!(sql.contains("CONSTRAINT PK_ORDERS PRIMARY KEY (ORDER_ID)"));
    }
}
