//! Cell values as read from source files, and the wire-safe values handed to
//! the database.
//!
//! [`Cell`] is the heterogeneous, pre-coercion representation stored in a
//! [`crate::table::LoadedTable`]. [`SqlValue`] is the closed set of values a
//! [`crate::db::Database`] accepts; [`sanitize`] is the total conversion
//! between the two.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Cell {
    /// Missing value (empty field, NA token, blank spreadsheet cell).
    #[default]
    Empty,
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    /// Spreadsheet floats and values too wide for [`Decimal`]; may be NaN.
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Cell::Date(_) | Cell::DateTime(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Cell::Integer(_) | Cell::Decimal(_) | Cell::Float(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Textual rendering used when a column is stringified for a STRING target.
    ///
    /// Missing values render as `nan` so that nullable columns can map them
    /// back to null alongside the other textual null markers.
    pub fn to_text(&self) -> String {
        match self {
            Cell::Empty => "nan".to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Integer(i) => i.to_string(),
            Cell::Decimal(d) => d.to_string(),
            Cell::Float(f) => format_float(*f),
            Cell::Boolean(true) => "True".to_string(),
            Cell::Boolean(false) => "False".to_string(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::DateTime(dt) => format_datetime(dt),
        }
    }

    /// Numeric interpretation of the cell, `None` when it cannot be coerced.
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            Cell::Integer(i) => Some(Decimal::from(*i)),
            Cell::Decimal(d) => Some(*d),
            Cell::Float(f) if f.is_finite() => Decimal::from_f64(*f),
            Cell::Boolean(b) => Some(Decimal::from(u8::from(*b))),
            Cell::Text(s) => parse_decimal(s),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            other => write!(f, "{}", other.to_text()),
        }
    }
}

/// Parses a numeric literal, accepting plain and scientific notation.
pub fn parse_decimal(value: &str) -> Option<Decimal> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = trimmed.parse::<Decimal>() {
        return Some(parsed);
    }
    if trimmed.contains(['e', 'E'])
        && let Ok(parsed) = Decimal::from_scientific(trimmed)
    {
        return Some(parsed);
    }
    None
}

/// Parses a numeric literal into the narrowest cell that represents it.
pub fn parse_numeric_cell(value: &str) -> Option<Cell> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = trimmed.parse::<i64>() {
        return Some(Cell::Integer(parsed));
    }
    if let Some(parsed) = parse_decimal(trimmed) {
        return Some(Cell::Decimal(parsed));
    }
    match trimmed.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && trimmed.chars().any(|c| c.is_ascii_digit()) => {
            Some(Cell::Float(parsed))
        }
        _ => None,
    }
}

pub fn format_datetime(value: &NaiveDateTime) -> String {
    if value.and_utc().timestamp_subsec_micros() == 0 {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        value.format(TIMESTAMP_FORMAT).to_string()
    }
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Values accepted by the transactional executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SqlValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Real(f64),
    Boolean(bool),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Renders the value as a SQL literal for generated scripts.
    pub fn to_sql_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Decimal(d) => d.normalize().to_string(),
            SqlValue::Real(f) => f.to_string(),
            SqlValue::Boolean(b) => u8::from(*b).to_string(),
            SqlValue::Timestamp(ts) => format!("'{}'", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

/// Converts a built cell into a wire-safe value. Every cell variant maps to
/// exactly one output variant: missing and NaN become `Null`, dates are
/// anchored to midnight, integral decimals narrow to `Integer` when they fit.
pub fn sanitize(cell: &Cell) -> SqlValue {
    match cell {
        Cell::Empty => SqlValue::Null,
        Cell::Text(s) => SqlValue::Text(s.clone()),
        Cell::Integer(i) => SqlValue::Integer(*i),
        Cell::Decimal(d) => {
            if d.fract().is_zero()
                && let Some(i) = d.to_i64()
            {
                SqlValue::Integer(i)
            } else {
                SqlValue::Decimal(*d)
            }
        }
        Cell::Float(f) if !f.is_finite() => SqlValue::Null,
        Cell::Float(f) => SqlValue::Real(*f),
        Cell::Boolean(b) => SqlValue::Boolean(*b),
        Cell::Date(d) => SqlValue::Timestamp(d.and_time(NaiveTime::MIN)),
        Cell::DateTime(dt) => SqlValue::Timestamp(*dt),
    }
}

pub fn sanitize_row(row: &[Cell]) -> Vec<SqlValue> {
    row.iter().map(sanitize).collect()
}
