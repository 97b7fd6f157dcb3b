//! Best-effort conversion of heterogeneous date/time representations into
//! canonical timestamps.
//!
//! Strings go through three stages: slash-date normalization, a generic
//! parser (RFC 3339, RFC 2822 and common ISO / month-name layouts), then an
//! ordered list of explicit layouts. Every candidate result is range checked
//! before it is accepted, so an out-of-range parse falls through to the next
//! stage instead of being returned.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use log::debug;
use regex::{Captures, Regex};

use crate::value::Cell;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

/// Share of sampled values that must look date-like before a column is parsed.
pub const DATE_LIKE_SAMPLE_RATIO: f64 = 0.3;
const DATE_LIKE_SAMPLE_SIZE: usize = 5;

const DATE_LIKE_MARKERS: [char; 6] = ['/', '-', ':', '年', '月', '日'];

/// Explicit layouts, tried in order. The flag marks date-only layouts.
const EXPLICIT_FORMATS: &[(&str, bool)] = &[
    ("%Y-%m-%d %H:%M:%S%.f", false),
    ("%Y-%m-%d %H:%M:%S", false),
    ("%Y-%m-%dT%H:%M:%S%.f", false),
    ("%Y-%m-%dT%H:%M:%S", false),
    ("%Y-%m-%d", true),
    ("%Y/%m/%d %H:%M:%S%.f", false),
    ("%Y/%m/%d %H:%M:%S", false),
    ("%Y/%m/%d", true),
    ("%Y年%m月%d日 %H:%M:%S", false),
    ("%Y年%m月%d日", true),
    ("%d/%m/%Y %H:%M:%S", false),
    ("%d/%m/%Y", true),
    ("%m/%d/%Y %H:%M:%S", false),
    ("%m/%d/%Y", true),
    ("%Y.%m.%d %H:%M:%S", false),
    ("%Y.%m.%d", true),
    ("%Y%m%d %H%M%S", false),
    ("%Y%m%d", true),
];

/// Layouts the generic parser understands beyond RFC 3339 / RFC 2822.
const GENERIC_FORMATS: &[(&str, bool)] = &[
    ("%Y-%m-%d %H:%M:%S%.f", false),
    ("%Y-%m-%dT%H:%M:%S%.f", false),
    ("%Y-%m-%d %H:%M", false),
    ("%Y-%m-%dT%H:%M", false),
    ("%Y-%m-%d", true),
    ("%d %B %Y", true),
    ("%d %b %Y", true),
    ("%B %d, %Y", true),
    ("%b %d, %Y", true),
    ("%B %d %Y", true),
    ("%b %d %Y", true),
    ("%d-%b-%Y", true),
    ("%d %B %Y %H:%M:%S", false),
    ("%b %d %Y %H:%M:%S", false),
];

/// Spreadsheet serial day zero.
pub fn serial_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap_or_default()
        .and_time(NaiveTime::MIN)
}

/// True when the timestamp falls inside the accepted calendar window.
pub fn is_valid(value: &NaiveDateTime) -> bool {
    (MIN_YEAR..=MAX_YEAR).contains(&value.year()) && (1..=12).contains(&value.month())
}

fn validated(value: NaiveDateTime) -> Option<NaiveDateTime> {
    is_valid(&value).then_some(value)
}

/// Parses a single cell. Unparseable input yields `None`.
pub fn parse_cell(cell: &Cell) -> Option<NaiveDateTime> {
    match cell {
        Cell::Empty | Cell::Boolean(_) => None,
        Cell::Date(date) => validated(date.and_time(NaiveTime::MIN)),
        Cell::DateTime(value) => validated(*value),
        Cell::Integer(days) => from_serial(*days as f64),
        Cell::Decimal(days) => {
            use rust_decimal::prelude::ToPrimitive;
            days.to_f64().and_then(from_serial)
        }
        Cell::Float(days) => from_serial(*days),
        Cell::Text(text) => parse_str(text),
    }
}

/// Converts a spreadsheet serial day count, fractional part being time of day.
pub fn from_serial(days: f64) -> Option<NaiveDateTime> {
    if !days.is_finite() {
        return None;
    }
    let micros = (days * 86_400_000_000.0).round();
    if micros.abs() > i64::MAX as f64 {
        return None;
    }
    let value = serial_epoch().checked_add_signed(Duration::microseconds(micros as i64))?;
    validated(value)
}

pub fn parse_str(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = normalize_slash_dates(trimmed);
    let parsed = parse_generic(&normalized)
        .or_else(|| parse_explicit(&normalized))
        .or_else(|| {
            let collapsed = collapse_whitespace(&normalized);
            parse_generic(&collapsed)
        });
    if parsed.is_none() {
        debug!("Unable to parse '{trimmed}' as a timestamp");
    }
    parsed
}

/// Generic parse: RFC 3339, RFC 2822, then common ISO and month-name layouts.
pub fn parse_generic(value: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value)
        && let Some(valid) = validated(parsed.naive_local())
    {
        return Some(valid);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value)
        && let Some(valid) = validated(parsed.naive_local())
    {
        return Some(valid);
    }
    try_formats(value, GENERIC_FORMATS)
}

fn parse_explicit(value: &str) -> Option<NaiveDateTime> {
    try_formats(value, EXPLICIT_FORMATS)
}

fn try_formats(value: &str, formats: &[(&str, bool)]) -> Option<NaiveDateTime> {
    formats.iter().find_map(|(format, date_only)| {
        let parsed = if *date_only {
            NaiveDate::parse_from_str(value, format)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        } else {
            NaiveDateTime::parse_from_str(value, format).ok()
        };
        parsed.and_then(validated)
    })
}

struct SlashPatterns {
    datetime: Regex,
    date: Regex,
    whitespace: Regex,
}

fn slash_patterns() -> &'static SlashPatterns {
    static PATTERNS: OnceLock<SlashPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| SlashPatterns {
        datetime: Regex::new(r"^(\d{4})/(\d{1,2})/(\d{1,2}) (\d{1,2}):(\d{1,2}):(\d{1,2})\.?(\d*)")
            .expect("valid datetime pattern"),
        date: Regex::new(r"^(\d{4})/(\d{1,2})/(\d{1,2})$").expect("valid date pattern"),
        whitespace: Regex::new(r"\s+").expect("valid whitespace pattern"),
    })
}

/// Rewrites `YYYY/M/D[ H:M:S[.f]]` into zero-padded ISO form.
pub fn normalize_slash_dates(value: &str) -> String {
    let patterns = slash_patterns();
    if let Some(caps) = patterns.datetime.captures(value) {
        let rest = &value[caps.get(0).map(|m| m.end()).unwrap_or(0)..];
        return format!("{}{}", format_datetime_parts(&caps), rest);
    }
    if let Some(caps) = patterns.date.captures(value) {
        return format!(
            "{}-{:0>2}-{:0>2}",
            &caps[1], &caps[2], &caps[3]
        );
    }
    value.to_string()
}

fn format_datetime_parts(caps: &Captures<'_>) -> String {
    let base = format!(
        "{}-{:0>2}-{:0>2} {:0>2}:{:0>2}:{:0>2}",
        &caps[1], &caps[2], &caps[3], &caps[4], &caps[5], &caps[6]
    );
    match caps.get(7).map(|m| m.as_str()).filter(|f| !f.is_empty()) {
        Some(fraction) => {
            let micros: String = fraction.chars().chain(std::iter::repeat('0')).take(6).collect();
            format!("{base}.{micros}")
        }
        None => base,
    }
}

fn collapse_whitespace(value: &str) -> String {
    slash_patterns()
        .whitespace
        .replace_all(value.trim(), " ")
        .into_owned()
}

/// True when a value carries a date/time separator or is already temporal.
pub fn looks_date_like(cell: &Cell) -> bool {
    match cell {
        Cell::Date(_) | Cell::DateTime(_) => true,
        Cell::Text(text) => text.contains(DATE_LIKE_MARKERS),
        _ => false,
    }
}

/// Parses a whole column.
///
/// Returns `None` when fewer than [`DATE_LIKE_SAMPLE_RATIO`] of the first
/// five non-missing values look date-like; the column is then left as is.
/// Otherwise each value is parsed, failures becoming `None`.
pub fn parse_column(values: &[Cell]) -> Option<Vec<Option<NaiveDateTime>>> {
    let sample: Vec<&Cell> = values
        .iter()
        .filter(|cell| !cell.is_empty())
        .take(DATE_LIKE_SAMPLE_SIZE)
        .collect();
    if sample.is_empty() {
        return Some(vec![None; values.len()]);
    }
    let date_like = sample.iter().filter(|cell| looks_date_like(cell)).count();
    if (date_like as f64) < sample.len() as f64 * DATE_LIKE_SAMPLE_RATIO {
        debug!(
            "Only {date_like} of {} sampled values look like dates; skipping temporal parse",
            sample.len()
        );
        return None;
    }

    let mut fallbacks = 0usize;
    let parsed = values
        .iter()
        .map(|cell| {
            let fast = match cell {
                Cell::Text(text) => parse_generic(text.trim()),
                _ => None,
            };
            fast.or_else(|| {
                if !cell.is_empty() {
                    fallbacks += 1;
                }
                parse_cell(cell)
            })
        })
        .collect();
    if fallbacks > 0 {
        debug!("{fallbacks} value(s) needed the per-value temporal parser");
    }
    Some(parsed)
}
