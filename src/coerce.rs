//! Converts loaded columns into values compatible with a [`TableSpec`] and
//! assembles output rows in table column order.

use chrono::{Local, NaiveDateTime};
use log::{debug, warn};
use rust_decimal::Decimal;

use crate::{
    schema::{
        CREATE_TIMESTAMP, CREATED_BY, ColumnSpec, DataKind, MAX_STRING_LENGTH, TableSpec,
        is_audit_column,
    },
    table::{Column, LoadedTable},
    temporal,
    value::Cell,
};

/// Positionally aligned with the owning [`TableSpec`] columns.
pub type OutputRow = Vec<Cell>;

const TEXT_NULL_MARKERS: [&str; 3] = ["nan", "NaN", ""];
/// Largest number of decimal digits a [`Decimal`] mantissa can hold.
///
/// Bounds wider than this lose fraction digits first: `numeric_bounds(30, 2)`
/// is ±(10^28 - 1), not ±(10^28 - 0.01).
const DECIMAL_DIGITS: u32 = 28;

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRows {
    pub rows: Vec<OutputRow>,
    /// Non-audit table columns the source did not supply.
    pub missing_columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RowBuilder {
    audit_user: String,
    string_max_length: u32,
}

impl Default for RowBuilder {
    fn default() -> Self {
        Self::new("SYSTEM", MAX_STRING_LENGTH)
    }
}

impl RowBuilder {
    pub fn new(audit_user: impl Into<String>, string_max_length: u32) -> Self {
        Self {
            audit_user: audit_user.into(),
            string_max_length,
        }
    }

    pub fn build(&self, table: &LoadedTable, spec: &TableSpec) -> BuiltRows {
        self.build_at(table, spec, Local::now().naive_local())
    }

    /// Builds rows using `now` for synthesized and defaulted timestamps.
    pub fn build_at(&self, table: &LoadedTable, spec: &TableSpec, now: NaiveDateTime) -> BuiltRows {
        let row_count = table.row_count();
        let mut missing_columns = Vec::new();
        let columns: Vec<Vec<Cell>> = spec
            .columns
            .iter()
            .map(|column_spec| {
                let source = table
                    .columns()
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(&column_spec.name));
                match source {
                    Some(column) => self.coerce_column(column, column_spec, now),
                    None => {
                        if !is_audit_column(&column_spec.name) {
                            warn!(
                                "Column {} of {} is missing from the source; inserting nulls",
                                column_spec.name, spec.name
                            );
                            missing_columns.push(column_spec.name.clone());
                        }
                        vec![self.synthesized(column_spec, now); row_count]
                    }
                }
            })
            .collect();

        let rows = (0..row_count)
            .map(|idx| {
                columns
                    .iter()
                    .map(|values| values.get(idx).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        debug!("Built {row_count} row(s) for {}", spec.name);
        BuiltRows {
            rows,
            missing_columns,
        }
    }

    fn synthesized(&self, column: &ColumnSpec, now: NaiveDateTime) -> Cell {
        if column.matches(CREATED_BY) {
            Cell::Text(self.audit_user.clone())
        } else if column.matches(CREATE_TIMESTAMP) {
            Cell::DateTime(now)
        } else {
            Cell::Empty
        }
    }

    pub fn coerce_column(&self, column: &Column, spec: &ColumnSpec, now: NaiveDateTime) -> Vec<Cell> {
        match spec.data_kind {
            DataKind::String { .. } => {
                let limit = spec.data_kind.max_length().unwrap_or(self.string_max_length);
                coerce_strings(&column.values, limit as usize, spec.nullable)
            }
            DataKind::Numeric { precision, scale } => {
                coerce_numbers(&column.values, precision, scale, spec.nullable)
            }
            DataKind::Timestamp { .. } => coerce_timestamps(&column.values, spec.nullable, now),
        }
    }

}

/// Renders every value as text, truncated to `limit` characters.
pub fn coerce_strings(values: &[Cell], limit: usize, nullable: bool) -> Vec<Cell> {
    values
        .iter()
        .map(|cell| {
            let text = cell.to_text();
            if nullable && TEXT_NULL_MARKERS.contains(&text.as_str()) {
                return Cell::Empty;
            }
            if text.chars().count() > limit {
                Cell::Text(text.chars().take(limit).collect())
            } else {
                Cell::Text(text)
            }
        })
        .collect()
}

/// Inclusive `(min, max)` for a NUMBER column; `None` when every
/// [`Decimal`] already fits.
pub fn numeric_bounds(precision: u32, scale: u32) -> Option<(Decimal, Decimal)> {
    let integer_digits = precision.saturating_sub(scale);
    if integer_digits > DECIMAL_DIGITS {
        return None;
    }
    let fraction_digits = scale.min(DECIMAL_DIGITS - integer_digits);
    let mantissa = 10i128.checked_pow(integer_digits + fraction_digits)? - 1;
    let max = Decimal::try_from_i128_with_scale(mantissa, fraction_digits).ok()?;
    Some((-max, max))
}

/// Largest magnitude of a NUMBER column as a float, for values outside
/// [`Decimal`]'s range.
fn float_bound(precision: u32, scale: u32) -> f64 {
    let integer_digits = precision.saturating_sub(scale) as i32;
    10f64.powi(integer_digits) - 10f64.powi(-(scale as i32))
}

/// Finite numbers too wide for [`Decimal`].
fn wide_number(cell: &Cell) -> Option<f64> {
    let value = match cell {
        Cell::Float(f) => *f,
        Cell::Text(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Coerces values for a NUMBER column, clipping to its precision.
///
/// Values beyond [`Decimal`]'s range stay floats, clipped the same way.
pub fn coerce_numbers(
    values: &[Cell],
    precision: Option<u32>,
    scale: Option<u32>,
    nullable: bool,
) -> Vec<Cell> {
    let bounds = precision.and_then(|p| numeric_bounds(p, scale.unwrap_or(0)));
    let integral = scale.unwrap_or(0) == 0;
    values
        .iter()
        .map(|cell| {
            let parsed = if cell.is_empty() {
                None
            } else {
                cell.to_decimal()
            };
            match parsed {
                Some(value) => {
                    let clipped = match bounds {
                        Some((min, max)) => value.clamp(min, max),
                        None => value,
                    };
                    if !nullable && integral {
                        Cell::Decimal(clipped.trunc())
                    } else {
                        Cell::Decimal(clipped)
                    }
                }
                None => match wide_number(cell) {
                    Some(value) => {
                        let clipped = match precision {
                            Some(p) => {
                                let bound = float_bound(p, scale.unwrap_or(0));
                                value.clamp(-bound, bound)
                            }
                            None => value,
                        };
                        if !nullable && integral {
                            Cell::Float(clipped.trunc())
                        } else {
                            Cell::Float(clipped)
                        }
                    }
                    None if nullable => Cell::Empty,
                    None if integral => Cell::Integer(0),
                    None => Cell::Decimal(Decimal::ZERO),
                },
            }
        })
        .collect()
}

pub fn coerce_timestamps(values: &[Cell], nullable: bool, now: NaiveDateTime) -> Vec<Cell> {
    let parsed = temporal::parse_column(values).unwrap_or_else(|| {
        values
            .iter()
            .map(temporal::parse_cell)
            .collect()
    });
    parsed
        .into_iter()
        .map(|value| match value.filter(temporal::is_valid) {
            Some(ts) => Cell::DateTime(ts),
            None if nullable => Cell::Empty,
            None => Cell::DateTime(now),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaInferencer, UPDATED_BY};
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn text(value: &str) -> Cell {
        Cell::Text(value.to_string())
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn bounds_are_symmetric() {
        assert_eq!(numeric_bounds(6, 2), Some((dec("-9999.99"), dec("9999.99"))));
        assert_eq!(numeric_bounds(3, 0), Some((dec("-999"), dec("999"))));
        assert_eq!(numeric_bounds(38, 0), None);
    }

    #[test]
    fn numbers_are_clipped_not_rejected() {
        let values = vec![text("123456.789"), text("-20000"), text("12.5"), text("abc")];
        let coerced = coerce_numbers(&values, Some(6), Some(2), true);
        assert_eq!(coerced[0], Cell::Decimal(dec("9999.99")));
        assert_eq!(coerced[1], Cell::Decimal(dec("-9999.99")));
        assert_eq!(coerced[2], Cell::Decimal(dec("12.5")));
        assert_eq!(coerced[3], Cell::Empty);
    }

    #[test]
    fn non_nullable_numbers_default_to_zero() {
        let values = vec![Cell::Empty, Cell::Float(7.9), Cell::Boolean(true)];
        let coerced = coerce_numbers(&values, Some(10), Some(0), false);
        assert_eq!(coerced[0], Cell::Integer(0));
        assert_eq!(coerced[1], Cell::Decimal(dec("7")));
        assert_eq!(coerced[2], Cell::Decimal(dec("1")));
    }

    #[test]
    fn strings_map_null_markers_and_truncate() {
        let values = vec![text("NaN"), Cell::Empty, text("abcdefgh"), Cell::Integer(3)];
        let nullable = coerce_strings(&values, 5, true);
        assert_eq!(nullable[0], Cell::Empty);
        assert_eq!(nullable[1], Cell::Empty);
        assert_eq!(nullable[2], text("abcde"));
        assert_eq!(nullable[3], text("3"));
        let required = coerce_strings(&values, 5, false);
        assert_eq!(required[1], text("nan"));
    }

    #[test]
    fn strings_truncate_to_column_length() {
        let column = Column::new("CODE", vec![text("abcdefghij"), text("xy")]);
        let spec = ColumnSpec::new("CODE", DataKind::varchar(3), true);
        let coerced = RowBuilder::default().coerce_column(&column, &spec, now());
        assert_eq!(coerced, vec![text("abc"), text("xy")]);

        let wide = ColumnSpec::new("CODE", DataKind::varchar(4000), true);
        let coerced = RowBuilder::new("SYSTEM", 4).coerce_column(&column, &wide, now());
        assert_eq!(coerced[0], text("abcdefghij"));
    }

    #[test]
    fn numbers_beyond_decimal_range_stay_floats() {
        let values = vec![
            Cell::Float(1e30),
            text("123456789012345678901234567890"),
            Cell::Float(-1e40),
            text("not a number"),
        ];
        let coerced = coerce_numbers(&values, Some(38), Some(0), true);
        assert_eq!(coerced[0], Cell::Float(1e30));
        assert_eq!(coerced[1], Cell::Float(1.2345678901234568e29));
        match coerced[2] {
            Cell::Float(clipped) => assert!(clipped < -9.9e37 && clipped > -1.1e38, "{clipped}"),
            ref other => panic!("expected a float, got {other:?}"),
        }
        assert_eq!(coerced[3], Cell::Empty);

        let unbounded = coerce_numbers(&[Cell::Float(1e30)], None, None, false);
        assert_eq!(unbounded[0], Cell::Float(1e30));
    }

    #[test]
    fn imprecise_wide_bounds_drop_fraction_digits() {
        let (_, max) = numeric_bounds(30, 2).unwrap();
        assert_eq!(max.scale(), 0);
        assert_eq!(max, dec("9999999999999999999999999999"));
    }

    #[test]
    fn timestamps_default_to_now_when_required() {
        let values = vec![text("2024-03-04 05:06:07"), text("garbage"), Cell::Empty];
        let nullable = coerce_timestamps(&values, true, now());
        assert!(matches!(nullable[0], Cell::DateTime(_)));
        assert_eq!(nullable[1], Cell::Empty);
        let required = coerce_timestamps(&values, false, now());
        assert_eq!(required[1], Cell::DateTime(now()));
        assert_eq!(required[2], Cell::DateTime(now()));
    }

    #[test]
    fn timestamps_without_date_separators_parse_per_cell() {
        let values = vec![text("20250827"), text("20250828"), Cell::Float(45000.5), text("junk")];
        let coerced = coerce_timestamps(&values, true, now());
        let expected = |y, m, d, h| {
            Cell::DateTime(
                NaiveDate::from_ymd_opt(y, m, d)
                    .unwrap()
                    .and_hms_opt(h, 0, 0)
                    .unwrap(),
            )
        };
        assert_eq!(coerced[0], expected(2025, 8, 27, 0));
        assert_eq!(coerced[1], expected(2025, 8, 28, 0));
        assert_eq!(coerced[2], expected(2023, 3, 15, 12));
        assert_eq!(coerced[3], Cell::Empty);
    }

    #[test]
    fn rows_follow_table_order_with_audit_defaults() {
        let table = LoadedTable::new(vec![
            Column::new("NAME", vec![text("Ann"), text("Bob")]),
            Column::new("ID", vec![Cell::Integer(1), Cell::Integer(2)]),
        ]);
        let mut spec = SchemaInferencer::default().infer(&table, "USERS");
        spec.columns.swap(0, 1);
        spec.columns.insert(
            2,
            ColumnSpec::new("EMAIL", DataKind::varchar(50), true),
        );
        let built = RowBuilder::default().build_at(&table, &spec, now());
        assert_eq!(built.missing_columns, vec!["EMAIL"]);
        assert_eq!(built.rows.len(), 2);
        let row = &built.rows[1];
        assert_eq!(row.len(), spec.columns.len());
        assert_eq!(row[0], Cell::Decimal(dec("2")));
        assert_eq!(row[1], text("Bob"));
        assert_eq!(row[2], Cell::Empty);
        assert_eq!(row[spec.column_index(CREATED_BY).unwrap()], text("SYSTEM"));
        assert_eq!(
            row[spec.column_index(CREATE_TIMESTAMP).unwrap()],
            Cell::DateTime(now())
        );
        assert_eq!(row[spec.column_index(UPDATED_BY).unwrap()], Cell::Empty);
    }

    #[test]
    fn source_audit_columns_are_kept() {
        let table = LoadedTable::new(vec![
            Column::new("ID", vec![Cell::Integer(1)]),
            Column::new("CREATED_BY", vec![text("loader")]),
        ]);
        let spec = SchemaInferencer::default().infer(&table, "T");
        let built = RowBuilder::default().build_at(&table, &spec, now());
        let idx = spec.column_index(CREATED_BY).unwrap();
        assert_eq!(built.rows[0][idx], text("loader"));
    }
}
