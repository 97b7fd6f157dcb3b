//! In-memory tabular data produced by the reader and consumed by inference
//! and row building, plus console rendering for previews.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::value::Cell;

/// Storage class of a column, decided from its non-missing cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// No non-missing values.
    Empty,
    Integer,
    /// Numeric with at least one fractional or wide value.
    Float,
    Boolean,
    Temporal,
    /// Text, or a mix of storage classes.
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn non_empty(&self) -> impl Iterator<Item = &Cell> {
        self.values.iter().filter(|cell| !cell.is_empty())
    }

    pub fn has_missing(&self) -> bool {
        self.values.iter().any(Cell::is_empty)
    }

    pub fn kind(&self) -> ColumnKind {
        let mut kind = ColumnKind::Empty;
        for cell in self.non_empty() {
            let cell_kind = match cell {
                Cell::Integer(_) => ColumnKind::Integer,
                Cell::Decimal(_) | Cell::Float(_) => ColumnKind::Float,
                Cell::Boolean(_) => ColumnKind::Boolean,
                Cell::Date(_) | Cell::DateTime(_) => ColumnKind::Temporal,
                Cell::Text(_) | Cell::Empty => ColumnKind::Text,
            };
            kind = match (kind, cell_kind) {
                (ColumnKind::Empty, next) => next,
                (current, next) if current == next => current,
                (ColumnKind::Integer, ColumnKind::Float) | (ColumnKind::Float, ColumnKind::Integer) => {
                    ColumnKind::Float
                }
                _ => return ColumnKind::Text,
            };
        }
        kind
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedTable {
    columns: Vec<Column>,
}

impl LoadedTable {
    /// Builds a table from columns. Shorter columns are padded with missing
    /// cells so that every column has the same row count.
    pub fn new(mut columns: Vec<Column>) -> Self {
        let rows = columns.iter().map(|c| c.values.len()).max().unwrap_or(0);
        for column in &mut columns {
            column.values.resize(rows, Cell::Empty);
        }
        Self { columns }
    }

    /// Builds a table from row-major records.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let mut columns: Vec<Column> = headers
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect();
        for row in rows {
            let mut cells = row.into_iter();
            for column in &mut columns {
                column.values.push(cells.next().unwrap_or(Cell::Empty));
            }
        }
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.row_count() == 0
    }

    pub fn row(&self, index: usize) -> Vec<&Cell> {
        self.columns
            .iter()
            .filter_map(|c| c.values.get(index))
            .collect()
    }

    /// Removes rows in which every cell is missing.
    pub fn drop_empty_rows(&mut self) {
        let rows = self.row_count();
        let keep: Vec<bool> = (0..rows)
            .map(|idx| self.columns.iter().any(|c| !c.values[idx].is_empty()))
            .collect();
        if keep.iter().all(|k| *k) {
            return;
        }
        for column in &mut self.columns {
            let mut flags = keep.iter();
            column.values.retain(|_| *flags.next().unwrap_or(&false));
        }
    }

    /// Keeps the first occurrence of each column name.
    pub fn drop_duplicate_columns(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.columns.retain(|c| seen.insert(c.name.clone()));
    }

    pub fn rename_columns(&mut self, mut rename: impl FnMut(&str) -> String) {
        for column in &mut self.columns {
            column.name = rename(&column.name);
        }
    }

    pub fn head(&self, rows: usize) -> Vec<Vec<String>> {
        (0..self.row_count().min(rows))
            .map(|idx| self.row(idx).iter().map(|c| c.to_string()).collect())
            .collect()
    }
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }

    for width in &mut widths {
        *width = (*width).max(1);
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));

    let separator_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<usize>>();
    let separator_cells = separator_widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator_cells, &separator_widths));

    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }

    output
}

/// Renders the first `rows` rows of a loaded table.
pub fn render_preview(table: &LoadedTable, rows: usize) -> String {
    render_table(&table.column_names(), &table.head(rows))
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let mut cells = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate().take(widths.len()) {
        let sanitized = sanitize_cell(value);
        let padding = widths[idx].saturating_sub(display_width(sanitized.as_ref()));
        let mut cell = sanitized.into_owned();
        cell.push_str(&" ".repeat(padding));
        cells.push(cell);
    }
    cells.join("  ").trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
