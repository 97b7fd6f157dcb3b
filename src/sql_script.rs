//! Literal INSERT statement scripts written for inspection.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Local;
use itertools::Itertools;
use log::info;

use crate::{
    coerce::OutputRow,
    io_utils,
    schema::TableSpec,
    value::{format_datetime, sanitize_row},
};

pub fn script_path(directory: &Path, table: &str) -> PathBuf {
    directory.join(format!("{table}_insert.sql"))
}

/// One `INSERT ... VALUES (...);` line per row.
pub fn render_inserts(spec: &TableSpec, rows: &[OutputRow]) -> Vec<String> {
    let columns = spec.columns.iter().map(|c| c.name.as_str()).join(", ");
    rows.iter()
        .map(|row| {
            let values = sanitize_row(row)
                .iter()
                .map(|value| value.to_sql_literal())
                .join(", ");
            format!("INSERT INTO {} ({columns}) VALUES ({values});", spec.name)
        })
        .collect()
}

/// Writes the script for `spec` under `directory` and returns its path.
pub fn write_script(
    directory: &Path,
    spec: &TableSpec,
    rows: &[OutputRow],
    source: &Path,
) -> Result<PathBuf> {
    let path = script_path(directory, &spec.name);
    let mut writer = io_utils::open_text_writer(&path)?;
    write_body(&mut writer, spec, rows, source)
        .with_context(|| format!("Writing SQL script {path:?}"))?;
    info!("Wrote {} INSERT statement(s) to {path:?}", rows.len());
    Ok(path)
}

fn write_body(
    writer: &mut impl Write,
    spec: &TableSpec,
    rows: &[OutputRow],
    source: &Path,
) -> std::io::Result<()> {
    writeln!(writer, "-- Table: {}", spec.name)?;
    writeln!(writer, "-- Source: {}", source.display())?;
    writeln!(
        writer,
        "-- Generated: {}",
        format_datetime(&Local::now().naive_local())
    )?;
    writeln!(writer, "-- Rows: {}", rows.len())?;
    writeln!(writer)?;
    for statement in render_inserts(spec, rows) {
        writeln!(writer, "{statement}")?;
    }
    writer.flush()
}
