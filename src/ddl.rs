//! Authoritative table definitions supplied alongside the data.
//!
//! A definition file holds either one table or a `tables:` list. A directory
//! is searched recursively for `*.yaml` / `*.yml` files. Tables are keyed by
//! their uppercased name.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use log::{debug, info, warn};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::schema::TableSpec;

const DEFINITION_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

#[derive(Deserialize)]
#[serde(untagged)]
enum DefinitionFile {
    Many { tables: Vec<TableSpec> },
    One(TableSpec),
}

#[derive(Debug, Clone, Default)]
pub struct DdlRegistry {
    tables: BTreeMap<String, TableSpec>,
}

impl DdlRegistry {
    /// Loads definitions from a single file or a directory tree.
    pub fn load(path: &Path) -> Result<Self> {
        ensure!(path.exists(), "Definition path {path:?} does not exist");
        let mut registry = Self::default();
        for file in definition_files(path)? {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Reading table definitions {file:?}"))?;
            registry
                .add_yaml(&raw)
                .with_context(|| format!("Parsing table definitions {file:?}"))?;
        }
        info!(
            "Loaded {} table definition(s) from {path:?}",
            registry.tables.len()
        );
        Ok(registry)
    }

    /// Adds every table defined in `raw`.
    pub fn add_yaml(&mut self, raw: &str) -> Result<()> {
        let parsed: DefinitionFile =
            serde_yaml::from_str(raw).context("Parsing table definition YAML")?;
        let specs = match parsed {
            DefinitionFile::Many { tables } => tables,
            DefinitionFile::One(spec) => vec![spec],
        };
        for spec in specs {
            ensure!(!spec.name.trim().is_empty(), "Table definition has no name");
            self.insert(spec);
        }
        Ok(())
    }

    /// Later definitions replace earlier ones with the same name.
    pub fn insert(&mut self, spec: TableSpec) {
        let key = spec.name.trim().to_uppercase();
        if self.tables.insert(key.clone(), spec).is_some() {
            warn!("Table {key} is defined more than once; keeping the last definition");
        }
    }

    pub fn get(&self, table: &str) -> Option<&TableSpec> {
        self.tables.get(&table.trim().to_uppercase())
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn definition_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Walking {path:?}"))?;
        let candidate = entry.path();
        let matches = candidate
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                DEFINITION_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false);
        if entry.file_type().is_file() && matches {
            debug!("Found table definition file {candidate:?}");
            files.push(candidate.to_path_buf());
        }
    }
    Ok(files)
}
