//! YAML configuration file.
//!
//! Every section is optional; missing sections and keys take their
//! defaults, and a missing file yields [`Config::default`].

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result, anyhow};
use log::{LevelFilter, info};
use serde::{Deserialize, Serialize};

use crate::{
    coerce::RowBuilder,
    db::SqlDialect,
    header::{HeaderDetector, HeaderMode},
    io_utils,
    loader::{
        DEFAULT_BATCH_SIZE, DEFAULT_DUPLICATE_ERROR_KEYWORDS, DEFAULT_DUPLICATE_MIN_BATCH_SIZE,
        LoaderSettings,
    },
    reader::ReaderOptions,
    schema::{SchemaInferencer, TypeLimits},
};

pub const DEFAULT_CONFIG_FILE: &str = "tabload.yaml";
pub const MAX_BATCH_SIZE: usize = 100_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub import_settings: ImportSettings,
    pub data_types: TypeLimits,
    pub header_detection: HeaderDetectionConfig,
    pub logging: LoggingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file; `:memory:` for a throwaway database.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("import.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    pub batch_size: usize,
    pub duplicate_min_batch_size: usize,
    pub duplicate_error_keywords: Vec<String>,
    pub create_table_if_not_exists: bool,
    pub default_encoding: String,
    pub encoding_confidence: f64,
    pub remove_date_suffix: bool,
    pub audit_user: String,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            duplicate_min_batch_size: DEFAULT_DUPLICATE_MIN_BATCH_SIZE,
            duplicate_error_keywords: DEFAULT_DUPLICATE_ERROR_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            create_table_if_not_exists: false,
            default_encoding: "utf-8".to_string(),
            encoding_confidence: 0.7,
            remove_date_suffix: true,
            audit_user: "SYSTEM".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderDetectionConfig {
    pub mode: HeaderMode,
    /// `A,B|C` keyword rule; empty disables it.
    pub keywords: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(self.level.trim())
            .map_err(|_| anyhow!("Unknown log level '{}'", self.level))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub dialect: SqlDialect,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            dialect: SqlDialect::Oracle,
        }
    }
}

impl Config {
    /// Loads `path`, or the defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Configuration {path:?} not found; using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Reading configuration {path:?}"))?;
        Self::from_yaml_str(&raw).with_context(|| format!("Parsing configuration {path:?}"))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("Parsing configuration YAML")
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing configuration to YAML")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml_string()?;
        io_utils::write_text(path, &yaml).with_context(|| format!("Writing configuration {path:?}"))
    }

    /// Returns every violation; empty when the configuration is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let settings = &self.import_settings;
        if !(1..=MAX_BATCH_SIZE).contains(&settings.batch_size) {
            errors.push(format!(
                "import_settings.batch_size must be within 1..={MAX_BATCH_SIZE}"
            ));
        }
        if !(0.0..=1.0).contains(&settings.encoding_confidence) {
            errors.push("import_settings.encoding_confidence must be within 0..=1".to_string());
        }
        if io_utils::resolve_encoding(Some(&settings.default_encoding)).is_err() {
            errors.push(format!(
                "import_settings.default_encoding '{}' is not a known encoding",
                settings.default_encoding
            ));
        }
        if settings.audit_user.trim().is_empty() {
            errors.push("import_settings.audit_user cannot be empty".to_string());
        }
        errors.extend(self.data_types.validate());
        if self.logging.level_filter().is_err() {
            errors.push(format!("logging.level '{}' is not a log level", self.logging.level));
        }
        if self.database.path.as_os_str().is_empty() {
            errors.push("database.path cannot be empty".to_string());
        }
        errors
    }

    pub fn reader_options(&self) -> Result<ReaderOptions> {
        let settings = &self.import_settings;
        Ok(ReaderOptions {
            default_encoding: io_utils::resolve_encoding(Some(&settings.default_encoding))?,
            encoding_confidence: settings.encoding_confidence,
            detector: HeaderDetector::new(
                self.header_detection.mode,
                &self.header_detection.keywords,
            ),
        })
    }

    pub fn loader_settings(&self) -> LoaderSettings {
        let settings = &self.import_settings;
        LoaderSettings {
            batch_size: settings.batch_size,
            duplicate_min_batch_size: settings.duplicate_min_batch_size,
            duplicate_error_keywords: settings.duplicate_error_keywords.clone(),
        }
    }

    pub fn inferencer(&self) -> SchemaInferencer {
        SchemaInferencer::new(self.data_types.clone())
    }

    pub fn row_builder(&self) -> RowBuilder {
        RowBuilder::new(
            self.import_settings.audit_user.clone(),
            self.data_types.string_max_length,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = Config::from_yaml_str(
            "import_settings:\n  batch_size: 50\nheader_detection:\n  mode: force_header\noutput:\n  dialect: sqlite\n",
        )
        .unwrap();
        assert_eq!(config.import_settings.batch_size, 50);
        assert_eq!(config.import_settings.duplicate_min_batch_size, 10);
        assert_eq!(config.header_detection.mode, HeaderMode::ForceHeader);
        assert_eq!(config.output.dialect, SqlDialect::Sqlite);
        assert_eq!(config.data_types.number_scale, 2);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn validation_reports_every_violation() {
        let mut config = Config::default();
        config.import_settings.batch_size = 0;
        config.import_settings.encoding_confidence = 1.5;
        config.data_types.number_scale = 40;
        config.logging.level = "loud".into();
        let errors = config.validate();
        assert_eq!(errors.len(), 4, "{errors:?}");
    }

    #[test]
    fn missing_file_yields_defaults_and_save_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(DEFAULT_CONFIG_FILE);
        assert_eq!(Config::load(&path).unwrap(), Config::default());

        let mut config = Config::default();
        config.import_settings.audit_user = "LOADER".into();
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn settings_flow_into_components() {
        let mut config = Config::default();
        config.import_settings.default_encoding = "gbk".into();
        config.header_detection.keywords = "ID,NAME".into();
        let options = config.reader_options().unwrap();
        assert_eq!(options.default_encoding.name(), "GBK");
        assert!(options.detector.is_header(&["id".into(), "name".into()]));
        assert_eq!(config.loader_settings(), LoaderSettings::default());
    }
}
