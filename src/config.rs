use crate::constants;
use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "vendor_etl.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// SQLite database file holding raw and derived tables.
    pub database: PathBuf,
    /// Directory scanned by the loader.
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub summary_table: String,
    pub extensions: Vec<String>,
    /// Record each job in the run ledger.
    pub record_runs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("inventory.db"),
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
            summary_table: constants::SUMMARY_TABLE.to_string(),
            extensions: constants::default_extensions(),
            record_runs: true,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or from `vendor_etl.toml` in the
    /// working directory when no path is given. An explicit path must exist;
    /// the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !config_path.exists() {
            if required {
                return Err(EtlError::Config(format!(
                    "Config file '{}' does not exist",
                    config_path.display()
                )));
            }
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(&config_path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&config_content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Applies `VENDOR_ETL_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty(constants::DATABASE_ENV) {
            self.database = PathBuf::from(v);
        }
        if let Some(v) = non_empty(constants::DATA_DIR_ENV) {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty(constants::LOG_DIR_ENV) {
            self.log_dir = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.summary_table.trim().is_empty() {
            return Err(EtlError::Config("summary_table must not be empty".to_string()));
        }
        if self.summary_table.eq_ignore_ascii_case(constants::RUNS_TABLE) {
            return Err(EtlError::Config(format!(
                "summary_table must not be the run ledger table '{}'",
                constants::RUNS_TABLE
            )));
        }
        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(EtlError::Config(
                "at least one file extension must be configured".to_string(),
            ));
        }
        Ok(())
    }
}
