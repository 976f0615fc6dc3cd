//! User configuration at `~/.clientele/config.json`.
//!
//! Every field has a default, so a missing file is not an error. Keys are
//! camelCase, e.g. `{ "dbPath": "/data/clients.db", "batchSize": 1000 }`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::import::{ExistingKeyPolicy, DEFAULT_BATCH_SIZE, DEFAULT_PAGE_SIZE};
use crate::queries::list::DEFAULT_PER_PAGE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Database file. Defaults to `~/.clientele/clientele.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Page size for full-table scans (key index, group rebuild, export).
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    #[serde(default)]
    pub on_existing: ExistingKeyPolicy,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_scan_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_per_page() -> usize {
    DEFAULT_PER_PAGE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            batch_size: DEFAULT_BATCH_SIZE,
            scan_page_size: DEFAULT_PAGE_SIZE,
            per_page: DEFAULT_PER_PAGE,
            on_existing: ExistingKeyPolicy::default(),
        }
    }
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batchSize must be positive".into()));
        }
        if self.scan_page_size == 0 {
            return Err(ConfigError::Invalid("scanPageSize must be positive".into()));
        }
        if self.per_page == 0 {
            return Err(ConfigError::Invalid("perPage must be positive".into()));
        }
        Ok(())
    }
}

/// Default config location: `~/.clientele/config.json`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
    Ok(home.join(".clientele").join("config.json"))
}

/// Load the config at the default location.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&default_config_path()?)
}

/// Load config from `path`; a missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}
