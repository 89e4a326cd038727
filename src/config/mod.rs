//! Configuration management for predex

pub mod schema;

pub use schema::Config;

use crate::error::{PredexError, PredexResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const STORE_FILE_NAME: &str = "predex-cache.xml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("predex")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("predex")
    }

    /// Store file used when `cache.store_path` is not set
    pub fn default_store_path() -> PathBuf {
        Self::state_dir().join(STORE_FILE_NAME)
    }

    /// Store file for `config`
    pub fn store_path(config: &Config) -> PathBuf {
        config
            .cache
            .store_path
            .clone()
            .unwrap_or_else(Self::default_store_path)
    }

    /// Load configuration, using defaults if the file does not exist
    pub fn load(&self) -> PredexResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, path: &Path) -> PredexResult<Config> {
        let content = fs::read_to_string(path)
            .map_err(|e| PredexError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| PredexError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub fn save(&self, config: &Config) -> PredexResult<()> {
        self.ensure_config_dir()?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).map_err(|e| {
            PredexError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    fn ensure_config_dir(&self) -> PredexResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| PredexError::ConfigDirCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
