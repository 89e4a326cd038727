//! Configuration schema for predex
//!
//! Configuration is stored at `~/.config/predex/config.toml`

use crate::cache::key::Revision;
use crate::dex::options::{BuildToolInfo, DexOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Pre-dex cache settings
    pub cache: CacheConfig,

    /// Build-tools installation
    pub build_tools: BuildToolsConfig,

    /// Options passed to dx
    pub dex: DexOptions,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Reuse pre-dexed output across builds (default: true)
    pub enabled: bool,

    /// Store file location; the state directory is used when unset
    pub store_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store_path: None,
        }
    }
}

/// Build-tools configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildToolsConfig {
    /// Revision recorded in cache keys, e.g. "23.0.1" or "24.0.0 rc2"
    pub revision: Revision,

    /// dx launcher; looked up on PATH when not absolute
    pub dx_path: PathBuf,
}

impl Default for BuildToolsConfig {
    fn default() -> Self {
        Self {
            revision: Revision::new(23, 0, 1),
            dx_path: PathBuf::from("dx"),
        }
    }
}

impl BuildToolsConfig {
    pub fn tool_info(&self) -> BuildToolInfo {
        BuildToolInfo::new(self.revision, self.dx_path.clone())
    }
}
