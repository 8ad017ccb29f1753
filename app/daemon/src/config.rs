//! Daemon configuration loaded from TOML.

use acore::AxonConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration filename inside the config directory.
pub const CONFIG_FILE: &str = "axon.toml";
/// Data subdirectory.
pub const DATA_DIR: &str = "data";
/// SQLite channel store filename.
pub const CHANNELS_DB: &str = "channels.db";
/// SQLite job table filename.
pub const JOBS_DB: &str = "jobs.db";

/// Resolve the global configuration directory (`~/.axon/`).
/// `AXON_CONFIG_DIR` overrides it, which tests rely on.
pub fn global_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("AXON_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir().expect("no home directory").join(".axon")
}

/// Top-level daemon configuration.
#[derive(Debug, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address the gateway binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Tuning options for channels, timeouts, and the fan-out pool
    /// (`[service]` table).
    #[serde(default)]
    pub service: AxonConfig,
}

fn default_bind() -> String {
    "127.0.0.1:8090".to_owned()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            service: AxonConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Parse a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content)
    }
}

/// Scaffold the config directory on first run: the data subdirectory
/// plus a default `axon.toml`.
pub fn scaffold_config_dir(config_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(config_dir.join(DATA_DIR))
        .context("failed to create data directory")?;

    let config_path = config_dir.join(CONFIG_FILE);
    let contents = toml::to_string_pretty(&DaemonConfig::default())
        .context("failed to serialize default config")?;
    std::fs::write(&config_path, contents)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    Ok(())
}
