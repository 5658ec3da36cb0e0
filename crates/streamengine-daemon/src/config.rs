//! Daemon configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use streamengine_core::{EngineConfig, PipelineConfig, SinkConfig};
use tracing::info;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Capture branch and teardown settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Render backend selection
    #[serde(default)]
    pub sinks: SinkConfig,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,
    /// Socket path (optional, uses the runtime directory if not set)
    pub socket_path: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { log_level: default_log_level(), json_logs: false, socket_path: None }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Engine settings with environment overrides applied.
    pub fn engine(&self) -> EngineConfig {
        let mut engine = EngineConfig { pipeline: self.pipeline.clone(), sinks: self.sinks.clone() };
        engine.apply_env(|name| std::env::var(name).ok());
        engine
    }
}

/// Load configuration from file or defaults.
pub fn load_config() -> Result<Config> {
    load_from(&config_path()?)
}

/// Load configuration from `config_path`, falling back to defaults when it
/// does not exist.
pub fn load_from(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Failed to parse config file: {config_path:?}"))?;
        Ok(config)
    } else {
        info!(?config_path, "Config file not found, using defaults");
        Ok(Config::default())
    }
}

/// Get the configuration file path.
fn config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("org", "streamengine", "StreamEngine").context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}
