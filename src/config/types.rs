// src/config/types.rs

//! Configuration structures.
//!
//! Everything here mirrors the TOML master config one-to-one; conversion of
//! string fields (log levels, humantime intervals) into richer types happens
//! in `loader` or at the point of use, keeping the file format and the
//! logic-layer representation separate.

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

/// All the ways config loading can go wrong.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration '{0}': {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Top-level config as deserialized from TOML.
#[derive(Debug, Deserialize)]
pub struct MasterConfig {
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub rules: RulesConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Mirror of the `[logging]` table.
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "INFO".into()
}

/// Mirror of the `[database]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub purge_on_restart: bool,
    #[serde(default = "default_synchronous")]
    pub synchronous: String,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_synchronous() -> String {
    "NORMAL".into()
}

fn default_flush_interval_ms() -> u64 {
    250
}

fn default_batch_size() -> usize {
    500
}

/// Mirror of the `[pipeline]` table.
#[derive(Debug, Deserialize)]
pub struct PipelineConfig {
    /// Capacity of the shared event queue; 0 means unbounded.
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { event_queue_size: default_event_queue_size() }
    }
}

fn default_event_queue_size() -> usize {
    1_000
}

/// Mirror of the `[rules]` table.
#[derive(Debug, Deserialize)]
pub struct RulesConfig {
    /// Rule-source locators; each may be a concrete file or a glob pattern.
    pub paths: Vec<String>,
}

/// One `[[sources]]` entry, keyed by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Github(GithubSourceConfig),
}

/// Settings for the GitHub public-events poller.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubSourceConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub oauth: Option<String>,
    /// Poll interval as a humantime string, e.g. `"60s"`.
    #[serde(default = "default_source_interval")]
    pub interval: String,
}

fn default_source_interval() -> String {
    "60s".into()
}
