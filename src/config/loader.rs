// src/config/loader.rs

//! Reads the master TOML config and converts string-typed fields.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::types::{ConfigError, MasterConfig};

/// Load and parse the master configuration from `path`.
pub fn load_master_config(path: &Path) -> Result<MasterConfig, ConfigError> {
    let text = fs::read_to_string(path)?;
    let cfg: MasterConfig = toml::from_str(&text)?;
    log::debug!(
        "loaded config from {:?}: {} source(s), {} rule locator(s)",
        path,
        cfg.sources.len(),
        cfg.rules.paths.len()
    );
    Ok(cfg)
}

/// Parse a humantime interval string like `"60s"` or `"5m"`.
pub fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw).map_err(|e| ConfigError::InvalidDuration(raw.to_owned(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_parsing() {
        assert_eq!(parse_interval("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_interval("5m").unwrap(), Duration::from_secs(300));
        assert!(matches!(
            parse_interval("sixty seconds or so"),
            Err(ConfigError::InvalidDuration(_, _))
        ));
    }
}
