//! Public API for configuration.

pub mod loader;
pub mod types;

pub use loader::{load_master_config, parse_interval};
pub use types::{ConfigError, MasterConfig};
