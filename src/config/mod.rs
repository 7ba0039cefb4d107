//! Scanner Configuration
//!
//! Parsed once at startup (defaults overlaid by an optional TOML file) and
//! immutable for the rest of the run.

pub mod error;
pub mod loader;
pub mod types;

pub use error::{ConfigError, ConfigResult};
pub use loader::{default_config_path, parse_severities};
pub use types::{Config, EngineConfig, RegistryConfig, TimeoutConfig, VulnConfig};
