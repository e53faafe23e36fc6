//! Configuration loading, types, and validation.

mod loader;
mod types;
mod validate;

pub use loader::{load_config, load_config_from_str};
pub use types::{Config, ConfigError, IndexServiceConfig, IngestConfig};
pub use validate::validate_config;
