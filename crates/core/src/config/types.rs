//! Configuration types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file does not exist.
    #[error("config file not found: {0}")]
    FileNotFound(String),

    /// Config file could not be parsed.
    #[error("failed to parse config: {0}")]
    ParseError(String),

    /// Config parsed but failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Index service connection settings.
    pub index: IndexServiceConfig,

    /// Ingestion behavior settings.
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Connection settings for the index service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexServiceConfig {
    /// Base URL of the index service.
    pub url: String,

    /// Optional bearer token for authenticated services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Configuration for the ingestion orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum submission calls in flight at once, across all collections.
    /// Collections themselves are not throttled; this is the only real
    /// throughput bound.
    #[serde(default = "default_submit_concurrency")]
    pub submit_concurrency: usize,

    /// How often the status watcher polls the index service (milliseconds).
    /// One batched query per poll covers everything outstanding.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How often the progress display refreshes (milliseconds).
    #[serde(default = "default_progress_tick")]
    pub progress_tick_ms: u64,

    /// Maximum in-flight collection rows rendered at once.
    #[serde(default = "default_progress_rows")]
    pub progress_max_rows: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_submit_concurrency() -> usize {
    5
}

fn default_poll_interval() -> u64 {
    500
}

fn default_progress_tick() -> u64 {
    250
}

fn default_progress_rows() -> usize {
    8
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            submit_concurrency: default_submit_concurrency(),
            poll_interval_ms: default_poll_interval(),
            progress_tick_ms: default_progress_tick(),
            progress_max_rows: default_progress_rows(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ingest_config() {
        let config = IngestConfig::default();
        assert_eq!(config.submit_concurrency, 5);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.progress_tick_ms, 250);
        assert_eq!(config.progress_max_rows, 8);
    }

    #[test]
    fn test_deserialize_minimal() {
        let toml = r#"
            [index]
            url = "http://localhost:7700"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.index.url, "http://localhost:7700");
        assert_eq!(config.index.timeout_secs, 30);
        assert!(config.index.api_token.is_none());
        assert_eq!(config.ingest.submit_concurrency, 5);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            [index]
            url = "https://index.internal"
            api_token = "secret"
            timeout_secs = 10

            [ingest]
            submit_concurrency = 3
            poll_interval_ms = 1000
            progress_tick_ms = 100
            progress_max_rows = 4
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.index.api_token.as_deref(), Some("secret"));
        assert_eq!(config.index.timeout_secs, 10);
        assert_eq!(config.ingest.submit_concurrency, 3);
        assert_eq!(config.ingest.poll_interval_ms, 1000);
        assert_eq!(config.ingest.progress_tick_ms, 100);
        assert_eq!(config.ingest.progress_max_rows, 4);
    }
}
