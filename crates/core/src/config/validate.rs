use super::{Config, ConfigError};

/// Validate a loaded configuration before it is used to build a run.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.index.url.trim().is_empty() {
        return Err(ConfigError::Invalid("index.url must not be empty".into()));
    }
    if !config.index.url.starts_with("http://") && !config.index.url.starts_with("https://") {
        return Err(ConfigError::Invalid(format!(
            "index.url must be an http(s) URL, got {:?}",
            config.index.url
        )));
    }
    if config.index.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "index.timeout_secs must be greater than zero".into(),
        ));
    }
    if config.ingest.submit_concurrency == 0 {
        return Err(ConfigError::Invalid(
            "ingest.submit_concurrency must be greater than zero".into(),
        ));
    }
    if config.ingest.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid(
            "ingest.poll_interval_ms must be greater than zero".into(),
        ));
    }
    if config.ingest.progress_tick_ms == 0 {
        return Err(ConfigError::Invalid(
            "ingest.progress_tick_ms must be greater than zero".into(),
        ));
    }
    if config.ingest.progress_max_rows == 0 {
        return Err(ConfigError::Invalid(
            "ingest.progress_max_rows must be greater than zero".into(),
        ));
    }
    Ok(())
}
