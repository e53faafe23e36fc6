pub mod config;
pub mod error;
pub mod index_client;
pub mod metrics;
pub mod orchestrator;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, IndexServiceConfig,
    IngestConfig,
};
pub use error::IngestError;
pub use index_client::{BatchStatus, HttpIndexClient, IndexClient, IndexClientError, UploadState};
pub use orchestrator::{
    BatchIngestor, CollectionSpec, IngestBatch, IngestReport, IngestTask, TaskRunner,
};
