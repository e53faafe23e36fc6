//! Types for index service operations.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during index client operations.
#[derive(Debug, Error)]
pub enum IndexClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// State of a submitted upload as reported by the index service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    /// Still queued or being processed.
    Pending,
    /// Fully processed and visible to the index.
    Completed,
    /// Processing reached a terminal failure.
    Errored,
}

impl UploadState {
    /// Returns the string representation used in API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::Pending => "pending",
            UploadState::Completed => "completed",
            UploadState::Errored => "errored",
        }
    }

    /// True for `completed` or `errored`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadState::Pending)
    }
}

/// Result of one batched status query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStatus {
    /// Terminal-or-pending state per queried upload id. Ids the service
    /// does not know yet may be absent; absence reads as pending.
    pub documents: HashMap<String, UploadState>,
    /// Catalog staleness per queried collection. `true` means the derived
    /// search catalog has not absorbed recently completed uploads.
    pub catalogs: HashMap<String, bool>,
}

/// Client for an index service backend.
///
/// These are the only two operations the orchestration core depends on;
/// implementations choose the wire protocol. The core performs no retries.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Submit one document of a collection for ingestion. Returns the
    /// service-assigned upload id used in later status queries.
    async fn submit_document(
        &self,
        collection: &str,
        document: &str,
    ) -> Result<String, IndexClientError>;

    /// Query the state of every named upload and the staleness of every
    /// named collection catalog in a single call.
    async fn batch_status(
        &self,
        upload_ids: &[String],
        collections: &[String],
    ) -> Result<BatchStatus, IndexClientError>;
}
