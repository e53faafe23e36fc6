//! HTTP index client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::IndexServiceConfig;

use super::{BatchStatus, IndexClient, IndexClientError};

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    upload_id: String,
}

#[derive(Debug, Serialize)]
struct BatchStatusRequest<'a> {
    upload_ids: &'a [String],
    collections: &'a [String],
}

/// Index client speaking the service's JSON API over HTTP.
pub struct HttpIndexClient {
    client: Client,
    config: IndexServiceConfig,
}

impl HttpIndexClient {
    /// Create a new HTTP index client.
    pub fn new(config: IndexServiceConfig) -> Result<Self, IndexClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IndexClientError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn map_send_error(e: reqwest::Error) -> IndexClientError {
        if e.is_timeout() {
            IndexClientError::Timeout
        } else if e.is_connect() {
            IndexClientError::ConnectionFailed(e.to_string())
        } else {
            IndexClientError::ApiError(e.to_string())
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl IndexClient for HttpIndexClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit_document(
        &self,
        collection: &str,
        document: &str,
    ) -> Result<String, IndexClientError> {
        let url = format!(
            "{}/api/v1/collections/{}/documents",
            self.base_url(),
            urlencoding::encode(collection),
        );

        let response = self
            .authorize(self.client.post(&url))
            .json(&serde_json::json!({ "document": document }))
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexClientError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| IndexClientError::InvalidResponse(e.to_string()))?;

        debug!(
            collection,
            document,
            upload_id = %parsed.upload_id,
            "document submitted"
        );
        Ok(parsed.upload_id)
    }

    async fn batch_status(
        &self,
        upload_ids: &[String],
        collections: &[String],
    ) -> Result<BatchStatus, IndexClientError> {
        let url = format!("{}/api/v1/status/batch", self.base_url());

        let response = self
            .authorize(self.client.post(&url))
            .json(&BatchStatusRequest {
                upload_ids,
                collections,
            })
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexClientError::ApiError(format!("HTTP {}", status)));
        }

        response
            .json()
            .await
            .map_err(|e| IndexClientError::InvalidResponse(e.to_string()))
    }
}
