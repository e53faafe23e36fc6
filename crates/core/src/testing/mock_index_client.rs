//! Mock index client for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::index_client::{BatchStatus, IndexClient, IndexClientError, UploadState};

/// A recorded batched status query for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedStatusQuery {
    /// Upload ids named in the query.
    pub upload_ids: Vec<String>,
    /// Collections named in the query.
    pub collections: Vec<String>,
}

/// A recorded submission for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    /// Collection the document was submitted under.
    pub collection: String,
    /// The submitted document.
    pub document: String,
    /// Upload id handed back to the caller.
    pub upload_id: String,
    /// When the submission was made.
    pub timestamp: DateTime<Utc>,
}

/// Mock implementation of the `IndexClient` trait.
///
/// Provides controllable behavior for testing:
/// - Track submissions for assertions
/// - Script batched status responses poll by poll
/// - Drive upload states and catalog staleness directly
/// - Simulate failures on either operation
///
/// # Example
///
/// ```rust,ignore
/// let client = MockIndexClient::new();
///
/// // Script one response per poll tick.
/// client.push_status_script(fixtures::batch_status(
///     &[("upload-00000001", UploadState::Completed)],
///     &[("docs", true)],
/// )).await;
///
/// // Or drive live state that every later poll reflects.
/// client.set_catalog_stale("docs", false).await;
/// ```
#[derive(Debug)]
pub struct MockIndexClient {
    /// Recorded submit_document calls.
    submissions: Arc<RwLock<Vec<RecordedSubmission>>>,
    /// Live upload states by upload id, used when no script is queued.
    upload_states: Arc<RwLock<HashMap<String, UploadState>>>,
    /// Live catalog staleness, used when no script is queued.
    catalog_stale: Arc<RwLock<HashMap<String, bool>>>,
    /// Scripted status responses consumed one per batch_status call.
    status_script: Arc<RwLock<VecDeque<BatchStatus>>>,
    /// If set, the next submit_document fails with this message.
    next_submit_error: Arc<RwLock<Option<String>>>,
    /// If set, the next batch_status fails with this message.
    next_status_error: Arc<RwLock<Option<String>>>,
    /// Recorded batch_status calls.
    status_queries: Arc<RwLock<Vec<RecordedStatusQuery>>>,
    /// Number of batch_status calls made.
    status_calls: AtomicU64,
    /// Counter for generating unique upload ids.
    upload_counter: AtomicU64,
}

impl Default for MockIndexClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIndexClient {
    /// Create a new mock index client.
    pub fn new() -> Self {
        Self {
            submissions: Arc::new(RwLock::new(Vec::new())),
            upload_states: Arc::new(RwLock::new(HashMap::new())),
            catalog_stale: Arc::new(RwLock::new(HashMap::new())),
            status_script: Arc::new(RwLock::new(VecDeque::new())),
            next_submit_error: Arc::new(RwLock::new(None)),
            next_status_error: Arc::new(RwLock::new(None)),
            status_queries: Arc::new(RwLock::new(Vec::new())),
            status_calls: AtomicU64::new(0),
            upload_counter: AtomicU64::new(0),
        }
    }

    /// Get all recorded submissions.
    pub async fn recorded_submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.read().await.clone()
    }

    /// Number of submissions made.
    pub async fn submission_count(&self) -> usize {
        self.submissions.read().await.len()
    }

    /// Upload id assigned to a recorded submission, if any.
    pub async fn upload_id_for(&self, collection: &str, document: &str) -> Option<String> {
        self.submissions
            .read()
            .await
            .iter()
            .find(|s| s.collection == collection && s.document == document)
            .map(|s| s.upload_id.clone())
    }

    /// Number of batch_status calls made so far.
    pub async fn batch_status_calls(&self) -> u64 {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// All recorded batch_status queries, in call order.
    pub async fn recorded_status_queries(&self) -> Vec<RecordedStatusQuery> {
        self.status_queries.read().await.clone()
    }

    /// Set the live state for an upload id.
    pub async fn set_upload_state(&self, upload_id: &str, state: UploadState) {
        self.upload_states
            .write()
            .await
            .insert(upload_id.to_string(), state);
    }

    /// Set the live staleness for a collection catalog.
    pub async fn set_catalog_stale(&self, collection: &str, stale: bool) {
        self.catalog_stale
            .write()
            .await
            .insert(collection.to_string(), stale);
    }

    /// Queue a scripted response; each batch_status call consumes one
    /// before falling back to live state.
    pub async fn push_status_script(&self, status: BatchStatus) {
        self.status_script.write().await.push_back(status);
    }

    /// Configure the next submit_document to fail.
    pub async fn fail_next_submit(&self, message: &str) {
        *self.next_submit_error.write().await = Some(message.to_string());
    }

    /// Configure the next batch_status to fail.
    pub async fn fail_next_batch_status(&self, message: &str) {
        *self.next_status_error.write().await = Some(message.to_string());
    }

    fn next_upload_id(&self) -> String {
        let n = self.upload_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("upload-{n:08x}")
    }
}

#[async_trait]
impl IndexClient for MockIndexClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit_document(
        &self,
        collection: &str,
        document: &str,
    ) -> Result<String, IndexClientError> {
        if let Some(message) = self.next_submit_error.write().await.take() {
            return Err(IndexClientError::ApiError(message));
        }

        let upload_id = self.next_upload_id();
        self.submissions.write().await.push(RecordedSubmission {
            collection: collection.to_string(),
            document: document.to_string(),
            upload_id: upload_id.clone(),
            timestamp: Utc::now(),
        });

        // New uploads start pending until a test drives them further.
        self.upload_states
            .write()
            .await
            .entry(upload_id.clone())
            .or_insert(UploadState::Pending);

        Ok(upload_id)
    }

    async fn batch_status(
        &self,
        upload_ids: &[String],
        collections: &[String],
    ) -> Result<BatchStatus, IndexClientError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status_queries.write().await.push(RecordedStatusQuery {
            upload_ids: upload_ids.to_vec(),
            collections: collections.to_vec(),
        });

        if let Some(message) = self.next_status_error.write().await.take() {
            return Err(IndexClientError::ApiError(message));
        }

        if let Some(scripted) = self.status_script.write().await.pop_front() {
            return Ok(scripted);
        }

        let states = self.upload_states.read().await;
        let stale = self.catalog_stale.read().await;

        let documents = upload_ids
            .iter()
            .filter_map(|id| states.get(id).map(|state| (id.clone(), *state)))
            .collect();
        let catalogs = collections
            .iter()
            .map(|name| (name.clone(), stale.get(name).copied().unwrap_or(false)))
            .collect();

        Ok(BatchStatus {
            documents,
            catalogs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_submit_records_and_assigns_ids() {
        let client = MockIndexClient::new();

        let id1 = client.submit_document("docs", "a.md").await.unwrap();
        let id2 = client.submit_document("docs", "b.md").await.unwrap();
        assert_ne!(id1, id2);

        let recorded = client.recorded_submissions().await;
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].document, "a.md");
        assert_eq!(client.upload_id_for("docs", "b.md").await, Some(id2));
    }

    #[tokio::test]
    async fn test_live_state_fallback() {
        let client = MockIndexClient::new();
        let id = client.submit_document("docs", "a.md").await.unwrap();

        client.set_upload_state(&id, UploadState::Completed).await;
        client.set_catalog_stale("docs", true).await;

        let status = client
            .batch_status(&[id.clone()], &["docs".to_string()])
            .await
            .unwrap();
        assert_eq!(status.documents.get(&id), Some(&UploadState::Completed));
        assert_eq!(status.catalogs.get("docs"), Some(&true));
    }

    #[tokio::test]
    async fn test_scripted_responses_consumed_in_order() {
        let client = MockIndexClient::new();
        client
            .push_status_script(fixtures::batch_status(&[], &[("docs", true)]))
            .await;
        client
            .push_status_script(fixtures::batch_status(&[], &[("docs", false)]))
            .await;

        let first = client.batch_status(&[], &[]).await.unwrap();
        assert_eq!(first.catalogs.get("docs"), Some(&true));

        let second = client.batch_status(&[], &[]).await.unwrap();
        assert_eq!(second.catalogs.get("docs"), Some(&false));

        assert_eq!(client.batch_status_calls().await, 2);
    }

    #[tokio::test]
    async fn test_error_injection_is_consumed() {
        let client = MockIndexClient::new();

        client.fail_next_submit("no space").await;
        assert!(client.submit_document("docs", "a.md").await.is_err());
        assert!(client.submit_document("docs", "a.md").await.is_ok());

        client.fail_next_batch_status("offline").await;
        assert!(client.batch_status(&[], &[]).await.is_err());
        assert!(client.batch_status(&[], &[]).await.is_ok());
    }
}
