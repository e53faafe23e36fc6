//! Per-collection ingestion task.
//!
//! Submits a collection's documents one at a time through the shared
//! submission limiter, waits for every upload to reach a terminal state,
//! then waits for the collection's catalog to settle fresh. The catalog
//! wait always acts on the newest observed state: a catalog may flip back
//! to stale while this task is blocked, when uploads from other ticks of
//! the same collection land behind it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::IngestError;
use crate::index_client::IndexClient;
use crate::metrics;

use super::limiter::UploadLimiter;
use super::registry::{CompletionRegistry, DocumentHandle};
use super::runner::IngestTask;

/// One collection's unit of work for the task runner.
pub struct CollectionIngestTask {
    collection: String,
    documents: Vec<String>,
    client: Arc<dyn IndexClient>,
    limiter: Arc<UploadLimiter>,
    registry: Arc<CompletionRegistry>,
    watcher_tx: mpsc::Sender<DocumentHandle>,
    finished: Arc<AtomicUsize>,
}

impl CollectionIngestTask {
    pub fn new(
        collection: impl Into<String>,
        documents: Vec<String>,
        client: Arc<dyn IndexClient>,
        limiter: Arc<UploadLimiter>,
        registry: Arc<CompletionRegistry>,
        watcher_tx: mpsc::Sender<DocumentHandle>,
    ) -> Self {
        Self {
            collection: collection.into(),
            documents,
            client,
            limiter,
            registry,
            watcher_tx,
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Submit every document in list order, spawning one waiter per
    /// registered upload. A submission failure aborts the whole task;
    /// documents not yet submitted are simply never registered.
    async fn submit_all(
        &self,
        cancel: &CancellationToken,
        waiters: &mut JoinSet<()>,
        err_tx: &mpsc::Sender<IngestError>,
    ) -> Result<(), IngestError> {
        for document in &self.documents {
            let permit = self.limiter.acquire(cancel).await?;
            let upload_id = match self.client.submit_document(&self.collection, document).await {
                Ok(id) => {
                    metrics::SUBMISSIONS.with_label_values(&["ok"]).inc();
                    id
                }
                Err(err) => {
                    metrics::SUBMISSIONS.with_label_values(&["error"]).inc();
                    return Err(IngestError::SubmissionFailed {
                        collection: self.collection.clone(),
                        document: document.clone(),
                        reason: err.to_string(),
                    });
                }
            };
            // The permit bounds submission concurrency, not processing
            // time; release it as soon as the call returns.
            drop(permit);

            let waiter = self.registry.register_document(&self.collection, document)?;
            let handle = DocumentHandle {
                collection: self.collection.clone(),
                document: document.clone(),
                upload_id,
            };
            debug!(
                collection = %handle.collection,
                document = %handle.document,
                upload_id = %handle.upload_id,
                "submitted"
            );
            if self.watcher_tx.send(handle).await.is_err() {
                // The watcher is gone; the run is shutting down.
                return Err(IngestError::Cancelled);
            }

            let finished = Arc::clone(&self.finished);
            let err_tx = err_tx.clone();
            let submitted_at = Instant::now();
            waiters.spawn(async move {
                let signal = waiter.wait().await;
                finished.fetch_add(1, Ordering::SeqCst);
                metrics::DOCUMENT_WAIT.observe(submitted_at.elapsed().as_secs_f64());
                if let Some(err) = signal {
                    let _ = err_tx.send(err).await;
                }
            });
        }
        Ok(())
    }

    /// Block until the catalog's newest known state reads fresh.
    async fn settle_catalog(&self, cancel: &CancellationToken) -> Result<(), IngestError> {
        let mut watch = self.registry.watch_catalog(&self.collection)?;
        let settle_start = Instant::now();

        // Two-phase read: pick up anything already buffered, then block
        // for the next value whenever the newest state is still stale.
        let mut latest = watch.drain_latest();
        loop {
            if let Some(state) = &latest {
                if !state.stale {
                    metrics::CATALOG_SETTLE.observe(settle_start.elapsed().as_secs_f64());
                    return match &state.error {
                        Some(err) => Err(err.clone()),
                        None => Ok(()),
                    };
                }
            }
            latest = tokio::select! {
                _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                next = watch.next() => match next {
                    Some(state) => Some(state),
                    // Stream closed without a terminal value: shutdown.
                    None => return Err(IngestError::Cancelled),
                },
            };
        }
    }
}

#[async_trait]
impl IngestTask for CollectionIngestTask {
    async fn run(&self, cancel: CancellationToken) -> Result<(), IngestError> {
        if self.documents.is_empty() {
            return Ok(());
        }

        let mut waiters = JoinSet::new();
        let (err_tx, mut err_rx) = mpsc::channel::<IngestError>(self.documents.len());

        let submitted = self.submit_all(&cancel, &mut waiters, &err_tx).await;
        drop(err_tx);
        // Dropping `waiters` on the early-error path aborts the spawned
        // waiters; their registry entries are later swept up by the flush.
        submitted?;

        while let Some(joined) = waiters.join_next().await {
            if let Err(err) = joined {
                return Err(IngestError::Internal(format!("waiter panicked: {err}")));
            }
        }

        let mut cancelled = false;
        let mut first_real: Option<IngestError> = None;
        while let Ok(err) = err_rx.try_recv() {
            if err.is_cancelled() {
                cancelled = true;
            } else if first_real.is_none() {
                first_real = Some(err);
            }
        }
        if let Some(err) = first_real {
            return Err(err);
        }
        if cancelled {
            return Err(IngestError::Cancelled);
        }

        self.settle_catalog(&cancel).await
    }

    fn describe(&self) -> String {
        format!(
            "{}: {}/{} documents",
            self.collection,
            self.finished.load(Ordering::SeqCst),
            self.documents.len()
        )
    }

    fn total(&self) -> usize {
        self.documents.len()
    }

    fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::registry::DocumentOutcome;
    use crate::testing::{fixtures, MockIndexClient};
    use std::time::Duration;

    struct Rig {
        client: Arc<MockIndexClient>,
        limiter: Arc<UploadLimiter>,
        registry: Arc<CompletionRegistry>,
        watcher_rx: mpsc::Receiver<DocumentHandle>,
    }

    fn task_for(collection: &str, documents: &[&str]) -> (CollectionIngestTask, Rig) {
        let client = Arc::new(MockIndexClient::new());
        let limiter = Arc::new(UploadLimiter::new(2));
        let registry = Arc::new(CompletionRegistry::new());
        let (watcher_tx, watcher_rx) = mpsc::channel(32);

        let task = CollectionIngestTask::new(
            collection,
            documents.iter().map(|d| d.to_string()).collect(),
            Arc::clone(&client) as Arc<dyn IndexClient>,
            Arc::clone(&limiter),
            Arc::clone(&registry),
            watcher_tx,
        );
        (
            task,
            Rig {
                client,
                limiter,
                registry,
                watcher_rx,
            },
        )
    }

    #[tokio::test]
    async fn test_empty_collection_completes_without_submissions() {
        let (task, rig) = task_for("empty", &[]);
        let result = task.run(CancellationToken::new()).await;
        assert!(result.is_ok());
        assert_eq!(rig.client.submission_count().await, 0);
    }

    #[tokio::test]
    async fn test_submits_in_list_order_and_completes() {
        let (task, mut rig) = task_for("docs", &["a.md", "b.md"]);
        let registry = Arc::clone(&rig.registry);

        let driver = tokio::spawn(async move {
            // Resolve each document as its handle shows up, then settle
            // the catalog.
            for _ in 0..2 {
                let handle = rig.watcher_rx.recv().await.unwrap();
                registry.resolve_documents(&[(handle.key(), DocumentOutcome::Completed)]);
            }
            registry.resolve_catalogs(&fixtures::stale_map(&[("docs", true)]));
            registry.resolve_catalogs(&fixtures::stale_map(&[("docs", false)]));
            rig.client
        });

        let result = tokio::time::timeout(Duration::from_secs(2), task.run(CancellationToken::new()))
            .await
            .expect("task must finish");
        assert!(result.is_ok());
        assert_eq!(task.finished(), 2);

        let client = driver.await.unwrap();
        let recorded = client.recorded_submissions().await;
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].document, "a.md");
        assert_eq!(recorded[1].document, "b.md");
    }

    #[tokio::test]
    async fn test_submission_failure_returns_immediately() {
        let (task, rig) = task_for("docs", &["a.md", "b.md"]);
        rig.client.fail_next_submit("quota exceeded").await;

        let result = task.run(CancellationToken::new()).await;
        assert!(matches!(
            result.err(),
            Some(IngestError::SubmissionFailed { .. })
        ));
        // Nothing registered for the failed document, and the second
        // document was never attempted.
        assert_eq!(rig.registry.outstanding_documents(), 0);
        assert_eq!(rig.client.submission_count().await, 0);
    }

    #[tokio::test]
    async fn test_errored_document_fails_the_task() {
        let (task, mut rig) = task_for("docs", &["bad.md"]);
        let registry = Arc::clone(&rig.registry);

        let driver = tokio::spawn(async move {
            let handle = rig.watcher_rx.recv().await.unwrap();
            registry.resolve_documents(&[(handle.key(), DocumentOutcome::Errored)]);
        });

        let result = task.run(CancellationToken::new()).await;
        assert_eq!(
            result.err(),
            Some(IngestError::ProcessingFailed {
                collection: "docs".into(),
                document: "bad.md".into(),
            })
        );
        driver.await.unwrap();
    }

    #[tokio::test]
    async fn test_restaled_catalog_waits_for_final_fresh() {
        let (task, mut rig) = task_for("docs", &["a.md"]);
        let registry = Arc::clone(&rig.registry);

        let driver = tokio::spawn(async move {
            let handle = rig.watcher_rx.recv().await.unwrap();
            registry.resolve_documents(&[(handle.key(), DocumentOutcome::Completed)]);

            // stale, stale again (another upload landed), then fresh.
            registry.resolve_catalogs(&fixtures::stale_map(&[("docs", true)]));
            tokio::time::sleep(Duration::from_millis(30)).await;
            registry.resolve_catalogs(&fixtures::stale_map(&[("docs", true)]));
            tokio::time::sleep(Duration::from_millis(30)).await;
            registry.resolve_catalogs(&fixtures::stale_map(&[("docs", false)]));
            Instant::now()
        });

        let started = Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(2), task.run(CancellationToken::new()))
            .await
            .expect("task must finish");
        let run_elapsed = started.elapsed();
        assert!(result.is_ok());

        let fresh_at = driver.await.unwrap();
        // The task cannot have returned before the final fresh push.
        assert!(run_elapsed >= fresh_at.duration_since(started));
    }

    #[tokio::test]
    async fn test_cancellation_while_blocked_on_limiter() {
        let (task, rig) = task_for("docs", &["a.md"]);
        let cancel = CancellationToken::new();

        // Exhaust the limiter so the task blocks in acquire.
        let _p1 = rig.limiter.acquire(&cancel).await.unwrap();
        let _p2 = rig.limiter.acquire(&cancel).await.unwrap();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                cancel.cancel();
            })
        };

        let result = tokio::time::timeout(Duration::from_secs(1), task.run(cancel.clone()))
            .await
            .expect("cancelled task must return promptly");
        assert_eq!(result.err(), Some(IngestError::Cancelled));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_unblocks_catalog_wait() {
        let (task, mut rig) = task_for("docs", &["a.md"]);
        let registry = Arc::clone(&rig.registry);

        let driver = tokio::spawn(async move {
            let handle = rig.watcher_rx.recv().await.unwrap();
            registry.resolve_documents(&[(handle.key(), DocumentOutcome::Completed)]);
            // Leave the catalog stale, then flush as a shutdown would.
            registry.resolve_catalogs(&fixtures::stale_map(&[("docs", true)]));
            tokio::time::sleep(Duration::from_millis(30)).await;
            registry.flush(None);
        });

        let result = tokio::time::timeout(Duration::from_secs(1), task.run(CancellationToken::new()))
            .await
            .expect("flushed task must not hang");
        // Flush with no error terminates the stream with a fresh state.
        assert!(result.is_ok());
        driver.await.unwrap();
    }
}
