//! Front door for running one batch.
//!
//! Wires the limiter, registry, status watcher, progress reporter, and
//! per-collection tasks together, runs them to completion, and guarantees
//! every background piece is shut down and joined before returning.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::index_client::IndexClient;

use super::ingest::CollectionIngestTask;
use super::limiter::UploadLimiter;
use super::registry::CompletionRegistry;
use super::pending::PendingSet;
use super::progress::ProgressReporter;
use super::runner::{IngestTask, TaskRunner};
use super::types::{IngestBatch, IngestReport};
use super::watcher::StatusWatcher;

/// Runs batches against one index service.
pub struct BatchIngestor {
    config: IngestConfig,
    client: Arc<dyn IndexClient>,
}

impl BatchIngestor {
    pub fn new(config: IngestConfig, client: Arc<dyn IndexClient>) -> Self {
        Self { config, client }
    }

    /// Run one batch to completion.
    ///
    /// Returns the first real error observed anywhere in the run, or
    /// `Cancelled` if the caller's token fired with nothing worse. All
    /// spawned tasks are joined before this returns.
    pub async fn run(
        &self,
        batch: IngestBatch,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, IngestError> {
        let started = Instant::now();
        let collections = batch.collections.len();
        let documents = batch.document_count();
        info!(
            backend = self.client.name(),
            collections, documents, "starting batch ingest"
        );

        let run_token = cancel.child_token();
        let limiter = Arc::new(UploadLimiter::new(self.config.submit_concurrency));
        let registry = Arc::new(CompletionRegistry::new());
        let (watcher_tx, watcher_rx) = StatusWatcher::channel(documents);

        let watcher = StatusWatcher::new(
            Arc::clone(&self.client),
            Arc::clone(&registry),
            Duration::from_millis(self.config.poll_interval_ms),
        );
        let watcher_handle = tokio::spawn(watcher.run(watcher_rx, run_token.clone()));

        let tasks: Arc<Vec<Arc<dyn IngestTask>>> = Arc::new(
            batch
                .collections
                .into_iter()
                .map(|spec| {
                    Arc::new(CollectionIngestTask::new(
                        spec.name,
                        spec.documents,
                        Arc::clone(&self.client),
                        Arc::clone(&limiter),
                        Arc::clone(&registry),
                        watcher_tx.clone(),
                    )) as Arc<dyn IngestTask>
                })
                .collect(),
        );
        drop(watcher_tx);

        let pending = Arc::new(PendingSet::new());
        let reporter = ProgressReporter::new(
            Arc::clone(&tasks),
            Arc::clone(&pending),
            Duration::from_millis(self.config.progress_tick_ms),
            self.config.progress_max_rows,
        );
        let reporter_handle = tokio::spawn(reporter.run(run_token.clone()));

        // Collection-level parallelism is unbounded; the submission
        // limiter is the only real throughput bound.
        let runner = TaskRunner::new(Arc::clone(&tasks), pending);
        let result = runner.run(&run_token, tasks.len()).await;

        // Tear down the poller and the display on every exit path.
        run_token.cancel();
        limiter.close();
        let _ = futures::future::join(watcher_handle, reporter_handle).await;

        match result {
            Ok(()) => {
                let duration = started.elapsed();
                info!(
                    collections,
                    documents,
                    duration_ms = duration.as_millis() as u64,
                    "batch ingest complete"
                );
                Ok(IngestReport {
                    collections,
                    documents,
                    duration,
                })
            }
            Err(err) => {
                warn!(error = %err, "batch ingest failed");
                Err(err)
            }
        }
    }
}
