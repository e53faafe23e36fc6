//! Single background poller distributing index service status.
//!
//! Collection tasks report each submitted document here; the watcher
//! issues one batched status query per poll tick covering every
//! outstanding upload and every watched catalog, and fans the results out
//! through the completion registry. Keeping it to one request per tick
//! makes the load on the index service independent of how many uploads
//! are in flight.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::index_client::{IndexClient, UploadState};
use crate::metrics;

use super::registry::{CompletionRegistry, DocumentHandle, DocumentOutcome};

/// The run's single status poller.
pub struct StatusWatcher {
    client: Arc<dyn IndexClient>,
    registry: Arc<CompletionRegistry>,
    poll_interval: Duration,
}

impl StatusWatcher {
    pub fn new(
        client: Arc<dyn IndexClient>,
        registry: Arc<CompletionRegistry>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            registry,
            poll_interval,
        }
    }

    /// Build the inbound handle channel shared by all collection tasks.
    pub fn channel(capacity: usize) -> (mpsc::Sender<DocumentHandle>, mpsc::Receiver<DocumentHandle>) {
        mpsc::channel(capacity.max(1))
    }

    /// Run until cancelled or until a status query fails.
    ///
    /// Exactly one registry flush happens on every exit path: `flush(None)`
    /// on cancellation, `flush(Some(StatusQueryFailed))` on a query error.
    pub async fn run(self, mut inbound: mpsc::Receiver<DocumentHandle>, cancel: CancellationToken) {
        let mut outstanding: Vec<DocumentHandle> = Vec::new();
        // Catalogs become watched once one of their uploads completes and
        // stop being watched once they report fresh.
        let mut watched_catalogs: BTreeSet<String> = BTreeSet::new();
        let mut inbound_open = true;

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("status watcher cancelled, flushing registry");
                    self.registry.flush(None);
                    return;
                }
                received = inbound.recv(), if inbound_open => match received {
                    Some(handle) => {
                        debug!(
                            collection = %handle.collection,
                            document = %handle.document,
                            upload_id = %handle.upload_id,
                            "tracking submitted document"
                        );
                        outstanding.push(handle);
                    }
                    None => inbound_open = false,
                },
                _ = ticker.tick() => {
                    if outstanding.is_empty() && watched_catalogs.is_empty() {
                        continue;
                    }
                    if let Err(err) = self.poll(&mut outstanding, &mut watched_catalogs).await {
                        warn!(error = %err, "status query failed, aborting run");
                        self.registry.flush(Some(err));
                        return;
                    }
                }
            }
        }
    }

    /// Issue one batched query and distribute the results.
    async fn poll(
        &self,
        outstanding: &mut Vec<DocumentHandle>,
        watched_catalogs: &mut BTreeSet<String>,
    ) -> Result<(), IngestError> {
        let upload_ids: Vec<String> = outstanding.iter().map(|h| h.upload_id.clone()).collect();
        let collections: Vec<String> = watched_catalogs.iter().cloned().collect();

        debug!(
            uploads = upload_ids.len(),
            catalogs = collections.len(),
            "issuing batched status query"
        );

        let status = match self.client.batch_status(&upload_ids, &collections).await {
            Ok(status) => {
                metrics::STATUS_POLLS.with_label_values(&["ok"]).inc();
                status
            }
            Err(err) => {
                metrics::STATUS_POLLS.with_label_values(&["error"]).inc();
                return Err(IngestError::StatusQueryFailed(err.to_string()));
            }
        };

        let mut outcomes = Vec::new();
        let mut still_pending = Vec::with_capacity(outstanding.len());
        for handle in outstanding.drain(..) {
            match status.documents.get(&handle.upload_id) {
                Some(UploadState::Completed) => {
                    metrics::DOCUMENTS_RESOLVED
                        .with_label_values(&["completed"])
                        .inc();
                    // A completed upload disturbs its collection's catalog.
                    watched_catalogs.insert(handle.collection.clone());
                    outcomes.push((handle.key(), DocumentOutcome::Completed));
                }
                Some(UploadState::Errored) => {
                    metrics::DOCUMENTS_RESOLVED
                        .with_label_values(&["errored"])
                        .inc();
                    outcomes.push((handle.key(), DocumentOutcome::Errored));
                }
                Some(UploadState::Pending) | None => still_pending.push(handle),
            }
        }
        *outstanding = still_pending;

        self.registry.resolve_documents(&outcomes);
        self.registry.resolve_catalogs(&status.catalogs);
        for (collection, stale) in &status.catalogs {
            if !*stale {
                watched_catalogs.remove(collection);
            }
        }
        Ok(())
    }
}
