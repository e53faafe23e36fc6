//! Completion signals for outstanding uploads and catalog settles.
//!
//! Owns one one-shot signal per outstanding document and one state stream
//! per collection catalog. The status watcher is the only writer; each
//! collection task is the only consumer of its own signals. `flush`
//! broadcasts a final signal to everything still outstanding so no waiter
//! can block past shutdown.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};

use crate::error::IngestError;

/// Identity of a document within the run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    pub collection: String,
    pub document: String,
}

impl DocumentKey {
    pub fn new(collection: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            document: document.into(),
        }
    }
}

/// A submitted document awaiting its terminal state.
#[derive(Debug, Clone)]
pub struct DocumentHandle {
    pub collection: String,
    pub document: String,
    /// Service-assigned id used in batched status queries.
    pub upload_id: String,
}

impl DocumentHandle {
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(&self.collection, &self.document)
    }
}

/// Terminal outcome of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOutcome {
    Completed,
    Errored,
}

/// Latest known state of a collection's derived catalog.
#[derive(Debug, Clone)]
pub struct CatalogState {
    /// True while the catalog has not absorbed recently completed uploads.
    pub stale: bool,
    /// Carried error, set only on a flush-terminated stream.
    pub error: Option<IngestError>,
}

/// Receiver for exactly one document's completion signal.
pub struct DocumentWaiter {
    key: DocumentKey,
    rx: oneshot::Receiver<Option<IngestError>>,
}

impl DocumentWaiter {
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// Resolve once the watcher observes a terminal state or the registry
    /// is flushed. A sender dropped without a signal reads as `Cancelled`.
    pub async fn wait(self) -> Option<IngestError> {
        match self.rx.await {
            Ok(signal) => signal,
            Err(_) => Some(IngestError::Cancelled),
        }
    }
}

/// Single consumer of one collection's catalog state stream.
pub struct CatalogWatch {
    rx: mpsc::UnboundedReceiver<CatalogState>,
}

impl CatalogWatch {
    /// Non-blocking phase of the two-phase read: drain everything already
    /// buffered and keep only the newest state.
    pub fn drain_latest(&mut self) -> Option<CatalogState> {
        let mut latest = None;
        while let Ok(state) = self.rx.try_recv() {
            latest = Some(state);
        }
        latest
    }

    /// Blocking phase: wait for the next state. `None` means the stream
    /// closed (registry flushed) without a further value.
    pub async fn next(&mut self) -> Option<CatalogState> {
        self.rx.recv().await
    }
}

struct CatalogEntry {
    tx: mpsc::UnboundedSender<CatalogState>,
    /// Held until the collection task claims the stream.
    rx: Option<mpsc::UnboundedReceiver<CatalogState>>,
}

impl CatalogEntry {
    fn new() -> Self {
        // Unbounded so catalog pushes can never block the status watcher.
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

#[derive(Default)]
struct RegistryInner {
    items: HashMap<DocumentKey, oneshot::Sender<Option<IngestError>>>,
    catalogs: HashMap<String, CatalogEntry>,
    closed: bool,
}

/// Registry of all outstanding completion signals for one run.
#[derive(Default)]
pub struct CompletionRegistry {
    inner: Mutex<RegistryInner>,
}

impl CompletionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a fresh one-shot signal for a document.
    pub fn register_document(
        &self,
        collection: &str,
        document: &str,
    ) -> Result<DocumentWaiter, IngestError> {
        let mut inner = self.inner.lock().expect("registry poisoned");
        if inner.closed {
            return Err(IngestError::Cancelled);
        }

        let key = DocumentKey::new(collection, document);
        if inner.items.contains_key(&key) {
            return Err(IngestError::DuplicateDocument {
                collection: collection.to_string(),
                document: document.to_string(),
            });
        }

        let (tx, rx) = oneshot::channel();
        inner.items.insert(key.clone(), tx);
        Ok(DocumentWaiter { key, rx })
    }

    /// Claim the single consumer end of a collection's catalog stream,
    /// creating the stream lazily if the watcher has not touched it yet.
    pub fn watch_catalog(&self, collection: &str) -> Result<CatalogWatch, IngestError> {
        let mut inner = self.inner.lock().expect("registry poisoned");
        if inner.closed {
            // Hand out an already-terminated stream; the waiter observes
            // closure instead of blocking on a flushed registry.
            let (_tx, rx) = mpsc::unbounded_channel();
            return Ok(CatalogWatch { rx });
        }

        let entry = inner
            .catalogs
            .entry(collection.to_string())
            .or_insert_with(CatalogEntry::new);
        match entry.rx.take() {
            Some(rx) => Ok(CatalogWatch { rx }),
            None => Err(IngestError::Internal(format!(
                "catalog stream for {collection} already claimed"
            ))),
        }
    }

    /// Signal and retire document entries that reached a terminal state.
    /// Entries already retired (for example by a flush) are ignored.
    pub fn resolve_documents(&self, outcomes: &[(DocumentKey, DocumentOutcome)]) {
        let mut inner = self.inner.lock().expect("registry poisoned");
        if inner.closed {
            return;
        }

        for (key, outcome) in outcomes {
            if let Some(tx) = inner.items.remove(key) {
                let signal = match outcome {
                    DocumentOutcome::Completed => None,
                    DocumentOutcome::Errored => Some(IngestError::ProcessingFailed {
                        collection: key.collection.clone(),
                        document: key.document.clone(),
                    }),
                };
                // The waiter may already have been dropped by an unwinding
                // task; a failed send is not an error.
                let _ = tx.send(signal);
            }
        }
    }

    /// Push the reported staleness of each named catalog into its stream,
    /// creating streams lazily so a waiter arriving later still sees the
    /// buffered value.
    pub fn resolve_catalogs(&self, stale_by: &HashMap<String, bool>) {
        let mut inner = self.inner.lock().expect("registry poisoned");
        if inner.closed {
            return;
        }

        for (collection, stale) in stale_by {
            let entry = inner
                .catalogs
                .entry(collection.clone())
                .or_insert_with(CatalogEntry::new);
            let _ = entry.tx.send(CatalogState {
                stale: *stale,
                error: None,
            });
        }
    }

    /// Broadcast a final signal to every outstanding entry and close the
    /// registry. Safe to call more than once; later calls are no-ops.
    pub fn flush(&self, err: Option<IngestError>) {
        let mut inner = self.inner.lock().expect("registry poisoned");
        if inner.closed {
            return;
        }
        inner.closed = true;

        for (_, tx) in inner.items.drain() {
            let _ = tx.send(err.clone());
        }
        for (_, entry) in inner.catalogs.drain() {
            let _ = entry.tx.send(CatalogState {
                stale: false,
                error: err.clone(),
            });
            // Dropping the sender here closes the stream after the
            // terminal value.
        }
    }

    /// Number of documents still awaiting a signal.
    pub fn outstanding_documents(&self) -> usize {
        self.inner.lock().expect("registry poisoned").items.len()
    }

    /// Whether `flush` has run.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("registry poisoned").closed
    }
}
