//! Batch ingestion orchestrator.
//!
//! The orchestrator drives one batch through three dependent waits:
//! - **Submission**: sequential per collection, bounded globally by the
//!   upload limiter
//! - **Processing**: one waiter per upload, resolved by the single status
//!   watcher's batched polls
//! - **Catalog settle**: per collection, re-entrant because uploads from
//!   other tasks can re-stale a catalog while a waiter is blocked on it

mod driver;
mod ingest;
mod limiter;
mod pending;
mod progress;
mod registry;
mod runner;
mod types;
mod watcher;

pub use driver::BatchIngestor;
pub use ingest::CollectionIngestTask;
pub use limiter::{UploadLimiter, UploadPermit};
pub use pending::PendingSet;
pub use progress::ProgressReporter;
pub use registry::{
    CatalogState, CatalogWatch, CompletionRegistry, DocumentHandle, DocumentKey, DocumentOutcome,
    DocumentWaiter,
};
pub use runner::{IngestTask, TaskRunner};
pub use types::{CollectionSpec, IngestBatch, IngestReport};
pub use watcher::StatusWatcher;
