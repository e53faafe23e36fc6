//! Types for batch ingestion runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One collection's work list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSpec {
    /// Collection name as known to the index service.
    pub name: String,
    /// Documents to submit, in submission order.
    pub documents: Vec<String>,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>, documents: Vec<String>) -> Self {
        Self {
            name: name.into(),
            documents,
        }
    }
}

/// The full work list for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestBatch {
    pub collections: Vec<CollectionSpec>,
}

impl IngestBatch {
    pub fn new(collections: Vec<CollectionSpec>) -> Self {
        Self { collections }
    }

    /// Total documents across all collections.
    pub fn document_count(&self) -> usize {
        self.collections.iter().map(|c| c.documents.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Collections processed.
    pub collections: usize,
    /// Documents submitted and verified.
    pub documents: usize,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}
