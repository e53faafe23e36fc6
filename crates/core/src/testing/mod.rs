//! Testing utilities and mock implementations for integration tests.
//!
//! Provides a scriptable mock of the `IndexClient` trait so the whole
//! orchestration stack can be exercised without a real index service.

mod mock_index_client;

pub use mock_index_client::{MockIndexClient, RecordedStatusQuery, RecordedSubmission};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::HashMap;

    use crate::index_client::{BatchStatus, UploadState};

    /// Build a batched status response from literal slices.
    pub fn batch_status(
        documents: &[(&str, UploadState)],
        catalogs: &[(&str, bool)],
    ) -> BatchStatus {
        BatchStatus {
            documents: documents
                .iter()
                .map(|(id, state)| (id.to_string(), *state))
                .collect(),
            catalogs: catalogs
                .iter()
                .map(|(name, stale)| (name.to_string(), *stale))
                .collect(),
        }
    }

    /// Build a staleness map for registry-level tests.
    pub fn stale_map(pairs: &[(&str, bool)]) -> HashMap<String, bool> {
        pairs
            .iter()
            .map(|(name, stale)| (name.to_string(), *stale))
            .collect()
    }
}
