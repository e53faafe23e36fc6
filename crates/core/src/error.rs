//! Errors produced by the ingestion core.

use thiserror::Error;

/// Errors that can occur while driving a batch ingest.
///
/// Payloads are plain strings so the error stays `Clone`; a single error
/// instance is broadcast to every outstanding waiter during a flush.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    /// The run's cancellation token fired. Expected during shutdown and
    /// never reported as the run's outcome unless nothing worse happened.
    #[error("operation cancelled")]
    Cancelled,

    /// Submitting a document to the index service failed.
    #[error("submission failed for {collection}/{document}: {reason}")]
    SubmissionFailed {
        collection: String,
        document: String,
        reason: String,
    },

    /// The index service reported a terminal errored state for an upload.
    #[error("processing failed for {collection}/{document}")]
    ProcessingFailed {
        collection: String,
        document: String,
    },

    /// The batched status query failed. Fatal to the whole run.
    #[error("status query failed: {0}")]
    StatusQueryFailed(String),

    /// A document was registered twice for the same collection.
    #[error("duplicate document registration: {collection}/{document}")]
    DuplicateDocument {
        collection: String,
        document: String,
    },

    /// Invariant violation inside the orchestrator.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// True for errors that are shutdown noise rather than a run failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IngestError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestError::SubmissionFailed {
            collection: "docs".to_string(),
            document: "intro.md".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "submission failed for docs/intro.md: connection refused"
        );

        let err = IngestError::ProcessingFailed {
            collection: "docs".to_string(),
            document: "intro.md".to_string(),
        };
        assert_eq!(err.to_string(), "processing failed for docs/intro.md");
    }

    #[test]
    fn test_is_cancelled() {
        assert!(IngestError::Cancelled.is_cancelled());
        assert!(!IngestError::StatusQueryFailed("boom".into()).is_cancelled());
    }

    #[test]
    fn test_clone_for_broadcast() {
        let err = IngestError::StatusQueryFailed("HTTP 502".into());
        assert_eq!(err.clone(), err);
    }
}
