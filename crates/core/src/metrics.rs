//! Prometheus metrics for the ingestion core.
//!
//! This module provides metrics for:
//! - Submissions (attempts by result)
//! - Status polling (batched queries by result)
//! - Document resolution (terminal states observed)
//! - Wait durations (document processing, catalog settling)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts};

/// Document submissions by result.
pub static SUBMISSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("granary_submissions_total", "Total document submissions"),
        &["result"], // "ok", "error"
    )
    .unwrap()
});

/// Batched status queries by result.
pub static STATUS_POLLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("granary_status_polls_total", "Total batched status queries"),
        &["result"], // "ok", "error"
    )
    .unwrap()
});

/// Documents that reached a terminal state, by state.
pub static DOCUMENTS_RESOLVED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "granary_documents_resolved_total",
            "Documents observed in a terminal state",
        ),
        &["state"], // "completed", "errored"
    )
    .unwrap()
});

/// Time from submission to observed terminal state.
pub static DOCUMENT_WAIT: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "granary_document_wait_seconds",
            "Time between submission and observed terminal state",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]),
    )
    .unwrap()
});

/// Time a collection spends waiting for its catalog to settle fresh.
pub static CATALOG_SETTLE: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "granary_catalog_settle_seconds",
            "Time between last document completion and catalog freshness",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SUBMISSIONS.clone()),
        Box::new(STATUS_POLLS.clone()),
        Box::new(DOCUMENTS_RESOLVED.clone()),
        Box::new(DOCUMENT_WAIT.clone()),
        Box::new(CATALOG_SETTLE.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register_cleanly() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
    }
}
