//! Set of task indices currently executing.
//!
//! Written by runner workers, read by the progress reporter. Iteration
//! order is ascending so progress rows are stable across ticks.

use std::collections::BTreeSet;
use std::sync::Mutex;

/// Thread-safe ordered set of in-flight task indices.
#[derive(Debug, Default)]
pub struct PendingSet {
    inner: Mutex<BTreeSet<usize>>,
}

impl PendingSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a task index as executing.
    pub fn insert(&self, id: usize) {
        self.inner.lock().expect("pending set poisoned").insert(id);
    }

    /// Mark a task index as no longer executing.
    pub fn remove(&self, id: usize) {
        self.inner.lock().expect("pending set poisoned").remove(&id);
    }

    /// Whether the index is currently marked executing.
    pub fn contains(&self, id: usize) -> bool {
        self.inner
            .lock()
            .expect("pending set poisoned")
            .contains(&id)
    }

    /// All executing indices, ascending.
    pub fn keys(&self) -> Vec<usize> {
        self.inner
            .lock()
            .expect("pending set poisoned")
            .iter()
            .copied()
            .collect()
    }

    /// Number of executing indices.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("pending set poisoned").len()
    }

    /// True when nothing is executing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
