//! Bounded-parallelism task runner.
//!
//! Drives a fixed list of independent ingest tasks, captures the first
//! real error, cancels the remaining work, and always joins its workers
//! before returning. Cancellation errors reported by tasks during
//! shutdown are noise, not outcomes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::IngestError;

use super::pending::PendingSet;

/// A unit of work driven by the [`TaskRunner`].
#[async_trait]
pub trait IngestTask: Send + Sync {
    /// Execute the task to completion or until the token fires.
    async fn run(&self, cancel: CancellationToken) -> Result<(), IngestError>;

    /// Human-readable one-line description for progress rendering.
    fn describe(&self) -> String;

    /// Total number of work units in this task.
    fn total(&self) -> usize;

    /// Work units finished so far.
    fn finished(&self) -> usize;
}

/// Runs a fixed set of tasks with bounded parallelism.
pub struct TaskRunner {
    tasks: Arc<Vec<Arc<dyn IngestTask>>>,
    pending: Arc<PendingSet>,
}

impl TaskRunner {
    /// Create a runner over the given tasks.
    ///
    /// `pending` is shared with the progress reporter so it can render
    /// which tasks are currently executing.
    pub fn new(tasks: Arc<Vec<Arc<dyn IngestTask>>>, pending: Arc<PendingSet>) -> Self {
        Self { tasks, pending }
    }

    /// Run every task and return the first real error, if any.
    ///
    /// On the first non-cancellation error the shared token is cancelled
    /// so in-flight tasks unwind; their `Cancelled` results are consumed
    /// as shutdown noise. Returns `Cancelled` only when the token fired
    /// and no real error was observed.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        concurrency: usize,
    ) -> Result<(), IngestError> {
        let total = self.tasks.len();
        if total == 0 {
            return Ok(());
        }
        let concurrency = concurrency.max(1).min(total);

        let queue: Arc<Mutex<VecDeque<usize>>> = Arc::new(Mutex::new((0..total).collect()));
        // Sized to the task count so no worker ever blocks on a full
        // results buffer.
        let (results_tx, mut results_rx) = mpsc::channel::<(usize, Result<(), IngestError>)>(total);

        let mut workers = JoinSet::new();
        for _ in 0..concurrency {
            let queue = Arc::clone(&queue);
            let tasks = Arc::clone(&self.tasks);
            let pending = Arc::clone(&self.pending);
            let results_tx = results_tx.clone();
            let cancel = cancel.clone();

            workers.spawn(async move {
                loop {
                    let idx = {
                        let mut queue = queue.lock().expect("task queue poisoned");
                        queue.pop_front()
                    };
                    let Some(idx) = idx else {
                        break;
                    };

                    // A cancelled run still owes the monitor one result
                    // per dequeued task.
                    let result = if cancel.is_cancelled() {
                        Err(IngestError::Cancelled)
                    } else {
                        pending.insert(idx);
                        let result = tasks[idx].run(cancel.clone()).await;
                        pending.remove(idx);
                        result
                    };

                    if results_tx.send((idx, result)).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(results_tx);

        let mut first_err: Option<IngestError> = None;
        let mut completed = 0usize;
        while completed < total {
            let Some((idx, result)) = results_rx.recv().await else {
                break;
            };
            completed += 1;
            match result {
                Ok(()) => {
                    debug!(task = idx, "task completed");
                }
                Err(err) if err.is_cancelled() => {
                    debug!(task = idx, "task cancelled during shutdown");
                }
                Err(err) => {
                    if first_err.is_none() {
                        warn!(task = idx, error = %err, "task failed, cancelling run");
                        first_err = Some(err);
                        cancel.cancel();
                    } else {
                        warn!(task = idx, error = %err, "additional task failure after shutdown began");
                    }
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                if first_err.is_none() {
                    first_err = Some(IngestError::Internal(format!("worker panicked: {err}")));
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None if cancel.is_cancelled() => Err(IngestError::Cancelled),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scriptable task for runner tests.
    struct TestTask {
        label: String,
        delay: Duration,
        fail: Option<IngestError>,
        started: AtomicUsize,
        running: Arc<AtomicUsize>,
        max_running: Arc<AtomicUsize>,
    }

    impl TestTask {
        fn ok(label: &str, delay_ms: u64) -> Self {
            Self::new(label, delay_ms, None)
        }

        fn failing(label: &str, delay_ms: u64, err: IngestError) -> Self {
            Self::new(label, delay_ms, Some(err))
        }

        fn new(label: &str, delay_ms: u64, fail: Option<IngestError>) -> Self {
            Self {
                label: label.to_string(),
                delay: Duration::from_millis(delay_ms),
                fail,
                started: AtomicUsize::new(0),
                running: Arc::new(AtomicUsize::new(0)),
                max_running: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl IngestTask for TestTask {
        async fn run(&self, cancel: CancellationToken) -> Result<(), IngestError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);

            let result = tokio::select! {
                _ = cancel.cancelled() => Err(IngestError::Cancelled),
                _ = tokio::time::sleep(self.delay) => match &self.fail {
                    Some(err) => Err(err.clone()),
                    None => Ok(()),
                },
            };

            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn describe(&self) -> String {
            self.label.clone()
        }

        fn total(&self) -> usize {
            1
        }

        fn finished(&self) -> usize {
            0
        }
    }

    fn runner_for(tasks: Vec<Arc<dyn IngestTask>>) -> TaskRunner {
        TaskRunner::new(Arc::new(tasks), Arc::new(PendingSet::new()))
    }

    #[tokio::test]
    async fn test_all_tasks_succeed() {
        let tasks: Vec<Arc<dyn IngestTask>> = (0..6)
            .map(|i| Arc::new(TestTask::ok(&format!("t{i}"), 10)) as Arc<dyn IngestTask>)
            .collect();
        let runner = runner_for(tasks);
        let cancel = CancellationToken::new();

        assert!(runner.run(&cancel, 3).await.is_ok());
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let runner = runner_for(vec![]);
        assert!(runner.run(&CancellationToken::new(), 4).await.is_ok());
    }

    #[tokio::test]
    async fn test_first_error_cancels_remaining() {
        let err = IngestError::ProcessingFailed {
            collection: "docs".into(),
            document: "a.md".into(),
        };
        let slow = Arc::new(TestTask::ok("slow", 10_000));
        let tasks: Vec<Arc<dyn IngestTask>> = vec![
            Arc::new(TestTask::failing("bad", 20, err.clone())),
            Arc::clone(&slow) as Arc<dyn IngestTask>,
        ];
        let runner = runner_for(tasks);
        let cancel = CancellationToken::new();

        let result = tokio::time::timeout(Duration::from_secs(2), runner.run(&cancel, 2))
            .await
            .expect("run must return promptly after first error");
        assert_eq!(result.err(), Some(err));
        assert!(cancel.is_cancelled());
        // The slow task must have been started and then unwound.
        assert_eq!(slow.started.load(Ordering::SeqCst), 1);
        assert_eq!(slow.running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_results_do_not_override_real_error() {
        let err = IngestError::StatusQueryFailed("boom".into());
        let tasks: Vec<Arc<dyn IngestTask>> = vec![
            Arc::new(TestTask::failing("bad", 10, err.clone())),
            Arc::new(TestTask::ok("a", 5_000)),
            Arc::new(TestTask::ok("b", 5_000)),
        ];
        let runner = runner_for(tasks);

        let result = runner.run(&CancellationToken::new(), 3).await;
        assert_eq!(result.err(), Some(err));
    }

    #[tokio::test]
    async fn test_external_cancellation_returns_cancelled() {
        let tasks: Vec<Arc<dyn IngestTask>> =
            vec![Arc::new(TestTask::ok("long", 10_000)), Arc::new(TestTask::ok("other", 10_000))];
        let runner = runner_for(tasks);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        let result = tokio::time::timeout(Duration::from_secs(2), runner.run(&cancel, 2))
            .await
            .expect("cancelled run must return within bounded time");
        assert_eq!(result.err(), Some(IngestError::Cancelled));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrency_bound_respected() {
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<Arc<dyn IngestTask>> = (0..10)
            .map(|i| {
                let mut task = TestTask::ok(&format!("t{i}"), 30);
                task.running = Arc::clone(&running);
                task.max_running = Arc::clone(&max_running);
                Arc::new(task) as Arc<dyn IngestTask>
            })
            .collect();
        let runner = runner_for(tasks);

        runner.run(&CancellationToken::new(), 3).await.unwrap();
        assert!(max_running.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_pending_set_empty_after_run() {
        let pending = Arc::new(PendingSet::new());
        let tasks: Vec<Arc<dyn IngestTask>> = (0..4)
            .map(|i| Arc::new(TestTask::ok(&format!("t{i}"), 10)) as Arc<dyn IngestTask>)
            .collect();
        let runner = TaskRunner::new(Arc::new(tasks), Arc::clone(&pending));

        runner.run(&CancellationToken::new(), 2).await.unwrap();
        assert!(pending.is_empty());
    }
}
