//! Live progress rendering for a running batch.
//!
//! Shows a capped-height list of in-flight collection descriptions plus a
//! single aggregate bar over all documents in the batch. Output is cleared
//! on exit no matter how the run ended; indicatif suppresses drawing when
//! stderr is not a terminal.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio_util::sync::CancellationToken;

use super::pending::PendingSet;
use super::runner::IngestTask;

/// Periodic renderer over the runner's shared state.
pub struct ProgressReporter {
    tasks: Arc<Vec<Arc<dyn IngestTask>>>,
    pending: Arc<PendingSet>,
    tick: Duration,
    max_rows: usize,
    draw_target: ProgressDrawTarget,
}

impl ProgressReporter {
    /// Create a reporter rendering to stderr.
    pub fn new(
        tasks: Arc<Vec<Arc<dyn IngestTask>>>,
        pending: Arc<PendingSet>,
        tick: Duration,
        max_rows: usize,
    ) -> Self {
        Self {
            tasks,
            pending,
            tick,
            max_rows,
            draw_target: ProgressDrawTarget::stderr(),
        }
    }

    /// Replace the draw target (hidden target in tests).
    pub fn with_draw_target(mut self, target: ProgressDrawTarget) -> Self {
        self.draw_target = target;
        self
    }

    /// Render until the token fires, then clear all output.
    pub async fn run(mut self, cancel: CancellationToken) {
        let draw_target =
            std::mem::replace(&mut self.draw_target, ProgressDrawTarget::hidden());
        let multi = MultiProgress::with_draw_target(draw_target);

        let rows: Vec<ProgressBar> = (0..self.max_rows)
            .map(|_| {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(
                    ProgressStyle::with_template("  {msg}").expect("static progress template"),
                );
                bar
            })
            .collect();

        let aggregate = multi.add(ProgressBar::new(0));
        aggregate.set_style(
            ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} documents")
                .expect("static progress template"),
        );

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.render(&rows, &aggregate),
            }
        }

        for bar in &rows {
            bar.finish_and_clear();
        }
        aggregate.finish_and_clear();
    }

    fn render(&self, rows: &[ProgressBar], aggregate: &ProgressBar) {
        let in_flight = self.pending.keys();
        let visible = visible_rows(&in_flight, self.max_rows);
        let overflow = in_flight.len().saturating_sub(visible.len());

        for (slot, bar) in rows.iter().enumerate() {
            let message = match visible.get(slot) {
                Some(&idx) => {
                    if overflow > 0 && slot == rows.len() - 1 {
                        format!("{} (+{} more)", self.tasks[idx].describe(), overflow)
                    } else {
                        self.tasks[idx].describe()
                    }
                }
                None => String::new(),
            };
            bar.set_message(message);
            bar.tick();
        }

        let (finished, total) = aggregate_progress(&self.tasks);
        aggregate.set_length(total as u64);
        aggregate.set_position(finished as u64);
    }
}

/// Which in-flight indices fit on screen: lowest indices first.
fn visible_rows(in_flight: &[usize], max_rows: usize) -> &[usize] {
    &in_flight[..in_flight.len().min(max_rows)]
}

/// Sum of (finished, total) across ALL tasks, not just in-flight ones.
fn aggregate_progress(tasks: &[Arc<dyn IngestTask>]) -> (usize, usize) {
    tasks.iter().fold((0, 0), |(finished, total), task| {
        (finished + task.finished(), total + task.total())
    })
}
