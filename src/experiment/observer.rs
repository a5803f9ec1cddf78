//! Progress reporting for queue runs.
//!
//! The runner and the sweep report through [`RunObserver`]; the console renders
//! the events, [`LogObserver`] turns them into tracing events.

use crate::experiment::job::Job;
use crate::experiment::queue::JobQueue;
use crate::experiment::sweep::{SweepOutcome, SweepParams, SweepRow};
use std::path::Path;

/// Display hooks invoked while the queue runs
///
/// Everything except `acknowledge` defaults to doing nothing.
pub trait RunObserver: Send {
    /// The queue contents or estimates changed
    fn queue_changed(&mut self, _queue: &JobQueue) {}

    /// A job is about to execute
    fn job_started(&mut self, _index: usize, _job: &Job) {}

    /// A sweep chose its output file and is about to take the first sample
    fn sweep_started(&mut self, _params: &SweepParams, _path: &Path) {}

    /// A sweep measured one point
    fn sweep_point(&mut self, _row: &SweepRow) {}

    /// A sweep wrote its file
    fn sweep_finished(&mut self, _outcome: &SweepOutcome) {}

    /// Notify the operator that the run did nothing
    ///
    /// Called instead of every other hook when the queue is empty. The runner
    /// does not block on it.
    fn acknowledge(&mut self, message: &str);
}

/// Observer that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn queue_changed(&mut self, queue: &JobQueue) {
        tracing::debug!(
            jobs = queue.len(),
            remaining_minutes = queue.total_remaining_minutes(),
            "Queue updated"
        );
    }

    fn job_started(&mut self, index: usize, job: &Job) {
        tracing::info!(index, "Running: {}", job.name);
    }

    fn sweep_finished(&mut self, outcome: &SweepOutcome) {
        tracing::info!(
            rows = outcome.rows.len(),
            started_at = %outcome.started_at.to_rfc3339(),
            "Sweep saved to '{}'",
            outcome.path.display()
        );
    }

    fn acknowledge(&mut self, message: &str) {
        tracing::warn!("{message}");
    }
}
