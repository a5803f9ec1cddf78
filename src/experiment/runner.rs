//! QueueRunner for executing the job queue.
//!
//! The runner walks the queue once, in index order, awaiting each job before
//! starting the next. After every job its estimate is zeroed and the display is
//! refreshed; after the last job the queue is cleared.
//!
//! An error from a job aborts the run and is returned. Jobs that already ran keep
//! their zero estimate, and the failed job and everything after it stay queued.

use crate::error::{AppResult, DaqError};
use crate::experiment::job::JobAction;
use crate::experiment::observer::RunObserver;
use crate::experiment::queue::JobQueue;
use crate::experiment::sweep::{execute_sweep, StageGeometry, SweepOutcome};
use crate::hardware::connection::InstrumentSet;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info};

/// Prompt shown when a run is requested on an empty queue
pub const EMPTY_QUEUE_MESSAGE: &str = "The queue is empty. First add some jobs!";

/// Summary of a completed run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Number of jobs executed
    pub jobs_run: usize,
    /// Outcomes of the sweeps, in execution order
    pub sweeps: Vec<SweepOutcome>,
    /// Wall-clock time of the run
    pub elapsed: Duration,
}

/// Sequential executor of a [`JobQueue`]
///
/// # Example
///
/// ```rust,ignore
/// let runner = QueueRunner::new(instruments, StageGeometry::from(&config.stage));
/// let summary = runner.run(&mut queue, &mut LogObserver).await?;
/// println!("{} jobs, {} files", summary.jobs_run, summary.sweeps.len());
/// ```
pub struct QueueRunner {
    instruments: InstrumentSet,
    geometry: StageGeometry,
}

impl QueueRunner {
    /// Create a runner driving `instruments`
    pub fn new(instruments: InstrumentSet, geometry: StageGeometry) -> Self {
        Self {
            instruments,
            geometry,
        }
    }

    /// Execute every queued job, then clear the queue
    ///
    /// An empty queue only raises the acknowledgement prompt.
    pub async fn run(
        &self,
        queue: &mut JobQueue,
        observer: &mut dyn RunObserver,
    ) -> AppResult<RunSummary> {
        if queue.is_empty() {
            observer.acknowledge(EMPTY_QUEUE_MESSAGE);
            return Ok(RunSummary::default());
        }

        let started = Instant::now();
        let mut summary = RunSummary::default();

        for index in 0..queue.len() {
            let Some(job) = queue.get(index).cloned() else {
                break;
            };
            observer.job_started(index, &job);

            match self.execute(&job.action, observer).await {
                Ok(Some(outcome)) => summary.sweeps.push(outcome),
                Ok(None) => {}
                Err(e) => {
                    error!(index, job = %job.name, "Job failed, aborting run: {e}");
                    return Err(e);
                }
            }

            queue.mark_done(index);
            summary.jobs_run += 1;
            observer.queue_changed(queue);
        }

        summary.elapsed = started.elapsed();
        info!(
            jobs = summary.jobs_run,
            elapsed_s = summary.elapsed.as_secs_f64(),
            "Queue finished!"
        );
        queue.clear();
        observer.queue_changed(queue);
        Ok(summary)
    }

    async fn execute(
        &self,
        action: &JobAction,
        observer: &mut dyn RunObserver,
    ) -> AppResult<Option<SweepOutcome>> {
        match action {
            JobAction::Sweep(params) => {
                let outcome = execute_sweep(
                    params,
                    self.instruments.stage.as_ref(),
                    self.instruments.meter.as_ref(),
                    self.geometry,
                    observer,
                )
                .await?;
                Ok(Some(outcome))
            }
            JobAction::Wait { seconds } => {
                let duration = Duration::try_from_secs_f64(*seconds)
                    .map_err(|_| DaqError::InvalidWait(*seconds))?;
                info!("Waiting {} s", seconds);
                sleep(duration).await;
                Ok(None)
            }
        }
    }
}
