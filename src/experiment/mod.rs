//! Job queue and experiment execution.
//!
//! - `job`: queue entries, their actions and runtime estimates
//! - `queue`: the editable job list
//! - `sweep`: the angle sweep action
//! - `runner`: sequential queue execution
//! - `observer`: progress hooks for the display

pub mod job;
pub mod observer;
pub mod queue;
pub mod runner;
pub mod sweep;

pub use job::{DurationEstimator, Job, JobAction};
pub use observer::{LogObserver, RunObserver};
pub use queue::JobQueue;
pub use runner::{QueueRunner, RunSummary, EMPTY_QUEUE_MESSAGE};
pub use sweep::{execute_sweep, StageGeometry, SweepOutcome, SweepParams, SweepRow};
