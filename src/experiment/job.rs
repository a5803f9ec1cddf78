//! Queue jobs and their runtime estimates.

use crate::config::SweepConfig;
use crate::error::{AppResult, DaqError};
use crate::experiment::sweep::SweepParams;
use serde::{Deserialize, Serialize};

/// What a job does when the runner reaches it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobAction {
    /// Angle sweep with CSV output
    Sweep(SweepParams),
    /// Timed pause
    Wait {
        /// Pause length (s)
        seconds: f64,
    },
}

impl JobAction {
    /// Reject parameters the runner could not execute
    pub fn validate(&self) -> AppResult<()> {
        match self {
            JobAction::Sweep(params) => params.validate(),
            JobAction::Wait { seconds } => {
                if seconds.is_finite() && *seconds >= 0.0 {
                    Ok(())
                } else {
                    Err(DaqError::InvalidWait(*seconds))
                }
            }
        }
    }

    /// Display name shown in the queue table
    pub fn display_name(&self) -> String {
        match self {
            JobAction::Sweep(p) => format!(
                "Range: [{:?}, {:?}], Step: {:?}",
                p.start_deg,
                p.stop_deg,
                round_to(p.step_deg, 3)
            ),
            JobAction::Wait { seconds } => format!("Wait: {seconds} seconds"),
        }
    }
}

/// Runtime estimation constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationEstimator {
    /// Time per sweep sample (s)
    pub seconds_per_step: f64,
    /// Fixed time added per sweep (min)
    pub positioning_overhead_minutes: f64,
}

impl Default for DurationEstimator {
    fn default() -> Self {
        Self::from(&SweepConfig::default())
    }
}

impl From<&SweepConfig> for DurationEstimator {
    fn from(config: &SweepConfig) -> Self {
        Self {
            seconds_per_step: config.seconds_per_step,
            positioning_overhead_minutes: config.positioning_overhead_minutes,
        }
    }
}

impl DurationEstimator {
    /// Estimated runtime of `action` in minutes
    pub fn estimate_minutes(&self, action: &JobAction) -> f64 {
        match action {
            JobAction::Sweep(params) => {
                params.sample_count() as f64 * self.seconds_per_step / 60.0
                    + self.positioning_overhead_minutes
            }
            JobAction::Wait { seconds } => seconds / 60.0,
        }
    }
}

/// One entry of the job queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Display name
    pub name: String,
    /// Work performed by the runner
    pub action: JobAction,
    /// Estimated runtime (min); zeroed once the job has run
    pub duration_estimate_minutes: f64,
}

impl Job {
    /// Build a job, naming and estimating it from its action
    pub fn new(action: JobAction, estimator: &DurationEstimator) -> AppResult<Self> {
        action.validate()?;
        Ok(Self {
            name: action.display_name(),
            duration_estimate_minutes: estimator.estimate_minutes(&action),
            action,
        })
    }

    /// Sweep job
    pub fn sweep(params: SweepParams, estimator: &DurationEstimator) -> AppResult<Self> {
        Self::new(JobAction::Sweep(params), estimator)
    }

    /// Wait job
    pub fn wait(seconds: f64, estimator: &DurationEstimator) -> AppResult<Self> {
        Self::new(JobAction::Wait { seconds }, estimator)
    }
}

/// Round to `decimals` places for display
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
