//! Angle sweep action.
//!
//! A sweep steps the goniometer through `[start, stop]` in relative angle, takes one
//! averaged power reading per angle and writes the rows to a fresh CSV file once
//! every angle has been measured. Any instrument failure aborts the sweep before
//! anything is written.

use crate::config::StageConfig;
use crate::data::csv_writer::{unique_csv_path, write_rows};
use crate::error::{AppResult, DaqError};
use crate::experiment::observer::RunObserver;
use crate::hardware::capabilities::{Movable, PowerMeter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Slack added before flooring the sample count so exact multiples of the step
/// are not lost to binary rounding (e.g. 30/0.1 = 299.99999999999994).
const STEP_TOLERANCE: f64 = 1e-9;

/// Upper bound on the points of one sweep
pub const MAX_SWEEP_SAMPLES: usize = 1_000_000;

/// Parameters of one sweep job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepParams {
    /// First relative angle (deg)
    pub start_deg: f64,
    /// Last relative angle (deg), inclusive
    pub stop_deg: f64,
    /// Angular step (deg)
    pub step_deg: f64,
    /// Output directory
    pub directory: PathBuf,
    /// Output file base name; `_<n>.csv` is appended
    pub base_name: String,
}

impl SweepParams {
    /// Reject ranges that cannot produce a sample grid
    pub fn validate(&self) -> AppResult<()> {
        if !(self.start_deg.is_finite() && self.stop_deg.is_finite() && self.step_deg.is_finite())
        {
            return Err(DaqError::InvalidSweep(format!(
                "range [{}, {}] with step {} is not finite",
                self.start_deg, self.stop_deg, self.step_deg
            )));
        }
        if self.step_deg <= 0.0 {
            return Err(DaqError::InvalidSweep(format!(
                "step must be positive, got {}",
                self.step_deg
            )));
        }
        if self.stop_deg < self.start_deg {
            return Err(DaqError::InvalidSweep(format!(
                "stop {} is below start {}",
                self.stop_deg, self.start_deg
            )));
        }
        let steps = (self.stop_deg - self.start_deg) / self.step_deg;
        if !steps.is_finite() || steps >= MAX_SWEEP_SAMPLES as f64 {
            return Err(DaqError::InvalidSweep(format!(
                "step {} over [{}, {}] exceeds {} samples",
                self.step_deg, self.start_deg, self.stop_deg, MAX_SWEEP_SAMPLES
            )));
        }
        if self.base_name.trim().is_empty() {
            return Err(DaqError::InvalidSweep("file base name is empty".into()));
        }
        Ok(())
    }

    /// Number of sample angles, `floor((stop - start) / step) + 1`
    ///
    /// Saturates for grids that [`validate`](Self::validate) rejects.
    pub fn sample_count(&self) -> usize {
        let span = (self.stop_deg - self.start_deg).abs();
        let intervals = (span / self.step_deg + STEP_TOLERANCE).floor() as usize;
        intervals.checked_add(1).unwrap_or(usize::MAX)
    }

    /// Sample angles, evenly spaced from start to stop inclusive
    pub fn angles(&self) -> Vec<f64> {
        let n = self.sample_count();
        if n == 1 {
            return vec![self.start_deg];
        }
        let spacing = (self.stop_deg - self.start_deg) / (n - 1) as f64;
        (0..n)
            .map(|i| {
                if i == n - 1 {
                    self.stop_deg
                } else {
                    self.start_deg + spacing * i as f64
                }
            })
            .collect()
    }
}

/// Mapping between relative angle and stage position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageGeometry {
    /// Stage position of relative angle zero (deg)
    pub angle_offset_deg: f64,
}

impl Default for StageGeometry {
    fn default() -> Self {
        Self {
            angle_offset_deg: 90.0,
        }
    }
}

impl From<&StageConfig> for StageGeometry {
    fn from(config: &StageConfig) -> Self {
        Self {
            angle_offset_deg: config.angle_offset_deg,
        }
    }
}

impl StageGeometry {
    /// Stage position for a relative angle
    pub fn stage_target(&self, angle_deg: f64) -> f64 {
        self.angle_offset_deg - angle_deg
    }

    /// Relative angle for a stage position
    pub fn relative_angle(&self, position: f64) -> f64 {
        self.angle_offset_deg - position
    }
}

/// One measured point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    /// Relative angle (deg)
    #[serde(rename = "Angle")]
    pub angle: f64,
    /// Mean power (W)
    #[serde(rename = "Power")]
    pub mean_power: f64,
    /// Standard deviation of the power (W)
    #[serde(rename = "Std_power")]
    pub std_power: f64,
}

/// Result of a completed sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepOutcome {
    /// CSV file written
    pub path: PathBuf,
    /// Measured rows, in acquisition order
    pub rows: Vec<SweepRow>,
    /// When the first sample was requested
    pub started_at: DateTime<Utc>,
}

/// Run one sweep and persist it
///
/// The output path is chosen before the first move. No file is created if any
/// move or read fails.
pub async fn execute_sweep(
    params: &SweepParams,
    stage: &dyn Movable,
    meter: &dyn PowerMeter,
    geometry: StageGeometry,
    observer: &mut dyn RunObserver,
) -> AppResult<SweepOutcome> {
    params.validate()?;
    let path = unique_csv_path(&params.directory, &params.base_name)?;
    let angles = params.angles();
    tracing::info!(
        start = params.start_deg,
        stop = params.stop_deg,
        step = params.step_deg,
        samples = angles.len(),
        path = %path.display(),
        "Starting sweep"
    );
    observer.sweep_started(params, &path);

    let started_at = Utc::now();
    let mut rows = Vec::with_capacity(angles.len());
    for angle in angles {
        let target = geometry.stage_target(angle);
        stage
            .move_abs(target)
            .await
            .map_err(DaqError::communication)?;
        let sample = meter
            .read_averaged_power()
            .await
            .map_err(DaqError::communication)?;

        let row = SweepRow {
            angle,
            mean_power: sample.mean,
            std_power: sample.std_dev,
        };
        tracing::trace!(angle, power = row.mean_power, "Sweep point");
        observer.sweep_point(&row);
        rows.push(row);
    }

    let path = write_rows(&path, &rows)?;
    let outcome = SweepOutcome {
        path,
        rows,
        started_at,
    };
    observer.sweep_finished(&outcome);
    Ok(outcome)
}
