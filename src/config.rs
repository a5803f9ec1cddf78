//! Configuration System using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (`SprConfig::default()`)
//! 2. A TOML file (`config/spr.toml` unless another path is given)
//! 3. Environment variables prefixed with `SPR_DAQ_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use spr_daq::config::SprConfig;
//!
//! let config = SprConfig::load()?;
//! println!("XPS at {}:{}", config.stage.host, config.stage.port);
//! # Ok::<(), spr_daq::error::DaqError>(())
//! ```
//!
//! Environment override example: `SPR_DAQ_STAGE__HOST=10.0.0.5`.

use crate::error::{AppResult, DaqError};
use crate::hardware::capabilities::FilterMode;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/spr.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "SPR_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SprConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Newport XPS motion controller
    pub stage: StageConfig,
    /// Newport 2936 power meter
    pub power_meter: PowerMeterConfig,
    /// Sweep defaults and duration estimation
    pub sweep: SweepConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "SPR angle sweep".to_string(),
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
        }
    }
}

/// XPS motion controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Controller IP address or hostname
    pub host: String,
    /// Controller command port
    pub port: u16,
    /// Login user
    pub username: String,
    /// Login password
    pub password: String,
    /// Motion group moved by the sweep
    pub group: String,
    /// Positioners of the group; every positioner receives the same target
    pub positioners: Vec<String>,
    /// Positioner velocity (deg/s)
    pub velocity: f64,
    /// Positioner acceleration (deg/s²)
    pub acceleration: f64,
    /// Reply timeout per command; must cover the longest move
    pub timeout_ms: u64,
    /// Stage position corresponding to a relative angle of zero
    pub angle_offset_deg: f64,
    /// Smallest relative angle accepted by `move`
    pub min_angle_deg: f64,
    /// Largest relative angle accepted by `move`
    pub max_angle_deg: f64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            host: "192.168.254.254".to_string(),
            port: 5001,
            username: "Administrator".to_string(),
            password: "Administrator".to_string(),
            group: "XY".to_string(),
            positioners: vec!["XY.X".to_string(), "XY.Y".to_string()],
            velocity: 5.0,
            acceleration: 4.0,
            timeout_ms: 30_000,
            angle_offset_deg: 90.0,
            min_angle_deg: 30.0,
            max_angle_deg: 90.0,
        }
    }
}

impl StageConfig {
    /// Reply timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Power meter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerMeterConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Detector wavelength applied at startup (nm)
    pub wavelength_nm: u32,
    /// Statistics ring buffer size (samples)
    pub buffer_size: u32,
    /// Interval between buffered samples (ms)
    pub interval_ms: u32,
    /// Filtering mode applied at startup
    pub filter: FilterMode,
    /// Query reply timeout
    pub timeout_ms: u64,
}

impl Default for PowerMeterConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 38_400,
            wavelength_nm: 633,
            buffer_size: 1000,
            interval_ms: 1,
            filter: FilterMode::None,
            timeout_ms: 1000,
        }
    }
}

impl PowerMeterConfig {
    /// Reply timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Sweep defaults and duration estimation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Empirical time per sample (s). Fitted from 145 s for 201 samples.
    pub seconds_per_step: f64,
    /// Fixed time added to each sweep for initial positioning (min)
    pub positioning_overhead_minutes: f64,
    /// Default output directory
    pub output_dir: PathBuf,
    /// Default output base name
    pub base_name: String,
    /// Default sweep start (deg)
    pub start_deg: f64,
    /// Default sweep stop (deg)
    pub stop_deg: f64,
    /// Default sweep step (deg)
    pub step_deg: f64,
    /// Default wait job length (s)
    pub wait_seconds: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            seconds_per_step: 0.72,
            positioning_overhead_minutes: 0.5,
            output_dir: PathBuf::from("."),
            base_name: "experiment".to_string(),
            start_deg: 30.0,
            stop_deg: 60.0,
            step_deg: 0.1,
            wait_seconds: 300.0,
        }
    }
}

impl SprConfig {
    /// Load configuration from `config/spr.toml` and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error: defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: SprConfig = Self::figment(path.as_ref()).extract()?;
        Ok(config)
    }

    /// The layered figment used by [`SprConfig::load_from`].
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(SprConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.stage.positioners.is_empty() {
            return Err(DaqError::Configuration(format!(
                "Stage group '{}' has no positioners",
                self.stage.group
            )));
        }
        if self.stage.port == 0 {
            return Err(DaqError::Configuration("Stage port must be non-zero".into()));
        }
        if !(self.stage.velocity > 0.0 && self.stage.acceleration > 0.0) {
            return Err(DaqError::Configuration(format!(
                "Stage velocity ({}) and acceleration ({}) must be positive",
                self.stage.velocity, self.stage.acceleration
            )));
        }
        if !(self.stage.min_angle_deg < self.stage.max_angle_deg) {
            return Err(DaqError::Configuration(format!(
                "Angle limits [{}, {}] are inverted",
                self.stage.min_angle_deg, self.stage.max_angle_deg
            )));
        }

        if self.power_meter.buffer_size == 0 {
            return Err(DaqError::Configuration(
                "Power meter buffer_size must be at least 1".into(),
            ));
        }

        if !(self.sweep.seconds_per_step > 0.0) {
            return Err(DaqError::Configuration(format!(
                "seconds_per_step must be positive, got {}",
                self.sweep.seconds_per_step
            )));
        }
        if !(self.sweep.positioning_overhead_minutes >= 0.0) {
            return Err(DaqError::Configuration(format!(
                "positioning_overhead_minutes must not be negative, got {}",
                self.sweep.positioning_overhead_minutes
            )));
        }

        Ok(())
    }
}
