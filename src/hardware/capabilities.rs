//! Atomic Hardware Capabilities
//!
//! Fine-grained capability traits implemented by the instruments of the sweep rig.
//! Instead of one monolithic instrument trait, each device implements the
//! capabilities it actually supports:
//!
//! - The XPS goniometer stage implements: `Movable`
//! - The Newport 2936 power meter implements: `WavelengthTunable + PowerReadout`
//!
//! Sweep and console code only depend on these traits, so the simulated
//! instruments in [`crate::hardware::mock`] substitute for the real ones in tests
//! and in dummy mode.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! # Example
//!
//! ```rust,ignore
//! async fn record<S, M>(stage: &S, meter: &M, position: f64) -> Result<PowerSample>
//! where
//!     S: Movable,
//!     M: PowerReadout,
//! {
//!     stage.move_abs(position).await?;
//!     meter.read_averaged_power().await
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability: Motion Control
///
/// Devices that can move to absolute positions (stages, goniometers).
///
/// # Contract
/// - Positions are in device-native units (degrees for the goniometer)
/// - `move_abs` returns once the controller reports the move complete
/// - `home` runs the controller's reference search
#[async_trait]
pub trait Movable: Send + Sync {
    /// Move to absolute position
    ///
    /// # Returns
    /// - Ok(()) once the move completed
    /// - Err if the position is rejected or on hardware error
    async fn move_abs(&self, position: f64) -> Result<()>;

    /// Run the homing (reference search) sequence
    async fn home(&self) -> Result<()>;

    /// Set motion velocity and acceleration for every axis of the device
    async fn set_velocity(&self, velocity: f64, acceleration: f64) -> Result<()>;

    /// Get current position
    async fn position(&self) -> Result<f64>;
}

/// Detector filtering modes
///
/// Numeric values are the ones sent with `PM:FILT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// No filtering
    #[default]
    None,
    /// Analog filter
    Analog,
    /// Digital filter
    Digital,
    /// Analog and digital filter
    AnalogDigital,
}

impl FilterMode {
    /// Instrument code for this mode
    pub fn code(self) -> u8 {
        match self {
            FilterMode::None => 0,
            FilterMode::Analog => 1,
            FilterMode::Digital => 2,
            FilterMode::AnalogDigital => 3,
        }
    }

    /// Mode for an instrument code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FilterMode::None),
            1 => Some(FilterMode::Analog),
            2 => Some(FilterMode::Digital),
            3 => Some(FilterMode::AnalogDigital),
            _ => None,
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterMode::None => "none",
            FilterMode::Analog => "analog",
            FilterMode::Digital => "digital",
            FilterMode::AnalogDigital => "analog+digital",
        };
        write!(f, "{name}")
    }
}

/// Mean and standard deviation of the detector's statistics buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSample {
    /// Mean power (W)
    pub mean: f64,
    /// Standard deviation of the buffered readings (W)
    pub std_dev: f64,
}

/// A single unaveraged reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstantPower {
    /// Wavelength the detector is calibrated for (nm)
    pub wavelength_nm: f64,
    /// Power (W)
    pub power: f64,
}

/// Capability: Wavelength Calibration
///
/// Detectors whose responsivity correction depends on the configured wavelength.
#[async_trait]
pub trait WavelengthTunable: Send + Sync {
    /// Set calibration wavelength
    ///
    /// # Returns
    /// - Err if the wavelength is outside the detector range (the setting is left unchanged)
    async fn set_wavelength(&self, nm: u32) -> Result<()>;

    /// Current calibration wavelength (nm)
    async fn wavelength(&self) -> Result<u32>;
}

/// Capability: Optical Power Readout
///
/// # Contract
/// - `read_averaged_power` summarises the detector's running buffer; it does not
///   wait for a fresh acquisition window
/// - Power is in watts
#[async_trait]
pub trait PowerReadout: Send + Sync {
    /// Set detector filtering
    async fn set_filtering(&self, mode: FilterMode) -> Result<()>;

    /// Mean and standard deviation of the recent readings
    async fn read_averaged_power(&self) -> Result<PowerSample>;

    /// One reading with the wavelength it was taken at
    async fn read_instant_power(&self) -> Result<InstantPower>;
}

/// Combined trait for power meters, usable as a trait object
///
/// Implement `WavelengthTunable` and `PowerReadout`; this trait follows from the
/// blanket impl.
pub trait PowerMeter: WavelengthTunable + PowerReadout {}

/// Blanket implementation - any type implementing both traits is a PowerMeter
impl<T: WavelengthTunable + PowerReadout> PowerMeter for T {}
