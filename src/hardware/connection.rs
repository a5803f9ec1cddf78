//! Instrument startup.
//!
//! Opens the XPS stage and the Newport 2936 meter and runs their initialization
//! routines. Any failure along the way is logged and the program continues with
//! simulated instruments (dummy mode).

use crate::config::SprConfig;
use crate::error::{AppResult, DaqError};
use crate::hardware::capabilities::{Movable, PowerMeter};
use crate::hardware::mock::{MockPowerMeter, MockStage, ResonanceModel};
use std::fmt;
use std::sync::Arc;

/// Base power of the simulated detector (W)
const DUMMY_BASE_POWER: f64 = 1.0e-3;

/// Whether the instrument handles talk to real hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// XPS stage and Newport 2936 meter
    Hardware,
    /// Simulated instruments
    Dummy,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Hardware => write!(f, "hardware"),
            ConnectionMode::Dummy => write!(f, "dummy"),
        }
    }
}

/// Stage and power meter handles shared by the console and the queue runner
#[derive(Clone)]
pub struct InstrumentSet {
    /// Goniometer stage
    pub stage: Arc<dyn Movable>,
    /// Optical power meter
    pub meter: Arc<dyn PowerMeter>,
    /// How the handles were obtained
    pub mode: ConnectionMode,
}

impl fmt::Debug for InstrumentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentSet")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl InstrumentSet {
    /// Wrap arbitrary instrument handles
    pub fn new(stage: Arc<dyn Movable>, meter: Arc<dyn PowerMeter>, mode: ConnectionMode) -> Self {
        Self { stage, meter, mode }
    }

    /// Connect to the real instruments, falling back to dummy mode on failure
    pub async fn connect(config: &SprConfig) -> Self {
        match Self::connect_hardware(config).await {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!("Instrument connection failed, continuing in dummy mode: {e}");
                Self::dummy(config)
            }
        }
    }

    /// Connect to the real instruments
    ///
    /// # Errors
    /// Returns `Communication` if either instrument cannot be opened or initialized,
    /// and `FeatureNotEnabled` when the serial driver was not compiled in.
    #[cfg(feature = "instrument_serial")]
    pub async fn connect_hardware(config: &SprConfig) -> AppResult<Self> {
        use crate::hardware::newport_2936::Newport2936Driver;
        use crate::hardware::xps::XpsDriver;

        let stage = XpsDriver::connect(&config.stage)
            .await
            .map_err(DaqError::communication)?;
        stage
            .initialize(&config.stage)
            .await
            .map_err(DaqError::communication)?;

        let meter = Newport2936Driver::open(&config.power_meter).map_err(DaqError::communication)?;
        meter
            .initialize(&config.power_meter)
            .await
            .map_err(DaqError::communication)?;

        tracing::info!(
            group = %stage.group(),
            meter_port = %config.power_meter.port,
            "Instruments connected"
        );
        Ok(Self::new(
            Arc::new(stage),
            Arc::new(meter),
            ConnectionMode::Hardware,
        ))
    }

    /// Connect to the real instruments
    ///
    /// # Errors
    /// Always `FeatureNotEnabled`: the serial driver was not compiled in.
    #[cfg(not(feature = "instrument_serial"))]
    pub async fn connect_hardware(_config: &SprConfig) -> AppResult<Self> {
        Err(DaqError::FeatureNotEnabled("instrument_serial".into()))
    }

    /// Simulated instruments
    ///
    /// The simulated meter follows a resonance dip as the simulated stage moves,
    /// so dummy sweeps produce a plausible curve.
    pub fn dummy(config: &SprConfig) -> Self {
        let stage = Arc::new(MockStage::new());
        let meter = MockPowerMeter::new(DUMMY_BASE_POWER).coupled_to(
            stage.clone(),
            config.stage.angle_offset_deg,
            ResonanceModel::default(),
        );
        tracing::info!("Using simulated instruments");
        Self::new(stage, Arc::new(meter), ConnectionMode::Dummy)
    }

    /// True when the handles are simulated
    pub fn is_dummy(&self) -> bool {
        self.mode == ConnectionMode::Dummy
    }
}
