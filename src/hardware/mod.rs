//! Hardware Abstraction Layer
//!
//! Instruments of the sweep rig, expressed as capability traits:
//!
//! - `capabilities`: `Movable`, `WavelengthTunable`, `PowerReadout`, `PowerMeter`
//! - `xps`: Newport XPS motion controller over TCP
//! - `newport_2936`: Newport 2936 optical power meter over serial
//! - `mock`: simulated stage and power meter (tests and dummy mode)
//! - `mock_transport`: in-memory byte transport for driver tests
//! - `connection`: startup routine that opens both instruments

pub mod capabilities;
pub mod connection;
pub mod mock;
pub mod mock_transport;
pub mod newport_2936;
pub mod xps;

pub use capabilities::{
    FilterMode, InstantPower, Movable, PowerMeter, PowerReadout, PowerSample, WavelengthTunable,
};
pub use connection::{ConnectionMode, InstrumentSet};
pub use mock::{MockPowerMeter, MockStage, ResonanceModel};
pub use newport_2936::Newport2936Driver;
pub use xps::XpsDriver;
