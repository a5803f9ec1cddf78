//! # SPR DAQ Core Library
//!
//! This crate drives a goniometer stage (Newport XPS) and an optical power meter
//! (Newport 2936) through angle-resolved power sweeps, sequenced by a manually
//! edited job queue. The binary (`main.rs`) adds the command line and the
//! interactive console on top of this library.
//!
//! ## Crate Structure
//!
//! - **`config`**: Layered configuration (defaults, TOML file, environment) via `figment`.
//! - **`console`**: Line-oriented operator console: command grammar, queue table,
//!   live sweep readout.
//! - **`data`**: CSV output with unique file naming.
//! - **`error`**: The `DaqError` enum and `AppResult` alias.
//! - **`experiment`**: Jobs, the job queue, the sweep action and the sequential runner.
//! - **`hardware`**: Capability traits, the XPS and 2936 drivers, simulated
//!   instruments and the startup connection routine.
//! - **`logging`**: `tracing-subscriber` initialization.

pub mod config;
pub mod console;
pub mod data;
pub mod error;
pub mod experiment;
pub mod hardware;
pub mod logging;
