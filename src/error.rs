//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the sweep and queue
//! layers. Using the `thiserror` crate, it provides a centralized and consistent way
//! to handle the kinds of failures the program can meet, from configuration and
//! file issues to instrument communication problems.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type
//!   mismatches in the configuration sources.
//! - **`Configuration`**: Semantic errors in a configuration that parsed correctly
//!   (e.g. a non-positive step time or inverted angle limits).
//! - **`Io`** / **`Csv`**: File system and CSV encoding failures while writing results.
//! - **`Communication`**: Any failure talking to the stage or the power meter. Drivers
//!   report failures as `anyhow::Error` with context; the experiment layer folds them
//!   into this variant, keeping the whole context chain in the message.
//! - **`InvalidSweep`** / **`InvalidWait`**: Job parameters rejected when the job is built.
//! - **`FeatureNotEnabled`**: A driver was requested that was not compiled in.
//!
//! Out-of-range queue indices are deliberately not an error: the queue reports them
//! and leaves its contents untouched.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Application error type.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration source could not be read or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but holds invalid values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding error while writing sweep results.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Instrument command or query failed.
    #[error("Communication error: {0}")]
    Communication(String),

    /// Sweep parameters cannot produce a valid sample grid.
    #[error("Invalid sweep: {0}")]
    InvalidSweep(String),

    /// Wait duration is negative or not finite.
    #[error("Invalid wait duration: {0} s")]
    InvalidWait(f64),

    /// Queue file could not be decoded.
    #[error("Queue file error: {0}")]
    QueueFile(String),

    /// Functionality compiled out via cargo features.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl DaqError {
    /// Fold a driver error (and its context chain) into a communication error.
    pub fn communication(err: anyhow::Error) -> Self {
        DaqError::Communication(format!("{err:#}"))
    }

    /// True when the failure came from an instrument rather than from local state.
    pub fn is_communication(&self) -> bool {
        matches!(self, DaqError::Communication(_))
    }
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}
