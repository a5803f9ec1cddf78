//! Console command line grammar.
//!
//! Each input line is split on whitespace and parsed with clap, so every command
//! gets `--help` and argument errors for free.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// One console input line
#[derive(Parser, Debug, PartialEq)]
#[command(no_binary_name = true, disable_version_flag = true)]
pub struct ConsoleLine {
    /// Command to execute
    #[command(subcommand)]
    pub command: ConsoleCommand,
}

/// Commands accepted by the console
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Run the stage homing sequence
    Home,
    /// Move to a relative angle (deg), clamped to the configured limits
    Move {
        /// Relative angle (deg)
        #[arg(allow_negative_numbers = true)]
        angle: f64,
    },
    /// Set the detector wavelength (nm)
    Wavelength {
        /// Wavelength (nm)
        nm: u32,
    },
    /// Read the instantaneous power
    Power,
    /// Queue an angle sweep; omitted values repeat the last ones used
    Sweep {
        /// First relative angle (deg)
        #[arg(long, allow_negative_numbers = true)]
        start: Option<f64>,
        /// Last relative angle (deg)
        #[arg(long, allow_negative_numbers = true)]
        stop: Option<f64>,
        /// Angular step (deg)
        #[arg(long)]
        step: Option<f64>,
        /// Output directory
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Output file base name
        #[arg(long)]
        file: Option<String>,
    },
    /// Queue a pause
    Wait {
        /// Pause length (s)
        #[arg(allow_negative_numbers = true)]
        seconds: Option<f64>,
    },
    /// Append a copy of the job at INDEX
    Copy {
        /// Queue index
        index: usize,
    },
    /// Remove the job at INDEX
    Delete {
        /// Queue index
        index: usize,
    },
    /// Remove every job
    Clear,
    /// Print the queue table
    Show,
    /// Execute the queue
    Run,
    /// Show instrument and queue state
    Status,
    /// Leave the console
    #[command(alias = "exit")]
    Quit,
}

/// Parse one input line
///
/// Returns `Ok(None)` for blank lines. Errors carry clap's rendered message,
/// including `--help` output.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, clap::Error> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Ok(None);
    }
    ConsoleLine::try_parse_from(words).map(|parsed| Some(parsed.command))
}
