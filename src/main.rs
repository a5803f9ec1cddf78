//! CLI Entry Point for spr_daq
//!
//! Provides the command-line interface for:
//! - The interactive console (default): edit the job queue, home and move the
//!   stage, read power, run the queue
//! - One-shot runs of a queue file
//!
//! # Usage
//!
//! ```bash
//! spr_daq                                # console, real instruments
//! spr_daq --dummy console                # console, simulated instruments
//! spr_daq --config lab.toml run queue.toml
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spr_daq::config::SprConfig;
use spr_daq::console::{ConsoleSession, ConsoleView};
use spr_daq::error::DaqError;
use spr_daq::experiment::{DurationEstimator, JobQueue, QueueRunner, StageGeometry};
use spr_daq::hardware::InstrumentSet;
use spr_daq::logging;
use std::path::{Path, PathBuf};
use tokio::io::BufReader;

#[derive(Parser)]
#[command(name = "spr_daq", version)]
#[command(about = "Angle-resolved power sweeps with a job queue", long_about = None)]
struct Cli {
    /// Configuration file (default: config/spr.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use simulated instruments instead of connecting to hardware
    #[arg(long, global = true)]
    dummy: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive console (default)
    Console,

    /// Home the stage, run a queue file and exit
    Run {
        /// Queue file (.toml or .json) listing job actions
        queue: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SprConfig::load_from(path),
        None => SprConfig::load(),
    }
    .context("Failed to load configuration")?;
    config.validate()?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    tracing::info!(name = %config.application.name, "Starting");

    let instruments = if cli.dummy {
        InstrumentSet::dummy(&config)
    } else {
        InstrumentSet::connect(&config).await
    };

    match cli.command.unwrap_or(Commands::Console) {
        Commands::Console => run_console(config, instruments).await,
        Commands::Run { queue } => run_queue_file(&config, instruments, &queue).await,
    }
}

async fn run_console(config: SprConfig, instruments: InstrumentSet) -> Result<()> {
    let mut session = ConsoleSession::new(config, instruments, std::io::stdout());
    session.run(BufReader::new(tokio::io::stdin())).await?;
    Ok(())
}

async fn run_queue_file(config: &SprConfig, instruments: InstrumentSet, path: &Path) -> Result<()> {
    let mut queue = JobQueue::load(path, &DurationEstimator::from(&config.sweep))?;

    tracing::info!("Homing stage");
    instruments
        .stage
        .home()
        .await
        .map_err(DaqError::communication)?;

    let runner = QueueRunner::new(instruments, StageGeometry::from(&config.stage));
    let mut view = ConsoleView::new(std::io::stdout());
    let summary = runner.run(&mut queue, &mut view).await?;

    for outcome in &summary.sweeps {
        println!("{}", outcome.path.display());
    }
    tracing::info!(
        jobs = summary.jobs_run,
        files = summary.sweeps.len(),
        elapsed_s = summary.elapsed.as_secs_f64(),
        "Run complete"
    );
    Ok(())
}
