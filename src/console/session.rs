//! Interactive console session.
//!
//! Holds the job queue, the sweep form values and the homing state, and maps
//! console commands onto instrument calls and queue edits. Instrument errors are
//! printed and logged; they end the command, not the session.

use crate::config::SprConfig;
use crate::console::commands::{parse_line, ConsoleCommand};
use crate::console::view::{format_minutes, format_position, ConsoleView};
use crate::error::{AppResult, DaqError};
use crate::experiment::job::{DurationEstimator, Job};
use crate::experiment::queue::JobQueue;
use crate::experiment::runner::{QueueRunner, RunSummary};
use crate::experiment::sweep::{StageGeometry, SweepParams};
use crate::hardware::connection::InstrumentSet;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const PROMPT: &str = "spr> ";

/// Whether the read loop keeps going after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line
    Continue,
    /// Leave the console
    Quit,
}

/// Last values entered for sweep and wait jobs
#[derive(Debug, Clone, PartialEq)]
pub struct JobForm {
    /// Sweep start (deg)
    pub start_deg: f64,
    /// Sweep stop (deg)
    pub stop_deg: f64,
    /// Sweep step (deg)
    pub step_deg: f64,
    /// Output directory
    pub directory: PathBuf,
    /// Output base name
    pub base_name: String,
    /// Wait length (s)
    pub wait_seconds: f64,
}

impl From<&SprConfig> for JobForm {
    fn from(config: &SprConfig) -> Self {
        let sweep = &config.sweep;
        Self {
            start_deg: sweep.start_deg,
            stop_deg: sweep.stop_deg,
            step_deg: sweep.step_deg,
            directory: sweep.output_dir.clone(),
            base_name: sweep.base_name.clone(),
            wait_seconds: sweep.wait_seconds,
        }
    }
}

impl JobForm {
    fn sweep_params(&self) -> SweepParams {
        SweepParams {
            start_deg: self.start_deg,
            stop_deg: self.stop_deg,
            step_deg: self.step_deg,
            directory: self.directory.clone(),
            base_name: self.base_name.clone(),
        }
    }
}

/// Console state and command dispatch
pub struct ConsoleSession<W> {
    config: SprConfig,
    instruments: InstrumentSet,
    geometry: StageGeometry,
    estimator: DurationEstimator,
    queue: JobQueue,
    form: JobForm,
    homed: bool,
    position: Option<f64>,
    view: ConsoleView<W>,
}

impl<W: Write + Send> ConsoleSession<W> {
    /// Session over `instruments`, printing to `out`
    pub fn new(config: SprConfig, instruments: InstrumentSet, out: W) -> Self {
        Self {
            geometry: StageGeometry::from(&config.stage),
            estimator: DurationEstimator::from(&config.sweep),
            form: JobForm::from(&config),
            queue: JobQueue::new(),
            homed: false,
            position: None,
            view: ConsoleView::new(out),
            instruments,
            config,
        }
    }

    /// Current queue
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Current sweep and wait form values
    pub fn form(&self) -> &JobForm {
        &self.form
    }

    /// True once `home` succeeded
    pub fn is_homed(&self) -> bool {
        self.homed
    }

    /// Last known relative angle (None before homing)
    pub fn position(&self) -> Option<f64> {
        self.position
    }

    /// Output view
    pub fn view(&self) -> &ConsoleView<W> {
        &self.view
    }

    /// Read commands from `input` until `quit` or end of input
    pub async fn run<R>(&mut self, input: R) -> AppResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.view.line(format_args!(
            "{} ({} mode). Type 'help' for commands.",
            self.config.application.name, self.instruments.mode
        ));
        self.view.line(format_args!("{}", format_position(self.position)));

        let mut lines = input.lines();
        loop {
            self.view.prompt(PROMPT);
            let Some(line) = lines.next_line().await? else {
                break;
            };
            if self.execute_line(&line).await == Flow::Quit {
                break;
            }
        }
        tracing::info!("Console closed");
        Ok(())
    }

    /// Parse and execute one input line
    pub async fn execute_line(&mut self, line: &str) -> Flow {
        match parse_line(line) {
            Ok(Some(command)) => self.execute(command).await,
            Ok(None) => Flow::Continue,
            Err(e) => {
                self.view.prompt(&e.render().to_string());
                Flow::Continue
            }
        }
    }

    /// Execute one command
    pub async fn execute(&mut self, command: ConsoleCommand) -> Flow {
        tracing::debug!(?command, "Console command");
        let result = match command {
            ConsoleCommand::Home => self.home().await,
            ConsoleCommand::Move { angle } => self.move_to(angle).await,
            ConsoleCommand::Wavelength { nm } => self.set_wavelength(nm).await,
            ConsoleCommand::Power => self.read_power().await,
            ConsoleCommand::Sweep {
                start,
                stop,
                step,
                dir,
                file,
            } => self.add_sweep(start, stop, step, dir, file),
            ConsoleCommand::Wait { seconds } => self.add_wait(seconds),
            ConsoleCommand::Copy { index } => {
                if self.queue.copy(index).is_none() {
                    self.view.line(format_args!("Index too high."));
                }
                self.view.show_queue(&self.queue);
                Ok(())
            }
            ConsoleCommand::Delete { index } => {
                if self.queue.delete(index).is_none() {
                    self.view.line(format_args!("Index too high."));
                }
                self.view.show_queue(&self.queue);
                Ok(())
            }
            ConsoleCommand::Clear => {
                self.queue.clear();
                self.view.line(format_args!("QUEUE CLEARED."));
                self.view.show_queue(&self.queue);
                Ok(())
            }
            ConsoleCommand::Show => {
                self.view.show_queue(&self.queue);
                Ok(())
            }
            ConsoleCommand::Run => self.run_queue().await.map(|_| ()),
            ConsoleCommand::Status => self.status().await,
            ConsoleCommand::Quit => return Flow::Quit,
        };

        if let Err(e) = result {
            tracing::error!("{e}");
            self.view.line(format_args!("Error: {e}"));
        }
        Flow::Continue
    }

    async fn home(&mut self) -> AppResult<()> {
        self.view.line(format_args!("Homing stage..."));
        self.instruments
            .stage
            .home()
            .await
            .map_err(DaqError::communication)?;
        self.homed = true;
        self.refresh_position().await
    }

    async fn move_to(&mut self, angle: f64) -> AppResult<()> {
        if !self.homed {
            self.view.line(format_args!("Home the stage first."));
            return Ok(());
        }

        let limits = (self.config.stage.min_angle_deg, self.config.stage.max_angle_deg);
        let clamped = angle.clamp(limits.0, limits.1);
        if clamped != angle {
            self.view.line(format_args!(
                "Angle {angle} outside [{}, {}], moving to {clamped}",
                limits.0, limits.1
            ));
        }

        self.instruments
            .stage
            .move_abs(self.geometry.stage_target(clamped))
            .await
            .map_err(DaqError::communication)?;
        self.refresh_position().await
    }

    async fn refresh_position(&mut self) -> AppResult<()> {
        let position = self
            .instruments
            .stage
            .position()
            .await
            .map_err(DaqError::communication)?;
        self.position = Some(self.geometry.relative_angle(position));
        self.view.line(format_args!("{}", format_position(self.position)));
        Ok(())
    }

    async fn set_wavelength(&mut self, nm: u32) -> AppResult<()> {
        self.instruments
            .meter
            .set_wavelength(nm)
            .await
            .map_err(DaqError::communication)?;
        self.view.line(format_args!("Wavelength set to {nm} nm"));
        Ok(())
    }

    async fn read_power(&mut self) -> AppResult<()> {
        let reading = self
            .instruments
            .meter
            .read_instant_power()
            .await
            .map_err(DaqError::communication)?;
        self.view.line(format_args!(
            "Power: {:.6e} W at {} nm",
            reading.power, reading.wavelength_nm
        ));
        Ok(())
    }

    fn add_sweep(
        &mut self,
        start: Option<f64>,
        stop: Option<f64>,
        step: Option<f64>,
        dir: Option<PathBuf>,
        file: Option<String>,
    ) -> AppResult<()> {
        let mut form = self.form.clone();
        if let Some(start) = start {
            form.start_deg = start;
        }
        if let Some(stop) = stop {
            form.stop_deg = stop;
        }
        if let Some(step) = step {
            form.step_deg = step;
        }
        if let Some(dir) = dir {
            form.directory = dir;
        }
        if let Some(file) = file {
            form.base_name = file;
        }

        let job = Job::sweep(form.sweep_params(), &self.estimator)?;
        self.form = form;
        self.queue.append(job);
        self.view.show_queue(&self.queue);
        Ok(())
    }

    fn add_wait(&mut self, seconds: Option<f64>) -> AppResult<()> {
        let seconds = seconds.unwrap_or(self.form.wait_seconds);
        let job = Job::wait(seconds, &self.estimator)?;
        self.form.wait_seconds = seconds;
        self.queue.append(job);
        self.view.show_queue(&self.queue);
        Ok(())
    }

    /// Execute the queue, refusing before the stage is homed
    pub async fn run_queue(&mut self) -> AppResult<Option<RunSummary>> {
        if !self.homed {
            self.view.line(format_args!("Home the stage first."));
            return Ok(None);
        }

        let runner = QueueRunner::new(self.instruments.clone(), self.geometry);
        let summary = runner.run(&mut self.queue, &mut self.view).await?;
        if summary.jobs_run > 0 {
            self.view.line(format_args!("Queue finished!"));
        }
        Ok(Some(summary))
    }

    async fn status(&mut self) -> AppResult<()> {
        self.view
            .line(format_args!("Mode: {}", self.instruments.mode));
        self.view.line(format_args!(
            "Homed: {}  {}",
            if self.homed { "yes" } else { "no" },
            format_position(self.position)
        ));
        match self.instruments.meter.wavelength().await {
            Ok(nm) => self.view.line(format_args!("Wavelength: {nm} nm")),
            Err(e) => self.view.line(format_args!("Wavelength: unavailable ({e:#})")),
        }
        self.view.line(format_args!(
            "Queue: {} jobs, {} min remaining",
            self.queue.len(),
            format_minutes(self.queue.total_remaining_minutes())
        ));
        Ok(())
    }
}
