//! Text rendering for the console.

use crate::experiment::job::{round_to, Job};
use crate::experiment::observer::RunObserver;
use crate::experiment::queue::JobQueue;
use crate::experiment::sweep::{SweepOutcome, SweepParams, SweepRow};
use std::fmt;
use std::io::Write;
use std::path::Path;

const INDEX_HEADER: &str = "Index";
const NAME_HEADER: &str = "Name";
const RUNTIME_HEADER: &str = "Runtime [min]";
const TOTAL_LABEL: &str = "Total Time Remaining->";

/// Render the queue table with its summary row
///
/// ```text
/// Index | Name                          | Runtime [min]
/// 0     | Range: [30.0, 60.0], Step: 0.1 | 4.112
///       | Total Time Remaining->        | 4.112
/// ```
pub fn render_queue(queue: &JobQueue) -> String {
    let name_width = queue
        .iter()
        .map(|job| job.name.chars().count())
        .chain([NAME_HEADER.len(), TOTAL_LABEL.len()])
        .max()
        .unwrap_or(TOTAL_LABEL.len());
    let index_width = INDEX_HEADER.len().max(queue.len().to_string().len());

    let mut out = String::new();
    let mut row = |index: &str, name: &str, runtime: &str| {
        out.push_str(&format!(
            "{index:<index_width$} | {name:<name_width$} | {runtime}\n"
        ));
    };

    row(INDEX_HEADER, NAME_HEADER, RUNTIME_HEADER);
    for (index, job) in queue.iter().enumerate() {
        row(
            &index.to_string(),
            &job.name,
            &format_minutes(job.duration_estimate_minutes),
        );
    }
    row("", TOTAL_LABEL, &format_minutes(queue.total_remaining_minutes()));
    out
}

/// Minutes rounded to three decimals
pub fn format_minutes(minutes: f64) -> String {
    format!("{:?}", round_to(minutes, 3))
}

/// Position readout, `NaN` while the position is unknown
pub fn format_position(relative_angle: Option<f64>) -> String {
    format!("Position: [{}]", relative_angle.unwrap_or(f64::NAN))
}

/// Writes console output and renders run progress
pub struct ConsoleView<W> {
    out: W,
}

impl<W: Write + Send> ConsoleView<W> {
    /// View writing to `out`
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Underlying writer
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Consume the view, returning the writer
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Write one line
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        if let Err(e) = self.out.write_fmt(args).and_then(|_| self.out.write_all(b"\n")) {
            tracing::debug!("Console write failed: {e}");
        }
    }

    /// Write without a newline and flush (prompts)
    pub fn prompt(&mut self, text: &str) {
        if let Err(e) = self
            .out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush())
        {
            tracing::debug!("Console write failed: {e}");
        }
    }

    /// Print the queue table
    pub fn show_queue(&mut self, queue: &JobQueue) {
        let table = render_queue(queue);
        self.prompt(&table);
    }
}

impl<W: Write + Send> RunObserver for ConsoleView<W> {
    fn queue_changed(&mut self, queue: &JobQueue) {
        self.show_queue(queue);
    }

    fn job_started(&mut self, _index: usize, job: &Job) {
        self.line(format_args!("Running: {}.", job.name));
    }

    fn sweep_started(&mut self, params: &SweepParams, path: &Path) {
        self.line(format_args!("{} chosen", path.display()));
        self.line(format_args!(
            "Angle axis [{}, {}], {} points",
            params.start_deg,
            params.stop_deg,
            params.sample_count()
        ));
        self.line(format_args!("{:>10}  {:>14}  {:>12}", "Angle", "Power", "Std_power"));
    }

    fn sweep_point(&mut self, row: &SweepRow) {
        self.line(format_args!(
            "{:>10.3}  {:>14.6e}  {:>12.3e}",
            row.angle, row.mean_power, row.std_power
        ));
    }

    fn sweep_finished(&mut self, outcome: &SweepOutcome) {
        self.line(format_args!(
            "Saved {} points to {} (started {} UTC)",
            outcome.rows.len(),
            outcome.path.display(),
            outcome.started_at.format("%Y-%m-%d %H:%M:%S")
        ));
    }

    fn acknowledge(&mut self, message: &str) {
        self.line(format_args!("[!] {message}"));
    }
}
