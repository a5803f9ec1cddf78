//! Manually edited job queue.
//!
//! Jobs run in index order. Index-based edits outside `0..len` are logged and
//! ignored; they never change the queue.
//!
//! A queue can also be loaded from a file listing job actions, either TOML
//! (`[[jobs]]` tables) or JSON (a `jobs` array or a bare array):
//!
//! ```toml
//! [[jobs]]
//! kind = "sweep"
//! start_deg = 30.0
//! stop_deg = 60.0
//! step_deg = 0.1
//! directory = "data"
//! base_name = "experiment"
//!
//! [[jobs]]
//! kind = "wait"
//! seconds = 300
//! ```

use crate::error::{AppResult, DaqError};
use crate::experiment::job::{DurationEstimator, Job, JobAction};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum QueueFile {
    Listed { jobs: Vec<JobAction> },
    Bare(Vec<JobAction>),
}

impl QueueFile {
    fn into_actions(self) -> Vec<JobAction> {
        match self {
            QueueFile::Listed { jobs } | QueueFile::Bare(jobs) => jobs,
        }
    }
}

/// Ordered list of pending jobs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobQueue {
    jobs: Vec<Job>,
}

impl JobQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job at the end
    pub fn append(&mut self, job: Job) {
        tracing::info!("ADDED TO QUEUE: {}", job.name);
        self.jobs.push(job);
    }

    /// Append an independent copy of the job at `index`
    ///
    /// Returns the copy, or `None` (queue unchanged) when `index` is out of range.
    pub fn copy(&mut self, index: usize) -> Option<&Job> {
        let Some(job) = self.jobs.get(index).cloned() else {
            tracing::warn!(index, len = self.jobs.len(), "Index too high, nothing copied");
            return None;
        };
        self.jobs.push(job);
        self.jobs.last()
    }

    /// Remove and return the job at `index`
    ///
    /// Returns `None` (queue unchanged) when `index` is out of range.
    pub fn delete(&mut self, index: usize) -> Option<Job> {
        if index >= self.jobs.len() {
            tracing::warn!(index, len = self.jobs.len(), "Index too high, nothing deleted");
            return None;
        }
        Some(self.jobs.remove(index))
    }

    /// Remove every job
    pub fn clear(&mut self) {
        self.jobs.clear();
        tracing::info!("QUEUE CLEARED.");
    }

    /// Number of jobs
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// True when no job is queued
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Job at `index`
    pub fn get(&self, index: usize) -> Option<&Job> {
        self.jobs.get(index)
    }

    /// Jobs in execution order
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Sum of the remaining runtime estimates (min)
    pub fn total_remaining_minutes(&self) -> f64 {
        self.jobs.iter().map(|j| j.duration_estimate_minutes).sum()
    }

    /// Zero the estimate of the job at `index` after it ran
    pub fn mark_done(&mut self, index: usize) {
        if let Some(job) = self.jobs.get_mut(index) {
            job.duration_estimate_minutes = 0.0;
        }
    }

    /// Build a queue from actions, naming and estimating each job
    pub fn from_actions<I>(actions: I, estimator: &DurationEstimator) -> AppResult<Self>
    where
        I: IntoIterator<Item = JobAction>,
    {
        actions
            .into_iter()
            .map(|action| Job::new(action, estimator))
            .collect()
    }

    /// Load a queue file; `.json` files are JSON, anything else TOML
    pub fn load(path: &Path, estimator: &DurationEstimator) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let invalid = |e: &dyn std::fmt::Display| DaqError::QueueFile(format!("{}: {e}", path.display()));
        let file: QueueFile = if is_json {
            serde_json::from_str(&text).map_err(|e| invalid(&e))?
        } else {
            toml::from_str(&text).map_err(|e| invalid(&e))?
        };

        let queue = Self::from_actions(file.into_actions(), estimator)?;
        tracing::info!(
            jobs = queue.len(),
            minutes = queue.total_remaining_minutes(),
            "Loaded queue from '{}'",
            path.display()
        );
        Ok(queue)
    }
}

impl FromIterator<Job> for JobQueue {
    fn from_iter<I: IntoIterator<Item = Job>>(iter: I) -> Self {
        Self {
            jobs: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    fn wait_job(seconds: f64) -> Job {
        Job::wait(seconds, &DurationEstimator::default()).unwrap()
    }

    #[test]
    fn append_then_clear_empties_queue() {
        let mut queue = JobQueue::new();
        for s in [10.0, 20.0, 30.0] {
            queue.append(wait_job(s));
        }
        assert_eq!(queue.len(), 3);

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.total_remaining_minutes(), 0.0);
    }

    #[test]
    fn copy_appends_independent_job() {
        let mut queue = JobQueue::new();
        queue.append(wait_job(60.0));
        queue.append(wait_job(120.0));

        let copied = queue.copy(0).cloned().unwrap();
        assert_eq!(queue.len(), 3);
        assert_eq!(copied.name, "Wait: 60 seconds");

        queue.mark_done(2);
        assert_eq!(queue.get(2).unwrap().duration_estimate_minutes, 0.0);
        assert_eq!(queue.get(0).unwrap().duration_estimate_minutes, 1.0);
    }

    #[test]
    fn out_of_range_edits_are_noops() {
        let mut queue = JobQueue::new();
        queue.append(wait_job(60.0));
        let before = queue.clone();

        assert!(queue.copy(1).is_none());
        assert!(queue.copy(7).is_none());
        assert!(queue.delete(1).is_none());
        assert!(queue.delete(usize::MAX).is_none());
        assert_eq!(queue, before);
    }

    #[test]
    #[traced_test]
    fn out_of_range_edits_are_reported() {
        let mut queue = JobQueue::new();
        queue.append(wait_job(60.0));

        assert!(queue.copy(1).is_none());
        assert!(logs_contain("Index too high, nothing copied"));

        assert!(queue.delete(3).is_none());
        assert!(logs_contain("Index too high, nothing deleted"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn delete_shifts_later_jobs() {
        let mut queue: JobQueue = [10.0, 20.0, 30.0].into_iter().map(wait_job).collect();

        let removed = queue.delete(1).unwrap();
        assert_eq!(removed.name, "Wait: 20 seconds");
        let names: Vec<_> = queue.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["Wait: 10 seconds", "Wait: 30 seconds"]);
    }

    #[test]
    fn total_remaining_sums_estimates() {
        let queue: JobQueue = [60.0, 90.0].into_iter().map(wait_job).collect();
        assert!((queue.total_remaining_minutes() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn loads_toml_queue_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.toml");
        fs::write(
            &path,
            r#"
[[jobs]]
kind = "sweep"
start_deg = 30.0
stop_deg = 60.0
step_deg = 0.1
directory = "data"
base_name = "experiment"

[[jobs]]
kind = "wait"
seconds = 300.0
"#,
        )
        .unwrap();

        let queue = JobQueue::load(&path, &DurationEstimator::default()).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get(0).unwrap().name, "Range: [30.0, 60.0], Step: 0.1");
        assert_eq!(queue.get(1).unwrap().name, "Wait: 300 seconds");
    }

    #[test]
    fn loads_bare_json_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        fs::write(&path, r#"[{"kind":"wait","seconds":1.5},{"kind":"wait","seconds":3}]"#).unwrap();

        let queue = JobQueue::load(&path, &DurationEstimator::default()).unwrap();
        assert_eq!(queue.len(), 2);
        assert!((queue.total_remaining_minutes() - 4.5 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_job_in_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        fs::write(&path, r#"{"jobs":[{"kind":"wait","seconds":-2}]}"#).unwrap();

        let err = JobQueue::load(&path, &DurationEstimator::default()).unwrap_err();
        assert!(matches!(err, DaqError::InvalidWait(_)));
    }

    #[test]
    fn unknown_kind_is_a_queue_file_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.toml");
        fs::write(&path, "[[jobs]]\nkind = \"dance\"\n").unwrap();

        let err = JobQueue::load(&path, &DurationEstimator::default()).unwrap_err();
        assert!(matches!(err, DaqError::QueueFile(_)));
    }
}
