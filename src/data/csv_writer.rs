//! CSV output for sweep results.
//!
//! Each sweep writes one file `{directory}/{base_name}_{n}.csv`, where `n` is the
//! smallest positive integer whose file does not exist yet. The header row is
//! derived from the serialized record type.

use crate::error::AppResult;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Pick the first free `{base_name}_{n}.csv` in `directory`, creating the directory if needed
///
/// The file itself is not created; callers write it once all rows are known.
pub fn unique_csv_path(directory: &Path, base_name: &str) -> AppResult<PathBuf> {
    if !directory.exists() {
        fs::create_dir_all(directory)?;
        tracing::debug!("Created output directory '{}'", directory.display());
    }

    let mut counter: u32 = 1;
    loop {
        let candidate = directory.join(format!("{base_name}_{counter}.csv"));
        if !candidate.exists() {
            return Ok(candidate);
        }
        counter += 1;
    }
}

/// A writer for CSV files with a header row
pub struct CsvWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl CsvWriter {
    /// Create (or truncate) the file at `path`
    pub fn create(path: &Path) -> AppResult<Self> {
        let writer = csv::Writer::from_path(path)?;
        tracing::debug!("CSV writer opened at '{}'", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        })
    }

    /// Append one record; the first record also emits the header
    pub fn write_row<R: Serialize>(&mut self, row: &R) -> AppResult<()> {
        self.writer.serialize(row)?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and close the file, returning its path
    pub fn finish(mut self) -> AppResult<PathBuf> {
        self.writer.flush()?;
        tracing::info!("Wrote {} rows to '{}'", self.rows, self.path.display());
        Ok(self.path)
    }
}

/// Write all `rows` to a new file at `path`
pub fn write_rows<R: Serialize>(path: &Path, rows: &[R]) -> AppResult<PathBuf> {
    let mut writer = CsvWriter::create(path)?;
    for row in rows {
        writer.write_row(row)?;
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        #[serde(rename = "Angle")]
        angle: f64,
        #[serde(rename = "Power")]
        power: f64,
    }

    #[test]
    fn first_free_index_is_one() {
        let dir = tempdir().unwrap();
        let path = unique_csv_path(dir.path(), "experiment").unwrap();
        assert_eq!(path, dir.path().join("experiment_1.csv"));
    }

    #[test]
    fn skips_existing_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("experiment_1.csv"), "").unwrap();
        fs::write(dir.path().join("experiment_2.csv"), "").unwrap();
        fs::write(dir.path().join("other_3.csv"), "").unwrap();

        let path = unique_csv_path(dir.path(), "experiment").unwrap();
        assert_eq!(path, dir.path().join("experiment_3.csv"));
    }

    #[test]
    fn fills_gaps_with_smallest_index() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("experiment_2.csv"), "").unwrap();

        let path = unique_csv_path(dir.path(), "experiment").unwrap();
        assert_eq!(path, dir.path().join("experiment_1.csv"));
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("runs").join("today");

        let path = unique_csv_path(&nested, "gold").unwrap();
        assert!(nested.is_dir());
        assert_eq!(path, nested.join("gold_1.csv"));
        assert!(!path.exists());
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let rows = vec![
            Row { angle: 30.0, power: 1.5e-3 },
            Row { angle: 30.5, power: 1.25e-3 },
        ];

        write_rows(&path, &rows).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Angle,Power\n"));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let read: Vec<Row> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(read, rows);
    }
}
