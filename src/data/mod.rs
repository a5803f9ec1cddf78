//! Data storage.
pub mod csv_writer;

pub use csv_writer::{unique_csv_path, write_rows, CsvWriter};
