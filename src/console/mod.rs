//! Line-oriented operator console.
//!
//! - `commands`: clap grammar of one input line
//! - `view`: queue table and progress rendering
//! - `session`: console state and command dispatch

pub mod commands;
pub mod session;
pub mod view;

pub use commands::{parse_line, ConsoleCommand};
pub use session::{ConsoleSession, Flow, JobForm};
pub use view::{render_queue, ConsoleView};
