//! CLI module

mod commands;
mod output;
mod progress;

pub use commands::{Cli, Commands, ScanArgs};
pub use output::{print_detection, print_records, print_report, print_volume};
pub use progress::ProgressReporter;
