//! Data Transfer Objects

mod recovery_report;
mod scan_options;

pub use recovery_report::RecoveryReport;
pub use scan_options::ScanOptions;
