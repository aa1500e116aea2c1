//! NTFS filesystem parser
//!
//! NTFS keeps one fixed-size record per file in the Master File Table (MFT).
//! Deleted files keep their record until the slot is reused.

mod boot_sector;
mod parser;
mod record;

pub use boot_sector::NtfsBootSector;
pub use parser::NtfsParser;
pub use record::{DataRun, filetime_to_utc, parse_data_runs};
