//! CLI commands using clap

use crate::application::dto::ScanOptions;
use clap::{Args, Parser, Subcommand};

/// Salvage - file metadata recovery
///
/// Reads NTFS, ext2/3/4 and APFS metadata from a device or image and lists
/// every live and deleted file record it can reconstruct. The source is
/// only ever opened read-only.
#[derive(Parser)]
#[command(name = "salvage")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Recover file metadata from raw filesystem volumes", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short = 'D', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Identify the filesystem on a device
    Detect {
        /// Path to device or image file (e.g., /dev/sdb1, disk.img)
        #[arg(short, long)]
        device: String,
    },

    /// Show device and volume information
    Info {
        /// Path to device or image file
        #[arg(short, long)]
        device: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Parse filesystem metadata and list recoverable records
    Scan(ScanArgs),
}

#[derive(Args)]
pub struct ScanArgs {
    /// Path to device or image file
    #[arg(short, long)]
    pub device: String,

    /// Only list records marked deleted
    #[arg(long)]
    pub deleted_only: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Parse on a single thread
    #[arg(long)]
    pub sequential: bool,

    /// Worker threads for parallel parsing (default: all cores)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Skip directory walks; records keep their ids but lose names
    #[arg(long)]
    pub no_names: bool,
}

impl ScanArgs {
    pub fn scan_options(&self) -> ScanOptions {
        let options = ScanOptions::new()
            .with_threads(self.threads)
            .with_name_resolution(!self.no_names)
            .with_deleted_only(self.deleted_only);
        if self.sequential {
            options.sequential()
        } else {
            options
        }
    }
}
