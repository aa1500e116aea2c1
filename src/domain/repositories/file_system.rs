//! File system parser trait
//!
//! Defines the shared contract of the per-format metadata parsers: validate
//! the root block on construction, then walk the locator structure and push
//! every classified record into a [`RecoveryCatalog`].

use super::block_device::BlockDeviceError;
use crate::domain::entities::{
    CancellationToken, CatalogError, FileRecord, RecoveryCatalog, ScanOutcome, ScanProgress,
    VolumeInfo,
};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Filesystem families recognised by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileSystemType {
    /// Windows NTFS
    Ntfs,
    /// Apple APFS container
    Apfs,
    /// Linux ext2/3/4
    Ext,
    /// FAT12/16/32
    Fat,
    /// Apple HFS+ / HFSX
    Hfs,
    /// No signature matched
    Unknown,
}

impl FileSystemType {
    /// Returns a human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            FileSystemType::Ntfs => "NTFS",
            FileSystemType::Apfs => "APFS",
            FileSystemType::Ext => "ext4",
            FileSystemType::Fat => "FAT32",
            FileSystemType::Hfs => "HFS+",
            FileSystemType::Unknown => "Unknown",
        }
    }

    /// Returns whether a metadata parser exists for this type
    pub fn has_parser(&self) -> bool {
        matches!(
            self,
            FileSystemType::Ntfs | FileSystemType::Apfs | FileSystemType::Ext
        )
    }
}

impl fmt::Display for FileSystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FileSystemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ntfs" => Ok(FileSystemType::Ntfs),
            "apfs" => Ok(FileSystemType::Apfs),
            "ext" | "ext2" | "ext3" | "ext4" => Ok(FileSystemType::Ext),
            "fat" | "fat12" | "fat16" | "fat32" | "vfat" => Ok(FileSystemType::Fat),
            "hfs" | "hfs+" | "hfsx" => Ok(FileSystemType::Hfs),
            "unknown" => Ok(FileSystemType::Unknown),
            other => Err(format!("unknown filesystem label '{}'", other)),
        }
    }
}

/// Errors that can occur when parsing a file system
#[derive(Error, Debug)]
pub enum FileSystemError {
    #[error("Invalid root block: {0}")]
    InvalidRootBlock(String),

    #[error("Device too small: volume declares {declared} bytes but device has {actual}")]
    DeviceTooSmall { declared: u64, actual: u64 },

    #[error("{structure} at offset {offset} lies outside the device ({device_size} bytes)")]
    LocatorUnreachable {
        structure: &'static str,
        offset: u64,
        device_size: u64,
    },

    #[error("No metadata parser for {0}")]
    Unsupported(FileSystemType),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Device(#[from] BlockDeviceError),
}

/// Progress callback type
pub type ProgressCallback = Box<dyn Fn(&ScanProgress) + Send + Sync>;

/// Slots between two progress callbacks
const PROGRESS_INTERVAL: u64 = 256;

/// Knobs and hooks for one parse pass
pub struct ScanControl {
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
    parallel: bool,
    resolve_names: bool,
}

impl Default for ScanControl {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            progress: None,
            parallel: false,
            resolve_names: true,
        }
    }
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Allows parsers to fan independent locator segments out to rayon
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_name_resolution(mut self, resolve_names: bool) -> Self {
        self.resolve_names = resolve_names;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn parallel(&self) -> bool {
        self.parallel
    }

    pub fn resolve_names(&self) -> bool {
        self.resolve_names
    }

    /// Starts progress accounting for a pass over `slots_total` slots
    pub(crate) fn tracker(&self, slots_total: u64) -> ProgressTracker<'_> {
        ProgressTracker {
            control: self,
            slots_total,
            slots_done: AtomicU64::new(0),
            found: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
        }
    }
}

/// Thread-safe progress counters for a running pass
pub(crate) struct ProgressTracker<'a> {
    control: &'a ScanControl,
    slots_total: u64,
    slots_done: AtomicU64,
    found: AtomicU64,
    deleted: AtomicU64,
}

impl ProgressTracker<'_> {
    pub(crate) fn slot_done(&self) {
        let done = self.slots_done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % PROGRESS_INTERVAL == 0 {
            self.report();
        }
    }

    pub(crate) fn emitted(&self, deleted: bool) {
        self.found.fetch_add(1, Ordering::Relaxed);
        if deleted {
            self.deleted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn processed(&self) -> u64 {
        self.slots_done.load(Ordering::Relaxed)
    }

    /// Finishes the pass, reporting final progress
    pub(crate) fn finish(&self, cancelled: bool) -> ScanOutcome {
        self.report();
        let processed = self.processed();
        if cancelled {
            ScanOutcome::Cancelled { processed }
        } else {
            ScanOutcome::Completed { processed }
        }
    }

    fn report(&self) {
        if let Some(callback) = &self.control.progress {
            callback(&ScanProgress {
                slots_total: self.slots_total,
                slots_done: self.slots_done.load(Ordering::Relaxed),
                found: self.found.load(Ordering::Relaxed),
                deleted: self.deleted.load(Ordering::Relaxed),
            });
        }
    }
}

/// Trait for parsing file system metadata
///
/// Constructors of implementing types read and validate the root metadata
/// block, so a parser that exists has already passed root validation.
/// [`scan`](FileSystemParser::scan) then walks the locator:
///
/// * structurally invalid slots are counted with
///   [`RecoveryCatalog::record_discarded`] and skipped,
/// * valid slots are appended with `is_deleted` set by the format's
///   deletion predicate,
/// * cancellation is polled between slots and yields
///   [`ScanOutcome::Cancelled`], never an error.
///
/// # Example
///
/// ```ignore
/// let parser = Ext4Parser::new(device)?;
/// let catalog = RecoveryCatalog::new();
/// let outcome = parser.scan(&catalog, &ScanControl::new())?;
/// println!("{} records, {}", catalog.total_found(), outcome);
/// ```
pub trait FileSystemParser: Send + Sync {
    /// Returns the filesystem type this parser handles
    fn filesystem_type(&self) -> FileSystemType;

    /// Returns volume-level facts from the root block
    fn volume_info(&self) -> Result<VolumeInfo, FileSystemError>;

    /// Upper bound on the record slots a scan visits, already clamped to the
    /// device size
    fn slot_count(&self) -> u64;

    /// Walks the metadata and appends every valid record to `catalog`
    fn scan(
        &self,
        catalog: &RecoveryCatalog,
        control: &ScanControl,
    ) -> Result<ScanOutcome, FileSystemError>;

    /// Runs a full sequential scan into a private catalog
    fn parse(&self) -> Result<Vec<FileRecord>, FileSystemError> {
        let catalog = RecoveryCatalog::new();
        self.scan(&catalog, &ScanControl::new())?;
        catalog.seal();
        Ok(catalog.snapshot().records)
    }
}
