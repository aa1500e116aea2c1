//! Recovery session use case
//!
//! Opens a device, identifies its filesystem and runs one metadata parse
//! pass into a caller-owned [`RecoveryCatalog`]. Every fatal error is tagged
//! with the stage it came from.

use crate::application::dto::{RecoveryReport, ScanOptions};
use crate::domain::entities::{CancellationToken, CatalogError, RecoveryCatalog, VolumeInfo};
use crate::domain::repositories::{
    BlockDeviceError, BlockDeviceReader, DeviceInfo, FileSystemError, FileSystemParser,
    FileSystemType, ProgressCallback, ScanControl,
};
use crate::domain::services::FormatDetector;
use crate::infrastructure::block_device::BlockDevice;
use crate::infrastructure::file_systems::open_parser;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

/// Where in the pipeline a fatal error happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryStage {
    Open,
    Detect,
    ParseRoot,
    ParseRecords,
}

impl RecoveryStage {
    pub fn label(&self) -> &'static str {
        match self {
            RecoveryStage::Open => "open",
            RecoveryStage::Detect => "detect",
            RecoveryStage::ParseRoot => "parse-root",
            RecoveryStage::ParseRecords => "parse-records",
        }
    }
}

impl fmt::Display for RecoveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fatal errors of a recovery session
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("[open] cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: BlockDeviceError,
    },

    #[error("[detect] {path}: no supported filesystem (detected {found})")]
    Detect { path: String, found: FileSystemType },

    #[error("[parse-root] {filesystem}: {source}")]
    ParseRoot {
        filesystem: FileSystemType,
        #[source]
        source: FileSystemError,
    },

    #[error("[parse-records] {filesystem}: {source}")]
    ParseRecords {
        filesystem: FileSystemType,
        #[source]
        source: FileSystemError,
    },

    /// The catalog handed to [`RecoverySession::run`] cannot take a new pass
    #[error("[parse-records] {0}")]
    Catalog(#[from] CatalogError),
}

impl RecoveryError {
    pub fn stage(&self) -> RecoveryStage {
        match self {
            RecoveryError::Open { .. } => RecoveryStage::Open,
            RecoveryError::Detect { .. } => RecoveryStage::Detect,
            RecoveryError::ParseRoot { .. } => RecoveryStage::ParseRoot,
            RecoveryError::ParseRecords { .. } | RecoveryError::Catalog(_) => {
                RecoveryStage::ParseRecords
            }
        }
    }
}

/// One opened device with a detected, parseable filesystem
pub struct RecoverySession {
    device: Arc<dyn BlockDeviceReader>,
    info: DeviceInfo,
    filesystem: FileSystemType,
}

impl RecoverySession {
    /// Opens `path` read-only and detects its filesystem
    pub fn open(path: &str) -> Result<Self, RecoveryError> {
        let device = BlockDevice::open(path).map_err(|source| RecoveryError::Open {
            path: path.to_string(),
            source,
        })?;
        Self::from_device(Arc::new(device))
    }

    /// Wraps an already open device
    pub fn from_device(device: Arc<dyn BlockDeviceReader>) -> Result<Self, RecoveryError> {
        let info = device.device_info().map_err(|source| RecoveryError::Open {
            path: device.path().to_string(),
            source,
        })?;

        let filesystem = FormatDetector::new().detect(device.as_ref());
        if !filesystem.has_parser() {
            return Err(RecoveryError::Detect {
                path: info.path,
                found: filesystem,
            });
        }
        info!("{}: detected {} ({} bytes)", info.path, filesystem, info.size);

        Ok(Self {
            device,
            info,
            filesystem,
        })
    }

    pub fn filesystem(&self) -> FileSystemType {
        self.filesystem
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    fn parser(&self) -> Result<Box<dyn FileSystemParser>, RecoveryError> {
        open_parser(self.filesystem, Arc::clone(&self.device)).map_err(|source| {
            RecoveryError::ParseRoot {
                filesystem: self.filesystem,
                source,
            }
        })
    }

    /// Validates the root metadata and returns volume-level facts
    pub fn volume_info(&self) -> Result<VolumeInfo, RecoveryError> {
        self.parser()?
            .volume_info()
            .map_err(|source| RecoveryError::ParseRoot {
                filesystem: self.filesystem,
                source,
            })
    }

    /// Runs one parse pass into `catalog` and seals it
    ///
    /// The catalog must be fresh. Cancellation through `cancel` ends the
    /// pass with a cancelled outcome; the records gathered so far stay in
    /// the catalog.
    pub fn run(
        &self,
        catalog: &RecoveryCatalog,
        options: &ScanOptions,
        cancel: &CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> Result<RecoveryReport, RecoveryError> {
        catalog.ensure_fresh()?;

        let parser = self.parser()?;
        let volume = parser
            .volume_info()
            .map_err(|source| RecoveryError::ParseRoot {
                filesystem: self.filesystem,
                source,
            })?;

        let mut control = ScanControl::new()
            .with_cancel(cancel.clone())
            .with_parallel(options.parallel)
            .with_name_resolution(options.resolve_names);
        if let Some(progress) = progress {
            control = control.with_progress(progress);
        }

        let start_time = Instant::now();
        let result = if options.parallel {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(options.thread_count)
                .build()
            {
                Ok(pool) => pool.install(|| parser.scan(catalog, &control)),
                Err(e) => {
                    warn!("cannot build a {}-thread pool ({}), using the global pool", options.thread_count, e);
                    parser.scan(catalog, &control)
                }
            }
        } else {
            parser.scan(catalog, &control)
        };
        catalog.seal();

        let outcome = result.map_err(|source| RecoveryError::ParseRecords {
            filesystem: self.filesystem,
            source,
        })?;

        let report = RecoveryReport {
            device: self.info.clone(),
            filesystem: self.filesystem,
            volume,
            outcome,
            total_found: catalog.total_found(),
            total_deleted: catalog.total_deleted(),
            discarded: catalog.discarded(),
            skipped_segments: catalog.skipped_segments(),
            duration: start_time.elapsed(),
        };
        info!("{}", report.summary());
        Ok(report)
    }

    /// Closes the underlying device
    pub fn close(&self) -> Result<(), BlockDeviceError> {
        self.device.close()
    }
}
