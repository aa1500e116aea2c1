//! File system parsers
//!
//! One parser per supported on-disk format. They share the slot
//! classification in [`Slot`] and the segment driver in [`drive_segments`],
//! which handles ordering, cancellation and optional rayon fan-out.

pub mod apfs;
pub mod ext4;
pub mod le;
pub mod ntfs;

pub use apfs::ApfsParser;
pub use ext4::Ext4Parser;
pub use ntfs::NtfsParser;

use crate::domain::entities::{FileRecord, RecoveryCatalog};
use crate::domain::repositories::{
    BlockDeviceReader, FileSystemError, FileSystemParser, FileSystemType, ProgressTracker,
    ScanControl,
};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

/// Classification of one metadata slot
#[derive(Debug)]
pub(crate) enum Slot {
    /// Never-used or zeroed slot
    Empty,
    /// Bytes failed structural validation
    Invalid { slot: u64, reason: String },
    /// Well-formed but not a file of its own
    Skipped,
    Record(FileRecord),
}

impl Slot {
    pub(crate) fn invalid(slot: u64, reason: impl Into<String>) -> Self {
        Slot::Invalid {
            slot,
            reason: reason.into(),
        }
    }
}

/// Classified slots of one locator segment, in locator order
#[derive(Debug, Default)]
pub(crate) struct SegmentScan {
    pub slots: Vec<Slot>,
    /// The segment stopped early because cancellation was requested
    pub cancelled: bool,
    /// Unusable parts of the segment (the whole segment, or nodes inside it)
    pub skipped: u64,
}

impl SegmentScan {
    pub(crate) fn skipped() -> Self {
        Self {
            skipped: 1,
            ..Default::default()
        }
    }
}

fn commit(
    segment: SegmentScan,
    catalog: &RecoveryCatalog,
    tracker: &ProgressTracker<'_>,
) -> Result<bool, FileSystemError> {
    for _ in 0..segment.skipped {
        catalog.record_skipped_segment()?;
    }
    for slot in segment.slots {
        match slot {
            Slot::Record(record) => {
                tracker.emitted(record.is_deleted());
                catalog.append(record)?;
            }
            Slot::Invalid { slot, reason } => {
                debug!("discarding slot {}: {}", slot, reason);
                catalog.record_discarded()?;
            }
            Slot::Empty | Slot::Skipped => {}
        }
        tracker.slot_done();
    }
    Ok(segment.cancelled)
}

/// Scans every segment and commits the results in segment order
///
/// Returns `true` when the pass was cancelled. In parallel mode segments
/// are scanned in waves on the current rayon pool; slots of a wave are
/// committed only after the whole wave is classified.
pub(crate) fn drive_segments<S, F>(
    segments: &[S],
    catalog: &RecoveryCatalog,
    control: &ScanControl,
    tracker: &ProgressTracker<'_>,
    scan_segment: F,
) -> Result<bool, FileSystemError>
where
    S: Sync,
    F: Fn(&S) -> Result<SegmentScan, FileSystemError> + Sync,
{
    if control.parallel() {
        let wave = rayon::current_num_threads().max(1) * 2;
        for chunk in segments.chunks(wave) {
            if control.is_cancelled() {
                return Ok(true);
            }
            let results: Vec<Result<SegmentScan, FileSystemError>> =
                chunk.par_iter().map(&scan_segment).collect();
            for result in results {
                if commit(result?, catalog, tracker)? {
                    return Ok(true);
                }
            }
        }
    } else {
        for segment in segments {
            if control.is_cancelled() {
                return Ok(true);
            }
            if commit(scan_segment(segment)?, catalog, tracker)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Builds the metadata parser for a detected filesystem
///
/// Root-block validation happens here; a returned parser is ready to scan.
pub fn open_parser(
    filesystem: FileSystemType,
    device: Arc<dyn BlockDeviceReader>,
) -> Result<Box<dyn FileSystemParser>, FileSystemError> {
    match filesystem {
        FileSystemType::Ntfs => Ok(Box::new(NtfsParser::new(device)?)),
        FileSystemType::Ext => Ok(Box::new(Ext4Parser::new(device)?)),
        FileSystemType::Apfs => Ok(Box::new(ApfsParser::new(device)?)),
        other => Err(FileSystemError::Unsupported(other)),
    }
}
