//! NTFS filesystem parser implementation
//!
//! Parses the NTFS boot sector, resolves the Master File Table from the
//! runlist of its own record 0, and classifies every MFT record. A record
//! whose in-use flag is clear is reported as deleted.

use super::boot_sector::{BOOT_SECTOR_SIZE, NtfsBootSector};
use super::record::{DataAttr, MftRecord, RecordClass, parse_record};
use crate::domain::entities::{
    Extent, FileRecord, RecordLocator, RecoveryCatalog, ScanOutcome, VolumeInfo, push_coalesced,
};
use crate::domain::repositories::{
    BlockDeviceError, BlockDeviceReader, FileSystemError, FileSystemParser, FileSystemType,
    ScanControl,
};
use crate::infrastructure::file_systems::{SegmentScan, Slot, drive_segments};
use std::sync::Arc;
use tracing::{info, warn};

/// Boot sector offset
const BOOT_SECTOR_OFFSET: u64 = 0;

/// Record number of `$Volume`
const VOLUME_RECORD: u64 = 3;

/// Records per scan segment
const SEGMENT_RECORDS: u64 = 1024;

/// A stretch of the MFT stream mapped onto the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MftRun {
    /// Byte offset within the MFT stream
    logical: u64,
    /// Byte offset on the device
    physical: u64,
    length: u64,
}

/// Logical-to-physical map of the MFT
#[derive(Debug, Clone)]
struct MftLayout {
    runs: Vec<MftRun>,
    record_count: u64,
}

impl MftLayout {
    /// Returns the physical pieces covering `[logical, logical + length)`,
    /// or `None` when part of the window is unmapped
    fn pieces(&self, logical: u64, length: u64) -> Option<Vec<(u64, usize)>> {
        let mut pieces = Vec::new();
        let mut position = logical;
        let end = logical.checked_add(length)?;

        while position < end {
            let run = self
                .runs
                .iter()
                .find(|r| r.logical <= position && position < r.logical.saturating_add(r.length))?;
            let within = position - run.logical;
            let take = (run.length - within).min(end - position);
            pieces.push((run.physical + within, take as usize));
            position += take;
        }
        Some(pieces)
    }
}

/// NTFS filesystem parser
pub struct NtfsParser<R: BlockDeviceReader + ?Sized> {
    device: Arc<R>,
    boot_sector: NtfsBootSector,
    layout: MftLayout,
}

impl<R: BlockDeviceReader + ?Sized> NtfsParser<R> {
    /// Creates a new NTFS parser, validating the boot sector and resolving
    /// the MFT location
    pub fn new(device: Arc<R>) -> Result<Self, FileSystemError> {
        let device_size = device.size();
        let data = device
            .read_at(BOOT_SECTOR_OFFSET, BOOT_SECTOR_SIZE)
            .map_err(|e| match e {
                BlockDeviceError::OutOfRange { .. } => FileSystemError::DeviceTooSmall {
                    declared: BOOT_SECTOR_SIZE as u64,
                    actual: device_size,
                },
                other => other.into(),
            })?;

        let boot_sector = NtfsBootSector::parse(&data)?;

        let volume_size = boot_sector.volume_size().unwrap_or(u64::MAX);
        if volume_size > device_size {
            return Err(FileSystemError::DeviceTooSmall {
                declared: volume_size,
                actual: device_size,
            });
        }

        let mft_offset = boot_sector.mft_offset().unwrap_or(u64::MAX);
        if mft_offset.saturating_add(boot_sector.record_size) > device_size {
            return Err(FileSystemError::LocatorUnreachable {
                structure: "MFT",
                offset: mft_offset,
                device_size,
            });
        }

        let layout = Self::resolve_layout(device.as_ref(), &boot_sector, mft_offset, volume_size)?;

        info!(
            "NTFS parser: {} bytes, cluster {}, MFT at {} ({} records of {} bytes)",
            volume_size,
            boot_sector.cluster_size,
            mft_offset,
            layout.record_count,
            boot_sector.record_size
        );

        Ok(Self {
            device,
            boot_sector,
            layout,
        })
    }

    /// Maps the MFT stream from the runlist of `$MFT`, its mirror, or a
    /// contiguous fallback
    fn resolve_layout(
        device: &R,
        boot_sector: &NtfsBootSector,
        mft_offset: u64,
        volume_size: u64,
    ) -> Result<MftLayout, FileSystemError> {
        let device_size = device.size();
        let record_size = boot_sector.record_size;

        let mut candidates = vec![("MFT", mft_offset)];
        if let Some(mirror) = boot_sector.mirror_offset() {
            if mirror.saturating_add(record_size) <= device_size && mirror != mft_offset {
                candidates.push(("MFT mirror", mirror));
            }
        }

        for (source, offset) in candidates {
            let mut raw = device.read_at(offset, record_size as usize)?;
            let RecordClass::Parsed(record) = parse_record(&mut raw) else {
                warn!("{} record 0 at {} is unusable", source, offset);
                continue;
            };
            let Some(DataAttr::NonResident { real_size, runs }) = record.data else {
                warn!("{} record 0 has no usable $DATA runlist", source);
                continue;
            };

            let mut mapped = Vec::new();
            let mut logical = 0u64;
            for (index, run) in runs.iter().enumerate() {
                let Some((length, next)) = run
                    .clusters
                    .checked_mul(boot_sector.cluster_size)
                    .and_then(|length| logical.checked_add(length).map(|next| (length, next)))
                else {
                    warn!("{} runlist overflows the stream at run {}", source, index);
                    break;
                };
                if let Some(lcn) = run.lcn {
                    let physical = lcn.saturating_mul(boot_sector.cluster_size);
                    if physical < device_size {
                        mapped.push(MftRun {
                            logical,
                            physical,
                            length: length.min(device_size - physical),
                        });
                    } else {
                        warn!("MFT run at {} lies outside the device", physical);
                    }
                }
                logical = next;
            }

            let mapped_end = mapped
                .last()
                .map(|r| r.logical.saturating_add(r.length))
                .unwrap_or(0);
            if mapped.is_empty() {
                continue;
            }
            return Ok(MftLayout {
                runs: mapped,
                record_count: real_size.min(mapped_end) / record_size,
            });
        }

        warn!("falling back to a contiguous MFT at {}", mft_offset);
        let end = volume_size.min(device_size);
        let length = end.saturating_sub(mft_offset);
        Ok(MftLayout {
            runs: vec![MftRun {
                logical: 0,
                physical: mft_offset,
                length,
            }],
            record_count: length / record_size,
        })
    }

    /// Reads the raw bytes of one record slot, `None` when unmapped
    fn read_slot(&self, slot: u64) -> Result<Option<(u64, Vec<u8>)>, FileSystemError> {
        let record_size = self.boot_sector.record_size;
        let Some(pieces) = slot
            .checked_mul(record_size)
            .and_then(|logical| self.layout.pieces(logical, record_size))
        else {
            return Ok(None);
        };

        let mut raw = Vec::with_capacity(record_size as usize);
        for &(offset, length) in &pieces {
            raw.extend(self.device.read_at(offset, length)?);
        }
        Ok(Some((pieces[0].0, raw)))
    }

    fn classify(&self, slot: u64) -> Result<Slot, FileSystemError> {
        let Some((byte_offset, mut raw)) = self.read_slot(slot)? else {
            return Ok(Slot::Skipped);
        };

        Ok(match parse_record(&mut raw) {
            RecordClass::Empty => Slot::Empty,
            RecordClass::Extension => Slot::Skipped,
            RecordClass::Invalid(reason) => Slot::invalid(slot, reason),
            RecordClass::Parsed(record) => {
                Slot::Record(self.to_file_record(slot, byte_offset, record))
            }
        })
    }

    fn to_file_record(&self, slot: u64, byte_offset: u64, record: MftRecord) -> FileRecord {
        let cluster_size = self.boot_sector.cluster_size;

        let mut extents = Vec::new();
        let size = match &record.data {
            Some(DataAttr::Resident { offset, length }) => {
                push_coalesced(&mut extents, Extent::new(byte_offset + *offset as u64, *length));
                *length
            }
            Some(DataAttr::NonResident { real_size, runs }) => {
                for run in runs {
                    if let Some(lcn) = run.lcn {
                        push_coalesced(
                            &mut extents,
                            Extent::new(
                                lcn.saturating_mul(cluster_size),
                                run.clusters.saturating_mul(cluster_size),
                            ),
                        );
                    }
                }
                *real_size
            }
            None if record.is_directory => 0,
            None => record.file_name.as_ref().map(|f| f.real_size).unwrap_or(0),
        };

        let (created, modified) = if record.has_standard_information {
            (record.created, record.modified)
        } else {
            record
                .file_name
                .as_ref()
                .map(|f| (f.created, f.modified))
                .unwrap_or((None, None))
        };

        let (name, parent) = match record.file_name {
            Some(file_name) => (Some(file_name.name), Some(file_name.parent)),
            None => (None, None),
        };

        FileRecord::new(slot, RecordLocator::new(slot, byte_offset))
            .with_name(name)
            .with_parent(parent)
            .with_size(size)
            .with_times(created, modified)
            .with_directory(record.is_directory)
            .with_deleted(!record.in_use)
            .with_extents(extents)
    }

    fn scan_range(&self, first: u64, control: &ScanControl) -> Result<SegmentScan, FileSystemError> {
        let last = (first + SEGMENT_RECORDS).min(self.layout.record_count);
        let mut segment = SegmentScan::default();

        for slot in first..last {
            if control.is_cancelled() {
                segment.cancelled = true;
                break;
            }
            segment.slots.push(self.classify(slot)?);
        }
        Ok(segment)
    }
}

impl<R: BlockDeviceReader + ?Sized> FileSystemParser for NtfsParser<R> {
    fn filesystem_type(&self) -> FileSystemType {
        FileSystemType::Ntfs
    }

    fn volume_info(&self) -> Result<VolumeInfo, FileSystemError> {
        let label = match self.read_slot(VOLUME_RECORD)? {
            Some((_, mut raw)) => match parse_record(&mut raw) {
                RecordClass::Parsed(record) => record.volume_name,
                _ => None,
            },
            None => None,
        };

        Ok(VolumeInfo {
            filesystem: FileSystemType::Ntfs.name().to_string(),
            label,
            uuid: Some(format!("{:016X}", self.boot_sector.volume_serial)),
            block_size: self.boot_sector.cluster_size,
            declared_size: self.boot_sector.volume_size().unwrap_or(0),
            ..Default::default()
        })
    }

    fn slot_count(&self) -> u64 {
        self.layout.record_count
    }

    fn scan(
        &self,
        catalog: &RecoveryCatalog,
        control: &ScanControl,
    ) -> Result<ScanOutcome, FileSystemError> {
        let tracker = control.tracker(self.layout.record_count);
        let segments: Vec<u64> = (0..self.layout.record_count)
            .step_by(SEGMENT_RECORDS as usize)
            .collect();

        let cancelled = drive_segments(&segments, catalog, control, &tracker, |&first| {
            self.scan_range(first, control)
        })?;

        let outcome = tracker.finish(cancelled);
        info!(
            "NTFS scan {}: {} records ({} deleted), {} discarded",
            outcome,
            catalog.total_found(),
            catalog.total_deleted(),
            catalog.discarded()
        );
        Ok(outcome)
    }
}
