//! Raw block device implementation
//!
//! Positional reads against block devices (`/dev/sdX`, `/dev/diskN`,
//! `\\.\C:`) and image files. Reads on real devices are widened to whole
//! sectors, since some platforms reject unaligned raw I/O.

use super::platform::{self, Geometry};
use super::registry::OpenGuard;
use crate::domain::repositories::{
    BlockDeviceError, BlockDeviceReader, DeviceInfo, DeviceKind, check_read_range,
};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io;
use tracing::debug;

struct OpenHandle {
    file: File,
    _guard: OpenGuard,
}

/// Raw block device reader
///
/// # Example
///
/// ```ignore
/// let device = RawBlockDevice::open("/dev/sda")?;
/// let data = device.read_at(0, 512)?;
/// ```
pub struct RawBlockDevice {
    handle: RwLock<Option<OpenHandle>>,
    path: String,
    geometry: Geometry,
}

impl RawBlockDevice {
    /// Opens the device read-only and fixes its geometry
    pub fn open(path: &str) -> Result<Self, BlockDeviceError> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| BlockDeviceError::from_open_error(path, e))?;

        let guard = OpenGuard::acquire(path)?;
        let geometry = platform::query_geometry(&file, path)?;
        platform::advise_sequential(&file);

        debug!(
            "opened {} ({} bytes, {}-byte sectors, {:?})",
            path, geometry.size, geometry.sector_size, geometry.kind
        );

        Ok(Self {
            handle: RwLock::new(Some(OpenHandle {
                file,
                _guard: guard,
            })),
            path: path.to_string(),
            geometry,
        })
    }

    /// Returns the sector-aligned span covering `[offset, offset + length)`,
    /// clamped to the device end
    fn aligned_span(&self, offset: u64, length: usize) -> (u64, u64) {
        let end = offset + length as u64;
        if self.geometry.kind != DeviceKind::BlockDevice {
            return (offset, end);
        }
        let sector = self.geometry.sector_size.max(1);
        let start = offset - offset % sector;
        let aligned_end = end.div_ceil(sector).saturating_mul(sector).min(self.geometry.size);
        (start, aligned_end.max(end))
    }
}

fn fill(file: &File, mut offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match platform::read_at(file, &mut buf[filled..], offset) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl BlockDeviceReader for RawBlockDevice {
    fn device_info(&self) -> Result<DeviceInfo, BlockDeviceError> {
        if !self.is_open() {
            return Err(BlockDeviceError::NotOpen);
        }
        Ok(DeviceInfo {
            path: self.path.clone(),
            size: self.geometry.size,
            sector_size: self.geometry.sector_size,
            read_only: true,
            kind: self.geometry.kind,
        })
    }

    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, BlockDeviceError> {
        let guard = self.handle.read();
        let handle = guard.as_ref().ok_or(BlockDeviceError::NotOpen)?;
        check_read_range(offset, length, self.geometry.size)?;

        if length == 0 {
            return Ok(Vec::new());
        }

        let (start, end) = self.aligned_span(offset, length);
        let mut buffer = vec![0u8; (end - start) as usize];
        let filled = fill(&handle.file, start, &mut buffer)?;

        let head = (offset - start) as usize;
        if filled < head + length {
            return Err(BlockDeviceError::ShortRead {
                offset,
                expected: length,
                actual: filled.saturating_sub(head),
            });
        }

        buffer.truncate(head + length);
        buffer.drain(..head);
        Ok(buffer)
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> u64 {
        self.geometry.size
    }

    fn sector_size(&self) -> u64 {
        self.geometry.sector_size
    }

    fn is_open(&self) -> bool {
        self.handle.read().is_some()
    }

    fn close(&self) -> Result<(), BlockDeviceError> {
        if self.handle.write().take().is_some() {
            debug!("closed {}", self.path);
        }
        Ok(())
    }
}
