//! Memory-mapped block device implementation
//!
//! Maps disk image files read-only. Concurrent readers share the mapping
//! without contention; closing drops the mapping.

use super::platform::DEFAULT_SECTOR_SIZE;
use super::registry::OpenGuard;
use crate::domain::repositories::{
    BlockDeviceError, BlockDeviceReader, DeviceInfo, DeviceKind, check_read_range,
};
use memmap2::Mmap;
use parking_lot::RwLock;
use std::fs::OpenOptions;
use std::io;
use tracing::debug;

struct MappedImage {
    mmap: Mmap,
    _guard: OpenGuard,
}

/// Memory-mapped image reader
///
/// # Example
///
/// ```ignore
/// let device = MmapBlockDevice::open("disk.img")?;
/// let data = device.read_at(0, 512)?;
/// ```
pub struct MmapBlockDevice {
    image: RwLock<Option<MappedImage>>,
    path: String,
    size: u64,
}

impl MmapBlockDevice {
    /// Maps an image file
    pub fn open(path: &str) -> Result<Self, BlockDeviceError> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| BlockDeviceError::from_open_error(path, e))?;

        let metadata = file.metadata()?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(BlockDeviceError::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{} is not a non-empty image file", path),
            )));
        }

        let guard = OpenGuard::acquire(path)?;

        // SAFETY: the mapping is read-only and the engine never writes to it
        let mmap = unsafe { Mmap::map(&file) }?;
        let size = mmap.len() as u64;

        debug!("mapped {} ({} bytes)", path, size);

        Ok(Self {
            image: RwLock::new(Some(MappedImage { mmap, _guard: guard })),
            path: path.to_string(),
            size,
        })
    }
}

impl BlockDeviceReader for MmapBlockDevice {
    fn device_info(&self) -> Result<DeviceInfo, BlockDeviceError> {
        if !self.is_open() {
            return Err(BlockDeviceError::NotOpen);
        }
        Ok(DeviceInfo {
            path: self.path.clone(),
            size: self.size,
            sector_size: DEFAULT_SECTOR_SIZE,
            read_only: true,
            kind: DeviceKind::ImageFile,
        })
    }

    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, BlockDeviceError> {
        let guard = self.image.read();
        let image = guard.as_ref().ok_or(BlockDeviceError::NotOpen)?;
        check_read_range(offset, length, self.size)?;

        let start = offset as usize;
        Ok(image.mmap[start..start + length].to_vec())
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn sector_size(&self) -> u64 {
        DEFAULT_SECTOR_SIZE
    }

    fn is_open(&self) -> bool {
        self.image.read().is_some()
    }

    fn close(&self) -> Result<(), BlockDeviceError> {
        if self.image.write().take().is_some() {
            debug!("unmapped {}", self.path);
        }
        Ok(())
    }
}
