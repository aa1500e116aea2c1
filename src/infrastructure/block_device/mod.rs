//! Block device implementations
//!
//! [`BlockDevice::open`] is the entry point: image files are memory-mapped,
//! everything else (and images that cannot be mapped) goes through
//! positional reads on a raw handle.

mod memory_block_device;
mod mmap_block_device;
mod platform;
mod raw_block_device;
mod registry;

pub use memory_block_device::MemoryBlockDevice;
pub use mmap_block_device::MmapBlockDevice;
pub use platform::{DEFAULT_SECTOR_SIZE, normalize_device_path};
pub use raw_block_device::RawBlockDevice;

use crate::domain::repositories::{BlockDeviceError, BlockDeviceReader, DeviceInfo};
use tracing::debug;

/// A device opened by path
pub enum BlockDevice {
    Mmap(MmapBlockDevice),
    Raw(RawBlockDevice),
}

impl BlockDevice {
    /// Opens a device or image path read-only
    ///
    /// Fails with `NotFound`, `PermissionDenied`, or `AlreadyOpen` when
    /// another handle to the same path is still open.
    pub fn open(path: &str) -> Result<Self, BlockDeviceError> {
        let path = normalize_device_path(path);

        if platform::is_image_file(&path) {
            match MmapBlockDevice::open(&path) {
                Ok(device) => return Ok(BlockDevice::Mmap(device)),
                Err(e @ BlockDeviceError::AlreadyOpen(_)) => return Err(e),
                Err(e) => debug!("mmap of {} failed ({}), using positional reads", path, e),
            }
        }

        RawBlockDevice::open(&path).map(BlockDevice::Raw)
    }

    #[inline]
    pub fn is_mmap(&self) -> bool {
        matches!(self, BlockDevice::Mmap(_))
    }

    fn inner(&self) -> &dyn BlockDeviceReader {
        match self {
            BlockDevice::Mmap(d) => d,
            BlockDevice::Raw(d) => d,
        }
    }
}

impl BlockDeviceReader for BlockDevice {
    fn device_info(&self) -> Result<DeviceInfo, BlockDeviceError> {
        self.inner().device_info()
    }

    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, BlockDeviceError> {
        self.inner().read_at(offset, length)
    }

    fn path(&self) -> &str {
        self.inner().path()
    }

    fn size(&self) -> u64 {
        self.inner().size()
    }

    fn sector_size(&self) -> u64 {
        self.inner().sector_size()
    }

    fn is_open(&self) -> bool {
        self.inner().is_open()
    }

    fn close(&self) -> Result<(), BlockDeviceError> {
        self.inner().close()
    }
}
