//! Block device reader trait
//!
//! Defines the interface for reading raw bytes from block devices and disk
//! images. Nothing behind this trait ever writes to the source.

use serde::Serialize;
use std::io;
use thiserror::Error;

/// Errors that can occur when opening or reading from a block device
#[derive(Error, Debug)]
pub enum BlockDeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device already open: {0}")]
    AlreadyOpen(String),

    #[error("Device is not open")]
    NotOpen,

    #[error("Read of {length} bytes at offset {offset} exceeds device size {device_size}")]
    OutOfRange {
        offset: u64,
        length: u64,
        device_size: u64,
    },

    #[error("Short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BlockDeviceError {
    /// Maps an `open()` failure onto the device error taxonomy
    pub fn from_open_error(path: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => {
                Self::PermissionDenied(format!("{} - raw device access needs elevated privileges", path))
            }
            _ => Self::Io(err),
        }
    }
}

/// What kind of object backs an open device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    /// A regular file holding a disk image
    ImageFile,
    /// A raw block or character device
    BlockDevice,
    /// An in-memory buffer
    Memory,
}

/// Information about an open block device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Path the device was opened with (after platform normalisation)
    pub path: String,
    /// Total size in bytes
    pub size: u64,
    /// Native sector size in bytes
    pub sector_size: u64,
    /// Always true; devices are opened read-only
    pub read_only: bool,
    /// What backs the device
    pub kind: DeviceKind,
}

impl DeviceInfo {
    /// Returns the number of whole sectors
    pub fn sector_count(&self) -> u64 {
        if self.sector_size == 0 {
            return 0;
        }
        self.size / self.sector_size
    }
}

/// Validates a read window against the device size.
///
/// A window is valid when `offset + length <= device_size`; the sum is
/// computed without overflow.
pub fn check_read_range(offset: u64, length: usize, device_size: u64) -> Result<(), BlockDeviceError> {
    let out_of_range = || BlockDeviceError::OutOfRange {
        offset,
        length: length as u64,
        device_size,
    };
    let end = offset.checked_add(length as u64).ok_or_else(out_of_range)?;
    if end > device_size {
        return Err(out_of_range());
    }
    Ok(())
}

/// Trait for reading raw data from block devices
///
/// Implementations fix the size and sector size when they are opened and
/// never re-query them. After [`close`](BlockDeviceReader::close) every read
/// fails with [`BlockDeviceError::NotOpen`].
///
/// # Example
///
/// ```ignore
/// let device = BlockDevice::open("/dev/sdb1")?;
/// let boot = device.read_at(0, 512)?;
/// device.close()?;
/// ```
pub trait BlockDeviceReader: Send + Sync {
    /// Returns information about the device
    fn device_info(&self) -> Result<DeviceInfo, BlockDeviceError>;

    /// Reads exactly `length` bytes at the specified byte offset
    ///
    /// Fails with `OutOfRange` when the window extends past the device end
    /// and with `ShortRead` when the platform delivers fewer bytes.
    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, BlockDeviceError>;

    /// Returns the device path
    fn path(&self) -> &str;

    /// Returns the total size in bytes
    fn size(&self) -> u64;

    /// Returns the native sector size in bytes
    fn sector_size(&self) -> u64;

    /// Returns whether the device still accepts reads
    fn is_open(&self) -> bool;

    /// Releases the handle. Closing twice is a no-op.
    fn close(&self) -> Result<(), BlockDeviceError>;

    /// Reads data in chunks, calling the callback for each chunk
    ///
    /// The last chunk is shortened to end exactly at the device end. The
    /// callback returns `false` to stop early. Returns the bytes delivered.
    fn read_chunks(
        &self,
        start_offset: u64,
        chunk_size: usize,
        callback: &mut dyn FnMut(u64, &[u8]) -> bool,
    ) -> Result<u64, BlockDeviceError> {
        let size = self.size();
        let mut offset = start_offset;
        let mut total_read = 0u64;

        while offset < size && chunk_size > 0 {
            let length = (chunk_size as u64).min(size - offset) as usize;
            let data = self.read_at(offset, length)?;

            if !callback(offset, &data) {
                break;
            }

            total_read += length as u64;
            offset += length as u64;
        }

        Ok(total_read)
    }
}

impl<T: BlockDeviceReader + ?Sized> BlockDeviceReader for std::sync::Arc<T> {
    fn device_info(&self) -> Result<DeviceInfo, BlockDeviceError> {
        (**self).device_info()
    }

    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, BlockDeviceError> {
        (**self).read_at(offset, length)
    }

    fn path(&self) -> &str {
        (**self).path()
    }

    fn size(&self) -> u64 {
        (**self).size()
    }

    fn sector_size(&self) -> u64 {
        (**self).sector_size()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close(&self) -> Result<(), BlockDeviceError> {
        (**self).close()
    }
}
