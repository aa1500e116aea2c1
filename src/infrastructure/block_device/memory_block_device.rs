//! In-memory block device
//!
//! Serves reads from an owned buffer. Used for synthetic images and fuzzing;
//! a short-read window can be configured to exercise device fault paths.

use crate::domain::repositories::{
    BlockDeviceError, BlockDeviceReader, DeviceInfo, DeviceKind, check_read_range,
};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct MemoryBlockDevice {
    data: Vec<u8>,
    path: String,
    sector_size: u64,
    short_read: Option<Range<u64>>,
    open: AtomicBool,
}

impl MemoryBlockDevice {
    pub fn new(path: &str, data: Vec<u8>) -> Self {
        Self {
            data,
            path: path.to_string(),
            sector_size: 512,
            short_read: None,
            open: AtomicBool::new(true),
        }
    }

    pub fn with_sector_size(mut self, sector_size: u64) -> Self {
        self.sector_size = sector_size;
        self
    }

    /// Makes any read overlapping `range` stop at the range start
    pub fn with_short_read(mut self, range: Range<u64>) -> Self {
        self.short_read = Some(range);
        self
    }
}

impl BlockDeviceReader for MemoryBlockDevice {
    fn device_info(&self) -> Result<DeviceInfo, BlockDeviceError> {
        if !self.is_open() {
            return Err(BlockDeviceError::NotOpen);
        }
        Ok(DeviceInfo {
            path: self.path.clone(),
            size: self.size(),
            sector_size: self.sector_size,
            read_only: true,
            kind: DeviceKind::Memory,
        })
    }

    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, BlockDeviceError> {
        if !self.is_open() {
            return Err(BlockDeviceError::NotOpen);
        }
        check_read_range(offset, length, self.size())?;

        let end = offset + length as u64;
        if let Some(fault) = &self.short_read {
            if offset < fault.end && end > fault.start {
                return Err(BlockDeviceError::ShortRead {
                    offset,
                    expected: length,
                    actual: fault.start.saturating_sub(offset) as usize,
                });
            }
        }

        Ok(self.data[offset as usize..end as usize].to_vec())
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn sector_size(&self) -> u64 {
        self.sector_size
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<(), BlockDeviceError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_reads_and_bounds() {
        let device = MemoryBlockDevice::new("mem", (0..=255u8).collect());
        assert_eq!(device.read_at(10, 3).unwrap(), vec![10, 11, 12]);
        assert!(device.read_at(256, 0).unwrap().is_empty());
        assert!(matches!(
            device.read_at(250, 7),
            Err(BlockDeviceError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_memory_short_read_window() {
        let device = MemoryBlockDevice::new("mem", vec![0; 4096]).with_short_read(1000..1100);
        assert!(device.read_at(0, 512).is_ok());
        assert!(matches!(
            device.read_at(900, 200),
            Err(BlockDeviceError::ShortRead { actual: 100, .. })
        ));
    }
}
