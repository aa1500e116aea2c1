//! Filesystem format detection
//!
//! Checks fixed offsets for format signatures in priority order. A check
//! whose read fails (device too small, I/O error) simply does not match.

use crate::domain::repositories::{BlockDeviceReader, FileSystemType};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::{trace, warn};

/// APFS container superblock magic "NXSB", little-endian at offset 0
pub const APFS_CONTAINER_MAGIC: u32 = 0x4253_584E;

/// APFS volume superblock magic "APSB"; a bare volume image starts with it
pub const APFS_VOLUME_MAGIC: u32 = 0x4253_5041;

/// NTFS OEM ID at offset 3
pub const NTFS_OEM_ID: [u8; 8] = *b"NTFS    ";

/// ext2/3/4 superblock magic at 1024 + 56
pub const EXT_SUPER_MAGIC: u16 = 0xEF53;
const EXT_MAGIC_OFFSET: u64 = 1080;

/// Boot sector signature at offset 510
pub const BOOT_SIGNATURE: u16 = 0xAA55;

/// HFS+ ("H+") and HFSX ("HX") volume header signatures at offset 1024
pub const HFS_PLUS_MAGIC: u16 = 0x482B;
pub const HFSX_MAGIC: u16 = 0x4858;

type SignatureCheck = fn(&dyn BlockDeviceReader) -> bool;

/// Signature checks in priority order; the first match wins
const SIGNATURES: [(FileSystemType, SignatureCheck); 5] = [
    (FileSystemType::Apfs, is_apfs),
    (FileSystemType::Ntfs, is_ntfs),
    (FileSystemType::Ext, is_ext),
    (FileSystemType::Fat, is_fat),
    (FileSystemType::Hfs, is_hfs),
];

fn read(device: &dyn BlockDeviceReader, offset: u64, length: usize) -> Option<Vec<u8>> {
    device.read_at(offset, length).ok()
}

fn is_apfs(device: &dyn BlockDeviceReader) -> bool {
    read(device, 0, 4).is_some_and(|b| {
        let magic = LittleEndian::read_u32(&b);
        magic == APFS_CONTAINER_MAGIC || magic == APFS_VOLUME_MAGIC
    })
}

fn is_ntfs(device: &dyn BlockDeviceReader) -> bool {
    read(device, 3, NTFS_OEM_ID.len()).is_some_and(|b| b == NTFS_OEM_ID)
}

fn is_ext(device: &dyn BlockDeviceReader) -> bool {
    read(device, EXT_MAGIC_OFFSET, 2).is_some_and(|b| LittleEndian::read_u16(&b) == EXT_SUPER_MAGIC)
}

fn is_fat(device: &dyn BlockDeviceReader) -> bool {
    // A bare MBR also ends in 0x55AA; FAT boot sectors start with a jump.
    // NTFS boot sectors share both, so its OEM id rules FAT out.
    read(device, 0, 512).is_some_and(|b| {
        LittleEndian::read_u16(&b[510..512]) == BOOT_SIGNATURE
            && matches!(b[0], 0xEB | 0xE9)
            && b[3..11] != NTFS_OEM_ID
    })
}

fn is_hfs(device: &dyn BlockDeviceReader) -> bool {
    read(device, 1024, 2).is_some_and(|b| {
        let signature = BigEndian::read_u16(&b);
        signature == HFS_PLUS_MAGIC || signature == HFSX_MAGIC
    })
}

/// Identifies the filesystem on a block device
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatDetector;

impl FormatDetector {
    pub fn new() -> Self {
        Self
    }

    /// Returns the highest-priority matching type, or `Unknown`
    pub fn detect(&self, device: &dyn BlockDeviceReader) -> FileSystemType {
        let matches = self.detect_all(device);

        if matches.len() > 1 {
            warn!(
                "{} carries several filesystem signatures ({}); using {}",
                device.path(),
                matches.iter().map(|t| t.name()).collect::<Vec<_>>().join(", "),
                matches[0]
            );
        }

        matches.first().copied().unwrap_or(FileSystemType::Unknown)
    }

    /// Returns every matching type in priority order
    pub fn detect_all(&self, device: &dyn BlockDeviceReader) -> Vec<FileSystemType> {
        SIGNATURES
            .iter()
            .filter(|(fs_type, check)| {
                let hit = check(device);
                trace!("{} signature on {}: {}", fs_type, device.path(), hit);
                hit
            })
            .map(|(fs_type, _)| *fs_type)
            .collect()
    }
}
