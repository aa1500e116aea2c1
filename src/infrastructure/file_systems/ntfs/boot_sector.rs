//! NTFS boot sector (BIOS Parameter Block)

use crate::domain::repositories::FileSystemError;
use crate::domain::services::NTFS_OEM_ID;
use crate::infrastructure::file_systems::le::{LeBytes, root_field};

/// Boot sector size
pub const BOOT_SECTOR_SIZE: usize = 512;

/// Largest cluster size NTFS supports
const MAX_CLUSTER_SIZE: u64 = 2 * 1024 * 1024;

/// Bounds on the MFT record size (fixups need whole 512-byte strides)
const MIN_RECORD_SIZE: u64 = 512;
const MAX_RECORD_SIZE: u64 = 65536;

/// Validated NTFS boot sector fields
#[derive(Debug, Clone)]
pub struct NtfsBootSector {
    /// Bytes per sector
    pub bytes_per_sector: u64,
    /// Cluster size in bytes
    pub cluster_size: u64,
    /// Total sectors in volume
    pub total_sectors: u64,
    /// LCN of MFT
    pub mft_lcn: u64,
    /// LCN of MFT mirror
    pub mft_mirror_lcn: u64,
    /// MFT record size in bytes
    pub record_size: u64,
    /// Volume serial number
    pub volume_serial: u64,
}

impl NtfsBootSector {
    /// Parses and validates the boot sector
    pub fn parse(data: &[u8]) -> Result<Self, FileSystemError> {
        let bpb = LeBytes::new(data);

        if bpb.bytes(3, 8) != Some(&NTFS_OEM_ID[..]) {
            return Err(FileSystemError::InvalidRootBlock(
                "missing NTFS OEM id".to_string(),
            ));
        }

        // Bytes per sector at offset 11
        let bytes_per_sector = root_field(bpb.u16(0x0B), "bytes per sector")? as u64;
        if !bytes_per_sector.is_power_of_two() || !(256..=4096).contains(&bytes_per_sector) {
            return Err(FileSystemError::InvalidRootBlock(format!(
                "implausible bytes per sector {}",
                bytes_per_sector
            )));
        }

        // Sectors per cluster at offset 13; values above 0x80 are 2^(256 - v)
        let raw_spc = root_field(bpb.u8(0x0D), "sectors per cluster")?;
        let sectors_per_cluster = match raw_spc {
            0 => 0,
            1..=0x80 => raw_spc as u64,
            _ => 1u64 << (256 - raw_spc as u32).min(63),
        };
        let cluster_size = bytes_per_sector.saturating_mul(sectors_per_cluster);
        if !sectors_per_cluster.is_power_of_two() || cluster_size > MAX_CLUSTER_SIZE {
            return Err(FileSystemError::InvalidRootBlock(format!(
                "implausible sectors per cluster {:#x}",
                raw_spc
            )));
        }

        let total_sectors = root_field(bpb.u64(0x28), "total sectors")?;
        if total_sectors == 0 {
            return Err(FileSystemError::InvalidRootBlock(
                "volume declares zero sectors".to_string(),
            ));
        }

        let mft_lcn = root_field(bpb.u64(0x30), "MFT cluster")?;
        let mft_mirror_lcn = root_field(bpb.u64(0x38), "MFT mirror cluster")?;

        // Clusters per MFT record at offset 64; negative means 2^|v| bytes
        let clusters_per_record = root_field(bpb.i8(0x40), "clusters per MFT record")?;
        let record_size = match clusters_per_record {
            v if v > 0 => cluster_size * v as u64,
            v if v < 0 && v > -32 => 1u64 << (-(v as i32)),
            _ => 0,
        };
        if !record_size.is_power_of_two()
            || !(MIN_RECORD_SIZE..=MAX_RECORD_SIZE).contains(&record_size)
        {
            return Err(FileSystemError::InvalidRootBlock(format!(
                "implausible MFT record size {}",
                record_size
            )));
        }

        let volume_serial = root_field(bpb.u64(0x48), "volume serial")?;

        Ok(Self {
            bytes_per_sector,
            cluster_size,
            total_sectors,
            mft_lcn,
            mft_mirror_lcn,
            record_size,
            volume_serial,
        })
    }

    /// Returns total volume size in bytes
    pub fn volume_size(&self) -> Option<u64> {
        self.total_sectors.checked_mul(self.bytes_per_sector)
    }

    /// Returns the MFT offset in bytes
    pub fn mft_offset(&self) -> Option<u64> {
        self.mft_lcn.checked_mul(self.cluster_size)
    }

    /// Returns the MFT mirror offset in bytes
    pub fn mirror_offset(&self) -> Option<u64> {
        self.mft_mirror_lcn.checked_mul(self.cluster_size)
    }
}
