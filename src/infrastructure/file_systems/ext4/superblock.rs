//! ext2/3/4 superblock and group descriptors

use crate::domain::repositories::FileSystemError;
use crate::domain::services::EXT_SUPER_MAGIC;
use crate::infrastructure::file_systems::le::{LeBytes, nul_padded_string, root_field, uuid_string};

/// Superblock offset from partition start
pub const SUPERBLOCK_OFFSET: u64 = 1024;

/// Superblock size
pub const SUPERBLOCK_SIZE: usize = 1024;

/// Largest accepted `log_block_size` (64 KiB blocks)
const MAX_LOG_BLOCK_SIZE: u32 = 6;

/// Inode size of revision 0 filesystems
const GOOD_OLD_INODE_SIZE: u64 = 128;

/// Descriptor size without the 64-bit feature
const GOOD_OLD_DESC_SIZE: u64 = 32;
const MIN_DESC_SIZE_64BIT: u64 = 64;

pub const COMPAT_HAS_JOURNAL: u32 = 0x0004;
pub const INCOMPAT_64BIT: u32 = 0x0080;
pub const RO_COMPAT_GDT_CSUM: u32 = 0x0010;
pub const RO_COMPAT_METADATA_CSUM: u32 = 0x0400;

/// Group descriptor flag: inode table not initialised
const BG_INODE_UNINIT: u16 = 0x0001;

/// Validated superblock fields
#[derive(Debug, Clone)]
pub struct Ext4Superblock {
    pub inodes_count: u32,
    pub blocks_count: u64,
    pub first_data_block: u32,
    /// Block size in bytes (1024 << log_block_size)
    pub block_size: u64,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub rev_level: u32,
    pub first_ino: u32,
    pub inode_size: u64,
    pub feature_compat: u32,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,
    pub uuid: Option<String>,
    pub volume_name: Option<String>,
    pub journal_uuid: Option<String>,
    pub journal_inum: u32,
    pub desc_size: u64,
}

impl Ext4Superblock {
    /// Parses superblock from raw bytes
    pub fn parse(data: &[u8]) -> Result<Self, FileSystemError> {
        let sb = LeBytes::new(data);

        let magic = root_field(sb.u16(56), "magic")?;
        if magic != EXT_SUPER_MAGIC {
            return Err(FileSystemError::InvalidRootBlock(format!(
                "bad superblock magic {:#06x}",
                magic
            )));
        }

        let log_block_size = root_field(sb.u32(24), "log block size")?;
        if log_block_size > MAX_LOG_BLOCK_SIZE {
            return Err(FileSystemError::InvalidRootBlock(format!(
                "log block size {} out of range",
                log_block_size
            )));
        }
        let block_size = 1024u64 << log_block_size;

        let rev_level = root_field(sb.u32(76), "revision")?;
        let inode_size = if rev_level == 0 {
            GOOD_OLD_INODE_SIZE
        } else {
            root_field(sb.u16(88), "inode size")? as u64
        };
        if !inode_size.is_power_of_two() || inode_size < GOOD_OLD_INODE_SIZE || inode_size > block_size
        {
            return Err(FileSystemError::InvalidRootBlock(format!(
                "implausible inode size {}",
                inode_size
            )));
        }

        let feature_incompat = root_field(sb.u32(96), "incompatible features")?;
        let blocks_lo = root_field(sb.u32(4), "block count")? as u64;
        let (blocks_count, desc_size) = if feature_incompat & INCOMPAT_64BIT != 0 {
            let blocks_hi = root_field(sb.u32(336), "block count high")? as u64;
            let desc_size = root_field(sb.u16(254), "descriptor size")? as u64;
            if desc_size < MIN_DESC_SIZE_64BIT || !desc_size.is_power_of_two() || desc_size > block_size
            {
                return Err(FileSystemError::InvalidRootBlock(format!(
                    "implausible descriptor size {}",
                    desc_size
                )));
            }
            (blocks_lo | (blocks_hi << 32), desc_size)
        } else {
            (blocks_lo, GOOD_OLD_DESC_SIZE)
        };

        Ok(Self {
            inodes_count: root_field(sb.u32(0), "inode count")?,
            blocks_count,
            first_data_block: root_field(sb.u32(20), "first data block")?,
            block_size,
            blocks_per_group: root_field(sb.u32(32), "blocks per group")?,
            inodes_per_group: root_field(sb.u32(40), "inodes per group")?,
            rev_level,
            first_ino: if rev_level == 0 { 11 } else { sb.u32(84).unwrap_or(11) },
            inode_size,
            feature_compat: root_field(sb.u32(92), "compatible features")?,
            feature_incompat,
            feature_ro_compat: root_field(sb.u32(100), "read-only features")?,
            uuid: sb.bytes(104, 16).and_then(uuid_string),
            volume_name: sb.bytes(120, 16).and_then(nul_padded_string),
            journal_uuid: sb.bytes(208, 16).and_then(uuid_string),
            journal_inum: sb.u32(224).unwrap_or(0),
            desc_size,
        })
    }

    /// Declared filesystem size in bytes
    pub fn declared_size(&self) -> u64 {
        self.blocks_count.saturating_mul(self.block_size)
    }

    /// Byte offset of the group descriptor table
    pub fn descriptor_table_offset(&self) -> u64 {
        (self.first_data_block as u64 + 1).saturating_mul(self.block_size)
    }

    /// Number of block groups before any clamping
    pub fn declared_group_count(&self) -> u64 {
        let blocks = self.blocks_count.saturating_sub(self.first_data_block as u64);
        if self.blocks_per_group == 0 || self.inodes_per_group == 0 || blocks == 0 {
            return 0;
        }
        blocks.div_ceil(self.blocks_per_group as u64)
    }

    pub fn has_journal(&self) -> bool {
        self.feature_compat & COMPAT_HAS_JOURNAL != 0
    }

    /// Whether `INODE_UNINIT` descriptor flags are trustworthy
    pub fn has_group_checksums(&self) -> bool {
        self.feature_ro_compat & (RO_COMPAT_GDT_CSUM | RO_COMPAT_METADATA_CSUM) != 0
    }
}

/// Block group descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupDescriptor {
    pub inode_bitmap: u64,
    pub inode_table: u64,
    pub flags: u16,
}

impl GroupDescriptor {
    /// Decodes one descriptor; the high halves exist only in 64-byte descriptors
    pub fn parse(data: &[u8]) -> Option<Self> {
        let gd = LeBytes::new(data);
        let wide = data.len() >= MIN_DESC_SIZE_64BIT as usize;
        let hi = |offset: usize| if wide { gd.u32(offset).unwrap_or(0) as u64 } else { 0 };

        Some(Self {
            inode_bitmap: gd.u32(0x04)? as u64 | (hi(0x24) << 32),
            inode_table: gd.u32(0x08)? as u64 | (hi(0x28) << 32),
            flags: gd.u16(0x12)?,
        })
    }

    pub fn inode_uninit(&self) -> bool {
        self.flags & BG_INODE_UNINIT != 0
    }
}
