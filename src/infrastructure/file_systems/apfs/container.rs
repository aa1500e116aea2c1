//! APFS container and volume superblocks, snapshot list

use crate::domain::entities::SnapshotEntry;
use crate::domain::repositories::FileSystemError;
use crate::domain::services::{APFS_CONTAINER_MAGIC, APFS_VOLUME_MAGIC};
use crate::infrastructure::file_systems::le::{LeBytes, nul_padded_string, root_field};
use chrono::{DateTime, Utc};

/// Snapshot list magic "SNAP"
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"SNAP";

const MIN_BLOCK_SIZE: u64 = 4096;
const MAX_BLOCK_SIZE: u64 = 65536;
const MAX_VOLUMES: u32 = 100;

const VOLUME_NAME_OFFSET: usize = 40;
const VOLUME_NAME_SIZE: usize = 64;

const SNAPSHOT_HEADER: usize = 8;
const SNAPSHOT_ENTRY_SIZE: usize = 80;

/// Converts nanoseconds since the Unix epoch, `None` for zero
pub fn nanos_to_utc(nanos: u64) -> Option<DateTime<Utc>> {
    if nanos == 0 {
        return None;
    }
    i64::try_from(nanos).ok().map(DateTime::from_timestamp_nanos)
}

/// Container superblock (block 0)
#[derive(Debug, Clone)]
pub struct ContainerSuperblock {
    pub block_size: u64,
    pub block_count: u64,
    pub features: u64,
    pub volume_count: u32,
    pub volume_list_block: u64,
    /// Zero when the container has no snapshot list
    pub snapshot_list_block: u64,
}

impl ContainerSuperblock {
    pub fn parse(data: &[u8]) -> Result<Self, FileSystemError> {
        let nx = LeBytes::new(data);

        let magic = root_field(nx.u32(0), "container magic")?;
        if magic == APFS_VOLUME_MAGIC {
            return Err(FileSystemError::InvalidRootBlock(
                "volume superblock without a container".to_string(),
            ));
        }
        if magic != APFS_CONTAINER_MAGIC {
            return Err(FileSystemError::InvalidRootBlock(format!(
                "bad container magic {:#010x}",
                magic
            )));
        }

        let block_size = root_field(nx.u32(4), "block size")? as u64;
        if !block_size.is_power_of_two() || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size)
        {
            return Err(FileSystemError::InvalidRootBlock(format!(
                "implausible block size {}",
                block_size
            )));
        }

        let volume_count = root_field(nx.u32(36), "volume count")?;
        if volume_count > MAX_VOLUMES {
            return Err(FileSystemError::InvalidRootBlock(format!(
                "implausible volume count {}",
                volume_count
            )));
        }

        Ok(Self {
            block_size,
            block_count: root_field(nx.u64(8), "block count")?,
            features: root_field(nx.u64(16), "features")?,
            volume_count,
            volume_list_block: root_field(nx.u64(40), "volume list block")?,
            snapshot_list_block: root_field(nx.u64(48), "snapshot list block")?,
        })
    }

    pub fn declared_size(&self) -> u64 {
        self.block_count.saturating_mul(self.block_size)
    }
}

/// Decodes the volume list block into volume superblock block numbers
pub fn parse_volume_list(data: &[u8], volume_count: u32) -> Result<Vec<u64>, FileSystemError> {
    let list = LeBytes::new(data);
    (0..volume_count as usize)
        .map(|i| root_field(list.u64(i * 8), "volume list entry"))
        .collect()
}

/// Volume superblock
#[derive(Debug, Clone)]
pub struct VolumeSuperblock {
    pub block_size: u64,
    pub inode_count: u64,
    pub inode_tree: u64,
    pub dirent_tree: u64,
    /// Zero when the volume has no extent tree
    pub extent_tree: u64,
    pub name: Option<String>,
}

impl VolumeSuperblock {
    /// Decodes a volume superblock; errors describe why the volume is unusable
    pub fn parse(data: &[u8]) -> Result<Self, String> {
        let sb = LeBytes::new(data);
        if sb.u32(0) != Some(APFS_VOLUME_MAGIC) {
            return Err("missing APSB magic".to_string());
        }
        let field = |value: Option<u64>| value.ok_or_else(|| "truncated volume superblock".to_string());

        Ok(Self {
            block_size: field(sb.u32(4).map(u64::from))?,
            inode_count: field(sb.u64(8))?,
            inode_tree: field(sb.u64(16))?,
            dirent_tree: field(sb.u64(24))?,
            extent_tree: field(sb.u64(32))?,
            name: sb
                .bytes(VOLUME_NAME_OFFSET, VOLUME_NAME_SIZE)
                .and_then(nul_padded_string),
        })
    }
}

/// Decodes a snapshot list block
pub fn parse_snapshot_list(data: &[u8]) -> Option<Vec<SnapshotEntry>> {
    let list = LeBytes::new(data);
    if list.bytes(0, 4) != Some(&SNAPSHOT_MAGIC[..]) {
        return None;
    }
    let capacity = data.len().saturating_sub(SNAPSHOT_HEADER) / SNAPSHOT_ENTRY_SIZE;
    let count = (list.u32(4)? as usize).min(capacity);

    let snapshots = (0..count)
        .filter_map(|i| {
            let entry = list.tail(SNAPSHOT_HEADER + i * SNAPSHOT_ENTRY_SIZE)?;
            Some(SnapshotEntry {
                transaction_id: entry.u64(0)?,
                created: entry.u64(8).and_then(nanos_to_utc),
                name: entry
                    .bytes(16, 64)
                    .and_then(nul_padded_string)
                    .unwrap_or_else(|| format!("snapshot-{}", entry.u64(0).unwrap_or(0))),
            })
        })
        .collect();
    Some(snapshots)
}
