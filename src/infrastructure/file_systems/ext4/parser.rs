//! ext4 filesystem parser implementation
//!
//! Parses the ext2/3/4 superblock and group descriptors, then walks every
//! inode table. An inode is reported as deleted when its bitmap bit is clear
//! or it carries a deletion time with no remaining links.

use super::block_map::{MapContext, inode_extents};
use super::directory::{DirEntry, NameTable, parse_dir_block};
use super::inode::{Inode, InodeClass, classify_inode};
use super::superblock::{Ext4Superblock, GroupDescriptor, SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE};
use crate::domain::entities::{
    FileRecord, JournalInfo, RecordLocator, RecoveryCatalog, ScanOutcome, VolumeInfo,
};
use crate::domain::repositories::{
    BlockDeviceError, BlockDeviceReader, FileSystemError, FileSystemParser, FileSystemType,
    ScanControl,
};
use crate::infrastructure::file_systems::{SegmentScan, Slot, drive_segments};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Inode number of the root directory
const ROOT_INODE: u32 = 2;

/// Loaded inode table of one block group
enum GroupTable {
    /// Descriptor points nowhere usable
    Unusable(String),
    /// Inode table never initialised; every slot is empty
    Uninitialized,
    Ready {
        offset: u64,
        table: Vec<u8>,
        bitmap: Option<Vec<u8>>,
    },
}

/// ext4 filesystem parser
pub struct Ext4Parser<R: BlockDeviceReader + ?Sized> {
    device: Arc<R>,
    superblock: Ext4Superblock,
    /// One entry per block group; `None` when the descriptor bytes are short
    groups: Vec<Option<GroupDescriptor>>,
}

impl<R: BlockDeviceReader + ?Sized> Ext4Parser<R> {
    /// Creates a new ext4 parser, validating the superblock and loading the
    /// group descriptor table
    pub fn new(device: Arc<R>) -> Result<Self, FileSystemError> {
        let device_size = device.size();
        let data = device
            .read_at(SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE)
            .map_err(|e| match e {
                BlockDeviceError::OutOfRange { .. } => FileSystemError::DeviceTooSmall {
                    declared: SUPERBLOCK_OFFSET + SUPERBLOCK_SIZE as u64,
                    actual: device_size,
                },
                other => other.into(),
            })?;
        let superblock = Ext4Superblock::parse(&data)?;

        let declared = superblock.declared_size();
        if declared > device_size {
            return Err(FileSystemError::DeviceTooSmall {
                declared,
                actual: device_size,
            });
        }

        let groups = Self::load_descriptors(device.as_ref(), &superblock)?;

        info!(
            "ext4 parser: {} blocks of {} bytes, {} groups of {} inodes ({} bytes each)",
            superblock.blocks_count,
            superblock.block_size,
            groups.len(),
            superblock.inodes_per_group,
            superblock.inode_size
        );

        Ok(Self {
            device,
            superblock,
            groups,
        })
    }

    fn load_descriptors(
        device: &R,
        superblock: &Ext4Superblock,
    ) -> Result<Vec<Option<GroupDescriptor>>, FileSystemError> {
        let device_size = device.size();
        let declared = superblock.declared_group_count();
        if declared == 0 {
            return Ok(Vec::new());
        }

        let table_offset = superblock.descriptor_table_offset();
        let desc_size = superblock.desc_size;
        if table_offset.saturating_add(desc_size) > device_size {
            return Err(FileSystemError::LocatorUnreachable {
                structure: "group descriptor table",
                offset: table_offset,
                device_size,
            });
        }

        // Neither the descriptor table nor the inode tables may outgrow the device
        let table_bytes = superblock.inodes_per_group as u64 * superblock.inode_size;
        let count = declared
            .min((device_size - table_offset) / desc_size)
            .min(device_size / table_bytes.max(1));
        if count < declared {
            warn!("clamping {} declared block groups to {}", declared, count);
        }

        let raw = device.read_at(table_offset, (count * desc_size) as usize)?;
        Ok(raw
            .chunks_exact(desc_size as usize)
            .map(GroupDescriptor::parse)
            .collect())
    }

    fn block_context(&self) -> MapContext {
        MapContext {
            block_size: self.superblock.block_size,
            blocks_count: self.superblock.blocks_count,
        }
    }

    fn read_block(&self, block: u64) -> Option<Vec<u8>> {
        if block == 0 || block >= self.superblock.blocks_count {
            return None;
        }
        self.device
            .read_at(block * self.superblock.block_size, self.superblock.block_size as usize)
            .ok()
    }

    fn inodes_per_group(&self) -> u64 {
        self.superblock.inodes_per_group as u64
    }

    fn load_group(&self, group: usize) -> GroupTable {
        let Some(descriptor) = self.groups.get(group).copied().flatten() else {
            return GroupTable::Unusable("truncated descriptor".to_string());
        };
        if descriptor.inode_uninit() && self.superblock.has_group_checksums() {
            return GroupTable::Uninitialized;
        }

        let table_bytes = self.inodes_per_group() * self.superblock.inode_size;
        let offset = descriptor.inode_table.saturating_mul(self.superblock.block_size);
        if descriptor.inode_table == 0
            || descriptor.inode_table >= self.superblock.blocks_count
            || offset.saturating_add(table_bytes) > self.device.size()
        {
            return GroupTable::Unusable(format!(
                "inode table at block {} is outside the device",
                descriptor.inode_table
            ));
        }

        let table = match self.device.read_at(offset, table_bytes as usize) {
            Ok(table) => table,
            Err(e) => return GroupTable::Unusable(format!("inode table unreadable: {}", e)),
        };

        let bitmap = self.read_block(descriptor.inode_bitmap);
        if bitmap.is_none() {
            debug!("group {}: inode bitmap unavailable, using deletion times", group);
        }

        GroupTable::Ready {
            offset,
            table,
            bitmap,
        }
    }

    /// Collects directory entry names from every directory inode
    fn build_name_table(&self, control: &ScanControl) -> Option<NameTable> {
        let scan_names = |group: usize| -> NameTable {
            let mut names = NameTable::new();
            if control.is_cancelled() {
                return names;
            }
            let GroupTable::Ready { offset, table, .. } = self.load_group(group) else {
                return names;
            };
            let inode_size = self.superblock.inode_size as usize;
            for (index, raw) in table.chunks_exact(inode_size).enumerate() {
                let ino = group as u64 * self.inodes_per_group() + index as u64 + 1;
                let Ok(ino) = u32::try_from(ino) else {
                    break;
                };
                if ino < self.superblock.first_ino && ino != ROOT_INODE {
                    continue;
                }
                let InodeClass::Parsed(inode) = classify_inode(raw) else {
                    continue;
                };
                if inode.is_directory() {
                    let inode_offset = offset + (index * inode_size) as u64;
                    names.insert_all(ino, self.directory_entries(&inode, inode_offset));
                }
            }
            names
        };

        let tables: Vec<NameTable> = if control.parallel() {
            (0..self.groups.len()).into_par_iter().map(scan_names).collect()
        } else {
            (0..self.groups.len()).map(scan_names).collect()
        };
        if control.is_cancelled() {
            return None;
        }

        let mut names = NameTable::new();
        for table in tables {
            names.merge(table);
        }
        debug!("resolved {} directory entry names", names.len());
        Some(names)
    }

    fn directory_entries(&self, inode: &Inode, inode_offset: u64) -> Vec<DirEntry> {
        let block_size = self.superblock.block_size;
        let extents =
            inode_extents(inode, inode_offset, &self.block_context(), &|b| self.read_block(b));

        let mut entries = Vec::new();
        for extent in extents {
            let mut position = extent.offset;
            while position < extent.end() {
                let Ok(block) = self.device.read_at(position, block_size as usize) else {
                    break;
                };
                entries.extend(parse_dir_block(&block, self.superblock.inodes_count));
                position += block_size;
            }
        }
        entries
    }

    fn scan_group(
        &self,
        group: usize,
        names: Option<&NameTable>,
        control: &ScanControl,
    ) -> Result<SegmentScan, FileSystemError> {
        let ipg = self.inodes_per_group();
        let (offset, table, bitmap) = match self.load_group(group) {
            GroupTable::Unusable(reason) => {
                warn!("skipping block group {}: {}", group, reason);
                return Ok(SegmentScan::skipped());
            }
            GroupTable::Uninitialized => {
                return Ok(SegmentScan {
                    slots: (0..ipg).map(|_| Slot::Empty).collect(),
                    ..Default::default()
                });
            }
            GroupTable::Ready {
                offset,
                table,
                bitmap,
            } => (offset, table, bitmap),
        };

        let inode_size = self.superblock.inode_size as usize;
        let context = self.block_context();
        let mut segment = SegmentScan::default();

        for (index, raw) in table.chunks_exact(inode_size).enumerate() {
            if control.is_cancelled() {
                segment.cancelled = true;
                break;
            }
            let ino = group as u64 * ipg + index as u64 + 1;
            let inode_offset = offset + (index * inode_size) as u64;

            let slot = match classify_inode(raw) {
                InodeClass::Empty => Slot::Empty,
                InodeClass::Invalid(reason) => Slot::invalid(ino, reason),
                InodeClass::Parsed(inode) => {
                    let allocated = bitmap
                        .as_ref()
                        .map(|b| b.get(index / 8).is_some_and(|&byte| byte & (1u8 << (index % 8)) != 0));
                    let deleted = match allocated {
                        Some(allocated) => !allocated || inode.deletion_stamped(),
                        None => inode.dtime != 0,
                    };

                    let extents =
                        inode_extents(&inode, inode_offset, &context, &|b| self.read_block(b));
                    let (name, parent) = if ino == ROOT_INODE as u64 {
                        (None, Some(ino))
                    } else {
                        match names.and_then(|n| n.get(ino)) {
                            Some(entry) => (Some(entry.name.clone()), Some(entry.parent as u64)),
                            None => (None, None),
                        }
                    };

                    Slot::Record(
                        FileRecord::new(ino, RecordLocator::new(ino, inode_offset))
                            .with_name(name)
                            .with_parent(parent)
                            .with_size(inode.size)
                            .with_times(inode.created, inode.modified)
                            .with_directory(inode.is_directory())
                            .with_deleted(deleted)
                            .with_extents(extents),
                    )
                }
            };
            segment.slots.push(slot);
        }

        Ok(segment)
    }
}

impl<R: BlockDeviceReader + ?Sized> FileSystemParser for Ext4Parser<R> {
    fn filesystem_type(&self) -> FileSystemType {
        FileSystemType::Ext
    }

    fn volume_info(&self) -> Result<VolumeInfo, FileSystemError> {
        let sb = &self.superblock;
        let journal = sb.has_journal().then(|| JournalInfo {
            inode: (sb.journal_inum != 0).then_some(sb.journal_inum),
            uuid: sb.journal_uuid.clone(),
        });

        Ok(VolumeInfo {
            filesystem: FileSystemType::Ext.name().to_string(),
            label: sb.volume_name.clone(),
            uuid: sb.uuid.clone(),
            block_size: sb.block_size,
            declared_size: sb.declared_size(),
            journal,
            ..Default::default()
        })
    }

    fn slot_count(&self) -> u64 {
        self.groups.len() as u64 * self.inodes_per_group()
    }

    fn scan(
        &self,
        catalog: &RecoveryCatalog,
        control: &ScanControl,
    ) -> Result<ScanOutcome, FileSystemError> {
        let tracker = control.tracker(self.slot_count());

        let names = if control.resolve_names() {
            match self.build_name_table(control) {
                Some(names) => Some(names),
                None => return Ok(tracker.finish(true)),
            }
        } else {
            None
        };

        let segments: Vec<usize> = (0..self.groups.len()).collect();
        let cancelled = drive_segments(&segments, catalog, control, &tracker, |&group| {
            self.scan_group(group, names.as_ref(), control)
        })?;

        let outcome = tracker.finish(cancelled);
        info!(
            "ext4 scan {}: {} inodes ({} deleted), {} discarded, {} groups skipped",
            outcome,
            catalog.total_found(),
            catalog.total_deleted(),
            catalog.discarded(),
            catalog.skipped_segments()
        );
        Ok(outcome)
    }
}
