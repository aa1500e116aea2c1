//! APFS container parser implementation
//!
//! Reads the container superblock, the volume list and every volume
//! superblock, then walks each volume's inode tree. Names come from the
//! dirent tree and data ranges from the extent tree.

use super::btree::{TreeWalk, walk_tree};
use super::container::{
    ContainerSuperblock, VolumeSuperblock, parse_snapshot_list, parse_volume_list,
};
use super::records::{RECORD_SIZE, parse_dirent, parse_inode};
use crate::domain::entities::{
    Extent, FileRecord, RecordLocator, RecoveryCatalog, ScanOutcome, SnapshotEntry, VolumeInfo,
    push_coalesced,
};
use crate::domain::repositories::{
    BlockDeviceError, BlockDeviceReader, FileSystemError, FileSystemParser, FileSystemType,
    ScanControl,
};
use crate::infrastructure::file_systems::le::LeBytes;
use crate::infrastructure::file_systems::{SegmentScan, Slot, drive_segments};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bytes of the container superblock that are read before the block size is known
const CONTAINER_HEADER_SIZE: usize = 4096;

/// One volume of the container
#[derive(Debug)]
enum Volume {
    Ready { block: u64, superblock: VolumeSuperblock },
    Unusable { block: u64, reason: String },
}

/// Name of an object and its directory
struct NameEntry {
    name: String,
    parent: u64,
    live: bool,
}

/// APFS container parser
pub struct ApfsParser<R: BlockDeviceReader + ?Sized> {
    device: Arc<R>,
    container: ContainerSuperblock,
    volumes: Vec<Volume>,
}

impl<R: BlockDeviceReader + ?Sized> ApfsParser<R> {
    /// Creates a new APFS parser, validating the container and locating
    /// every volume superblock
    pub fn new(device: Arc<R>) -> Result<Self, FileSystemError> {
        let device_size = device.size();
        let data = device
            .read_at(0, CONTAINER_HEADER_SIZE)
            .map_err(|e| match e {
                BlockDeviceError::OutOfRange { .. } => FileSystemError::DeviceTooSmall {
                    declared: CONTAINER_HEADER_SIZE as u64,
                    actual: device_size,
                },
                other => other.into(),
            })?;
        let container = ContainerSuperblock::parse(&data)?;

        let declared = container.declared_size();
        if declared > device_size {
            return Err(FileSystemError::DeviceTooSmall {
                declared,
                actual: device_size,
            });
        }

        let volumes = Self::load_volumes(device.as_ref(), &container)?;

        info!(
            "APFS parser: {} blocks of {} bytes, {} volumes",
            container.block_count,
            container.block_size,
            volumes.len()
        );

        Ok(Self {
            device,
            container,
            volumes,
        })
    }

    fn block_offset(container: &ContainerSuperblock, device_size: u64, block: u64) -> Option<u64> {
        let offset = block.checked_mul(container.block_size)?;
        (offset.checked_add(container.block_size)? <= device_size).then_some(offset)
    }

    fn load_volumes(
        device: &R,
        container: &ContainerSuperblock,
    ) -> Result<Vec<Volume>, FileSystemError> {
        let device_size = device.size();
        if container.volume_count == 0 {
            return Ok(Vec::new());
        }
        let locator_error = |structure: &'static str, block: u64| {
            FileSystemError::LocatorUnreachable {
                structure,
                offset: block.saturating_mul(container.block_size),
                device_size,
            }
        };

        let list_offset = Self::block_offset(container, device_size, container.volume_list_block)
            .ok_or_else(|| locator_error("volume list", container.volume_list_block))?;
        let list = device.read_at(list_offset, container.block_size as usize)?;

        let mut volumes = Vec::new();
        for block in parse_volume_list(&list, container.volume_count)? {
            let offset = Self::block_offset(container, device_size, block)
                .ok_or_else(|| locator_error("volume superblock", block))?;
            let raw = device.read_at(offset, container.block_size as usize)?;

            let superblock = match VolumeSuperblock::parse(&raw) {
                Ok(sb) if sb.block_size != container.block_size => {
                    volumes.push(Volume::Unusable {
                        block,
                        reason: format!(
                            "block size {} differs from the container's {}",
                            sb.block_size, container.block_size
                        ),
                    });
                    continue;
                }
                Ok(sb) => sb,
                Err(reason) => {
                    volumes.push(Volume::Unusable { block, reason });
                    continue;
                }
            };

            for (structure, root) in [
                ("inode tree", superblock.inode_tree),
                ("dirent tree", superblock.dirent_tree),
                ("extent tree", superblock.extent_tree),
            ] {
                if root != 0 && Self::block_offset(container, device_size, root).is_none() {
                    return Err(locator_error(structure, root));
                }
            }
            volumes.push(Volume::Ready { block, superblock });
        }
        Ok(volumes)
    }

    fn read_block(&self, block: u64) -> Option<Vec<u8>> {
        let offset = Self::block_offset(&self.container, self.device.size(), block)?;
        self.device.read_at(offset, self.container.block_size as usize).ok()
    }

    /// Walks the tree at `root`; block 0 is the container and means "no tree"
    fn walk(&self, root: u64) -> TreeWalk {
        if root == 0 {
            return TreeWalk::default();
        }
        walk_tree(root, &|b| self.read_block(b))
    }

    /// Upper bound on inode slots of a volume
    fn volume_slots(&self, superblock: &VolumeSuperblock) -> u64 {
        superblock
            .inode_count
            .min(self.device.size() / RECORD_SIZE as u64)
    }

    fn collect_names(
        &self,
        superblock: &VolumeSuperblock,
        skipped: &mut u64,
    ) -> HashMap<u64, NameEntry> {
        let walk = self.walk(superblock.dirent_tree);
        *skipped += walk.bad_nodes;

        let mut names: HashMap<u64, NameEntry> = HashMap::new();
        let mut cache = RecordBlockCache::default();
        for leaf in walk.leaves {
            let Some(raw) = cache.record(self, leaf.value_a, leaf.value_b) else {
                continue;
            };
            let Some(dirent) = parse_dirent(raw) else {
                debug!("unreadable directory record under key {}", leaf.key);
                continue;
            };
            let candidate = NameEntry {
                name: dirent.name,
                parent: dirent.parent_id,
                live: !dirent.unlinked,
            };
            match names.get(&dirent.child_id) {
                Some(existing) if existing.live || !candidate.live => {}
                _ => {
                    names.insert(dirent.child_id, candidate);
                }
            }
        }
        names
    }

    fn collect_extents(
        &self,
        superblock: &VolumeSuperblock,
        skipped: &mut u64,
    ) -> HashMap<u64, Vec<Extent>> {
        let mut extents: HashMap<u64, Vec<Extent>> = HashMap::new();
        let walk = self.walk(superblock.extent_tree);
        *skipped += walk.bad_nodes;

        let block_size = self.container.block_size;
        for leaf in walk.leaves {
            if leaf.value_a == 0 || leaf.value_a >= self.container.block_count {
                continue;
            }
            let count = leaf.value_b.min(self.container.block_count - leaf.value_a);
            push_coalesced(
                extents.entry(leaf.key).or_default(),
                Extent::new(leaf.value_a * block_size, count * block_size),
            );
        }
        extents
    }

    fn scan_volume(
        &self,
        index: usize,
        control: &ScanControl,
    ) -> Result<SegmentScan, FileSystemError> {
        let superblock = match &self.volumes[index] {
            Volume::Unusable { block, reason } => {
                warn!("skipping APFS volume at block {}: {}", block, reason);
                return Ok(SegmentScan::skipped());
            }
            Volume::Ready { superblock, .. } => superblock,
        };

        let mut segment = SegmentScan::default();
        let names = if control.resolve_names() {
            self.collect_names(superblock, &mut segment.skipped)
        } else {
            HashMap::new()
        };
        let mut extents = self.collect_extents(superblock, &mut segment.skipped);

        let walk = self.walk(superblock.inode_tree);
        segment.skipped += walk.bad_nodes;

        let limit = self.volume_slots(superblock) as usize;
        if walk.leaves.len() > limit {
            warn!(
                "inode tree lists {} entries, volume declares {}; truncating",
                walk.leaves.len(),
                limit
            );
        }

        let block_size = self.container.block_size;
        let mut cache = RecordBlockCache::default();
        for (ordinal, leaf) in walk.leaves.into_iter().take(limit).enumerate() {
            if control.is_cancelled() {
                segment.cancelled = true;
                break;
            }

            let byte_offset = leaf
                .value_a
                .saturating_mul(block_size)
                .saturating_add(leaf.value_b.saturating_mul(RECORD_SIZE as u64));
            let Some(raw) = cache.record(self, leaf.value_a, leaf.value_b) else {
                segment.slots.push(Slot::invalid(
                    ordinal as u64,
                    format!("record {}:{} is unreachable", leaf.value_a, leaf.value_b),
                ));
                continue;
            };
            if LeBytes::new(raw).is_zeroed() {
                segment.slots.push(Slot::Empty);
                continue;
            }

            let slot = match parse_inode(raw, leaf.key) {
                Err(reason) => Slot::invalid(ordinal as u64, reason),
                Ok(inode) => {
                    let name = names.get(&inode.object_id);
                    let data = if inode.is_directory() {
                        Vec::new()
                    } else {
                        extents.remove(&inode.object_id).unwrap_or_default()
                    };
                    let locator = RecordLocator::new(ordinal as u64, byte_offset);
                    Slot::Record(
                        FileRecord::new(inode.object_id, locator)
                            .with_name(name.map(|n| n.name.clone()))
                            .with_parent(Some(name.map(|n| n.parent).unwrap_or(inode.parent_id)))
                            .with_size(inode.size)
                            .with_times(inode.created, inode.modified)
                            .with_directory(inode.is_directory())
                            .with_deleted(inode.is_deleted())
                            .with_extents(data),
                    )
                }
            };
            segment.slots.push(slot);
        }

        Ok(segment)
    }

    fn snapshots(&self) -> Vec<SnapshotEntry> {
        if self.container.snapshot_list_block == 0 {
            return Vec::new();
        }
        match self
            .read_block(self.container.snapshot_list_block)
            .and_then(|block| parse_snapshot_list(&block))
        {
            Some(snapshots) => snapshots,
            None => {
                warn!(
                    "snapshot list at block {} is unreadable",
                    self.container.snapshot_list_block
                );
                Vec::new()
            }
        }
    }
}

/// Keeps the most recently read record block
#[derive(Default)]
struct RecordBlockCache {
    block: Option<(u64, Vec<u8>)>,
}

impl RecordBlockCache {
    fn record<R: BlockDeviceReader + ?Sized>(
        &mut self,
        parser: &ApfsParser<R>,
        block: u64,
        slot: u64,
    ) -> Option<&[u8]> {
        let start = usize::try_from(slot).ok()?.checked_mul(RECORD_SIZE)?;
        if start + RECORD_SIZE > parser.container.block_size as usize {
            return None;
        }
        if self.block.as_ref().is_none_or(|(cached, _)| *cached != block) {
            self.block = Some((block, parser.read_block(block)?));
        }
        self.block
            .as_ref()
            .and_then(|(_, data)| data.get(start..start + RECORD_SIZE))
    }
}

impl<R: BlockDeviceReader + ?Sized> FileSystemParser for ApfsParser<R> {
    fn filesystem_type(&self) -> FileSystemType {
        FileSystemType::Apfs
    }

    fn volume_info(&self) -> Result<VolumeInfo, FileSystemError> {
        let volumes: Vec<String> = self
            .volumes
            .iter()
            .filter_map(|v| match v {
                Volume::Ready { superblock, block } => Some(
                    superblock
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("volume@{}", block)),
                ),
                Volume::Unusable { .. } => None,
            })
            .collect();

        Ok(VolumeInfo {
            filesystem: FileSystemType::Apfs.name().to_string(),
            label: volumes.first().cloned(),
            block_size: self.container.block_size,
            declared_size: self.container.declared_size(),
            volumes,
            snapshots: self.snapshots(),
            ..Default::default()
        })
    }

    fn slot_count(&self) -> u64 {
        self.volumes
            .iter()
            .map(|v| match v {
                Volume::Ready { superblock, .. } => self.volume_slots(superblock),
                Volume::Unusable { .. } => 0,
            })
            .sum()
    }

    fn scan(
        &self,
        catalog: &RecoveryCatalog,
        control: &ScanControl,
    ) -> Result<ScanOutcome, FileSystemError> {
        let tracker = control.tracker(self.slot_count());
        let segments: Vec<usize> = (0..self.volumes.len()).collect();

        let cancelled = drive_segments(&segments, catalog, control, &tracker, |&index| {
            self.scan_volume(index, control)
        })?;

        let outcome = tracker.finish(cancelled);
        info!(
            "APFS scan {}: {} inodes ({} deleted), {} discarded, {} segments skipped",
            outcome,
            catalog.total_found(),
            catalog.total_deleted(),
            catalog.discarded(),
            catalog.skipped_segments()
        );
        Ok(outcome)
    }
}
