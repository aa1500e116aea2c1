//! Synthetic image builders shared by the integration tests
//!
//! Every builder produces a small but structurally complete volume. The
//! `sample_*` images carry a fixed set of live and deleted files whose
//! counts are exported as constants.

#![allow(dead_code)]

use salvage::domain::repositories::BlockDeviceReader;
use salvage::infrastructure::block_device::MemoryBlockDevice;
use std::sync::Arc;

pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

pub fn device(name: &str, data: Vec<u8>) -> Arc<dyn BlockDeviceReader> {
    Arc::new(MemoryBlockDevice::new(name, data))
}

/// 2021-01-01T00:00:00Z
pub const UNIX_2021: i64 = 1_609_459_200;

// ============================================================================
// NTFS
// ============================================================================

pub const NTFS_CLUSTER: u64 = 4096;
pub const MFT_RECORD: usize = 1024;
pub const MFT_LCN: u64 = 4;
pub const MFT_MIRROR_LCN: u64 = 2;
pub const NTFS_SERIAL: u64 = 0x1234_5678_9ABC_DEF0;

const ATTR_STANDARD_INFORMATION: u32 = 0x10;
const ATTR_FILE_NAME: u32 = 0x30;
const ATTR_VOLUME_NAME: u32 = 0x60;
const ATTR_DATA: u32 = 0x80;

const RECORD_IN_USE: u16 = 0x1;
const RECORD_DIRECTORY: u16 = 0x2;

pub fn filetime(unix: i64) -> u64 {
    (unix + 11_644_473_600) as u64 * 10_000_000
}

fn resident_attr(attr_type: u32, value: &[u8]) -> Vec<u8> {
    let length = (24 + value.len()).next_multiple_of(8);
    let mut attr = vec![0u8; length];
    put_u32(&mut attr, 0, attr_type);
    put_u32(&mut attr, 4, length as u32);
    put_u16(&mut attr, 10, 24);
    put_u32(&mut attr, 16, value.len() as u32);
    put_u16(&mut attr, 20, 24);
    put(&mut attr, 24, value);
    attr
}

/// Runlist with 2-byte lengths and 4-byte relative offsets
fn encode_runs(runs: &[(u64, u64)]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut previous = 0i64;
    for &(lcn, clusters) in runs {
        out.push(0x42);
        out.extend_from_slice(&(clusters as u16).to_le_bytes());
        let delta = lcn as i64 - previous;
        out.extend_from_slice(&(delta as i32).to_le_bytes());
        previous = lcn as i64;
    }
    out.push(0);
    out
}

fn non_resident_data(runs: &[(u64, u64)], real_size: u64) -> Vec<u8> {
    let clusters: u64 = runs.iter().map(|r| r.1).sum();
    non_resident_attr(&encode_runs(runs), clusters, real_size)
}

fn non_resident_attr(runlist: &[u8], clusters: u64, real_size: u64) -> Vec<u8> {
    let length = (64 + runlist.len()).next_multiple_of(8);

    let mut attr = vec![0u8; length];
    put_u32(&mut attr, 0, ATTR_DATA);
    put_u32(&mut attr, 4, length as u32);
    attr[8] = 1;
    put_u64(&mut attr, 24, clusters.saturating_sub(1));
    put_u16(&mut attr, 32, 64);
    put_u64(&mut attr, 40, clusters * NTFS_CLUSTER);
    put_u64(&mut attr, 48, real_size);
    put_u64(&mut attr, 56, real_size);
    put(&mut attr, 64, runlist);
    attr
}

fn standard_information(unix: i64) -> Vec<u8> {
    let mut value = vec![0u8; 48];
    put_u64(&mut value, 0, filetime(unix));
    put_u64(&mut value, 8, filetime(unix + 3600));
    resident_attr(ATTR_STANDARD_INFORMATION, &value)
}

fn file_name(name: &str, parent: u64, real_size: u64) -> Vec<u8> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let mut value = vec![0u8; 66 + units.len() * 2];
    // Sequence number in the top 16 bits of the reference
    put_u64(&mut value, 0, parent | (1 << 48));
    put_u64(&mut value, 8, filetime(UNIX_2021));
    put_u64(&mut value, 16, filetime(UNIX_2021));
    put_u64(&mut value, 48, real_size);
    value[64] = units.len() as u8;
    value[65] = 1;
    for (i, unit) in units.iter().enumerate() {
        put_u16(&mut value, 66 + i * 2, *unit);
    }
    resident_attr(ATTR_FILE_NAME, &value)
}

fn volume_name(label: &str) -> Vec<u8> {
    let value: Vec<u8> = label.encode_utf16().flat_map(u16::to_le_bytes).collect();
    resident_attr(ATTR_VOLUME_NAME, &value)
}

/// Contents of one NTFS file
pub enum NtfsData {
    None,
    Resident(Vec<u8>),
    Runs { runs: Vec<(u64, u64)>, real_size: u64 },
}

pub struct NtfsFile<'a> {
    pub name: &'a str,
    pub parent: u64,
    pub in_use: bool,
    pub directory: bool,
    pub data: NtfsData,
}

impl<'a> NtfsFile<'a> {
    pub fn file(name: &'a str, parent: u64, in_use: bool, data: NtfsData) -> Self {
        Self {
            name,
            parent,
            in_use,
            directory: false,
            data,
        }
    }

    pub fn directory(name: &'a str, parent: u64, in_use: bool) -> Self {
        Self {
            name,
            parent,
            in_use,
            directory: true,
            data: NtfsData::None,
        }
    }
}

/// Assembles a FILE record with update-sequence fixups applied
pub fn ntfs_record(flags: u16, attributes: &[Vec<u8>]) -> Vec<u8> {
    let mut raw = vec![0u8; MFT_RECORD];
    put(&mut raw, 0, b"FILE");
    put_u16(&mut raw, 4, 0x30);
    put_u16(&mut raw, 6, 3);
    put_u16(&mut raw, 0x14, 0x38);
    put_u16(&mut raw, 0x16, flags);

    let mut offset = 0x38;
    for attr in attributes {
        put(&mut raw, offset, attr);
        offset += attr.len();
    }
    put_u32(&mut raw, offset, 0xFFFF_FFFF);
    put_u32(&mut raw, 0x18, (offset + 8) as u32);
    put_u32(&mut raw, 0x1C, MFT_RECORD as u32);

    let usn = [0x2A, 0x00];
    put(&mut raw, 0x30, &usn);
    for stride in 1..=2 {
        let tail = stride * 512 - 2;
        let original = [raw[tail], raw[tail + 1]];
        put(&mut raw, 0x30 + stride * 2, &original);
        put(&mut raw, tail, &usn);
    }
    raw
}

pub fn ntfs_file_record(file: &NtfsFile<'_>) -> Vec<u8> {
    let mut flags = 0;
    if file.in_use {
        flags |= RECORD_IN_USE;
    }
    if file.directory {
        flags |= RECORD_DIRECTORY;
    }

    let real_size = match &file.data {
        NtfsData::None => 0,
        NtfsData::Resident(bytes) => bytes.len() as u64,
        NtfsData::Runs { real_size, .. } => *real_size,
    };
    let mut attributes = vec![
        standard_information(UNIX_2021),
        file_name(file.name, file.parent, real_size),
    ];
    match &file.data {
        NtfsData::None => {}
        NtfsData::Resident(bytes) => attributes.push(resident_attr(ATTR_DATA, bytes)),
        NtfsData::Runs { runs, real_size } => attributes.push(non_resident_data(runs, *real_size)),
    }
    ntfs_record(flags, &attributes)
}

/// Builds an NTFS volume of `size` bytes whose MFT holds `record_count`
/// records at LCN 4, with a mirror of record 0 at LCN 2
pub fn ntfs_image(size: usize, record_count: usize, label: &str, files: &[(usize, NtfsFile<'_>)]) -> Vec<u8> {
    let mut image = vec![0u8; size];

    put(&mut image, 0, &[0xEB, 0x52, 0x90]);
    put(&mut image, 3, b"NTFS    ");
    put_u16(&mut image, 0x0B, 512);
    image[0x0D] = 8;
    put_u64(&mut image, 0x28, (size / 512) as u64);
    put_u64(&mut image, 0x30, MFT_LCN);
    put_u64(&mut image, 0x38, MFT_MIRROR_LCN);
    image[0x40] = (-10i8) as u8;
    put_u64(&mut image, 0x48, NTFS_SERIAL);
    put(&mut image, 510, &[0x55, 0xAA]);

    let mft_bytes = (record_count * MFT_RECORD) as u64;
    let mft = ntfs_file_record(&NtfsFile {
        name: "$MFT",
        parent: 5,
        in_use: true,
        directory: false,
        data: NtfsData::Runs {
            runs: vec![(MFT_LCN, mft_bytes.div_ceil(NTFS_CLUSTER))],
            real_size: mft_bytes,
        },
    });
    let mft_offset = (MFT_LCN * NTFS_CLUSTER) as usize;
    put(&mut image, mft_offset, &mft);
    put(&mut image, (MFT_MIRROR_LCN * NTFS_CLUSTER) as usize, &mft);

    let volume = ntfs_record(
        RECORD_IN_USE,
        &[standard_information(UNIX_2021), file_name("$Volume", 5, 0), volume_name(label)],
    );
    put(&mut image, mft_offset + 3 * MFT_RECORD, &volume);

    for (slot, file) in files {
        put(&mut image, mft_offset + slot * MFT_RECORD, &ntfs_file_record(file));
    }
    image
}

pub const NTFS_SAMPLE_FOUND: u64 = 7;
pub const NTFS_SAMPLE_DELETED: u64 = 2;
pub const NTFS_SAMPLE_LABEL: &str = "EVIDENCE";

/// 1 MiB volume, 16 MFT slots:
/// 0 `$MFT`, 3 `$Volume`, 5 root, 6 `report.docx`, 7 deleted `deleted.txt`
/// (resident), 8 `photos/`, 9 deleted `photos/beach.jpg`
pub fn sample_ntfs() -> Vec<u8> {
    ntfs_image(
        1 << 20,
        16,
        NTFS_SAMPLE_LABEL,
        &[
            (5, NtfsFile::directory(".", 5, true)),
            (
                6,
                NtfsFile::file(
                    "report.docx",
                    5,
                    true,
                    NtfsData::Runs {
                        runs: vec![(40, 2)],
                        real_size: 6000,
                    },
                ),
            ),
            (
                7,
                NtfsFile::file("deleted.txt", 5, false, NtfsData::Resident(b"hello world".to_vec())),
            ),
            (8, NtfsFile::directory("photos", 5, true)),
            (
                9,
                NtfsFile::file(
                    "beach.jpg",
                    8,
                    false,
                    NtfsData::Runs {
                        runs: vec![(50, 3)],
                        real_size: 10_000,
                    },
                ),
            ),
        ],
    )
}

/// Byte offset of an MFT slot in the images built here
pub fn mft_slot_offset(slot: usize) -> usize {
    (MFT_LCN * NTFS_CLUSTER) as usize + slot * MFT_RECORD
}

/// Overwrites the FILE signature of one MFT slot
pub fn corrupt_mft_record(image: &mut [u8], slot: usize) {
    put(image, mft_slot_offset(slot), b"XXXX");
}

/// Rewrites record 0 and its mirror with a `$DATA` attribute carrying the
/// raw mapping pairs in `runlist`
pub fn replace_mft_runlist(image: &mut [u8], runlist: &[u8]) {
    let mft_bytes = 16 * MFT_RECORD as u64;
    let record = ntfs_record(
        RECORD_IN_USE,
        &[
            standard_information(UNIX_2021),
            file_name("$MFT", 5, mft_bytes),
            non_resident_attr(runlist, mft_bytes / NTFS_CLUSTER, mft_bytes),
        ],
    );
    put(image, mft_slot_offset(0), &record);
    put(image, (MFT_MIRROR_LCN * NTFS_CLUSTER) as usize, &record);
}

/// A volume whose MFT holds `count` slots, every slot from 16 on a live file
pub fn ntfs_many_files(count: usize) -> Vec<u8> {
    let names: Vec<String> = (0..count).map(|i| format!("file{:05}.bin", i)).collect();
    let files: Vec<(usize, NtfsFile<'_>)> = (16..count)
        .map(|slot| (slot, NtfsFile::file(&names[slot], 5, slot % 3 != 0, NtfsData::None)))
        .collect();
    let mft_end = mft_slot_offset(count);
    let size = (mft_end + (1 << 16)).next_multiple_of(4096);
    ntfs_image(size, count, "BULK", &files)
}

// ============================================================================
// ext
// ============================================================================

pub const EXT_BLOCK: usize = 1024;
pub const EXT_INODE_SIZE: usize = 256;
pub const EXT_INODES_PER_GROUP: u32 = 32;
pub const EXT_BITMAP_BLOCK: usize = 4;
pub const EXT_INODE_TABLE_BLOCK: usize = 5;
pub const EXT_JOURNAL_INODE: u32 = 8;

const S_IFDIR: u16 = 0x4000;
const S_IFREG: u16 = 0x8000;
const EXT4_EXTENTS_FL: u32 = 0x0008_0000;

/// One inode of the sample images
pub struct ExtInode {
    pub mode: u16,
    pub size: u32,
    pub links: u16,
    pub dtime: u32,
    /// First block and length of a single extent
    pub extent: Option<(u32, u16)>,
}

impl ExtInode {
    pub fn directory(block: u32) -> Self {
        Self {
            mode: S_IFDIR | 0o755,
            size: EXT_BLOCK as u32,
            links: 2,
            dtime: 0,
            extent: Some((block, 1)),
        }
    }

    pub fn file(size: u32, block: u32, blocks: u16) -> Self {
        Self {
            mode: S_IFREG | 0o644,
            size,
            links: 1,
            dtime: 0,
            extent: Some((block, blocks)),
        }
    }

    pub fn deleted(mut self) -> Self {
        self.links = 0;
        self.dtime = (UNIX_2021 + 86_400) as u32;
        self
    }
}

pub fn ext_inode(inode: &ExtInode) -> Vec<u8> {
    let mut raw = vec![0u8; EXT_INODE_SIZE];
    put_u16(&mut raw, 0x00, inode.mode);
    put_u32(&mut raw, 0x04, inode.size);
    put_u32(&mut raw, 0x10, (UNIX_2021 + 60) as u32);
    put_u32(&mut raw, 0x14, inode.dtime);
    put_u16(&mut raw, 0x1A, inode.links);
    if let Some((block, length)) = inode.extent {
        put_u32(&mut raw, 0x20, EXT4_EXTENTS_FL);
        // Extent header: magic, one entry, depth 0
        put_u16(&mut raw, 0x28, 0xF30A);
        put_u16(&mut raw, 0x2A, 1);
        put_u16(&mut raw, 0x2C, 4);
        put_u16(&mut raw, 0x2E, 0);
        put_u32(&mut raw, 0x34, 0);
        put_u16(&mut raw, 0x38, length);
        put_u16(&mut raw, 0x3A, 0);
        put_u32(&mut raw, 0x3C, block);
    }
    put_u16(&mut raw, 0x80, 32);
    put_u32(&mut raw, 0x90, UNIX_2021 as u32);
    raw
}

/// Appends a directory entry; `rec_len` of zero means "to the end of the block"
fn dir_entry(block: &mut [u8], offset: usize, inode: u32, rec_len: usize, name: &str) -> usize {
    let rec_len = if rec_len == 0 { block.len() - offset } else { rec_len };
    put_u32(block, offset, inode);
    put_u16(block, offset + 4, rec_len as u16);
    block[offset + 6] = name.len() as u8;
    put(block, offset + 8, name.as_bytes());
    offset + rec_len
}

/// Superblock for a 1 KiB-block volume of `blocks` blocks in one group
pub fn ext_superblock(blocks: u32) -> Vec<u8> {
    let mut sb = vec![0u8; 1024];
    put_u32(&mut sb, 0, EXT_INODES_PER_GROUP);
    put_u32(&mut sb, 4, blocks);
    put_u32(&mut sb, 20, 1);
    put_u32(&mut sb, 24, 0);
    put_u32(&mut sb, 32, 8192);
    put_u32(&mut sb, 40, EXT_INODES_PER_GROUP);
    put_u16(&mut sb, 56, 0xEF53);
    put_u32(&mut sb, 76, 1);
    put_u32(&mut sb, 84, 11);
    put_u16(&mut sb, 88, EXT_INODE_SIZE as u16);
    put_u32(&mut sb, 92, 0x4);
    put(&mut sb, 104, &[0xA1; 16]);
    put(&mut sb, 120, b"linuxdata");
    put_u32(&mut sb, 224, EXT_JOURNAL_INODE);
    sb
}

pub fn ext_inode_offset(ino: u32) -> usize {
    EXT_INODE_TABLE_BLOCK * EXT_BLOCK + (ino as usize - 1) * EXT_INODE_SIZE
}

pub const EXT_SAMPLE_FOUND: u64 = 5;
pub const EXT_SAMPLE_DELETED: u64 = 1;

/// 1 MiB volume with one block group:
/// 2 root, 12 `notes.txt`, 13 `docs/`, 14 deleted `old.log` (hidden entry
/// in the root directory), 15 `docs/draft.md`
pub fn sample_ext() -> Vec<u8> {
    let blocks = 1024u32;
    let mut image = vec![0u8; blocks as usize * EXT_BLOCK];
    put(&mut image, 1024, &ext_superblock(blocks));

    // Group descriptor table at block 2
    let gdt = 2 * EXT_BLOCK;
    put_u32(&mut image, gdt + 0x04, EXT_BITMAP_BLOCK as u32);
    put_u32(&mut image, gdt + 0x08, EXT_INODE_TABLE_BLOCK as u32);

    // Inodes 1-13 and 15 allocated; 14 is free
    let bitmap = EXT_BITMAP_BLOCK * EXT_BLOCK;
    image[bitmap] = 0xFF;
    image[bitmap + 1] = 0b0101_1111;

    let inodes = [
        (2, ExtInode {
            links: 3,
            ..ExtInode::directory(20)
        }),
        (12, ExtInode::file(3000, 30, 3)),
        (13, ExtInode::directory(21)),
        (14, ExtInode::file(500, 40, 1).deleted()),
        (15, ExtInode::file(42, 41, 1)),
    ];
    for (ino, inode) in &inodes {
        put(&mut image, ext_inode_offset(*ino), &ext_inode(inode));
    }

    let mut root = vec![0u8; EXT_BLOCK];
    let mut at = dir_entry(&mut root, 0, 2, 12, ".");
    at = dir_entry(&mut root, at, 2, 12, "..");
    at = dir_entry(&mut root, at, 12, 20, "notes.txt");
    let docs = at;
    dir_entry(&mut root, docs, 13, 0, "docs");
    // Unlinked entry left in the slack of "docs"
    dir_entry(&mut root, docs + 12, 14, 16, "old.log");
    put(&mut image, 20 * EXT_BLOCK, &root);

    let mut sub = vec![0u8; EXT_BLOCK];
    let mut at = dir_entry(&mut sub, 0, 13, 12, ".");
    at = dir_entry(&mut sub, at, 2, 12, "..");
    dir_entry(&mut sub, at, 15, 0, "draft.md");
    put(&mut image, 21 * EXT_BLOCK, &sub);

    image
}

/// Gives an inode a file type no ext variant defines
pub fn corrupt_ext_inode(image: &mut [u8], ino: u32) {
    put_u16(image, ext_inode_offset(ino), 0xF1A4);
}

/// 1 MiB of zeros with only the ext magic at offset 1080
pub fn ext_magic_only() -> Vec<u8> {
    let mut image = vec![0u8; 1 << 20];
    put(&mut image, 1080, &[0x53, 0xEF]);
    image
}

// ============================================================================
// APFS
// ============================================================================

pub const APFS_BLOCK: usize = 4096;
pub const APFS_BLOCKS: u64 = 64;
pub const APFS_RECORD: usize = 128;

pub const VOLUME_LIST_BLOCK: usize = 1;
const VOLUME_BLOCK: usize = 2;
const SNAPSHOT_BLOCK: usize = 3;
const INODE_TREE_BLOCK: usize = 10;
pub const DIRENT_TREE_BLOCK: usize = 11;
const EXTENT_TREE_BLOCK: usize = 12;
pub const INODE_RECORD_BLOCK: usize = 20;
const DIRENT_RECORD_BLOCK: usize = 21;

const KIND_DIRECTORY: u16 = 4;
const KIND_REGULAR: u16 = 8;

pub const APFS_VOLUME_NAME: &str = "Macintosh HD";

fn nanos(unix: i64) -> u64 {
    unix as u64 * 1_000_000_000
}

pub fn tree_node(level: u16, entries: &[(u64, u64, u64)]) -> Vec<u8> {
    let mut node = vec![0u8; APFS_BLOCK];
    put(&mut node, 0, b"NODE");
    put_u16(&mut node, 4, level);
    put_u32(&mut node, 8, entries.len() as u32);
    for (i, (key, a, b)) in entries.iter().enumerate() {
        let at = 16 + i * 24;
        put_u64(&mut node, at, *key);
        put_u64(&mut node, at + 8, *a);
        put_u64(&mut node, at + 16, *b);
    }
    node
}

fn inode_record(kind: u16, deleted: bool, size: u64, oid: u64, parent: u64) -> Vec<u8> {
    let mut raw = vec![0u8; APFS_RECORD];
    put(&mut raw, 0, b"INOD");
    put_u16(&mut raw, 4, kind);
    put_u16(&mut raw, 6, deleted as u16);
    put_u64(&mut raw, 12, size);
    put_u64(&mut raw, 20, nanos(UNIX_2021));
    put_u64(&mut raw, 28, nanos(UNIX_2021 + 120));
    put_u64(&mut raw, 44, oid);
    put_u64(&mut raw, 52, parent);
    raw
}

fn dirent_record(name: &str, parent: u64, child: u64, unlinked: bool) -> Vec<u8> {
    let mut raw = vec![0u8; APFS_RECORD];
    put(&mut raw, 0, b"DREC");
    put_u16(&mut raw, 4, name.len() as u16);
    put_u16(&mut raw, 6, unlinked as u16);
    put_u64(&mut raw, 8, parent);
    put_u64(&mut raw, 16, child);
    put(&mut raw, 24, name.as_bytes());
    raw
}

fn apfs_block(image: &mut [u8], block: usize) -> &mut [u8] {
    &mut image[block * APFS_BLOCK..(block + 1) * APFS_BLOCK]
}

pub const APFS_SAMPLE_FOUND: u64 = 4;
pub const APFS_SAMPLE_DELETED: u64 = 1;

/// 256 KiB container with one volume:
/// 2 root, 16 `Documents/`, 17 `Documents/tax.xlsx`, 18 deleted
/// `Documents/old.pdf`, plus one snapshot
pub fn sample_apfs() -> Vec<u8> {
    apfs_image(&[])
}

/// Like [`sample_apfs`], with extra volume superblock blocks appended to
/// the volume list
pub fn apfs_image(extra_volumes: &[u64]) -> Vec<u8> {
    let mut image = vec![0u8; APFS_BLOCKS as usize * APFS_BLOCK];

    let nx = apfs_block(&mut image, 0);
    put(nx, 0, b"NXSB");
    put_u32(nx, 4, APFS_BLOCK as u32);
    put_u64(nx, 8, APFS_BLOCKS);
    put_u32(nx, 36, 1 + extra_volumes.len() as u32);
    put_u64(nx, 40, VOLUME_LIST_BLOCK as u64);
    put_u64(nx, 48, SNAPSHOT_BLOCK as u64);

    let list = apfs_block(&mut image, VOLUME_LIST_BLOCK);
    put_u64(list, 0, VOLUME_BLOCK as u64);
    for (i, block) in extra_volumes.iter().enumerate() {
        put_u64(list, 8 * (i + 1), *block);
    }

    let volume = apfs_block(&mut image, VOLUME_BLOCK);
    put(volume, 0, b"APSB");
    put_u32(volume, 4, APFS_BLOCK as u32);
    put_u64(volume, 8, 4);
    put_u64(volume, 16, INODE_TREE_BLOCK as u64);
    put_u64(volume, 24, DIRENT_TREE_BLOCK as u64);
    put_u64(volume, 32, EXTENT_TREE_BLOCK as u64);
    put(volume, 40, APFS_VOLUME_NAME.as_bytes());

    let snapshots = apfs_block(&mut image, SNAPSHOT_BLOCK);
    put(snapshots, 0, b"SNAP");
    put_u32(snapshots, 4, 1);
    put_u64(snapshots, 8, 77);
    put_u64(snapshots, 16, nanos(UNIX_2021));
    put(snapshots, 24, b"daily");

    let inode_block = INODE_RECORD_BLOCK as u64;
    let inode_tree = tree_node(
        0,
        &[
            (2, inode_block, 0),
            (16, inode_block, 1),
            (17, inode_block, 2),
            (18, inode_block, 3),
        ],
    );
    put(&mut image, INODE_TREE_BLOCK * APFS_BLOCK, &inode_tree);

    let dirent_block = DIRENT_RECORD_BLOCK as u64;
    let dirent_tree = tree_node(0, &[(1, dirent_block, 0), (2, dirent_block, 1), (3, dirent_block, 2)]);
    put(&mut image, DIRENT_TREE_BLOCK * APFS_BLOCK, &dirent_tree);

    let extent_tree = tree_node(0, &[(17, 40, 3), (18, 44, 1)]);
    put(&mut image, EXTENT_TREE_BLOCK * APFS_BLOCK, &extent_tree);

    let records = [
        inode_record(KIND_DIRECTORY, false, 0, 2, 2),
        inode_record(KIND_DIRECTORY, false, 0, 16, 2),
        inode_record(KIND_REGULAR, false, 9000, 17, 16),
        inode_record(KIND_REGULAR, true, 4000, 18, 16),
    ];
    for (i, record) in records.iter().enumerate() {
        put(&mut image, INODE_RECORD_BLOCK * APFS_BLOCK + i * APFS_RECORD, record);
    }

    let dirents = [
        dirent_record("Documents", 2, 16, false),
        dirent_record("tax.xlsx", 16, 17, false),
        dirent_record("old.pdf", 16, 18, true),
    ];
    for (i, record) in dirents.iter().enumerate() {
        put(&mut image, DIRENT_RECORD_BLOCK * APFS_BLOCK + i * APFS_RECORD, record);
    }

    image
}

/// Overwrites the magic of one inode record slot
pub fn corrupt_apfs_record(image: &mut [u8], slot: usize) {
    put(image, INODE_RECORD_BLOCK * APFS_BLOCK + slot * APFS_RECORD, b"XXXX");
}

// ============================================================================
// Formats without a parser
// ============================================================================

pub fn fat_image() -> Vec<u8> {
    let mut image = vec![0u8; 1 << 16];
    put(&mut image, 0, &[0xEB, 0x3C, 0x90]);
    put(&mut image, 3, b"MSDOS5.0");
    put(&mut image, 510, &[0x55, 0xAA]);
    image
}

pub fn hfs_image() -> Vec<u8> {
    let mut image = vec![0u8; 1 << 16];
    put(&mut image, 1024, b"H+");
    image
}
