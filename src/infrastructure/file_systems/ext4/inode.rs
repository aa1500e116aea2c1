//! Inode decoding and classification

use crate::infrastructure::file_systems::le::LeBytes;
use chrono::{DateTime, Utc};

/// Bytes of the fixed inode part
pub const GOOD_OLD_INODE_SIZE: usize = 128;

/// Offset and size of `i_block`
pub const I_BLOCK_OFFSET: usize = 0x28;
pub const I_BLOCK_SIZE: usize = 60;

const S_IFMT: u16 = 0xF000;
const S_IFIFO: u16 = 0x1000;
const S_IFCHR: u16 = 0x2000;
const S_IFDIR: u16 = 0x4000;
const S_IFBLK: u16 = 0x6000;
const S_IFREG: u16 = 0x8000;
const S_IFLNK: u16 = 0xA000;
const S_IFSOCK: u16 = 0xC000;

pub const EXT4_EXTENTS_FL: u32 = 0x0008_0000;
pub const EXT4_INLINE_DATA_FL: u32 = 0x1000_0000;

/// `extra_isize` needed before `i_crtime` is present
const CRTIME_EXTRA_ISIZE: u16 = 0x18;

/// Decoded inode fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub mode: u16,
    pub size: u64,
    pub links_count: u16,
    pub dtime: u32,
    pub flags: u32,
    pub modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub i_block: [u8; I_BLOCK_SIZE],
    /// Zero mode recovered from a deletion stamp
    pub mode_cleared: bool,
}

impl Inode {
    pub fn is_directory(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    pub fn is_regular(&self) -> bool {
        self.mode_cleared || self.mode & S_IFMT == S_IFREG
    }

    pub fn uses_extents(&self) -> bool {
        self.flags & EXT4_EXTENTS_FL != 0
    }

    pub fn has_inline_data(&self) -> bool {
        self.flags & EXT4_INLINE_DATA_FL != 0
    }

    /// Short symlink targets live in `i_block` itself
    pub fn is_fast_symlink(&self) -> bool {
        self.is_symlink() && !self.uses_extents() && self.size < I_BLOCK_SIZE as u64
    }

    /// Deletion marks readable from the inode alone
    pub fn deletion_stamped(&self) -> bool {
        self.dtime != 0 && self.links_count == 0
    }
}

#[derive(Debug)]
pub enum InodeClass {
    Empty,
    Invalid(String),
    Parsed(Inode),
}

fn unix_time(seconds: u32) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    DateTime::from_timestamp(seconds as i64, 0)
}

/// Classifies one on-disk inode of `raw.len()` bytes
pub fn classify_inode(raw: &[u8]) -> InodeClass {
    let view = LeBytes::new(raw);
    if view.is_zeroed() {
        return InodeClass::Empty;
    }
    if raw.len() < GOOD_OLD_INODE_SIZE {
        return InodeClass::Invalid("truncated inode".to_string());
    }

    let (Some(mode), Some(size_lo), Some(mtime), Some(dtime), Some(links_count), Some(flags)) = (
        view.u16(0x00),
        view.u32(0x04),
        view.u32(0x10),
        view.u32(0x14),
        view.u16(0x1A),
        view.u32(0x20),
    ) else {
        return InodeClass::Invalid("truncated inode".to_string());
    };

    let mode_cleared = mode == 0;
    if mode_cleared && dtime == 0 {
        return InodeClass::Invalid("zero mode without deletion time".to_string());
    }
    if !mode_cleared
        && !matches!(
            mode & S_IFMT,
            S_IFIFO | S_IFCHR | S_IFDIR | S_IFBLK | S_IFREG | S_IFLNK | S_IFSOCK
        )
    {
        return InodeClass::Invalid(format!("unknown file type in mode {:#o}", mode));
    }

    let mut created = None;
    if raw.len() > GOOD_OLD_INODE_SIZE {
        let extra_isize = view.u16(0x80).unwrap_or(0);
        if GOOD_OLD_INODE_SIZE + extra_isize as usize > raw.len() {
            return InodeClass::Invalid(format!("extra_isize {} overflows inode", extra_isize));
        }
        if extra_isize >= CRTIME_EXTRA_ISIZE {
            created = view.u32(0x90).and_then(unix_time);
        }
    }

    let size_hi = view.u32(0x6C).unwrap_or(0) as u64;
    let mut i_block = [0u8; I_BLOCK_SIZE];
    if let Some(bytes) = view.bytes(I_BLOCK_OFFSET, I_BLOCK_SIZE) {
        i_block.copy_from_slice(bytes);
    }

    InodeClass::Parsed(Inode {
        mode,
        size: size_lo as u64 | (size_hi << 32),
        links_count,
        dtime,
        flags,
        modified: unix_time(mtime),
        created,
        i_block,
        mode_cleared,
    })
}
