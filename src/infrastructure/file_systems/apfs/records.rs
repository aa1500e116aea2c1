//! Inode (`INOD`) and directory entry (`DREC`) records
//!
//! Both live in 128-byte slots inside record blocks that tree leaves point at.

use super::container::nanos_to_utc;
use crate::infrastructure::file_systems::le::LeBytes;
use chrono::{DateTime, Utc};

pub const RECORD_SIZE: usize = 128;

pub const INODE_MAGIC: [u8; 4] = *b"INOD";
pub const DIRENT_MAGIC: [u8; 4] = *b"DREC";

pub const KIND_DIRECTORY: u16 = 4;
pub const KIND_REGULAR: u16 = 8;
pub const KIND_SYMLINK: u16 = 10;

const INODE_FLAG_DELETED: u16 = 0x1;
const DIRENT_FLAG_UNLINKED: u16 = 0x1;

const DIRENT_NAME_OFFSET: usize = 24;
const MAX_NAME_LEN: usize = RECORD_SIZE - DIRENT_NAME_OFFSET;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeRecord {
    pub kind: u16,
    pub flags: u16,
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub object_id: u64,
    pub parent_id: u64,
}

impl InodeRecord {
    pub fn is_directory(&self) -> bool {
        self.kind == KIND_DIRECTORY
    }

    pub fn is_deleted(&self) -> bool {
        self.flags & INODE_FLAG_DELETED != 0
    }
}

/// Decodes an inode record, checking it belongs to `expected_id`
///
/// Mode bits (@8) and access time (@36) are not carried into the catalog.
pub fn parse_inode(raw: &[u8], expected_id: u64) -> Result<InodeRecord, String> {
    let view = LeBytes::new(raw);
    if view.bytes(0, 4) != Some(&INODE_MAGIC[..]) {
        return Err("missing INOD magic".to_string());
    }
    let truncated = || "truncated inode record".to_string();

    let kind = view.u16(4).ok_or_else(truncated)?;
    if !matches!(kind, KIND_DIRECTORY | KIND_REGULAR | KIND_SYMLINK) {
        return Err(format!("unknown inode kind {}", kind));
    }
    let object_id = view.u64(44).ok_or_else(truncated)?;
    if object_id != expected_id {
        return Err(format!("object id {} under key {}", object_id, expected_id));
    }

    Ok(InodeRecord {
        kind,
        flags: view.u16(6).ok_or_else(truncated)?,
        size: view.u64(12).ok_or_else(truncated)?,
        created: view.u64(20).and_then(nanos_to_utc),
        modified: view.u64(28).and_then(nanos_to_utc),
        object_id,
        parent_id: view.u64(52).ok_or_else(truncated)?,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirentRecord {
    pub name: String,
    pub parent_id: u64,
    pub child_id: u64,
    pub unlinked: bool,
}

/// Decodes a directory entry record, `None` when malformed
pub fn parse_dirent(raw: &[u8]) -> Option<DirentRecord> {
    let view = LeBytes::new(raw);
    if view.bytes(0, 4) != Some(&DIRENT_MAGIC[..]) {
        return None;
    }
    let name_len = view.u16(4)? as usize;
    if name_len == 0 || name_len > MAX_NAME_LEN {
        return None;
    }
    let name = std::str::from_utf8(view.bytes(DIRENT_NAME_OFFSET, name_len)?).ok()?;

    Some(DirentRecord {
        name: name.to_string(),
        parent_id: view.u64(8)?,
        child_id: view.u64(16)?,
        unlinked: view.u16(6)? & DIRENT_FLAG_UNLINKED != 0,
    })
}
