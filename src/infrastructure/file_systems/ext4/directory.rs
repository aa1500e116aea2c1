//! Directory block parsing
//!
//! Besides the live `ext4_dir_entry_2` chain, a directory block keeps the
//! bytes of unlinked entries inside the `rec_len` of their predecessor.
//! Those are recovered as hidden entries.

use crate::infrastructure::file_systems::le::LeBytes;
use std::collections::HashMap;

const DIRENT_HEADER: usize = 8;

/// One name found in a directory block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u32,
    pub name: String,
    /// False for entries recovered from `rec_len` slack
    pub live: bool,
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Decodes an entry header and name at `offset`, if plausible
fn entry_at(view: &LeBytes<'_>, offset: usize, limit: usize) -> Option<(u32, u16, String)> {
    let inode = view.u32(offset)?;
    let rec_len = view.u16(offset + 4)?;
    let name_len = view.u8(offset + 6)? as usize;
    if inode == 0 || name_len == 0 || offset + DIRENT_HEADER + name_len > limit {
        return None;
    }
    let raw = view.bytes(offset + DIRENT_HEADER, name_len)?;
    if raw.iter().any(|&b| b == 0 || b == b'/') {
        return None;
    }
    let name = std::str::from_utf8(raw).ok()?.to_string();
    Some((inode, rec_len, name))
}

/// Parses one directory block
pub fn parse_dir_block(block: &[u8], inodes_count: u32) -> Vec<DirEntry> {
    let view = LeBytes::new(block);
    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset + DIRENT_HEADER <= block.len() {
        let Some(rec_len) = view.u16(offset + 4).map(|l| l as usize) else {
            break;
        };
        if rec_len < DIRENT_HEADER || rec_len % 4 != 0 || offset + rec_len > block.len() {
            break;
        }
        let end = offset + rec_len;

        let mut used = DIRENT_HEADER;
        if let Some((inode, _, name)) = entry_at(&view, offset, end) {
            used = align4(DIRENT_HEADER + name.len());
            if inode <= inodes_count {
                entries.push(DirEntry { inode, name, live: true });
            }
        }

        // Unlinked entries hide in the slack after the live one
        let mut cursor = offset + used;
        while cursor + DIRENT_HEADER < end {
            match entry_at(&view, cursor, end) {
                Some((inode, hidden_len, name))
                    if inode <= inodes_count
                        && hidden_len as usize >= align4(DIRENT_HEADER + name.len()) =>
                {
                    cursor += align4(DIRENT_HEADER + name.len());
                    entries.push(DirEntry { inode, name, live: false });
                }
                _ => cursor += 4,
            }
        }

        offset = end;
    }

    entries
}

/// Name of an inode and the directory that holds it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    pub name: String,
    pub parent: u32,
    live: bool,
}

/// Inode number → name map built from directory blocks
#[derive(Debug, Default)]
pub struct NameTable {
    names: HashMap<u32, NameEntry>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the entries of one directory; live names replace hidden ones
    pub fn insert_all(&mut self, directory: u32, entries: Vec<DirEntry>) {
        for entry in entries {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            let candidate = NameEntry {
                name: entry.name,
                parent: directory,
                live: entry.live,
            };
            match self.names.get(&entry.inode) {
                Some(existing) if existing.live || !candidate.live => {}
                _ => {
                    self.names.insert(entry.inode, candidate);
                }
            }
        }
    }

    /// Merges another table, keeping this table's entries on ties
    pub fn merge(&mut self, other: NameTable) {
        for (inode, candidate) in other.names {
            match self.names.get(&inode) {
                Some(existing) if existing.live || !candidate.live => {}
                _ => {
                    self.names.insert(inode, candidate);
                }
            }
        }
    }

    /// Entry naming `inode`; directory entries hold 32-bit inode numbers,
    /// so larger numbers never have one
    pub fn get(&self, inode: u64) -> Option<&NameEntry> {
        self.names.get(&u32::try_from(inode).ok()?)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
