//! File record entity
//!
//! One file or directory entry reconstructed from on-disk metadata.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where a record was read from inside the metadata table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RecordLocator {
    /// Slot index within the format's locator (MFT record number, inode
    /// table index, tree leaf ordinal)
    pub slot: u64,
    /// Absolute byte offset of the record on the device
    pub byte_offset: u64,
}

impl RecordLocator {
    pub fn new(slot: u64, byte_offset: u64) -> Self {
        Self { slot, byte_offset }
    }
}

/// A contiguous byte range on the device holding file data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Extent {
    /// Absolute byte offset on the device
    pub offset: u64,
    /// Length in bytes
    pub length: u64,
}

impl Extent {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}

/// Appends an extent, merging it into the previous one when they touch
pub(crate) fn push_coalesced(extents: &mut Vec<Extent>, next: Extent) {
    if next.length == 0 {
        return;
    }
    if let Some(last) = extents.last_mut() {
        if last.end() == next.offset {
            last.length += next.length;
            return;
        }
    }
    extents.push(next);
}

/// Represents one file or directory discovered while parsing metadata
///
/// Records are immutable once built; the parser assembles them with the
/// `with_*` builder methods before handing them to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Format-specific identifier (MFT record number, inode number, object id)
    id: u64,
    /// Identifier of the containing directory, when known
    parent_id: Option<u64>,
    /// Name, absent when directory-entry resolution failed
    name: Option<String>,
    /// Logical size in bytes
    size: u64,
    created: Option<DateTime<Utc>>,
    modified: Option<DateTime<Utc>>,
    is_directory: bool,
    is_deleted: bool,
    locator: RecordLocator,
    /// Data ranges on the device, in logical order
    extents: Vec<Extent>,
}

impl FileRecord {
    /// Creates a record with no name, zero size and no timestamps
    pub fn new(id: u64, locator: RecordLocator) -> Self {
        Self {
            id,
            parent_id: None,
            name: None,
            size: 0,
            created: None,
            modified: None,
            is_directory: false,
            is_deleted: false,
            locator,
            extents: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn with_parent(mut self, parent_id: Option<u64>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_times(
        mut self,
        created: Option<DateTime<Utc>>,
        modified: Option<DateTime<Utc>>,
    ) -> Self {
        self.created = created;
        self.modified = modified;
        self
    }

    pub fn with_directory(mut self, is_directory: bool) -> Self {
        self.is_directory = is_directory;
        self
    }

    pub fn with_deleted(mut self, is_deleted: bool) -> Self {
        self.is_deleted = is_deleted;
        self
    }

    pub fn with_extents(mut self, extents: Vec<Extent>) -> Self {
        self.extents = extents;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn parent_id(&self) -> Option<u64> {
        self.parent_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn locator(&self) -> RecordLocator {
        self.locator
    }

    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }

    /// Sum of all extent lengths
    pub fn allocated_bytes(&self) -> u64 {
        self.extents.iter().map(|e| e.length).sum()
    }

    /// Returns a display name, falling back to the identifier
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("<unnamed #{}>", self.id),
        }
    }

    /// Returns a human-readable size string
    pub fn size_human(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if self.size >= GB {
            format!("{:.2} GB", self.size as f64 / GB as f64)
        } else if self.size >= MB {
            format!("{:.2} MB", self.size as f64 / MB as f64)
        } else if self.size >= KB {
            format!("{:.2} KB", self.size as f64 / KB as f64)
        } else {
            format!("{} bytes", self.size)
        }
    }
}
