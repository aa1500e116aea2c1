//! Volume-level facts read from the root metadata block

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A point-in-time snapshot recorded by the filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotEntry {
    pub name: String,
    pub transaction_id: u64,
    pub created: Option<DateTime<Utc>>,
}

/// Journal location for journalling filesystems
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalInfo {
    /// Inode holding an internal journal, if any
    pub inode: Option<u32>,
    /// UUID of an external journal device, if any
    pub uuid: Option<String>,
}

/// Summary of one filesystem instance
#[derive(Debug, Clone, Default, Serialize)]
pub struct VolumeInfo {
    /// Human-readable filesystem label ("NTFS", "ext4", ...)
    pub filesystem: String,
    /// Volume label, when the format stores one
    pub label: Option<String>,
    pub uuid: Option<String>,
    /// Cluster / block size in bytes
    pub block_size: u64,
    /// Size the root block declares for the volume
    pub declared_size: u64,
    /// Named volumes inside a container
    pub volumes: Vec<String>,
    pub snapshots: Vec<SnapshotEntry>,
    pub journal: Option<JournalInfo>,
}
