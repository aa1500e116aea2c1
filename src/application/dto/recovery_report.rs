//! Recovery report DTO

use crate::domain::entities::{ScanOutcome, VolumeInfo};
use crate::domain::repositories::{DeviceInfo, FileSystemType};
use serde::Serialize;
use std::time::Duration;

/// Summary of one finished recovery pass
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub device: DeviceInfo,
    pub filesystem: FileSystemType,
    pub volume: VolumeInfo,
    pub outcome: ScanOutcome,
    pub total_found: u64,
    pub total_deleted: u64,
    pub discarded: u64,
    pub skipped_segments: u64,
    /// Wall-clock time of the parse pass
    #[serde(serialize_with = "serialize_seconds")]
    pub duration: Duration,
}

fn serialize_seconds<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(duration.as_secs_f64())
}

impl RecoveryReport {
    pub fn is_cancelled(&self) -> bool {
        self.outcome.is_cancelled()
    }

    /// Returns a one-line summary
    pub fn summary(&self) -> String {
        let status = if self.is_cancelled() {
            "cancelled"
        } else {
            "completed"
        };
        format!(
            "{} pass {} in {:.2}s: {} records ({} deleted), {} discarded, {} segments skipped",
            self.filesystem,
            status,
            self.duration.as_secs_f64(),
            self.total_found,
            self.total_deleted,
            self.discarded,
            self.skipped_segments
        )
    }
}
