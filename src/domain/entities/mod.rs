//! Domain entities
//!
//! Core business objects of the metadata recovery domain.

mod file_record;
mod recovery_catalog;
mod scan_result;
mod volume_info;

pub use file_record::{Extent, FileRecord, RecordLocator};
pub(crate) use file_record::push_coalesced;
pub use recovery_catalog::{CatalogError, CatalogSnapshot, RecoveryCatalog};
pub use scan_result::{CancellationToken, ScanOutcome, ScanProgress};
pub use volume_info::{JournalInfo, SnapshotEntry, VolumeInfo};
