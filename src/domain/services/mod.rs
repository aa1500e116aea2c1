//! Domain services
//!
//! Stateless logic that operates on repository traits.

mod format_detector;

pub use format_detector::{
    APFS_CONTAINER_MAGIC, APFS_VOLUME_MAGIC, EXT_SUPER_MAGIC, FormatDetector, NTFS_OEM_ID,
};
