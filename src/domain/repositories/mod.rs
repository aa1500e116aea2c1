//! Repository traits
//!
//! Byte access to a device and metadata parsing of one filesystem format.
//! The application layer sees only these traits.

mod block_device;
mod file_system;

pub use block_device::{BlockDeviceError, BlockDeviceReader, DeviceInfo, DeviceKind, check_read_range};
pub use file_system::{
    FileSystemError, FileSystemParser, FileSystemType, ProgressCallback, ScanControl,
};
pub(crate) use file_system::ProgressTracker;
