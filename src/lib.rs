//! Salvage - file metadata recovery from raw volumes
//!
//! Detects the filesystem on a block device or image, walks its metadata
//! structures (NTFS MFT, ext inode tables, APFS object trees) and collects
//! every live and deleted file record into a [`RecoveryCatalog`].
//!
//! [`RecoveryCatalog`]: domain::entities::RecoveryCatalog

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
