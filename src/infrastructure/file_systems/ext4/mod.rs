//! ext4 filesystem parser
//!
//! Handles ext2, ext3 and ext4. Inodes are fixed slots in per-group tables,
//! so a deleted file keeps its inode until the slot is reallocated.

mod block_map;
mod directory;
mod inode;
mod parser;
mod superblock;

pub use directory::{DirEntry, parse_dir_block};
pub use parser::Ext4Parser;
pub use superblock::{Ext4Superblock, GroupDescriptor};
