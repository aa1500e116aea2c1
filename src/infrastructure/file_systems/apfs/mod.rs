//! APFS container parser
//!
//! Volumes are independent trees inside one container; each volume is one
//! scan segment.

mod btree;
mod container;
mod parser;
mod records;

pub use btree::{TreeEntry, TreeWalk, walk_tree};
pub use container::{ContainerSuperblock, VolumeSuperblock};
pub use parser::ApfsParser;
