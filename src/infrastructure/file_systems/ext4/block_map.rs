//! Maps an inode's `i_block` area to device byte ranges
//!
//! Handles extent trees and the classic direct/indirect block maps. Block
//! reads go through a callback so the walk stays independent of the device.

use super::inode::{I_BLOCK_OFFSET, I_BLOCK_SIZE, Inode};
use crate::domain::entities::{Extent, push_coalesced};
use crate::infrastructure::file_systems::le::LeBytes;
use std::collections::HashSet;
use tracing::debug;

const EXTENT_MAGIC: u16 = 0xF30A;
const EXTENT_MAX_DEPTH: u16 = 5;
const EXTENT_ENTRY_SIZE: usize = 12;

/// Lengths above this mark an uninitialised extent
const EXTENT_INIT_MAX_LEN: u16 = 32768;

const DIRECT_BLOCKS: usize = 12;

/// Reads one filesystem block by number
pub type ReadBlock<'a> = dyn Fn(u64) -> Option<Vec<u8>> + 'a;

/// Geometry a block map walk needs
#[derive(Debug, Clone, Copy)]
pub struct MapContext {
    pub block_size: u64,
    pub blocks_count: u64,
}

impl MapContext {
    fn extent(&self, block: u64, count: u64) -> Option<Extent> {
        if block == 0 || block >= self.blocks_count {
            return None;
        }
        let count = count.min(self.blocks_count - block);
        Some(Extent::new(block * self.block_size, count * self.block_size))
    }
}

/// Returns the data ranges of an inode
///
/// `inode_offset` is the byte offset of the inode on the device, used for
/// inline data.
pub fn inode_extents(
    inode: &Inode,
    inode_offset: u64,
    context: &MapContext,
    read_block: &ReadBlock<'_>,
) -> Vec<Extent> {
    if inode.has_inline_data() {
        let mut extents = Vec::new();
        let length = inode.size.min(I_BLOCK_SIZE as u64);
        push_coalesced(&mut extents, Extent::new(inode_offset + I_BLOCK_OFFSET as u64, length));
        return extents;
    }
    if inode.is_fast_symlink() {
        return Vec::new();
    }

    let mut extents = Vec::new();
    if inode.uses_extents() {
        let mut visited = HashSet::new();
        walk_extent_node(
            &inode.i_block,
            context,
            read_block,
            EXTENT_MAX_DEPTH + 1,
            &mut visited,
            &mut extents,
        );
    } else {
        let wanted = inode.size.div_ceil(context.block_size);
        walk_block_map(&inode.i_block, context, read_block, wanted, &mut extents);
    }
    extents
}

fn walk_extent_node(
    node: &[u8],
    context: &MapContext,
    read_block: &ReadBlock<'_>,
    depth_budget: u16,
    visited: &mut HashSet<u64>,
    extents: &mut Vec<Extent>,
) {
    let view = LeBytes::new(node);
    let (Some(magic), Some(entries), Some(depth)) = (view.u16(0), view.u16(2), view.u16(6)) else {
        return;
    };
    if magic != EXTENT_MAGIC || depth > EXTENT_MAX_DEPTH || depth >= depth_budget {
        debug!("extent header rejected (magic {:#06x}, depth {})", magic, depth);
        return;
    }

    for i in 0..entries as usize {
        let Some(entry) = view.bytes(EXTENT_ENTRY_SIZE * (i + 1), EXTENT_ENTRY_SIZE).map(LeBytes::new)
        else {
            break;
        };

        if depth == 0 {
            let (Some(len), Some(start_hi), Some(start_lo)) = (entry.u16(4), entry.u16(6), entry.u32(8))
            else {
                break;
            };
            let len = if len > EXTENT_INIT_MAX_LEN { len - EXTENT_INIT_MAX_LEN } else { len };
            let start = start_lo as u64 | ((start_hi as u64) << 32);
            if let Some(extent) = context.extent(start, len as u64) {
                push_coalesced(extents, extent);
            }
        } else {
            let (Some(leaf_lo), Some(leaf_hi)) = (entry.u32(4), entry.u16(8)) else {
                break;
            };
            let child = leaf_lo as u64 | ((leaf_hi as u64) << 32);
            if child == 0 || child >= context.blocks_count || !visited.insert(child) {
                continue;
            }
            if let Some(block) = read_block(child) {
                walk_extent_node(&block, context, read_block, depth, visited, extents);
            }
        }
    }
}

fn walk_block_map(
    i_block: &[u8],
    context: &MapContext,
    read_block: &ReadBlock<'_>,
    wanted: u64,
    extents: &mut Vec<Extent>,
) {
    let view = LeBytes::new(i_block);
    let mut remaining = wanted;

    for i in 0..DIRECT_BLOCKS {
        if remaining == 0 {
            return;
        }
        let block = view.u32(i * 4).unwrap_or(0) as u64;
        if let Some(extent) = context.extent(block, 1) {
            push_coalesced(extents, extent);
        }
        remaining -= 1;
    }

    for (level, slot) in [(1u32, 12usize), (2, 13), (3, 14)] {
        if remaining == 0 {
            return;
        }
        let block = view.u32(slot * 4).unwrap_or(0) as u64;
        walk_indirect(block, level, context, read_block, &mut remaining, extents);
    }
}

fn walk_indirect(
    block: u64,
    level: u32,
    context: &MapContext,
    read_block: &ReadBlock<'_>,
    remaining: &mut u64,
    extents: &mut Vec<Extent>,
) {
    let per_block = context.block_size / 4;
    let span = per_block.saturating_pow(level - 1);

    if block == 0 || block >= context.blocks_count {
        // A hole skips everything this pointer would have mapped
        *remaining = remaining.saturating_sub(span.saturating_mul(per_block));
        return;
    }
    let Some(data) = read_block(block) else {
        *remaining = remaining.saturating_sub(span.saturating_mul(per_block));
        return;
    };

    let view = LeBytes::new(&data);
    for i in 0..per_block as usize {
        if *remaining == 0 {
            return;
        }
        let pointer = view.u32(i * 4).unwrap_or(0) as u64;
        if level == 1 {
            if let Some(extent) = context.extent(pointer, 1) {
                push_coalesced(extents, extent);
            }
            *remaining -= 1;
        } else {
            walk_indirect(pointer, level - 1, context, read_block, remaining, extents);
        }
    }
}
