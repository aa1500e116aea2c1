//! B-tree node decoding and traversal

use crate::infrastructure::file_systems::le::LeBytes;
use std::collections::HashSet;
use tracing::warn;

/// Tree node magic "NODE"
pub const NODE_MAGIC: [u8; 4] = *b"NODE";

const NODE_HEADER: usize = 16;
const ENTRY_SIZE: usize = 24;
const MAX_DEPTH: u16 = 16;

/// One key/value pair of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeEntry {
    pub key: u64,
    pub value_a: u64,
    pub value_b: u64,
}

/// Leaf entries of a tree, plus the number of nodes that had to be skipped
#[derive(Debug, Default)]
pub struct TreeWalk {
    pub leaves: Vec<TreeEntry>,
    pub bad_nodes: u64,
}

#[derive(Debug)]
struct Node {
    level: u16,
    entries: Vec<TreeEntry>,
}

fn parse_node(data: &[u8]) -> Result<Node, String> {
    let view = LeBytes::new(data);
    if view.bytes(0, 4) != Some(&NODE_MAGIC[..]) {
        return Err("missing NODE magic".to_string());
    }
    let level = view.u16(4).ok_or("truncated node header")?;
    let key_count = view.u32(8).ok_or("truncated node header")? as usize;
    if NODE_HEADER + key_count.saturating_mul(ENTRY_SIZE) > data.len() {
        return Err(format!("{} keys overflow the node", key_count));
    }

    let mut entries: Vec<TreeEntry> = (0..key_count)
        .filter_map(|i| {
            let entry = LeBytes::new(view.bytes(NODE_HEADER + i * ENTRY_SIZE, ENTRY_SIZE)?);
            Some(TreeEntry {
                key: entry.u64(0)?,
                value_a: entry.u64(8)?,
                value_b: entry.u64(16)?,
            })
        })
        .collect();
    entries.sort_by_key(|e| e.key);

    Ok(Node { level, entries })
}

/// Walks a tree depth-first in key order
///
/// `read_block` returns `None` for blocks outside the device or unreadable.
/// Malformed, unreadable, repeated or level-inconsistent nodes are skipped
/// and counted.
pub fn walk_tree(root: u64, read_block: &dyn Fn(u64) -> Option<Vec<u8>>) -> TreeWalk {
    let mut walk = TreeWalk::default();
    let mut visited = HashSet::new();
    visit(root, None, 0, read_block, &mut visited, &mut walk);
    walk
}

fn visit(
    block: u64,
    expected_level: Option<u16>,
    depth: u16,
    read_block: &dyn Fn(u64) -> Option<Vec<u8>>,
    visited: &mut HashSet<u64>,
    walk: &mut TreeWalk,
) {
    if depth > MAX_DEPTH || !visited.insert(block) {
        warn!("tree node {} revisited or too deep; skipping", block);
        walk.bad_nodes += 1;
        return;
    }
    let Some(data) = read_block(block) else {
        warn!("tree node {} is unreadable; skipping", block);
        walk.bad_nodes += 1;
        return;
    };
    let node = match parse_node(&data) {
        Ok(node) => node,
        Err(reason) => {
            warn!("tree node {}: {}; skipping", block, reason);
            walk.bad_nodes += 1;
            return;
        }
    };
    if expected_level.is_some_and(|level| level != node.level) {
        warn!("tree node {} has level {}, expected {:?}", block, node.level, expected_level);
        walk.bad_nodes += 1;
        return;
    }

    if node.level == 0 {
        walk.leaves.extend(node.entries);
        return;
    }
    for entry in node.entries {
        visit(entry.value_a, Some(node.level - 1), depth + 1, read_block, visited, walk);
    }
}
