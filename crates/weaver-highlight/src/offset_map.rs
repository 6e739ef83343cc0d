//! Offset mapping between container char offsets and tree positions.
//!
//! The coordinate space is the concatenated text of every leaf under the
//! root, walked depth-first. A boundary offset shared by two adjacent leaves
//! attaches to the end of the earlier leaf.
//!
//! # Example
//!
//! Leaves: `"Hello "` `"world"`
//!
//! - offset 3 -> (leaf 0, 3)
//! - offset 6 -> (leaf 0, 6), not (leaf 1, 0)
//! - offset 8 -> (leaf 1, 2)
//!
//! Positions are only valid until the next tree mutation.

use crate::error::{HighlightError, Result, TreeError};
use crate::tree::{NodeData, NodeId, TextTree};

/// A text leaf plus a char offset within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub leaf: NodeId,
    pub offset: usize,
}

impl Position {
    pub fn new(leaf: NodeId, offset: usize) -> Self {
        Self { leaf, offset }
    }
}

/// Total char length of the text under `root`.
pub fn text_len(tree: &TextTree, root: NodeId) -> usize {
    tree.leaves(root).map(|leaf| tree.char_len(leaf)).sum()
}

/// Map one char offset to a leaf position.
pub fn map_offset(tree: &TextTree, root: NodeId, offset: usize) -> Result<Position> {
    let mut positions = map_offsets(tree, root, &[offset])?;
    positions.pop().ok_or(HighlightError::OffsetOutOfRange { offset, len: 0 })
}

/// Map char offsets to leaf positions, returned in request order.
///
/// Walks the leaves once and stops as soon as the largest requested offset
/// has been assigned, so cost is bounded by the text consumed.
pub fn map_offsets(tree: &TextTree, root: NodeId, offsets: &[usize]) -> Result<Vec<Position>> {
    if offsets.is_empty() {
        return Ok(Vec::new());
    }

    let mut order: Vec<usize> = (0..offsets.len()).collect();
    order.sort_by_key(|&i| offsets[i]);

    let mut resolved: Vec<Option<Position>> = vec![None; offsets.len()];
    let mut next = 0;
    let mut running = 0;
    let mut walked = 0;

    for leaf in tree.leaves(root) {
        walked += 1;
        let leaf_end = running + tree.char_len(leaf);
        while next < order.len() && offsets[order[next]] <= leaf_end {
            let idx = order[next];
            resolved[idx] = Some(Position::new(leaf, offsets[idx] - running));
            next += 1;
        }
        if next == order.len() {
            break;
        }
        running = leaf_end;
    }

    if next < order.len() {
        let offset = offsets[order[next]];
        tracing::debug!(
            target: "weaver::highlight::offset_map",
            offset,
            len = running,
            "offset past end of document"
        );
        return Err(HighlightError::OffsetOutOfRange {
            offset,
            len: running,
        });
    }

    tracing::trace!(
        target: "weaver::highlight::offset_map",
        requested = offsets.len(),
        leaves_walked = walked,
        "mapped offsets"
    );

    Ok(resolved.into_iter().flatten().collect())
}

/// Map a tree point back to a char offset relative to `root`.
///
/// For text leaves `local_offset` counts chars; for elements it counts
/// children, as in DOM ranges.
pub fn offset_of(
    tree: &TextTree,
    root: NodeId,
    node: NodeId,
    local_offset: usize,
) -> Result<usize> {
    if !tree.is_inclusive_descendant(root, node) {
        return Err(HighlightError::PositionOutsideRoot);
    }

    if let Some(text) = tree.text(node) {
        let len = text.chars().count();
        if local_offset > len {
            return Err(TreeError::OffsetBeyondText {
                node,
                offset: local_offset,
                len,
            }
            .into());
        }
        return Ok(chars_before(tree, root, node) + local_offset);
    }

    let children = tree.children(node);
    match children.get(local_offset) {
        Some(&child) => Ok(chars_before(tree, root, child)),
        None if local_offset == children.len() => {
            Ok(chars_before(tree, root, node) + text_len(tree, node))
        }
        None => Err(HighlightError::InvalidRange),
    }
}

/// Chars of text preceding `target` in a pre-order walk of `root`.
fn chars_before(tree: &TextTree, root: NodeId, target: NodeId) -> usize {
    let mut count = 0;
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if id == target {
            break;
        }
        let Some(node) = tree.get(id) else {
            continue;
        };
        match &node.data {
            NodeData::Text(text) => count += text.chars().count(),
            NodeData::Element(_) => stack.extend(node.children.iter().rev().copied()),
        }
    }
    count
}
