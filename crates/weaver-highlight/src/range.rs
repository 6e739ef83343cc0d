//! Decomposition of a logical span into leaf-scoped sub-ranges.
//!
//! A span that crosses leaf boundaries cannot be wrapped by a single marker
//! without breaking the tree, so it is cut into one sub-range per leaf:
//!
//! ```text
//! leaves:   [Hello ][big][ world]
//! span:        [lo   big  wo]
//! ranges:      [lo ] [big][ wo]
//! ```
//!
//! Empty pieces (a span starting exactly at a leaf's end, empty leaves in the
//! middle) are dropped so no zero-width marker is ever produced.

use crate::error::{HighlightError, Result, TreeError};
use crate::offset_map::{Position, map_offsets};
use crate::tree::{NodeId, TextTree};

/// Half-open `[start, end)` char range inside a single text leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRange {
    pub leaf: NodeId,
    pub start: usize,
    pub end: usize,
}

impl SubRange {
    pub fn new(leaf: NodeId, start: usize, end: usize) -> Self {
        Self { leaf, start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Cut the span between two positions into leaf-scoped sub-ranges.
pub fn decompose(
    tree: &TextTree,
    root: NodeId,
    start: Position,
    end: Position,
) -> Result<Vec<SubRange>> {
    check_within_leaf(tree, start)?;
    check_within_leaf(tree, end)?;

    if start.leaf == end.leaf {
        if end.offset < start.offset {
            return Err(HighlightError::InvalidRange);
        }
        let range = SubRange::new(start.leaf, start.offset, end.offset);
        return Ok(if range.is_empty() { Vec::new() } else { vec![range] });
    }

    let mut ranges = Vec::new();
    let mut inside = false;
    for leaf in tree.leaves(root) {
        if leaf == start.leaf {
            inside = true;
            ranges.push(SubRange::new(leaf, start.offset, tree.char_len(leaf)));
        } else if leaf == end.leaf {
            if !inside {
                return Err(HighlightError::InvalidRange);
            }
            ranges.push(SubRange::new(leaf, 0, end.offset));
            ranges.retain(|range| !range.is_empty());
            return Ok(ranges);
        } else if inside {
            ranges.push(SubRange::new(leaf, 0, tree.char_len(leaf)));
        }
    }

    // One of the leaves is not under `root`.
    Err(HighlightError::PositionOutsideRoot)
}

/// Map a `[start, end)` char span and decompose it in one step.
pub fn decompose_offsets(
    tree: &TextTree,
    root: NodeId,
    start: usize,
    end: usize,
) -> Result<Vec<SubRange>> {
    if end < start {
        return Err(HighlightError::InvalidRange);
    }
    let positions = map_offsets(tree, root, &[start, end])?;
    decompose(tree, root, positions[0], positions[1])
}

fn check_within_leaf(tree: &TextTree, position: Position) -> Result<()> {
    let text = tree
        .text(position.leaf)
        .ok_or(TreeError::NotText(position.leaf))?;
    let len = text.chars().count();
    if position.offset > len {
        return Err(TreeError::OffsetBeyondText {
            node: position.leaf,
            offset: position.offset,
            len,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(tree: &TextTree) -> Vec<NodeId> {
        tree.leaves(tree.root()).collect()
    }

    fn texts(tree: &TextTree, ranges: &[SubRange]) -> Vec<String> {
        ranges
            .iter()
            .map(|r| {
                tree.text(r.leaf)
                    .unwrap()
                    .chars()
                    .skip(r.start)
                    .take(r.len())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_same_leaf() {
        let tree = TextTree::from_fragments(&["Hello world"]);
        let ranges = decompose_offsets(&tree, tree.root(), 0, 5).unwrap();
        assert_eq!(ranges, vec![SubRange::new(leaves(&tree)[0], 0, 5)]);
    }

    #[test]
    fn test_two_leaves() {
        let tree = TextTree::from_fragments(&["Hello ", "world"]);
        let l = leaves(&tree);
        let ranges = decompose_offsets(&tree, tree.root(), 3, 8).unwrap();
        assert_eq!(
            ranges,
            vec![SubRange::new(l[0], 3, 6), SubRange::new(l[1], 0, 2)]
        );
        assert_eq!(texts(&tree, &ranges), vec!["lo ", "wo"]);
    }

    #[test]
    fn test_middle_leaves_covered_fully() {
        let mut tree = TextTree::default();
        let root = tree.root();
        tree.append_text(root, "Hello ").unwrap();
        let em = tree.append_element(root, "em").unwrap();
        tree.append_text(em, "big").unwrap();
        tree.append_text(root, "").unwrap();
        tree.append_text(root, " world").unwrap();

        let ranges = decompose_offsets(&tree, root, 3, 12).unwrap();
        assert_eq!(texts(&tree, &ranges), vec!["lo ", "big", " wo"]);
    }

    #[test]
    fn test_start_on_boundary_drops_empty_head() {
        let tree = TextTree::from_fragments(&["Hello ", "world"]);
        let l = leaves(&tree);

        // Offset 6 attaches to the end of "Hello ", leaving an empty head.
        let ranges = decompose_offsets(&tree, tree.root(), 6, 11).unwrap();
        assert_eq!(ranges, vec![SubRange::new(l[1], 0, 5)]);
    }

    #[test]
    fn test_empty_span() {
        let tree = TextTree::from_fragments(&["Hello"]);
        assert!(decompose_offsets(&tree, tree.root(), 2, 2).unwrap().is_empty());
    }

    #[test]
    fn test_inverted_positions() {
        let tree = TextTree::from_fragments(&["Hello ", "world"]);
        let l = leaves(&tree);
        assert_eq!(
            decompose(&tree, tree.root(), Position::new(l[1], 1), Position::new(l[0], 1)),
            Err(HighlightError::InvalidRange)
        );
        assert_eq!(
            decompose_offsets(&tree, tree.root(), 5, 2),
            Err(HighlightError::InvalidRange)
        );
    }

    #[test]
    fn test_position_beyond_leaf() {
        let tree = TextTree::from_fragments(&["abc"]);
        let leaf = leaves(&tree)[0];
        assert!(matches!(
            decompose(&tree, tree.root(), Position::new(leaf, 0), Position::new(leaf, 9)),
            Err(HighlightError::Tree(TreeError::OffsetBeyondText { .. }))
        ));
    }
}
