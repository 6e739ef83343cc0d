//! Nesting queries over rendered markers.
//!
//! Both queries ascend the tree iteratively from a marker and stop after
//! `max_depth` steps, so pathological nesting cannot blow the stack or spin.

use crate::registry::Registry;
use crate::tree::{NodeId, TextTree};
use crate::types::{Annotation, TextPositionSelector};

/// Registered markers enclosing `marker`, innermost first.
///
/// `marker` itself is included when it is registered.
pub fn enclosing_markers(
    tree: &TextTree,
    registry: &Registry,
    marker: NodeId,
    max_depth: usize,
) -> Vec<NodeId> {
    let mut found = Vec::new();
    if registry.is_marker(marker) {
        found.push(marker);
    }

    let mut ancestors = tree.ancestors(marker);
    for ancestor in ancestors.by_ref().take(max_depth) {
        if registry.is_marker(ancestor) {
            found.push(ancestor);
        }
    }
    if ancestors.next().is_some() {
        tracing::warn!(
            target: "weaver::highlight::overlap",
            marker,
            max_depth,
            "nesting depth guard reached, ignoring outer markers"
        );
    }
    found
}

/// Find an existing annotation whose span equals `selector` exactly.
///
/// Only markers enclosing the freshly wrapped `new_markers` are considered;
/// the new markers themselves never match. When several match, the one
/// closest to the root wins.
pub fn find_exact_duplicate(
    tree: &TextTree,
    registry: &Registry,
    selector: TextPositionSelector,
    new_markers: &[NodeId],
    max_depth: usize,
) -> Option<Annotation> {
    new_markers
        .iter()
        .flat_map(|&marker| enclosing_markers(tree, registry, marker, max_depth))
        .filter(|candidate| !new_markers.contains(candidate))
        .filter(|&candidate| {
            registry
                .annotation_for_marker(candidate)
                .is_some_and(|annotation| annotation.selector == Some(selector))
        })
        .min_by_key(|&candidate| tree.depth(candidate))
        .and_then(|candidate| registry.annotation_for_marker(candidate))
        .cloned()
}

/// Annotations covering `marker`, most specific first.
///
/// Collected innermost to outermost, then stably ordered by ascending span
/// length so equal lengths keep their nesting order.
pub fn enclosing_annotations(
    tree: &TextTree,
    registry: &Registry,
    marker: NodeId,
    max_depth: usize,
) -> Vec<Annotation> {
    let mut annotations: Vec<Annotation> = Vec::new();
    for candidate in enclosing_markers(tree, registry, marker, max_depth) {
        let Some(annotation) = registry.annotation_for_marker(candidate) else {
            continue;
        };
        if !annotations.iter().any(|a| a.id == annotation.id) {
            annotations.push(annotation.clone());
        }
    }
    annotations.sort_by_key(Annotation::span_len);
    annotations
}
