//! Highlight rendering: wrapping sub-ranges in marker elements and undoing it.
//!
//! A marker only ever wraps a single text leaf (or the part of one a split
//! produced), so new markers never contain other markers. Nesting arises when
//! a later annotation wraps text that already sits inside an earlier marker.

use smol_str::SmolStr;

use crate::config::HighlighterConfig;
use crate::error::{HighlightError, Result, TreeError};
use crate::format::{Formatted, apply_format};
use crate::range::SubRange;
use crate::registry::Registry;
use crate::tree::{ElementData, NodeId, TextTree};

/// Everything needed to build the markers of one annotation or stub.
#[derive(Debug, Clone)]
pub struct MarkerSpec {
    pub tag: SmolStr,
    pub marker_class: SmolStr,
    pub extra_class: Option<SmolStr>,
    pub id_attribute: SmolStr,
    /// Annotation id. `None` for selection stubs.
    pub id: Option<SmolStr>,
    pub formatted: Option<Formatted>,
}

impl MarkerSpec {
    /// Markers for a stored annotation.
    pub fn annotation(
        config: &HighlighterConfig,
        id: impl Into<SmolStr>,
        formatted: Option<Formatted>,
    ) -> Self {
        Self {
            tag: config.marker_tag.clone(),
            marker_class: config.marker_class.clone(),
            extra_class: None,
            id_attribute: config.id_attribute.clone(),
            id: Some(id.into()),
            formatted,
        }
    }

    /// Markers for a pending user selection.
    pub fn selection(config: &HighlighterConfig) -> Self {
        Self {
            tag: config.marker_tag.clone(),
            marker_class: config.marker_class.clone(),
            extra_class: Some(config.selection_class.clone()),
            id_attribute: config.id_attribute.clone(),
            id: None,
            formatted: None,
        }
    }

    fn element(&self) -> ElementData {
        let mut element = ElementData::new(self.tag.clone());
        element.add_class(&self.marker_class);
        if let Some(extra) = &self.extra_class {
            element.add_class(extra);
        }
        if let Some(id) = &self.id {
            element.set_attr(&self.id_attribute, id.clone());
        }
        if let Some(formatted) = &self.formatted {
            apply_format(&mut element, formatted);
        }
        element
    }

    /// Whether `element` is a marker built from this spec.
    ///
    /// Checks the marker class, the extra class and the identity attribute,
    /// so a reused node id holding some other marker does not match.
    pub fn matches(&self, element: &ElementData) -> bool {
        element.has_class(&self.marker_class)
            && self
                .extra_class
                .as_ref()
                .is_none_or(|extra| element.has_class(extra))
            && element.attr(&self.id_attribute) == self.id.as_deref()
    }

    fn label(&self) -> SmolStr {
        self.id
            .clone()
            .unwrap_or_else(|| SmolStr::new_static("selection"))
    }
}

/// Wrap every sub-range in a fresh marker.
///
/// Either every sub-range is wrapped or none is: on the first failure the
/// markers created so far are unwrapped, split leaves are merged back and
/// `RenderFailure` is returned.
pub fn wrap(
    tree: &mut TextTree,
    ranges: &[SubRange],
    spec: &MarkerSpec,
    max_depth: usize,
) -> Result<Vec<NodeId>> {
    let mut markers = Vec::with_capacity(ranges.len());
    let mut touched = Vec::with_capacity(ranges.len());

    for range in ranges {
        if let Some(parent) = tree.parent(range.leaf) {
            touched.push(parent);
        }
        match wrap_one(tree, *range, spec) {
            Ok(marker) => markers.push(marker),
            Err(err) => {
                tracing::warn!(
                    target: "weaver::highlight::render",
                    id = %spec.label(),
                    leaf = range.leaf,
                    error = %err,
                    "wrap failed, rolling back"
                );
                unwrap(tree, &markers, spec, max_depth);
                for parent in touched {
                    if tree.contains_node(parent) {
                        tree.normalize(parent);
                    }
                }
                return Err(HighlightError::RenderFailure {
                    id: spec.label(),
                    reason: SmolStr::new(err.to_string()),
                });
            }
        }
    }

    for marker in &markers {
        restack(tree, *marker, &spec.marker_class, max_depth);
    }

    tracing::trace!(
        target: "weaver::highlight::render",
        id = %spec.label(),
        markers = markers.len(),
        "wrapped"
    );
    Ok(markers)
}

/// Isolate `[start, end)` of the leaf and move it into a new marker.
fn wrap_one(tree: &mut TextTree, range: SubRange, spec: &MarkerSpec) -> Result<NodeId, TreeError> {
    let len = tree
        .text(range.leaf)
        .ok_or(TreeError::NotText(range.leaf))?
        .chars()
        .count();
    if range.end > len {
        return Err(TreeError::OffsetBeyondText {
            node: range.leaf,
            offset: range.end,
            len,
        });
    }
    if range.start >= range.end {
        return Err(TreeError::EmptyRange {
            node: range.leaf,
            offset: range.start,
        });
    }

    if range.end < len {
        tree.split_text(range.leaf, range.end)?;
    }
    let target = if range.start > 0 {
        tree.split_text(range.leaf, range.start)?
    } else {
        range.leaf
    };

    let marker = tree.create_element_with(spec.element());
    let attached = match tree.insert_before(target, marker) {
        Ok(()) => tree.append_child(marker, target),
        Err(err) => Err(err),
    };
    if let Err(err) = attached {
        let _ = tree.remove(marker);
        return Err(err);
    }
    Ok(marker)
}

/// Replace markers built from `spec` by their children and merge the text
/// left behind.
///
/// Ids that are gone, or whose node is not a marker of `spec` (a freed id
/// reused by another marker, say), are skipped, so unwrapping twice is
/// harmless. Returns how many markers were removed.
pub fn unwrap(
    tree: &mut TextTree,
    markers: &[NodeId],
    spec: &MarkerSpec,
    max_depth: usize,
) -> usize {
    let marker_class = spec.marker_class.as_str();
    let mut removed = 0;
    let mut parents = Vec::new();
    let mut nested = Vec::new();

    for &marker in markers {
        if !tree.element(marker).is_some_and(|element| spec.matches(element)) {
            continue;
        }
        let view: &TextTree = tree;
        nested.extend(
            view.descendants(marker)
                .into_iter()
                .filter(|&id| is_marker_element(view, id, marker_class)),
        );
        match tree.replace_with_children(marker) {
            Ok(parent) => {
                parents.push(parent);
                removed += 1;
            }
            Err(err) => {
                tracing::debug!(
                    target: "weaver::highlight::render",
                    marker,
                    error = %err,
                    "skipping detached marker"
                );
            }
        }
    }

    parents.sort_unstable();
    parents.dedup();
    for parent in parents {
        if tree.contains_node(parent) {
            tree.normalize(parent);
        }
    }
    for marker in nested {
        if tree.contains_node(marker) {
            restack(tree, marker, marker_class, max_depth);
        }
    }
    removed
}

fn is_marker_element(tree: &TextTree, id: NodeId, marker_class: &str) -> bool {
    tree.element(id)
        .is_some_and(|element| element.has_class(marker_class))
}

/// Own background colour of a marker, if its style declares one.
fn background_of(element: &ElementData) -> Option<&str> {
    element
        .style_value("background-color")
        .or_else(|| element.style_value("background"))
}

/// Recompute the stacked background layers of a marker.
///
/// Each enclosing marker with a background contributes one
/// `linear-gradient(c, c)` layer, innermost ancestor first.
pub fn restack(tree: &mut TextTree, marker: NodeId, marker_class: &str, max_depth: usize) {
    let layers: Vec<String> = tree
        .ancestors(marker)
        .take(max_depth)
        .filter_map(|ancestor| tree.element(ancestor))
        .filter(|element| element.has_class(marker_class))
        .filter_map(background_of)
        .map(|color| format!("linear-gradient({color}, {color})"))
        .collect();

    let Some(element) = tree.element_mut(marker) else {
        return;
    };
    if layers.is_empty() {
        element.remove_style("background-image");
    } else {
        element.set_style("background-image", layers.join(", "));
    }
}

/// Toggle the hover class on a set of markers.
pub fn set_hover(tree: &mut TextTree, markers: &[NodeId], hover_class: &str, on: bool) {
    for &marker in markers {
        if let Some(element) = tree.element_mut(marker) {
            if on {
                element.add_class(hover_class);
            } else {
                element.remove_class(hover_class);
            }
        }
    }
}

/// Hover target change produced by a pointer event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoverChange {
    pub unhighlight: Option<SmolStr>,
    pub highlight: Option<SmolStr>,
}

impl HoverChange {
    pub fn is_empty(&self) -> bool {
        self.unhighlight.is_none() && self.highlight.is_none()
    }
}

/// Pointer hover tracking.
///
/// Entered markers are kept as a set; the active annotation is the one of the
/// deepest entered marker, so a nested marker shadows its ancestors and
/// leaving it hands the highlight back to the next enclosing one.
#[derive(Debug, Clone, Default)]
pub struct HoverState {
    entered: Vec<NodeId>,
    active: Option<SmolStr>,
}

impl HoverState {
    pub fn active(&self) -> Option<&SmolStr> {
        self.active.as_ref()
    }

    pub fn enter(&mut self, tree: &TextTree, registry: &Registry, marker: NodeId) -> HoverChange {
        if !self.entered.contains(&marker) {
            self.entered.push(marker);
        }
        self.retarget(tree, registry)
    }

    pub fn leave(&mut self, tree: &TextTree, registry: &Registry, marker: NodeId) -> HoverChange {
        self.entered.retain(|m| *m != marker);
        self.retarget(tree, registry)
    }

    /// Drop markers that are being unwrapped.
    pub fn forget(&mut self, tree: &TextTree, registry: &Registry, markers: &[NodeId]) -> HoverChange {
        self.entered.retain(|m| !markers.contains(m));
        self.retarget(tree, registry)
    }

    /// Follow an identity override of the active annotation.
    pub fn rename(&mut self, old: &str, new: &str) {
        if self.active.as_deref() == Some(old) {
            self.active = Some(SmolStr::new(new));
        }
    }

    pub fn clear(&mut self) -> HoverChange {
        self.entered.clear();
        HoverChange {
            unhighlight: self.active.take(),
            highlight: None,
        }
    }

    fn retarget(&mut self, tree: &TextTree, registry: &Registry) -> HoverChange {
        self.entered
            .retain(|m| tree.contains_node(*m) && registry.is_marker(*m));
        let next = self
            .entered
            .iter()
            .max_by_key(|m| tree.depth(**m))
            .and_then(|m| registry.annotation_id(*m))
            .cloned();

        if next == self.active {
            return HoverChange::default();
        }
        let change = HoverChange {
            unhighlight: self.active.take(),
            highlight: next.clone(),
        };
        self.active = next;
        change
    }
}
