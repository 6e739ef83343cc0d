//! Annotation and selection types.
//!
//! The engine never creates annotation identities; it only reads the ids and
//! offsets of annotations handed to it by the owning application.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::tree::NodeId;

/// Whether an annotation is drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    #[default]
    Normal,
    /// Tracked by the application but never rendered.
    Shadow,
}

/// Half-open `[start, end)` char offsets into the container's text content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextPositionSelector {
    pub start: usize,
    pub end: usize,
}

impl TextPositionSelector {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Span length in chars. Zero for inverted selectors.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn to_range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Check if `other` lies entirely within this span.
    pub fn contains(&self, other: &TextPositionSelector) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// An annotation as stored by the owning application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: SmolStr,
    /// Missing selectors cannot be resolved to text and are never rendered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<TextPositionSelector>,
    #[serde(default)]
    pub kind: AnnotationKind,
    /// Opaque data for the formatter.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Annotation {
    /// Create a normal annotation over `[start, end)`.
    pub fn new(id: impl Into<SmolStr>, start: usize, end: usize) -> Self {
        Self {
            id: id.into(),
            selector: Some(TextPositionSelector::new(start, end)),
            kind: AnnotationKind::Normal,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_kind(mut self, kind: AnnotationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_shadow(&self) -> bool {
        self.kind == AnnotationKind::Shadow
    }

    pub fn start(&self) -> Option<usize> {
        self.selector.map(|s| s.start)
    }

    pub fn end(&self) -> Option<usize> {
        self.selector.map(|s| s.end)
    }

    /// Span length, or `usize::MAX` when there is no selector so such
    /// annotations sort last by specificity.
    pub fn span_len(&self) -> usize {
        self.selector.map(|s| s.len()).unwrap_or(usize::MAX)
    }
}

/// A point in the tree as reported by the selection layer.
///
/// For text leaves `offset` counts chars; for elements it counts children.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreePoint {
    pub node: NodeId,
    pub offset: usize,
}

impl TreePoint {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// Raw user selection with anchor and head positions.
///
/// The anchor is where the selection started, the head is where it ended.
/// They may be in any order; the selection path orders them after mapping to
/// offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawSelection {
    pub anchor: TreePoint,
    pub head: TreePoint,
    /// Common ancestor of both points, when the selection layer knows it.
    pub scope: Option<NodeId>,
}

impl RawSelection {
    pub fn new(anchor: TreePoint, head: TreePoint) -> Self {
        Self {
            anchor,
            head,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: NodeId) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Check if the selection is collapsed (cursor only).
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }
}

/// Candidate annotation produced from a user selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionStub {
    pub selector: TextPositionSelector,
    /// Text covered by the selection.
    pub quote: String,
}

/// What the application should do with a fresh selection.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectionOutcome {
    /// No annotation covers exactly this span; the stub stays highlighted.
    Create(SelectionStub),
    /// An existing annotation already covers exactly this span.
    Reuse(Annotation),
}
