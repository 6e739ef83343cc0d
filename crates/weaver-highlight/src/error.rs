//! Error types for highlight rendering.

use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

use crate::tree::NodeId;

/// Errors raised by the highlight engine.
///
/// Per-annotation failures (`RenderFailure`, `NoMatchingMarkers`) are logged and
/// skipped by batch rendering; only direct callers of the mapper see
/// `OffsetOutOfRange` as a hard failure.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HighlightError {
    /// A requested char offset lies past the end of the document.
    #[error("offset {offset} is out of range for a document of {len} chars")]
    #[diagnostic(
        code(weaver::highlight::offset_out_of_range),
        help("annotation offsets count chars of the container's text content")
    )]
    OffsetOutOfRange { offset: usize, len: usize },

    /// Wrapping one annotation failed; nothing was left attached for it.
    #[error("failed to render annotation {id}: {reason}")]
    #[diagnostic(code(weaver::highlight::render_failure))]
    RenderFailure { id: SmolStr, reason: SmolStr },

    /// Lookup by annotation id found no markers.
    #[error("no markers found for annotation {0}")]
    #[diagnostic(code(weaver::highlight::no_matching_markers))]
    NoMatchingMarkers(SmolStr),

    /// End position precedes the start position.
    #[error("range end precedes range start")]
    #[diagnostic(code(weaver::highlight::invalid_range))]
    InvalidRange,

    /// A selection position or scope lies outside the highlighter root.
    #[error("position lies outside the highlighted container")]
    #[diagnostic(code(weaver::highlight::outside_root))]
    PositionOutsideRoot,

    /// A selection covering no text.
    #[error("selection is collapsed")]
    #[diagnostic(code(weaver::highlight::empty_selection))]
    EmptySelection,

    /// The render batch was replaced or cleared before it finished.
    #[error("render batch was cancelled before completion")]
    #[diagnostic(code(weaver::highlight::render_cancelled))]
    RenderCancelled,

    /// The underlying tree refused an operation.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Tree(#[from] TreeError),
}

/// Errors from text tree mutations.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TreeError {
    #[error("node {0} does not exist")]
    #[diagnostic(code(weaver::highlight::tree::missing_node))]
    MissingNode(NodeId),

    #[error("node {0} is not a text node")]
    #[diagnostic(code(weaver::highlight::tree::not_text))]
    NotText(NodeId),

    #[error("node {0} is not an element")]
    #[diagnostic(code(weaver::highlight::tree::not_element))]
    NotElement(NodeId),

    #[error("offset {offset} is beyond the {len} chars of text node {node}")]
    #[diagnostic(code(weaver::highlight::tree::offset_beyond_text))]
    OffsetBeyondText {
        node: NodeId,
        offset: usize,
        len: usize,
    },

    #[error("empty range at offset {offset} of text node {node}")]
    #[diagnostic(code(weaver::highlight::tree::empty_range))]
    EmptyRange { node: NodeId, offset: usize },

    #[error("node {0} has no parent")]
    #[diagnostic(code(weaver::highlight::tree::detached))]
    Detached(NodeId),

    #[error("moving node {0} would create a cycle")]
    #[diagnostic(code(weaver::highlight::tree::cycle))]
    Cycle(NodeId),

    #[error("the tree root cannot be removed")]
    #[diagnostic(code(weaver::highlight::tree::root_removal))]
    RootRemoval,
}

pub type Result<T, E = HighlightError> = std::result::Result<T, E>;
