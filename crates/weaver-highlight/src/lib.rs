//! weaver-highlight: render text annotations as nested highlight markers.
//!
//! Annotations address text by char offsets into the concatenated leaves of a
//! container. This crate provides:
//! - `TextTree` - slab-backed tree of elements and text leaves
//! - Offset mapping from char offsets to leaf positions and back
//! - Range decomposition of a span into leaf-scoped sub-ranges
//! - Transactional wrap/unwrap of marker elements, with background stacking
//!   and hover tracking
//! - Overlap queries for duplicate selections and nested annotations
//! - `Highlighter` - the annotation lifecycle, driven in chunks by a tick source
//!
//! ```
//! use weaver_highlight::{Annotation, Highlighter, TextTree};
//!
//! let mut highlighter = Highlighter::from_tree(TextTree::from_fragments(&["Hello world"]));
//! let _handle = highlighter.render([Annotation::new("a1", 0, 5)]);
//! highlighter.run_to_completion();
//!
//! assert_eq!(highlighter.find_markers("a1").len(), 1);
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod highlighter;
pub mod offset_map;
pub mod overlap;
pub mod range;
pub mod registry;
pub mod render;
pub mod scheduler;
pub mod tree;
pub mod types;

pub use config::{ConfigError, HighlighterConfig};
pub use error::{HighlightError, Result, TreeError};
pub use format::{FormatStyle, Formatted, Formatter};
pub use highlighter::Highlighter;
pub use offset_map::{Position, map_offset, map_offsets, offset_of, text_len};
pub use range::{SubRange, decompose, decompose_offsets};
pub use render::{HoverChange, HoverState};
pub use scheduler::{BatchReport, RenderHandle, TickOutcome};
pub use smol_str::SmolStr;
pub use tree::{ElementData, NodeData, NodeId, TextTree};
pub use types::{
    Annotation, AnnotationKind, RawSelection, SelectionOutcome, SelectionStub,
    TextPositionSelector, TreePoint,
};
