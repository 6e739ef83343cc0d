//! Formatter interface for per-annotation visual attribution.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::tree::ElementData;
use crate::types::Annotation;

/// Structured formatter output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatStyle {
    /// Whitespace-separated classes added to every marker.
    #[serde(default, rename = "className")]
    pub class_name: Option<SmolStr>,
    /// CSS declarations appended to the marker's inline style.
    #[serde(default)]
    pub style: Option<String>,
    /// `data-*` attributes. Keys without the `data-` prefix are ignored.
    #[serde(default)]
    pub data: Vec<(SmolStr, SmolStr)>,
}

/// What a formatter returns for an annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formatted {
    /// Class list string.
    Classes(SmolStr),
    Style(FormatStyle),
}

impl From<&str> for Formatted {
    fn from(classes: &str) -> Self {
        Formatted::Classes(SmolStr::new(classes))
    }
}

impl From<FormatStyle> for Formatted {
    fn from(style: FormatStyle) -> Self {
        Formatted::Style(style)
    }
}

/// Maps an annotation to its visual attribution.
///
/// Called once per rendered annotation. Implementations must be pure from the
/// highlighter's point of view.
pub trait Formatter {
    fn format(&self, annotation: &Annotation) -> Option<Formatted>;
}

impl<F> Formatter for F
where
    F: Fn(&Annotation) -> Option<Formatted>,
{
    fn format(&self, annotation: &Annotation) -> Option<Formatted> {
        self(annotation)
    }
}

/// Apply formatter output to a marker element.
pub(crate) fn apply_format(element: &mut ElementData, formatted: &Formatted) {
    match formatted {
        Formatted::Classes(classes) => element.add_class(classes),
        Formatted::Style(style) => {
            if let Some(class_name) = &style.class_name {
                element.add_class(class_name);
            }
            if let Some(css) = &style.style {
                element.append_style_text(css);
            }
            for (key, value) in &style.data {
                if key.starts_with("data-") {
                    element.set_attr(key, value.clone());
                } else {
                    tracing::trace!(
                        target: "weaver::highlight::format",
                        key = %key,
                        "ignoring formatter attribute without data- prefix"
                    );
                }
            }
        }
    }
}
