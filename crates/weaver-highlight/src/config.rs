//! Highlighter configuration.
//!
//! Every field has a default, so a config file only needs the keys it changes:
//!
//! ```toml
//! marker_class = "r-annotation"
//! chunk_size = 25
//! ```

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// Class token, attribute names and batching limits used when rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlighterConfig {
    /// Element tag of every marker.
    pub marker_tag: SmolStr,
    /// Class token identifying an element as a highlight marker.
    pub marker_class: SmolStr,
    /// Class toggled on every marker of the hovered annotation.
    pub hover_class: SmolStr,
    /// Extra class carried by markers of the pending selection stub.
    pub selection_class: SmolStr,
    /// Attribute holding the annotation id on each marker.
    pub id_attribute: SmolStr,
    /// Annotations rendered per scheduler tick.
    pub chunk_size: usize,
    /// Maximum ancestor steps taken when resolving nesting.
    pub max_nesting_depth: usize,
}

impl Default for HighlighterConfig {
    fn default() -> Self {
        Self {
            marker_tag: SmolStr::new_static("span"),
            marker_class: SmolStr::new_static("annotation"),
            hover_class: SmolStr::new_static("hover"),
            selection_class: SmolStr::new_static("selection"),
            id_attribute: SmolStr::new_static("data-id"),
            chunk_size: 10,
            max_nesting_depth: 256,
        }
    }
}

/// Errors from loading a configuration.
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("failed to parse highlighter config: {0}")]
    #[diagnostic(code(weaver::highlight::config::parse))]
    Parse(#[from] toml::de::Error),

    #[error("invalid highlighter config: {0}")]
    #[diagnostic(code(weaver::highlight::config::invalid))]
    Invalid(&'static str),
}

impl HighlighterConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the renderer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be at least 1"));
        }
        if self.max_nesting_depth == 0 {
            return Err(ConfigError::Invalid("max_nesting_depth must be at least 1"));
        }
        if self.marker_tag.trim().is_empty() {
            return Err(ConfigError::Invalid("marker_tag must not be empty"));
        }
        for class in [&self.marker_class, &self.hover_class, &self.selection_class] {
            if class.trim().is_empty() || class.contains(char::is_whitespace) {
                return Err(ConfigError::Invalid(
                    "class names must be single non-empty tokens",
                ));
            }
        }
        if self.id_attribute.trim().is_empty() {
            return Err(ConfigError::Invalid("id_attribute must not be empty"));
        }
        Ok(())
    }
}
