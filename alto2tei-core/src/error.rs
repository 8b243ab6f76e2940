//! Fatal errors and non-fatal policy notes.
//!
//! Only loading a broken rule table or unreadable source is fatal. Everything
//! the converter decides on its own while walking a page (falling back to a
//! default rule, forcing a container closed, refusing an ambiguous merge) is
//! recorded as a [`PolicyNote`] and conversion carries on.

use crate::types::ContainerKind;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid rule table: {0}")]
    RuleTable(#[from] serde_yaml::Error),

    #[error("invalid footnote pattern '{pattern}': {source}")]
    FootnotePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed XML attribute: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("not an ALTO document (root element <{0}>)")]
    NotAlto(String),

    #[error("METS file has no fileGrp with USE=\"export\"")]
    MetsNoExportGroup,

    #[error("METS export group does not reference any ALTO files")]
    MetsEmpty,
}

/// Which rule table a tag was looked up in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    Block,
    Line,
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleScope::Block => write!(f, "block"),
            RuleScope::Line => write!(f, "line"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyNote {
    /// Tag without a configured rule; a broader or default rule was used
    ConfigResolutionFallback {
        scope: RuleScope,
        tag: String,
        resolved: String,
    },
    /// Blank line text under a non-skip action, kept as an empty span
    MalformedLine { page: u32, line_id: String },
    /// Container still open when the page ran out of lines
    UnterminatedContainer {
        page: u32,
        container: ContainerKind,
        node_id: String,
    },
    /// Continuation heuristic could not decide; pages were kept apart
    CrossPageAmbiguity { page: u32, reason: String },
}

impl PolicyNote {
    /// Emit the note through the `log` facade at a level matching its weight
    pub fn log(&self) {
        match self {
            PolicyNote::CrossPageAmbiguity { .. } => log::warn!("⚠️  {self}"),
            _ => log::debug!("📝 {self}"),
        }
    }
}

impl fmt::Display for PolicyNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyNote::ConfigResolutionFallback {
                scope,
                tag,
                resolved,
            } => write!(f, "no {scope} rule for '{tag}', using '{resolved}'"),
            PolicyNote::MalformedLine { page, line_id } => {
                write!(f, "page {page}: line {line_id} has no text")
            }
            PolicyNote::UnterminatedContainer {
                page,
                container,
                node_id,
            } => write!(f, "page {page}: {container} {node_id} closed at page end"),
            PolicyNote::CrossPageAmbiguity { page, reason } => {
                write!(f, "page {page}: not merged with previous page ({reason})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_note_names_both_tags() {
        let note = PolicyNote::ConfigResolutionFallback {
            scope: RuleScope::Line,
            tag: "CustomLine:marginalia".to_string(),
            resolved: "DefaultLine".to_string(),
        };
        assert_eq!(
            note.to_string(),
            "no line rule for 'CustomLine:marginalia', using 'DefaultLine'"
        );
    }

    #[test]
    fn mets_errors_render_readably() {
        assert_eq!(
            ConversionError::MetsNoExportGroup.to_string(),
            "METS file has no fileGrp with USE=\"export\""
        );
    }

    #[test]
    fn notes_serialize_with_kind_tag() {
        let note = PolicyNote::MalformedLine {
            page: 3,
            line_id: "l7".to_string(),
        };
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["kind"], "malformed_line");
        assert_eq!(json["page"], 3);
    }
}
