use crate::error::ConversionError;
use crate::types::{Attributes, ContainerKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Mapping shipped with the crate; also what `Default` resolves to
pub const BUILTIN_CONFIG: &str = include_str!("../config/alto_tei_mapping.yaml");

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_action() -> String {
    "create_element".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Types used when a block or line carries no tag at all
    #[serde(default)]
    pub defaults: DefaultTypes,
    #[serde(default)]
    pub block_types: BTreeMap<String, BlockTypeConfig>,
    #[serde(default)]
    pub line_types: BTreeMap<String, LineTypeConfig>,
    /// Ordered; the first pattern matching the start of a note line wins
    #[serde(default)]
    pub footnote_patterns: Vec<FootnotePatternConfig>,
    #[serde(default)]
    pub tei_structure: TeiStructureConfig,
    #[serde(default)]
    pub facsimile: FacsimileConfig,
    #[serde(default)]
    pub merge: MergeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultTypes {
    pub block: String,
    pub line: String,
}

impl Default for DefaultTypes {
    fn default() -> Self {
        Self {
            block: "MainZone".to_string(),
            line: "DefaultLine".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockTypeConfig {
    pub process_lines: bool,
    pub skip_content: bool,
    /// Record the block text as the printed page number
    pub extract_page_number: bool,
    /// Route the block's lines through footnote extraction
    pub extract_footnote: bool,
    /// Emit the whole block as a single element with this name
    pub tei_element: Option<String>,
    pub attributes: Attributes,
    /// Line types still processed when the block itself is skipped
    pub special_lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineTypeConfig {
    /// One of add_to_paragraph, start_paragraph, create_element, skip
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub tei_element: Option<String>,
    /// Paragraph element opened implicitly by add_to_paragraph
    #[serde(default)]
    pub fallback_element: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
    /// Wrapper element for consecutive lines of this type (e.g. "lg")
    #[serde(default)]
    pub container: Option<String>,
    /// Inferred from the container name when omitted
    #[serde(default)]
    pub container_kind: Option<ContainerKind>,
    #[serde(default)]
    pub container_attributes: Attributes,
    #[serde(default)]
    pub closes: Vec<ContainerKind>,
    #[serde(default)]
    pub standalone: bool,
    /// Page furniture (signatures, catchwords): kept in place, never running text
    #[serde(default)]
    pub furniture: bool,
}

impl Default for LineTypeConfig {
    fn default() -> Self {
        Self {
            action: default_action(),
            tei_element: None,
            fallback_element: None,
            attributes: Attributes::new(),
            container: None,
            container_kind: None,
            container_attributes: Attributes::new(),
            closes: Vec::new(),
            standalone: false,
            furniture: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FootnotePatternConfig {
    pub pattern: String,
    #[serde(rename = "type", alias = "category")]
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementConfig {
    pub element: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl ElementConfig {
    fn new(element: &str, attributes: &[(&str, &str)]) -> Self {
        Self {
            element: element.to_string(),
            attributes: attributes.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TeiStructureConfig {
    pub namespace: String,
    pub body: BodyConfig,
    pub header: HeaderConfig,
    pub elements: ElementNames,
}

impl Default for TeiStructureConfig {
    fn default() -> Self {
        Self {
            namespace: "http://www.tei-c.org/ns/1.0".to_string(),
            body: BodyConfig::default(),
            header: HeaderConfig::default(),
            elements: ElementNames::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyConfig {
    /// Render an `lb` between lines instead of joining them into running text
    pub preserve_line_breaks: bool,
    /// Wrap lines that have a facsimile zone in `seg facs=...`
    pub line_segments: bool,
    pub pretty_print: bool,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            preserve_line_breaks: false,
            line_segments: false,
            pretty_print: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    pub publisher: String,
    pub source_description: String,
    /// Fixed header date; today's date when unset
    pub date: Option<String>,
    /// `{file}` is replaced by the page's image or file name
    pub page_title: String,
    /// `{total_pages}` is replaced by the page count
    pub book_title: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            publisher: "eScriptorium".to_string(),
            source_description: "Transcribed from digital image using eScriptorium".to_string(),
            date: None,
            page_title: "Digital text from {file}".to_string(),
            book_title: "Book converted from ALTO (pages 1-{total_pages})".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementNames {
    pub paragraph: String,
    pub page_break: String,
    pub line_break: String,
    pub segment: String,
    pub note: ElementConfig,
    pub notes: ElementConfig,
    pub book: ElementConfig,
}

impl Default for ElementNames {
    fn default() -> Self {
        Self {
            paragraph: "p".to_string(),
            page_break: "pb".to_string(),
            line_break: "lb".to_string(),
            segment: "seg".to_string(),
            note: ElementConfig::new("note", &[("place", "foot")]),
            notes: ElementConfig::new("div", &[("type", "notes")]),
            book: ElementConfig::new("div", &[("type", "book")]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacsimileConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub include_graphic: bool,
    #[serde(default = "default_true")]
    pub include_textblocks: bool,
    #[serde(default = "default_true")]
    pub include_textlines: bool,
    #[serde(default = "default_true")]
    pub include_baselines: bool,
    /// Emit polygon `points` when the source has them
    #[serde(default = "default_true")]
    pub use_polygons: bool,
    #[serde(default)]
    pub ids: ZoneIdTemplates,
}

impl Default for FacsimileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_graphic: true,
            include_textblocks: true,
            include_textlines: true,
            include_baselines: true,
            use_polygons: true,
            ids: ZoneIdTemplates::default(),
        }
    }
}

/// Id templates; `{page}` is 1-based, `{block}` and `{line}` are 0-based
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneIdTemplates {
    pub surface: String,
    pub block: String,
    pub line: String,
}

impl Default for ZoneIdTemplates {
    fn default() -> Self {
        Self {
            surface: "facs_page_{page}".to_string(),
            block: "facs_block_{page}_{block}".to_string(),
            line: "facs_line_{page}_{block}_{line}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Characters that split a word across a line or page end
    pub word_break_chars: Vec<char>,
    pub joiner: String,
    /// A tail ending in one of these reads as a finished sentence
    pub terminal_punctuation: String,
    /// A head starting with one of these never continues a paragraph
    pub structural_markers: String,
    /// Block types dropped entirely from book output
    pub skip_blocks: Vec<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            word_break_chars: vec!['-', '¬', '⸗', '\u{00AD}'],
            joiner: " ".to_string(),
            terminal_punctuation: ".!?…".to_string(),
            structural_markers: "§¶".to_string(),
            skip_blocks: vec![
                "NumberingZone".to_string(),
                "RunningTitleZone".to_string(),
                "QuireMarksZone".to_string(),
                "GraphicZone".to_string(),
                "MarginTextZone:note".to_string(),
            ],
        }
    }
}

impl ConversionConfig {
    /// Load config from file path
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConversionError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConversionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(yaml: &str) -> Result<Self, ConversionError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load config with fallback to the built-in mapping
    pub fn load_with_fallback(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::load_from_file(p).unwrap_or_else(|e| {
                log::warn!("⚠️  Failed to load config from {}: {e}; using defaults", p.display());
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConversionError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self::load_from_str(BUILTIN_CONFIG).expect("built-in mapping is valid YAML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtin_mapping_parses() {
        let config = ConversionConfig::default();
        assert!(config.block_types.contains_key("MainZone"));
        assert!(config.line_types.contains_key("DefaultLine"));
        assert!(config.line_types.contains_key("CustomLine:verse"));
        assert!(!config.footnote_patterns.is_empty());
    }

    #[test]
    fn missing_sections_take_defaults() {
        let config = ConversionConfig::load_from_str("line_types: {}\n").unwrap();
        assert_eq!(config.defaults.block, "MainZone");
        assert_eq!(config.tei_structure.elements.paragraph, "p");
        assert!(config.facsimile.enabled);
        assert_eq!(config.merge.joiner, " ");
    }

    #[test]
    fn line_type_fields_round_out_from_defaults() {
        let yaml = r#"
line_types:
  "CustomLine:verse":
    tei_element: l
    container: lg
    container_attributes:
      type: verse
    closes: [paragraph]
"#;
        let config = ConversionConfig::load_from_str(yaml).unwrap();
        let verse = &config.line_types["CustomLine:verse"];
        assert_eq!(verse.action, "create_element");
        assert_eq!(verse.container.as_deref(), Some("lg"));
        assert_eq!(verse.container_attributes.get("type"), Some("verse"));
        assert_eq!(verse.closes, vec![ContainerKind::Paragraph]);
    }

    #[test]
    fn poetry_is_accepted_as_verse_group_alias() {
        let yaml = "line_types:\n  HeadingLine:\n    tei_element: head\n    closes: [paragraph, poetry]\n";
        let config = ConversionConfig::load_from_str(yaml).unwrap();
        assert_eq!(
            config.line_types["HeadingLine"].closes,
            vec![ContainerKind::Paragraph, ContainerKind::VerseGroup]
        );
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(ConversionConfig::load_from_str("invalid: yaml: content: [").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_builtin() {
        let config = ConversionConfig::load_with_fallback(Some(Path::new("/nonexistent/path.yaml")));
        assert!(config.block_types.contains_key("MainZone"));
    }

    #[test]
    fn config_survives_yaml_round_trip() {
        let config = ConversionConfig::default();
        let yaml = config.to_yaml().unwrap();
        let reloaded = ConversionConfig::load_from_str(&yaml).unwrap();
        assert_eq!(reloaded.line_types.len(), config.line_types.len());
        assert_eq!(reloaded.merge.word_break_chars, config.merge.word_break_chars);
    }
}
