use crate::config::{ConversionConfig, ElementConfig, LineTypeConfig, MergeConfig};
use crate::error::ConversionError;
use crate::rules::footnote::FootnoteMatcher;
use crate::rules::tag::Tag;
use crate::types::{Attributes, ContainerKind};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAction {
    AddToParagraph,
    StartParagraph,
    CreateElement,
    Skip,
}

impl LineAction {
    /// `None` for names outside the closed action set
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "add_to_paragraph" => Some(LineAction::AddToParagraph),
            "start_paragraph" => Some(LineAction::StartParagraph),
            "create_element" => Some(LineAction::CreateElement),
            "skip" => Some(LineAction::Skip),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementSpec {
    pub name: String,
    pub attributes: Attributes,
}

impl From<&ElementConfig> for ElementSpec {
    fn from(config: &ElementConfig) -> Self {
        Self {
            name: config.element.clone(),
            attributes: config.attributes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub kind: ContainerKind,
    pub name: String,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockRule {
    pub process_lines: bool,
    pub skip_content: bool,
    pub extract_page_number: bool,
    pub extract_footnote: bool,
    pub emit_element: Option<ElementSpec>,
    pub special_line_overrides: HashSet<Tag>,
}

impl BlockRule {
    fn processing() -> Self {
        Self {
            process_lines: true,
            skip_content: false,
            extract_page_number: false,
            extract_footnote: false,
            emit_element: None,
            special_line_overrides: HashSet::new(),
        }
    }

    /// Whether lines with this tag are processed even though the block is not
    pub fn overrides(&self, tag: &Tag) -> bool {
        self.special_line_overrides.contains(tag)
            || (tag.subtype.is_some() && self.special_line_overrides.contains(&tag.category_only()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineRule {
    pub action: LineAction,
    pub element_name: Option<String>,
    /// Element opened implicitly when a paragraph line finds none open
    pub fallback_element: Option<String>,
    pub attributes: Attributes,
    pub container: Option<ContainerSpec>,
    pub closes: Vec<ContainerKind>,
    pub standalone: bool,
    pub furniture: bool,
}

impl LineRule {
    fn add_to_paragraph() -> Self {
        Self {
            action: LineAction::AddToParagraph,
            element_name: None,
            fallback_element: None,
            attributes: Attributes::new(),
            container: None,
            closes: Vec::new(),
            standalone: false,
            furniture: false,
        }
    }

    fn from_config(config: &LineTypeConfig, paragraph: &str) -> Self {
        // Unknown actions are reported by validation and treated as element creation
        let action = LineAction::from_name(&config.action).unwrap_or(LineAction::CreateElement);
        let container = config.container.as_ref().map(|name| ContainerSpec {
            kind: config.container_kind.unwrap_or(if name == paragraph {
                ContainerKind::Paragraph
            } else {
                ContainerKind::VerseGroup
            }),
            name: name.clone(),
            attributes: config.container_attributes.clone(),
        });

        Self {
            action,
            element_name: config.tei_element.clone(),
            fallback_element: config.fallback_element.clone(),
            attributes: config.attributes.clone(),
            container,
            closes: config.closes.clone(),
            standalone: config.standalone,
            furniture: config.furniture,
        }
    }
}

/// Settings for gluing line and page texts back together
#[derive(Debug, Clone, PartialEq)]
pub struct TextJoin {
    pub word_break_chars: Vec<char>,
    pub joiner: String,
}

impl From<&MergeConfig> for TextJoin {
    fn from(config: &MergeConfig) -> Self {
        Self {
            word_break_chars: config.word_break_chars.clone(),
            joiner: config.joiner.clone(),
        }
    }
}

/// Element names the converter itself introduces, rather than ones named by
/// a line or block rule
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralElements {
    pub paragraph: String,
    pub note: ElementSpec,
    pub notes: ElementSpec,
}

/// Immutable tag → rule lookup built once per run and shared by reference
#[derive(Debug, Clone)]
pub struct RuleTable {
    blocks: HashMap<Tag, BlockRule>,
    lines: HashMap<Tag, LineRule>,
    default_block_tag: Tag,
    default_line_tag: Tag,
    default_block: BlockRule,
    default_line: LineRule,
    footnotes: FootnoteMatcher,
    elements: StructuralElements,
    join: TextJoin,
}

impl RuleTable {
    /// Fails only when a footnote pattern does not compile
    pub fn from_config(config: &ConversionConfig) -> Result<Self, ConversionError> {
        let paragraph = config.tei_structure.elements.paragraph.clone();

        let blocks: HashMap<Tag, BlockRule> = config
            .block_types
            .iter()
            .map(|(name, block)| {
                let rule = BlockRule {
                    process_lines: block.process_lines,
                    skip_content: block.skip_content,
                    extract_page_number: block.extract_page_number,
                    extract_footnote: block.extract_footnote,
                    emit_element: block.tei_element.as_ref().map(|element| ElementSpec {
                        name: element.clone(),
                        attributes: block.attributes.clone(),
                    }),
                    special_line_overrides: block
                        .special_lines
                        .iter()
                        .map(|s| Tag::parse(s))
                        .collect(),
                };
                (Tag::parse(name), rule)
            })
            .collect();

        let lines: HashMap<Tag, LineRule> = config
            .line_types
            .iter()
            .map(|(name, line)| (Tag::parse(name), LineRule::from_config(line, &paragraph)))
            .collect();

        let default_block_tag = Tag::parse(&config.defaults.block);
        let default_line_tag = Tag::parse(&config.defaults.line);
        let default_block = blocks
            .get(&default_block_tag)
            .cloned()
            .unwrap_or_else(BlockRule::processing);
        let default_line = lines
            .get(&default_line_tag)
            .cloned()
            .unwrap_or_else(LineRule::add_to_paragraph);

        let elements = &config.tei_structure.elements;
        Ok(Self {
            blocks,
            lines,
            default_block_tag,
            default_line_tag,
            default_block,
            default_line,
            footnotes: FootnoteMatcher::from_config(&config.footnote_patterns)?,
            elements: StructuralElements {
                paragraph,
                note: ElementSpec::from(&elements.note),
                notes: ElementSpec::from(&elements.notes),
            },
            join: TextJoin::from(&config.merge),
        })
    }

    pub fn block_rule(&self, tag: &Tag) -> Option<&BlockRule> {
        self.blocks.get(tag)
    }

    pub fn line_rule(&self, tag: &Tag) -> Option<&LineRule> {
        self.lines.get(tag)
    }

    pub fn default_block_tag(&self) -> &Tag {
        &self.default_block_tag
    }

    pub fn default_line_tag(&self) -> &Tag {
        &self.default_line_tag
    }

    pub fn default_block(&self) -> &BlockRule {
        &self.default_block
    }

    pub fn default_line(&self) -> &LineRule {
        &self.default_line
    }

    pub fn footnotes(&self) -> &FootnoteMatcher {
        &self.footnotes
    }

    pub fn elements(&self) -> &StructuralElements {
        &self.elements
    }

    pub fn join(&self) -> &TextJoin {
        &self.join
    }

    /// Element name for a paragraph opened by `rule`, explicit or implicit
    pub fn paragraph_element<'a>(&'a self, rule: &'a LineRule) -> &'a str {
        let name = match rule.action {
            LineAction::AddToParagraph => rule.fallback_element.as_ref().or(rule.element_name.as_ref()),
            _ => rule.element_name.as_ref().or(rule.fallback_element.as_ref()),
        };
        name.map(String::as_str).unwrap_or(&self.elements.paragraph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table_from(yaml: &str) -> RuleTable {
        RuleTable::from_config(&ConversionConfig::load_from_str(yaml).unwrap()).unwrap()
    }

    #[test]
    fn builtin_table_has_verse_container() {
        let table = RuleTable::from_config(&ConversionConfig::default()).unwrap();
        let verse = table.line_rule(&Tag::parse("CustomLine:verse")).unwrap();
        let container = verse.container.as_ref().unwrap();
        assert_eq!(container.kind, ContainerKind::VerseGroup);
        assert_eq!(container.name, "lg");
        assert_eq!(container.attributes.get("type"), Some("verse"));
    }

    #[test]
    fn empty_config_still_has_usable_defaults() {
        let table = table_from("{}");
        assert_eq!(table.default_line().action, LineAction::AddToParagraph);
        assert!(table.default_block().process_lines);
        assert_eq!(table.paragraph_element(table.default_line()), "p");
    }

    #[test]
    fn container_named_like_paragraph_is_paragraph_kind() {
        let table = table_from(
            "line_types:\n  CustomLine:aside:\n    tei_element: hi\n    container: p\n",
        );
        let rule = table.line_rule(&Tag::parse("CustomLine:aside")).unwrap();
        assert_eq!(rule.container.as_ref().unwrap().kind, ContainerKind::Paragraph);
    }

    #[test]
    fn unknown_action_is_treated_as_create_element() {
        let table = table_from("line_types:\n  Odd:\n    action: dance\n    tei_element: ab\n");
        assert_eq!(
            table.line_rule(&Tag::parse("Odd")).unwrap().action,
            LineAction::CreateElement
        );
    }

    #[test]
    fn special_lines_match_by_category_too() {
        let table = table_from(
            "block_types:\n  QuireMarksZone:\n    skip_content: true\n    special_lines: [CustomLine]\n",
        );
        let rule = table.block_rule(&Tag::parse("QuireMarksZone")).unwrap();
        assert!(rule.overrides(&Tag::parse("CustomLine:signature")));
        assert!(!rule.overrides(&Tag::parse("DefaultLine")));
    }

    #[test]
    fn bad_footnote_pattern_fails_table_construction() {
        let config =
            ConversionConfig::load_from_str("footnote_patterns:\n  - pattern: '^(\\d+'\n    type: broken\n")
                .unwrap();
        assert!(matches!(
            RuleTable::from_config(&config),
            Err(ConversionError::FootnotePattern { .. })
        ));
    }
}
