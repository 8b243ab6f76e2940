use crate::error::{PolicyNote, RuleScope};
use crate::rules::table::{BlockRule, LineRule, RuleTable};
use serde::Serialize;
use std::fmt;

/// Canonical `(category, subtype)` form of a raw tag such as "CustomLine:verse"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Tag {
    pub category: String,
    pub subtype: Option<String>,
}

impl Tag {
    /// Split on the first ':' only and trim both halves. An empty subtype
    /// collapses to `None`, so "MainZone:" and "MainZone" are the same tag.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((category, subtype)) => {
                let subtype = subtype.trim();
                Self {
                    category: category.trim().to_string(),
                    subtype: (!subtype.is_empty()).then(|| subtype.to_string()),
                }
            }
            None => Self {
                category: raw.trim().to_string(),
                subtype: None,
            },
        }
    }

    pub fn category_only(&self) -> Self {
        Self {
            category: self.category.clone(),
            subtype: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_empty() && self.subtype.is_none()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subtype {
            Some(subtype) => write!(f, "{}:{}", self.category, subtype),
            None => write!(f, "{}", self.category),
        }
    }
}

/// Result of a rule lookup: the tag as written, the rule that applies and,
/// when that rule belongs to a broader tag, the note recording the fallback.
#[derive(Debug)]
pub struct Resolved<'r, R> {
    pub tag: Tag,
    pub rule: &'r R,
    pub fallback: Option<PolicyNote>,
}

/// Looks tags up in a [`RuleTable`]: full tag, then bare category, then the
/// scope's default. Never fails.
#[derive(Debug, Clone, Copy)]
pub struct TagResolver<'r> {
    table: &'r RuleTable,
}

impl<'r> TagResolver<'r> {
    pub fn new(table: &'r RuleTable) -> Self {
        Self { table }
    }

    pub fn resolve_block(&self, raw: Option<&str>) -> Resolved<'r, BlockRule> {
        let table = self.table;
        self.resolve(
            raw,
            RuleScope::Block,
            table.default_block_tag(),
            |tag| table.block_rule(tag),
            table.default_block(),
        )
    }

    pub fn resolve_line(&self, raw: Option<&str>) -> Resolved<'r, LineRule> {
        let table = self.table;
        self.resolve(
            raw,
            RuleScope::Line,
            table.default_line_tag(),
            |tag| table.line_rule(tag),
            table.default_line(),
        )
    }

    fn resolve<R>(
        &self,
        raw: Option<&str>,
        scope: RuleScope,
        default_tag: &Tag,
        lookup: impl Fn(&Tag) -> Option<&'r R>,
        default_rule: &'r R,
    ) -> Resolved<'r, R> {
        let tag = match raw.map(Tag::parse) {
            Some(tag) if !tag.is_empty() => tag,
            _ => {
                return Resolved {
                    tag: default_tag.clone(),
                    rule: default_rule,
                    fallback: None,
                }
            }
        };

        if let Some(rule) = lookup(&tag) {
            return Resolved {
                tag,
                rule,
                fallback: None,
            };
        }

        let (rule, resolved) = match tag.subtype.is_some().then(|| tag.category_only()) {
            Some(broader) => match lookup(&broader) {
                Some(rule) => (rule, broader),
                None => (default_rule, default_tag.clone()),
            },
            None => (default_rule, default_tag.clone()),
        };

        let note = PolicyNote::ConfigResolutionFallback {
            scope,
            tag: tag.to_string(),
            resolved: resolved.to_string(),
        };
        Resolved {
            tag,
            rule,
            fallback: Some(note),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::rules::table::LineAction;
    use rstest::rstest;

    #[rstest]
    #[case("CustomLine:verse", "CustomLine", Some("verse"))]
    #[case("  CustomLine : verse ", "CustomLine", Some("verse"))]
    #[case("MainZone", "MainZone", None)]
    #[case("MainZone:", "MainZone", None)]
    #[case("CustomLine:a:b", "CustomLine", Some("a:b"))]
    fn parses_category_and_subtype(
        #[case] raw: &str,
        #[case] category: &str,
        #[case] subtype: Option<&str>,
    ) {
        let tag = Tag::parse(raw);
        assert_eq!(tag.category, category);
        assert_eq!(tag.subtype.as_deref(), subtype);
    }

    #[test]
    fn display_round_trips_normalized_form() {
        assert_eq!(Tag::parse(" HeadingLine :title").to_string(), "HeadingLine:title");
    }

    fn table() -> RuleTable {
        RuleTable::from_config(&ConversionConfig::default()).unwrap()
    }

    #[test]
    fn absent_tag_uses_default_without_note() {
        let table = table();
        let resolved = TagResolver::new(&table).resolve_line(None);
        assert_eq!(resolved.tag.to_string(), "DefaultLine");
        assert_eq!(resolved.rule.action, LineAction::AddToParagraph);
        assert!(resolved.fallback.is_none());
    }

    #[test]
    fn known_tag_resolves_exactly() {
        let table = table();
        let resolved = TagResolver::new(&table).resolve_line(Some("CustomLine : verse"));
        assert_eq!(resolved.rule.element_name.as_deref(), Some("l"));
        assert!(resolved.fallback.is_none());
    }

    #[test]
    fn unknown_subtype_falls_back_to_category() {
        let table = table();
        let resolved = TagResolver::new(&table).resolve_line(Some("HeadingLine:chapter"));
        assert_eq!(resolved.rule.element_name.as_deref(), Some("head"));
        match resolved.fallback {
            Some(PolicyNote::ConfigResolutionFallback { resolved, .. }) => {
                assert_eq!(resolved, "HeadingLine")
            }
            other => panic!("expected fallback note, got {other:?}"),
        }
    }

    #[test]
    fn unknown_category_falls_back_to_default_block() {
        let table = table();
        let resolved = TagResolver::new(&table).resolve_block(Some("MysteryZone"));
        assert!(resolved.rule.process_lines);
        assert!(matches!(
            resolved.fallback,
            Some(PolicyNote::ConfigResolutionFallback {
                scope: RuleScope::Block,
                ..
            })
        ));
    }
}
