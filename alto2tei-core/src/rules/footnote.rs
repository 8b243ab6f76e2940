use crate::config::FootnotePatternConfig;
use crate::error::ConversionError;
use regex::Regex;

#[derive(Debug, Clone)]
pub struct FootnotePattern {
    pub regex: Regex,
    pub category_label: String,
}

/// How a note line splits into marker and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootnoteMatch {
    /// The marker as printed, e.g. "(1)" or "*"
    pub symbol: Option<String>,
    pub category_label: Option<String>,
    pub body: String,
}

/// Ordered footnote marker patterns; the first one matching at the very start
/// of the text wins. Matching is case-sensitive so "(a)" and "(A)" series
/// stay apart.
#[derive(Debug, Clone, Default)]
pub struct FootnoteMatcher {
    patterns: Vec<FootnotePattern>,
}

impl FootnoteMatcher {
    pub fn new(patterns: Vec<FootnotePattern>) -> Self {
        Self { patterns }
    }

    pub fn from_config(configs: &[FootnotePatternConfig]) -> Result<Self, ConversionError> {
        // Compile patterns from config
        let mut patterns = Vec::new();
        for config in configs {
            let regex = Regex::new(&config.pattern).map_err(|source| {
                ConversionError::FootnotePattern {
                    pattern: config.pattern.clone(),
                    source,
                }
            })?;
            patterns.push(FootnotePattern {
                regex,
                category_label: config.category.clone(),
            });
        }
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> &[FootnotePattern] {
        &self.patterns
    }

    pub fn classify(&self, text: &str) -> FootnoteMatch {
        let text = text.trim();
        for pattern in &self.patterns {
            // Unanchored patterns still only count when they match at offset 0
            if let Some(m) = pattern.regex.find(text).filter(|m| m.start() == 0 && !m.is_empty()) {
                return FootnoteMatch {
                    symbol: Some(m.as_str().trim().to_string()),
                    category_label: Some(pattern.category_label.clone()),
                    body: text[m.end()..].trim().to_string(),
                };
            }
        }

        FootnoteMatch {
            symbol: None,
            category_label: None,
            body: text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use rstest::rstest;

    fn builtin() -> FootnoteMatcher {
        FootnoteMatcher::from_config(&ConversionConfig::default().footnote_patterns).unwrap()
    }

    #[rstest]
    #[case("(1) text", "(1)", "numeric", "text")]
    #[case("* note", "*", "asterisk_plain", "note")]
    #[case("(*) starred", "(*)", "asterisk", "starred")]
    #[case("(a) lower", "(a)", "alpha_lower", "lower")]
    #[case("(A) upper", "(A)", "alpha_upper", "upper")]
    #[case("[12] bracketed", "[12]", "numeric_bracket", "bracketed")]
    #[case("† dagger", "†", "dagger", "dagger")]
    fn classifies_leading_marker(
        #[case] text: &str,
        #[case] symbol: &str,
        #[case] label: &str,
        #[case] body: &str,
    ) {
        let m = builtin().classify(text);
        assert_eq!(m.symbol.as_deref(), Some(symbol));
        assert_eq!(m.category_label.as_deref(), Some(label));
        assert_eq!(m.body, body);
    }

    #[test]
    fn no_match_keeps_whole_text_as_body() {
        let m = builtin().classify("See chapter (1) above");
        assert_eq!(m.category_label, None);
        assert_eq!(m.symbol, None);
        assert_eq!(m.body, "See chapter (1) above");
    }

    #[test]
    fn first_matching_pattern_wins() {
        let matcher = FootnoteMatcher::from_config(&[
            FootnotePatternConfig {
                pattern: r"^\(\w\)\s*".to_string(),
                category: "any_paren".to_string(),
            },
            FootnotePatternConfig {
                pattern: r"^\(\d\)\s*".to_string(),
                category: "numeric".to_string(),
            },
        ])
        .unwrap();
        assert_eq!(
            matcher.classify("(1) first").category_label.as_deref(),
            Some("any_paren")
        );
    }

    #[test]
    fn unanchored_pattern_only_matches_at_start() {
        let matcher = FootnoteMatcher::from_config(&[FootnotePatternConfig {
            pattern: r"\*".to_string(),
            category: "asterisk_plain".to_string(),
        }])
        .unwrap();
        assert_eq!(matcher.classify("a * b").category_label, None);
        assert_eq!(
            matcher.classify("* b").category_label.as_deref(),
            Some("asterisk_plain")
        );
    }
}
