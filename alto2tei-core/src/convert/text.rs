//! Text-level helpers shared by the merger, the continuation policy and the
//! serializer, so that "what the joined text reads as" is decided in one place.

use crate::rules::TextJoin;
use crate::types::{Child, OutputNode};

/// If `text` ends in a word-break character that follows a letter, return
/// the text with that character removed.
pub fn strip_word_break<'a>(text: &'a str, word_break_chars: &[char]) -> Option<&'a str> {
    let trimmed = text.trim_end();
    let last = trimmed.chars().next_back()?;
    if !word_break_chars.contains(&last) {
        return None;
    }
    let stem = &trimmed[..trimmed.len() - last.len_utf8()];
    stem.chars()
        .next_back()
        .filter(|c| c.is_alphabetic())
        .map(|_| stem)
}

/// Split off the first whitespace-delimited word; the rest has its leading
/// whitespace removed.
pub fn split_first_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(idx) => (&text[..idx], text[idx..].trim_start()),
        None => (text, ""),
    }
}

/// Lowercase letter from the Latin or Cyrillic blocks
pub fn is_script_lowercase(c: char) -> bool {
    if !c.is_lowercase() {
        return false;
    }
    matches!(c as u32,
        0x0061..=0x007A        // Basic Latin
        | 0x00DF..=0x00FF      // Latin-1 Supplement
        | 0x0100..=0x024F      // Latin Extended-A/B
        | 0x1E00..=0x1EFF      // Latin Extended Additional
        | 0x0400..=0x052F      // Cyrillic + Supplement
        | 0x1C80..=0x1C8F      // Cyrillic Extended-C
        | 0xA640..=0xA69F // Cyrillic Extended-B
    )
}

/// Last meaningful character is sentence-ending punctuation. Closing quotes
/// and brackets after the punctuation are looked through.
pub fn ends_with_terminal(text: &str, terminal_punctuation: &str) -> bool {
    text.trim_end()
        .chars()
        .rev()
        .find(|c| !matches!(c, '"' | '\'' | '»' | '”' | '’' | ')' | ']'))
        .is_some_and(|c| terminal_punctuation.contains(c))
}

/// Join two adjacent texts: hyphenated word ends glue directly, everything
/// else gets the joiner. Empty sides vanish.
pub fn join_pair(left: &str, right: &str, join: &TextJoin) -> String {
    let right = right.trim_start();
    if left.trim().is_empty() {
        return right.to_string();
    }
    if right.is_empty() {
        return left.to_string();
    }
    match strip_word_break(left, &join.word_break_chars) {
        Some(stem) => format!("{stem}{right}"),
        None => format!("{}{}{}", left.trim_end(), join.joiner, right),
    }
}

/// Reading text of a node: spans joined with word-break handling, nested
/// nodes joined the same way, page boundaries transparent.
pub fn text_content(node: &OutputNode, join: &TextJoin) -> String {
    let mut text = String::new();
    for child in &node.children {
        let piece = match child {
            Child::Text(span) => span.text.clone(),
            Child::Node(inner) => text_content(inner, join),
            Child::PageBoundary(_) => continue,
        };
        text = join_pair(&text, &piece, join);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeKind, PageBoundary, TextSpan};

    fn join() -> TextJoin {
        TextJoin {
            word_break_chars: vec!['-', '¬'],
            joiner: " ".to_string(),
        }
    }

    #[test]
    fn strips_hyphen_only_after_letter() {
        assert_eq!(strip_word_break("wonder-", &['-']), Some("wonder"));
        assert_eq!(strip_word_break("wonder- ", &['-']), Some("wonder"));
        assert_eq!(strip_word_break("pages 3 -", &['-']), None);
        assert_eq!(strip_word_break("1914-", &['-']), None);
        assert_eq!(strip_word_break("plain", &['-']), None);
    }

    #[test]
    fn splits_first_word() {
        assert_eq!(split_first_word("ful and more"), ("ful", "and more"));
        assert_eq!(split_first_word("  ful"), ("ful", ""));
        assert_eq!(split_first_word(""), ("", ""));
    }

    #[test]
    fn lowercase_is_script_aware() {
        assert!(is_script_lowercase('a'));
        assert!(is_script_lowercase('é'));
        assert!(is_script_lowercase('ж'));
        assert!(!is_script_lowercase('Ж'));
        assert!(!is_script_lowercase('A'));
        assert!(!is_script_lowercase('α'));
        assert!(!is_script_lowercase('1'));
    }

    #[test]
    fn terminal_punctuation_looks_through_quotes() {
        assert!(ends_with_terminal("He left.", ".!?"));
        assert!(ends_with_terminal("\"He left!\"", ".!?"));
        assert!(!ends_with_terminal("the end of the", ".!?"));
        assert!(!ends_with_terminal("", ".!?"));
    }

    #[test]
    fn joins_with_space_or_hyphen_glue() {
        assert_eq!(join_pair("the end of the", "story continues", &join()), "the end of the story continues");
        assert_eq!(join_pair("wonder-", "ful", &join()), "wonderful");
        assert_eq!(join_pair("", "first", &join()), "first");
    }

    #[test]
    fn text_content_ignores_page_boundaries() {
        let mut p = OutputNode::new("n1", "p", NodeKind::Paragraph);
        p.push_text(TextSpan::new("a wonder-", None));
        p.children.push(Child::PageBoundary(PageBoundary {
            page_number: 2,
            label: None,
            facs_reference: None,
        }));
        p.push_text(TextSpan::new("ful day", None));
        assert_eq!(text_content(&p, &join()), "a wonderful day");
    }
}
