use crate::config::MergeConfig;
use crate::convert::text::{ends_with_terminal, is_script_lowercase, text_content};
use crate::rules::TextJoin;
use crate::types::{NodeKind, OutputNode};

/// What to do with the first flow node of a page given the last flow node
/// of the output so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeDecision {
    /// Splice the head into the tail paragraph
    Merge,
    /// Keep them apart
    Separate,
    /// Keep them apart and record why the call was unclear
    Ambiguous(String),
}

/// Decides whether a paragraph continues across a page boundary.
///
/// Implementations must be pure: the same pair always gets the same answer.
pub trait ContinuationPolicy: Send + Sync {
    fn decide(&self, tail: &OutputNode, head: &OutputNode) -> MergeDecision;
}

impl<F> ContinuationPolicy for F
where
    F: Fn(&OutputNode, &OutputNode) -> MergeDecision + Send + Sync,
{
    fn decide(&self, tail: &OutputNode, head: &OutputNode) -> MergeDecision {
        self(tail, head)
    }
}

/// Default policy: an open or unpunctuated paragraph continues when the next
/// page opens with a lowercase letter.
#[derive(Debug, Clone)]
pub struct LowercaseContinuation {
    pub terminal_punctuation: String,
    pub structural_markers: String,
    pub join: TextJoin,
}

impl LowercaseContinuation {
    pub fn from_config(config: &MergeConfig) -> Self {
        Self {
            terminal_punctuation: config.terminal_punctuation.clone(),
            structural_markers: config.structural_markers.clone(),
            join: TextJoin::from(config),
        }
    }
}

impl ContinuationPolicy for LowercaseContinuation {
    fn decide(&self, tail: &OutputNode, head: &OutputNode) -> MergeDecision {
        // 1. Only implicit paragraphs continue
        if tail.kind != NodeKind::Paragraph || head.kind != NodeKind::Paragraph || head.explicit_start {
            return MergeDecision::Separate;
        }

        // 2. The tail has to look unfinished
        let tail_text = text_content(tail, &self.join);
        let terminated = ends_with_terminal(&tail_text, &self.terminal_punctuation);
        if !tail.open_at_block_end && terminated {
            return MergeDecision::Separate;
        }

        // 3. Classify the head's first character
        let head_text = text_content(head, &self.join);
        let Some(first) = head_text.trim_start().chars().next() else {
            return MergeDecision::Ambiguous(format!("paragraph {} has no text", head.id));
        };
        if self.structural_markers.contains(first) {
            return MergeDecision::Separate;
        }
        if is_script_lowercase(first) {
            return MergeDecision::Merge;
        }
        if terminated {
            return MergeDecision::Separate;
        }
        MergeDecision::Ambiguous(format!(
            "'{}' ends without punctuation but next page starts with '{first}'",
            tail.id
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::types::TextSpan;
    use rstest::rstest;

    fn policy() -> LowercaseContinuation {
        LowercaseContinuation::from_config(&ConversionConfig::default().merge)
    }

    fn paragraph(id: &str, text: &str, open: bool) -> OutputNode {
        let mut node = OutputNode::new(id, "p", NodeKind::Paragraph);
        node.push_text(TextSpan::new(text, None));
        node.open_at_block_end = open;
        node
    }

    #[rstest]
    #[case("the end of the", true, "story goes on", MergeDecision::Merge)]
    #[case("a wonder-", true, "ful thing", MergeDecision::Merge)]
    #[case("It ended.", false, "and yet", MergeDecision::Separate)]
    #[case("It ended.", true, "and yet", MergeDecision::Merge)]
    #[case("It ended.", true, "Then more", MergeDecision::Separate)]
    #[case("no stop here", true, "§ 4 begins", MergeDecision::Separate)]
    #[case("ещё не", true, "конец", MergeDecision::Merge)]
    fn decides_on_first_character(
        #[case] tail: &str,
        #[case] open: bool,
        #[case] head: &str,
        #[case] expected: MergeDecision,
    ) {
        let decision = policy().decide(&paragraph("t", tail, open), &paragraph("h", head, false));
        assert_eq!(decision, expected);
    }

    #[rstest]
    #[case("no stop here", "Capital start")]
    #[case("no stop here", "1914 was")]
    #[case("no stop here", "αρχή")]
    #[case("no stop here", "")]
    fn unclear_starts_are_ambiguous(#[case] tail: &str, #[case] head: &str) {
        let decision = policy().decide(&paragraph("t", tail, true), &paragraph("h", head, false));
        assert!(matches!(decision, MergeDecision::Ambiguous(_)), "{decision:?}");
    }

    #[test]
    fn explicit_or_non_paragraph_heads_never_merge() {
        let tail = paragraph("t", "the end of the", true);
        let mut explicit = paragraph("h", "story", false);
        explicit.explicit_start = true;
        assert_eq!(policy().decide(&tail, &explicit), MergeDecision::Separate);

        let mut heading = OutputNode::new("h", "head", NodeKind::LineElement);
        heading.push_text(TextSpan::new("chapter", None));
        assert_eq!(policy().decide(&tail, &heading), MergeDecision::Separate);
    }

    #[test]
    fn closures_are_policies() {
        let never = |_: &OutputNode, _: &OutputNode| MergeDecision::Separate;
        let tail = paragraph("t", "the end of the", true);
        let head = paragraph("h", "story", false);
        assert_eq!(never.decide(&tail, &head), MergeDecision::Separate);
    }
}
