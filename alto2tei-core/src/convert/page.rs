use crate::convert::state_machine::ConversionStateMachine;
use crate::error::PolicyNote;
use crate::rules::{BlockRule, RuleTable, Tag};
use crate::types::{
    ContainerKind, NodeKind, OutputNode, PageSummary, PageTree, SourceBlock, SourcePage,
};

/// Per-run knobs that change which blocks reach the state machine
#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    /// Block tags dropped entirely (book merge mode)
    pub skip_blocks: Vec<Tag>,
}

impl PageOptions {
    pub fn skipping(skip_blocks: &[String]) -> Self {
        Self {
            skip_blocks: skip_blocks.iter().map(|s| Tag::parse(s)).collect(),
        }
    }

    fn skips(&self, tag: &Tag) -> bool {
        self.skip_blocks.contains(tag)
    }
}

/// Run one page through the state machine.
///
/// Blocks are dispatched on their rule: page-number blocks only set the
/// printed label, footnote blocks feed the notes container, `emit_element`
/// blocks become one element, skipped blocks only let their special lines
/// through, and everything else is processed line by line.
pub fn convert_page(rules: &RuleTable, page: &SourcePage, options: &PageOptions) -> PageTree {
    let mut machine = ConversionStateMachine::new(rules, page.page_number);
    let resolver = machine.resolver();
    let mut root = OutputNode::new(format!("p{}-body", page.page_number), "body", NodeKind::Root);
    let mut label: Option<String> = None;

    for block in &page.blocks {
        let resolved = resolver.resolve_block(block.tag.as_deref());
        if let Some(note) = resolved.fallback {
            machine.record(note);
        }
        let rule = resolved.rule;

        if rule.extract_page_number && label.is_none() {
            label = page_number_text(block);
        }
        if options.skips(&resolved.tag) {
            log::debug!("   ⏭️  block {} ({}) skipped", block.id, resolved.tag);
            continue;
        }

        machine.begin_block(block);
        dispatch_block(&mut machine, rule, block);
        for node in machine.end_block() {
            root.push_node(node);
        }
    }

    let footnotes = machine.take_footnotes();
    if !footnotes.is_empty() {
        let spec = &rules.elements().notes;
        let mut notes_div = OutputNode::new(
            format!("p{}-notes", page.page_number),
            spec.name.clone(),
            NodeKind::Notes,
        )
        .with_attributes(spec.attributes.clone());
        for note in footnotes {
            notes_div.push_node(note);
        }
        root.push_node(notes_div);
    }

    if let Some(tail) = root.child_nodes().filter(|n| n.is_flow()).last() {
        if tail.open_at_block_end {
            let container = match tail.kind {
                NodeKind::VerseGroup => ContainerKind::VerseGroup,
                _ => ContainerKind::Paragraph,
            };
            machine.record(PolicyNote::UnterminatedContainer {
                page: page.page_number,
                container,
                node_id: tail.id.clone(),
            });
        }
    }

    let summary = summarize(page, &root, label.clone());
    log::debug!(
        "📄 Page {}: {} top-level nodes",
        page.page_number,
        root.children.len()
    );

    PageTree {
        page_number: page.page_number,
        label,
        image: page.image.clone(),
        facs_reference: page.image.clone(),
        root,
        notes: machine.into_notes(),
        summary,
    }
}

fn dispatch_block(machine: &mut ConversionStateMachine<'_>, rule: &BlockRule, block: &SourceBlock) {
    let resolver = machine.resolver();
    let special_lines_only = rule.extract_page_number || rule.skip_content || !rule.process_lines;

    if rule.extract_page_number {
        // Label already taken; signatures and the like may share the zone
    } else if rule.extract_footnote {
        for line in &block.lines {
            machine.process_footnote_line(line);
        }
        return;
    } else if let Some(spec) = &rule.emit_element {
        machine.emit_block_element(spec, block);
        return;
    }

    for line in &block.lines {
        if special_lines_only {
            let tag = resolver.resolve_line(line.tag.as_deref()).tag;
            if !rule.overrides(&tag) {
                continue;
            }
        }
        machine.process_line(line);
    }
}

/// Block text when it looks like a page number (contains a digit)
fn page_number_text(block: &SourceBlock) -> Option<String> {
    let text = block.joined_text();
    text.chars().any(|c| c.is_ascii_digit()).then_some(text)
}

fn summarize(page: &SourcePage, root: &OutputNode, label: Option<String>) -> PageSummary {
    let mut summary = PageSummary {
        page_number: page.page_number,
        source_name: page.source_name.clone(),
        printed_page_number: label,
        ..PageSummary::default()
    };
    root.walk(&mut |node| match node.kind {
        NodeKind::VerseGroup => summary.verse_line_count += node.child_nodes().count(),
        NodeKind::Note => {
            summary.footnote_count += 1;
            if let Some(symbol) = node.attributes.get("n") {
                summary.footnote_symbols.push(symbol.to_string());
            }
        }
        _ => {}
    });
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::types::SourceLine;
    use pretty_assertions::assert_eq;

    fn rules() -> RuleTable {
        RuleTable::from_config(&ConversionConfig::default()).unwrap()
    }

    fn block(id: &str, tag: Option<&str>, lines: &[(Option<&str>, &str)]) -> SourceBlock {
        let lines = lines
            .iter()
            .enumerate()
            .map(|(i, (tag, text))| SourceLine::new(format!("{id}_l{i}"), *tag, *text))
            .collect();
        SourceBlock::new(id, tag, lines)
    }

    fn sample_page() -> SourcePage {
        SourcePage::new(
            3,
            vec![
                block("b0", Some("RunningTitleZone"), &[(None, "THE"), (None, "STORY")]),
                block("b1", Some("NumberingZone"), &[(None, "17")]),
                block(
                    "b2",
                    Some("MainZone"),
                    &[
                        (Some("HeadingLine"), "Chapter One"),
                        (None, "It was a dark"),
                        (None, "and stormy night"),
                        (Some("CustomLine:verse"), "Roses are red"),
                    ],
                ),
                block("b3", Some("MarginTextZone:note"), &[(None, "(1) A note.")]),
                block(
                    "b4",
                    Some("QuireMarksZone"),
                    &[(None, "noise"), (Some("CustomLine:signature"), "B2")],
                ),
            ],
        )
    }

    #[test]
    fn blocks_are_dispatched_by_rule() {
        let rules = rules();
        let tree = convert_page(&rules, &sample_page(), &PageOptions::default());
        let names: Vec<&str> = tree.root.child_nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["fw", "head", "p", "lg", "fw", "div"]);

        let running_title = tree.root.child_nodes().next().unwrap();
        assert_eq!(running_title.first_text(), Some("THE STORY"));
        assert_eq!(running_title.attributes.get("type"), Some("header"));

        let signature = tree.root.child_nodes().nth(4).unwrap();
        assert_eq!(signature.attributes.get("type"), Some("sig"));
        assert_eq!(signature.first_text(), Some("B2"));

        assert_eq!(tree.label.as_deref(), Some("17"));
    }

    #[test]
    fn summary_counts_verse_and_notes() {
        let rules = rules();
        let tree = convert_page(&rules, &sample_page(), &PageOptions::default());
        assert_eq!(tree.summary.printed_page_number.as_deref(), Some("17"));
        assert_eq!(tree.summary.verse_line_count, 1);
        assert_eq!(tree.summary.footnote_count, 1);
        assert_eq!(tree.summary.footnote_symbols, vec!["(1)".to_string()]);
    }

    #[test]
    fn merge_mode_drops_furniture_but_keeps_label() {
        let rules = rules();
        let options = PageOptions::skipping(&ConversionConfig::default().merge.skip_blocks);
        let tree = convert_page(&rules, &sample_page(), &options);
        let names: Vec<&str> = tree.root.child_nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["head", "p", "lg"]);
        assert_eq!(tree.label.as_deref(), Some("17"));
    }

    #[test]
    fn page_number_block_without_digits_sets_no_label() {
        let rules = rules();
        let page = SourcePage::new(1, vec![block("b0", Some("NumberingZone"), &[(None, "xvii")])]);
        let tree = convert_page(&rules, &page, &PageOptions::default());
        assert_eq!(tree.label, None);
        assert!(tree.root.children.is_empty());
    }

    #[test]
    fn open_tail_is_noted_as_unterminated() {
        let rules = rules();
        let page = SourcePage::new(2, vec![block("b0", None, &[(None, "runs off the page")])]);
        let tree = convert_page(&rules, &page, &PageOptions::default());
        assert!(matches!(
            tree.notes.as_slice(),
            [PolicyNote::UnterminatedContainer {
                page: 2,
                container: ContainerKind::Paragraph,
                ..
            }]
        ));
    }
}
