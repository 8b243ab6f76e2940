use crate::convert::continuation::{ContinuationPolicy, MergeDecision};
use crate::convert::text::{split_first_word, strip_word_break};
use crate::error::PolicyNote;
use crate::rules::TextJoin;
use crate::types::{Child, OutputNode, PageBoundary, PageSummary, PageTree};

/// Result of stitching all pages of a book together
#[derive(Debug, Clone)]
pub struct MergedBook {
    pub body: OutputNode,
    pub notes: Vec<PolicyNote>,
    pub pages: Vec<PageSummary>,
    pub merges: usize,
}

/// Appends page trees in page order, splicing a page's opening paragraph
/// into the previous page's last paragraph when the policy says it
/// continues. A page break marker is kept at every boundary, inside the
/// paragraph for merged pages and between nodes otherwise.
pub struct CrossPageMerger<'p> {
    policy: &'p dyn ContinuationPolicy,
    join: TextJoin,
    body: OutputNode,
    /// Index in `body.children` of the last flow node of the previous page
    tail: Option<usize>,
    notes: Vec<PolicyNote>,
    pages: Vec<PageSummary>,
    merges: usize,
}

impl<'p> CrossPageMerger<'p> {
    pub fn new(policy: &'p dyn ContinuationPolicy, join: TextJoin, body: OutputNode) -> Self {
        Self {
            policy,
            join,
            body,
            tail: None,
            notes: Vec::new(),
            pages: Vec::new(),
            merges: 0,
        }
    }

    pub fn push_page(&mut self, page: PageTree) {
        let boundary = page.boundary();
        let page_number = page.page_number;
        self.notes.extend(page.notes);
        self.pages.push(page.summary);

        let mut children = page.root.children;
        let head_index = children
            .iter()
            .position(|c| c.as_node().is_some_and(OutputNode::is_flow));

        let decision = match (self.tail, head_index) {
            (Some(tail), Some(head)) => match (self.body.children[tail].as_node(), children[head].as_node()) {
                (Some(tail_node), Some(head_node)) => self.policy.decide(tail_node, head_node),
                _ => MergeDecision::Separate,
            },
            _ => MergeDecision::Separate,
        };

        if let MergeDecision::Ambiguous(reason) = &decision {
            let note = PolicyNote::CrossPageAmbiguity {
                page: page_number,
                reason: reason.clone(),
            };
            note.log();
            self.notes.push(note);
        }

        match (decision, self.tail, head_index) {
            (MergeDecision::Merge, Some(tail), Some(head)) => {
                let rest = children.split_off(head + 1);
                let head_node = match children.pop() {
                    Some(Child::Node(node)) => node,
                    _ => unreachable!("head index points at a node"),
                };
                if let Some(tail_node) = self.body.children[tail].as_node_mut() {
                    log::debug!("   🔗 {} continues into {} on page {page_number}", tail_node.id, head_node.id);
                    splice(tail_node, boundary, head_node, &self.join);
                }
                self.merges += 1;

                let before = self.body.children.len();
                self.body.children.extend(children);
                self.body.children.extend(rest);
                self.tail = last_flow_since(&self.body, before).or(Some(tail));
            }
            _ => {
                self.body.children.push(Child::PageBoundary(boundary));
                let before = self.body.children.len();
                self.body.children.extend(children);
                self.tail = last_flow_since(&self.body, before);
            }
        }
    }

    /// A page that produced no tree. Its break is still written, and no
    /// paragraph continues across it.
    pub fn push_gap(&mut self, page_number: u32) {
        log::debug!("   🕳️  page {page_number} missing, continuation reset");
        self.body.children.push(Child::PageBoundary(PageBoundary {
            page_number,
            label: None,
            facs_reference: None,
        }));
        self.tail = None;
    }

    pub fn finish(self) -> MergedBook {
        MergedBook {
            body: self.body,
            notes: self.notes,
            pages: self.pages,
            merges: self.merges,
        }
    }
}

fn last_flow_since(body: &OutputNode, start: usize) -> Option<usize> {
    (start..body.children.len())
        .rev()
        .find(|&i| body.children[i].as_node().is_some_and(OutputNode::is_flow))
}

/// Move the head's children into the tail behind a page break. A word split
/// by a hyphen at the end of the tail is completed before the break so the
/// word stays whole. Blank spans at either edge (empty source lines) are
/// passed over when looking for the two halves.
fn splice(tail: &mut OutputNode, boundary: PageBoundary, head: OutputNode, join: &TextJoin) {
    let OutputNode {
        mut children,
        open_at_block_end,
        ..
    } = head;

    let end = tail.children.iter().rposition(|c| !is_blank_text(c));
    let start = children.iter().position(|c| !is_blank_text(c));
    if let (Some(end), Some(start)) = (end, start) {
        let glue = match (&tail.children[end], &children[start]) {
            (Child::Text(last), Child::Text(first)) => {
                let (word, rest) = split_first_word(&first.text);
                strip_word_break(&last.text, &join.word_break_chars)
                    .filter(|_| !word.is_empty())
                    .map(|stem| (format!("{stem}{word}"), rest.to_string()))
            }
            _ => None,
        };
        if let Some((whole, rest)) = glue {
            if let Child::Text(last) = &mut tail.children[end] {
                last.text = whole;
            }
            if rest.is_empty() {
                children.remove(start);
            } else if let Child::Text(first) = &mut children[start] {
                first.text = rest;
            }
        }
    }

    tail.children.push(Child::PageBoundary(boundary));
    tail.children.extend(children);
    tail.open_at_block_end = open_at_block_end;
}

fn is_blank_text(child: &Child) -> bool {
    matches!(child, Child::Text(span) if span.text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::continuation::LowercaseContinuation;
    use crate::config::ConversionConfig;
    use crate::types::{NodeKind, PageSummary, SourceRef, TextSpan};
    use pretty_assertions::assert_eq;

    fn policy() -> LowercaseContinuation {
        LowercaseContinuation::from_config(&ConversionConfig::default().merge)
    }

    fn join() -> TextJoin {
        TextJoin::from(&ConversionConfig::default().merge)
    }

    fn span(page: u32, id: &str, text: &str) -> TextSpan {
        TextSpan::new(
            text,
            Some(SourceRef {
                page,
                id: id.to_string(),
            }),
        )
    }

    fn paragraph(page: u32, id: &str, lines: &[&str], open: bool) -> OutputNode {
        let mut node = OutputNode::new(id, "p", NodeKind::Paragraph);
        for (i, line) in lines.iter().enumerate() {
            node.push_text(span(page, &format!("{id}_l{i}"), line));
        }
        node.open_at_block_end = open;
        node
    }

    fn page(number: u32, nodes: Vec<OutputNode>) -> PageTree {
        let mut root = OutputNode::new(format!("p{number}-body"), "body", NodeKind::Root);
        for node in nodes {
            root.push_node(node);
        }
        PageTree {
            page_number: number,
            label: None,
            image: None,
            facs_reference: None,
            root,
            notes: Vec::new(),
            summary: PageSummary {
                page_number: number,
                ..PageSummary::default()
            },
        }
    }

    fn merge(pages: Vec<PageTree>) -> MergedBook {
        let policy = policy();
        let mut merger = CrossPageMerger::new(&policy, join(), OutputNode::new("book", "div", NodeKind::Root));
        for page in pages {
            merger.push_page(page);
        }
        merger.finish()
    }

    fn texts(node: &OutputNode) -> Vec<&str> {
        node.text_spans().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn hyphenated_word_is_completed_before_the_page_break() {
        let book = merge(vec![
            page(1, vec![paragraph(1, "a", &["It was a wonder-"], true)]),
            page(2, vec![paragraph(2, "b", &["ful day indeed."], false)]),
        ]);
        assert_eq!(book.merges, 1);
        let nodes: Vec<&OutputNode> = book.body.child_nodes().collect();
        assert_eq!(nodes.len(), 1);
        assert_eq!(texts(nodes[0]), vec!["It was a wonderful", "day indeed."]);
        assert!(matches!(nodes[0].children[1], Child::PageBoundary(PageBoundary { page_number: 2, .. })));
        assert!(!nodes[0].open_at_block_end);
    }

    #[test]
    fn blank_lines_at_the_boundary_do_not_split_the_word() {
        let book = merge(vec![
            page(1, vec![paragraph(1, "a", &["It was a wonder-"], true)]),
            page(2, vec![paragraph(2, "b", &["", "ful day."], false)]),
        ]);
        let p = book.body.child_nodes().next().unwrap();
        assert_eq!(texts(p), vec!["It was a wonderful", "", "day."]);
        assert!(matches!(p.children[1], Child::PageBoundary(_)));

        let book = merge(vec![
            page(1, vec![paragraph(1, "a", &["It was a wonder-", "  "], true)]),
            page(2, vec![paragraph(2, "b", &["ful day."], false)]),
        ]);
        let p = book.body.child_nodes().next().unwrap();
        assert_eq!(texts(p), vec!["It was a wonderful", "  ", "day."]);
        assert!(matches!(p.children[2], Child::PageBoundary(_)));
    }

    #[test]
    fn missing_page_keeps_its_break_and_stops_continuation() {
        let policy = policy();
        let mut merger = CrossPageMerger::new(&policy, join(), OutputNode::new("book", "div", NodeKind::Root));
        merger.push_page(page(1, vec![paragraph(1, "a", &["the end of the"], true)]));
        merger.push_gap(2);
        merger.push_page(page(3, vec![paragraph(3, "c", &["story goes on"], false)]));
        let book = merger.finish();

        assert_eq!(book.merges, 0);
        let breaks: Vec<u32> = book
            .body
            .children
            .iter()
            .filter_map(|c| match c {
                Child::PageBoundary(pb) => Some(pb.page_number),
                _ => None,
            })
            .collect();
        assert_eq!(breaks, vec![1, 2, 3]);
        assert_eq!(book.body.child_nodes().count(), 2);
    }

    #[test]
    fn plain_continuation_keeps_both_spans() {
        let book = merge(vec![
            page(1, vec![paragraph(1, "a", &["the end of the"], true)]),
            page(2, vec![paragraph(2, "b", &["story goes on"], false)]),
        ]);
        let p = book.body.child_nodes().next().unwrap();
        assert_eq!(texts(p), vec!["the end of the", "story goes on"]);
        assert_eq!(p.children.len(), 3);
    }

    #[test]
    fn single_word_head_is_absorbed_entirely() {
        let book = merge(vec![
            page(1, vec![paragraph(1, "a", &["a wonder-"], true)]),
            page(2, vec![paragraph(2, "b", &["ful", "and more"], false)]),
        ]);
        let p = book.body.child_nodes().next().unwrap();
        assert_eq!(texts(p), vec!["a wonderful", "and more"]);
    }

    #[test]
    fn page_breaks_precede_every_page_when_separate() {
        let book = merge(vec![
            page(1, vec![paragraph(1, "a", &["Done."], false)]),
            page(2, vec![paragraph(2, "b", &["New start."], false)]),
        ]);
        assert_eq!(book.merges, 0);
        let shape: Vec<&str> = book
            .body
            .children
            .iter()
            .map(|c| match c {
                Child::PageBoundary(_) => "pb",
                Child::Node(_) => "p",
                Child::Text(_) => "text",
            })
            .collect();
        assert_eq!(shape, vec!["pb", "p", "pb", "p"]);
    }

    #[test]
    fn ambiguous_boundary_is_noted_and_kept_apart() {
        let book = merge(vec![
            page(1, vec![paragraph(1, "a", &["no stop here"], true)]),
            page(2, vec![paragraph(2, "b", &["Capital start"], false)]),
        ]);
        assert_eq!(book.merges, 0);
        assert_eq!(book.body.child_nodes().count(), 2);
        assert!(matches!(
            book.notes.as_slice(),
            [PolicyNote::CrossPageAmbiguity { page: 2, .. }]
        ));
    }

    #[test]
    fn blank_page_stops_continuation() {
        let book = merge(vec![
            page(1, vec![paragraph(1, "a", &["the end of the"], true)]),
            page(2, vec![]),
            page(3, vec![paragraph(3, "c", &["story goes on"], false)]),
        ]);
        assert_eq!(book.merges, 0);
        assert_eq!(book.body.child_nodes().count(), 2);
    }

    #[test]
    fn furniture_before_the_head_follows_the_merged_paragraph() {
        let mut heading = OutputNode::new("h", "fw", NodeKind::BlockElement);
        heading.push_text(span(2, "h", "RUNNING TITLE"));
        let book = merge(vec![
            page(1, vec![paragraph(1, "a", &["the end of the"], true)]),
            page(2, vec![heading, paragraph(2, "b", &["story goes on"], true)]),
            page(3, vec![paragraph(3, "c", &["and on"], false)]),
        ]);
        assert_eq!(book.merges, 2);
        let names: Vec<&str> = book.body.child_nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["p", "fw"]);
        let p = book.body.child_nodes().next().unwrap();
        assert_eq!(texts(p), vec!["the end of the", "story goes on", "and on"]);
    }

    #[test]
    fn summaries_are_collected_in_order() {
        let book = merge(vec![page(1, vec![]), page(2, vec![])]);
        let numbers: Vec<u32> = book.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }
}
