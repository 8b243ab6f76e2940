use crate::error::PolicyNote;
use crate::rules::{ElementSpec, LineAction, LineRule, RuleTable, TagResolver};
use crate::types::{
    Attributes, Child, ContainerKind, NodeKind, OutputNode, SourceBlock, SourceLine, SourceRef,
    TextSpan,
};

/// The paragraph or verse group currently accumulating lines. At most one
/// exists at a time; opening either kind finalizes the other.
#[derive(Debug)]
struct OpenContainer {
    kind: ContainerKind,
    node: OutputNode,
}

/// Note lines collected until the next marker line or the block end
#[derive(Debug)]
struct PendingFootnote {
    symbol: Option<String>,
    category_label: Option<String>,
    source: SourceRef,
    spans: Vec<TextSpan>,
}

/// Applies line rules to the lines of one page, block by block.
///
/// Per line: resolve the rule, honor `closes`, then run the action against
/// the single open container. Block ends finalize whatever is still open, so
/// no line is dropped and output order follows input order.
pub struct ConversionStateMachine<'r> {
    rules: &'r RuleTable,
    resolver: TagResolver<'r>,
    page: u32,
    block_source: Option<SourceRef>,
    open_container: Option<OpenContainer>,
    block_root: Vec<OutputNode>,
    /// Furniture lines met while a container was open, placed after it
    held_furniture: Vec<OutputNode>,
    pending_footnote: Option<PendingFootnote>,
    footnotes: Vec<OutputNode>,
    notes: Vec<PolicyNote>,
    next_id: usize,
}

impl<'r> ConversionStateMachine<'r> {
    pub fn new(rules: &'r RuleTable, page: u32) -> Self {
        Self {
            rules,
            resolver: TagResolver::new(rules),
            page,
            block_source: None,
            open_container: None,
            block_root: Vec::new(),
            held_furniture: Vec::new(),
            pending_footnote: None,
            footnotes: Vec::new(),
            notes: Vec::new(),
            next_id: 0,
        }
    }

    pub fn resolver(&self) -> TagResolver<'r> {
        self.resolver
    }

    pub fn record(&mut self, note: PolicyNote) {
        note.log();
        self.notes.push(note);
    }

    pub fn begin_block(&mut self, block: &SourceBlock) {
        self.block_source = Some(SourceRef {
            page: self.page,
            id: block.id.clone(),
        });
    }

    /// Finalize the open container and any pending footnote, returning the
    /// block's top-level nodes in line order
    pub fn end_block(&mut self) -> Vec<OutputNode> {
        if let Some(mut open) = self.open_container.take() {
            open.node.open_at_block_end = true;
            log::debug!("   ↩️  {} {} closed at block end", open.kind, open.node.id);
            self.block_root.push(open.node);
        }
        self.block_root.append(&mut self.held_furniture);
        self.finalize_footnote();
        self.block_source = None;
        std::mem::take(&mut self.block_root)
    }

    pub fn process_line(&mut self, line: &SourceLine) {
        // 1. Resolve; Skip lines have no effect at all
        let resolved = self.resolver.resolve_line(line.tag.as_deref());
        if let Some(note) = resolved.fallback {
            self.record(note);
        }
        let rule = resolved.rule;
        if rule.action == LineAction::Skip {
            log::debug!("   ⏭️  skip {} ({})", line.id, resolved.tag);
            return;
        }
        self.check_line_text(line);

        // 2. Explicit closes
        for kind in &rule.closes {
            self.close(*kind);
        }

        // 3. Action
        let span = self.span(line);
        match rule.action {
            LineAction::StartParagraph => {
                self.finalize_open();
                let mut paragraph = self.paragraph_node(rule, true);
                paragraph.push_text(span);
                self.open(ContainerKind::Paragraph, paragraph);
            }
            LineAction::AddToParagraph => {
                let continuing = matches!(
                    &self.open_container,
                    Some(open) if open.kind == ContainerKind::Paragraph
                );
                if continuing {
                    if let Some(open) = &mut self.open_container {
                        open.node.push_text(span);
                    }
                } else {
                    self.finalize_open();
                    let mut paragraph = self.paragraph_node(rule, false);
                    paragraph.push_text(span);
                    self.open(ContainerKind::Paragraph, paragraph);
                }
            }
            LineAction::CreateElement => self.create_element(rule, line, span),
            LineAction::Skip => {}
        }
    }

    /// Footnote extraction: a line whose start matches a marker pattern opens
    /// a new note, other lines continue the pending one
    pub fn process_footnote_line(&mut self, line: &SourceLine) {
        let resolved = self.resolver.resolve_line(line.tag.as_deref());
        if let Some(note) = resolved.fallback {
            self.record(note);
        }
        if resolved.rule.action == LineAction::Skip {
            return;
        }
        self.check_line_text(line);
        if resolved.rule.closes.contains(&ContainerKind::Footnote) {
            self.finalize_footnote();
        }

        let matched = self.rules.footnotes().classify(&line.text);
        let source = SourceRef {
            page: self.page,
            id: line.id.clone(),
        };
        let body = TextSpan::new(matched.body, Some(source.clone()));

        let starts_note = matched.category_label.is_some() || self.pending_footnote.is_none();
        if starts_note {
            self.finalize_footnote();
            self.pending_footnote = Some(PendingFootnote {
                symbol: matched.symbol,
                category_label: matched.category_label,
                source,
                spans: vec![body],
            });
        } else if let Some(pending) = &mut self.pending_footnote {
            pending.spans.push(body);
        }
    }

    /// One element holding the whole block's text (running titles and the like)
    pub fn emit_block_element(&mut self, spec: &ElementSpec, block: &SourceBlock) {
        let text = block.joined_text();
        if text.is_empty() {
            return;
        }
        self.finalize_open();
        let id = self.next_id();
        let mut node = OutputNode::new(id, spec.name.clone(), NodeKind::BlockElement)
            .with_attributes(spec.attributes.clone())
            .with_source(self.block_source.clone());
        node.push_text(TextSpan::new(text, self.block_source.clone()));
        self.block_root.push(node);
    }

    /// Notes collected so far on this page, in source order
    pub fn take_footnotes(&mut self) -> Vec<OutputNode> {
        self.finalize_footnote();
        std::mem::take(&mut self.footnotes)
    }

    pub fn into_notes(self) -> Vec<PolicyNote> {
        self.notes
    }

    fn create_element(&mut self, rule: &LineRule, line: &SourceLine, span: TextSpan) {
        let name = rule
            .element_name
            .clone()
            .unwrap_or_else(|| self.rules.elements().paragraph.clone());
        let id = self.next_id();
        let mut element = OutputNode::new(id, name, NodeKind::LineElement)
            .with_attributes(rule.attributes.clone())
            .with_source(Some(SourceRef {
                page: self.page,
                id: line.id.clone(),
            }));
        element.push_text(span);

        if rule.furniture {
            // The open container stays open; the line lands after it
            element.kind = NodeKind::Furniture;
            if self.open_container.is_some() {
                self.held_furniture.push(element);
            } else {
                self.block_root.push(element);
            }
        } else if let Some(container) = &rule.container {
            let reusable = matches!(
                &self.open_container,
                Some(open) if open.kind == container.kind && open.node.name == container.name
            );
            if !reusable {
                self.finalize_open();
                let node_kind = match container.kind {
                    ContainerKind::Paragraph => NodeKind::Paragraph,
                    _ => NodeKind::VerseGroup,
                };
                let id = self.next_id();
                let node = OutputNode::new(id, container.name.clone(), node_kind)
                    .with_attributes(container.attributes.clone())
                    .with_source(self.block_source.clone());
                self.open(container.kind, node);
            }
            if let Some(open) = &mut self.open_container {
                open.node.push_node(element);
            }
        } else if rule.standalone {
            self.finalize_open();
            self.block_root.push(element);
        } else {
            // Running element: later paragraph lines continue inside it
            self.finalize_open();
            element.explicit_start = true;
            self.open(ContainerKind::Paragraph, element);
        }
    }

    fn paragraph_node(&mut self, rule: &LineRule, explicit: bool) -> OutputNode {
        let name = self.rules.paragraph_element(rule).to_string();
        let attributes: Attributes = rule.attributes.clone();
        let id = self.next_id();
        let mut node = OutputNode::new(id, name, NodeKind::Paragraph)
            .with_attributes(attributes)
            .with_source(self.block_source.clone());
        node.explicit_start = explicit;
        node
    }

    fn open(&mut self, kind: ContainerKind, node: OutputNode) {
        log::debug!("   📂 open {kind} {}", node.id);
        self.open_container = Some(OpenContainer { kind, node });
    }

    fn close(&mut self, kind: ContainerKind) {
        match kind {
            ContainerKind::Footnote => self.finalize_footnote(),
            _ => {
                if matches!(&self.open_container, Some(open) if open.kind == kind) {
                    self.finalize_open();
                }
            }
        }
    }

    fn finalize_open(&mut self) {
        if let Some(open) = self.open_container.take() {
            self.block_root.push(open.node);
        }
        self.block_root.append(&mut self.held_furniture);
    }

    fn finalize_footnote(&mut self) {
        let Some(pending) = self.pending_footnote.take() else {
            return;
        };
        let spec = &self.rules.elements().note;
        let mut attributes = spec.attributes.clone();
        if let Some(symbol) = &pending.symbol {
            attributes.set("n", symbol.clone());
        }
        if let Some(label) = &pending.category_label {
            attributes.set("type", label.clone());
        }
        let name = spec.name.clone();
        let id = self.next_id();
        let mut note = OutputNode::new(id, name, NodeKind::Note)
            .with_attributes(attributes)
            .with_source(Some(pending.source));
        note.children = pending.spans.into_iter().map(Child::Text).collect();
        self.footnotes.push(note);
    }

    fn check_line_text(&mut self, line: &SourceLine) {
        if line.text.trim().is_empty() {
            self.record(PolicyNote::MalformedLine {
                page: self.page,
                line_id: line.id.clone(),
            });
        }
    }

    fn span(&self, line: &SourceLine) -> TextSpan {
        TextSpan::new(
            line.text.trim(),
            Some(SourceRef {
                page: self.page,
                id: line.id.clone(),
            }),
        )
    }

    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("p{}-n{}", self.page, self.next_id)
    }
}
