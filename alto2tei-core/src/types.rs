use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ===== ATTRIBUTES =====

/// Element attributes. Insertion order is kept for serialization but ignored
/// for equality, so two nodes with the same attribute set compare equal.
#[derive(Debug, Clone, Default)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Set an attribute, replacing the value in place if the key already exists.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        for (k, v) in iter {
            attributes.set(k, v);
        }
        attributes
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AttributesVisitor;

        impl<'de> Visitor<'de> for AttributesVisitor {
            type Value = Attributes;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of attribute names to string values")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
                let mut attributes = Attributes::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    attributes.set(key, value);
                }
                Ok(attributes)
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(Attributes::new())
            }
        }

        deserializer.deserialize_any(AttributesVisitor)
    }
}

// ===== SOURCE GEOMETRY =====

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Smallest box enclosing all points. `None` for an empty slice.
    pub fn enclosing(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        })
    }
}

/// Spatial footprint of a source block or line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<Vec<Point>>,
}

impl Coordinates {
    pub fn from_box(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            bbox: BoundingBox {
                x,
                y,
                width,
                height,
            },
            polygon: None,
            baseline: None,
        }
    }
}

// ===== SOURCE PAGE TYPES =====
// What a page source hands to the converter: blocks of classified lines,
// in reading order, with their raw tag strings still unresolved.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLine {
    pub id: String,
    /// Raw tag string such as "CustomLine:verse"; `None` means the default line type
    pub tag: Option<String>,
    pub text: String,
    pub coordinates: Option<Coordinates>,
}

impl SourceLine {
    pub fn new(id: impl Into<String>, tag: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.map(str::to_string),
            text: text.into(),
            coordinates: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBlock {
    pub id: String,
    pub tag: Option<String>,
    pub lines: Vec<SourceLine>,
    pub coordinates: Option<Coordinates>,
}

impl SourceBlock {
    pub fn new(id: impl Into<String>, tag: Option<&str>, lines: Vec<SourceLine>) -> Self {
        Self {
            id: id.into(),
            tag: tag.map(str::to_string),
            lines,
            coordinates: None,
        }
    }

    /// All non-blank line texts joined by single spaces
    pub fn joined_text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePage {
    /// 1-based position of the page in the final page order
    pub page_number: u32,
    /// Name of the file the page was read from, for reporting
    pub source_name: Option<String>,
    /// Image file name recorded by the layout source
    pub image: Option<String>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub blocks: Vec<SourceBlock>,
}

impl SourcePage {
    pub fn new(page_number: u32, blocks: Vec<SourceBlock>) -> Self {
        Self {
            page_number,
            source_name: None,
            image: None,
            width: None,
            height: None,
            blocks,
        }
    }
}

// ===== OUTPUT TREE =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Paragraph,
    #[serde(alias = "poetry")]
    VerseGroup,
    Footnote,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::Paragraph => write!(f, "paragraph"),
            ContainerKind::VerseGroup => write!(f, "verse group"),
            ContainerKind::Footnote => write!(f, "footnote"),
        }
    }
}

/// Structural role of a node, independent of the element name it renders as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Page body or book wrapper
    Root,
    Paragraph,
    VerseGroup,
    /// Element created from a single line (heading, verse line, signature)
    LineElement,
    /// Signature or catchword line; sits beside the text flow, not in it
    Furniture,
    /// Element created from a whole block's text (running title)
    BlockElement,
    Note,
    Notes,
}

/// Where a node or span came from: page number plus block or line id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub page: u32,
    pub id: String,
}

/// A run of text from one source line. The text is never edited in place;
/// reassembly across pages builds new spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub source: Option<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facs: Option<String>,
}

impl TextSpan {
    pub fn new(text: impl Into<String>, source: Option<SourceRef>) -> Self {
        Self {
            text: text.into(),
            source,
            facs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageBoundary {
    pub page_number: u32,
    /// Printed page number, when one was found on the page
    pub label: Option<String>,
    pub facs_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Child {
    Text(TextSpan),
    Node(OutputNode),
    PageBoundary(PageBoundary),
}

impl Child {
    pub fn as_node(&self) -> Option<&OutputNode> {
        match self {
            Child::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut OutputNode> {
        match self {
            Child::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextSpan> {
        match self {
            Child::Text(span) => Some(span),
            _ => None,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputNode {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub attributes: Attributes,
    pub children: Vec<Child>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
    /// Opened by an explicit new-paragraph line rather than implicitly
    #[serde(default, skip_serializing_if = "is_false")]
    pub explicit_start: bool,
    /// Still open when its block ran out of lines
    #[serde(default, skip_serializing_if = "is_false")]
    pub open_at_block_end: bool,
}

impl OutputNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            attributes: Attributes::new(),
            children: Vec::new(),
            facs: None,
            source: None,
            explicit_start: false,
            open_at_block_end: false,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_source(mut self, source: Option<SourceRef>) -> Self {
        self.source = source;
        self
    }

    pub fn push_text(&mut self, span: TextSpan) {
        self.children.push(Child::Text(span));
    }

    pub fn push_node(&mut self, node: OutputNode) {
        self.children.push(Child::Node(node));
    }

    /// Nodes that carry running text and take part in cross-page continuity.
    /// Page furniture (running titles, notes, signatures) does not.
    pub fn is_flow(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Paragraph | NodeKind::VerseGroup | NodeKind::LineElement
        )
    }

    pub fn child_nodes(&self) -> impl Iterator<Item = &OutputNode> {
        self.children.iter().filter_map(Child::as_node)
    }

    pub fn text_spans(&self) -> impl Iterator<Item = &TextSpan> {
        self.children.iter().filter_map(Child::as_text)
    }

    pub fn last_text_span_mut(&mut self) -> Option<&mut TextSpan> {
        self.children.iter_mut().rev().find_map(|c| match c {
            Child::Text(span) => Some(span),
            _ => None,
        })
    }

    pub fn first_text(&self) -> Option<&str> {
        self.children.iter().find_map(|c| match c {
            Child::Text(span) => Some(span.text.as_str()),
            Child::Node(node) => node.first_text(),
            Child::PageBoundary(_) => None,
        })
    }

    /// Depth-first walk over this node and all descendants
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a OutputNode)) {
        visit(self);
        for node in self.child_nodes() {
            node.walk(visit);
        }
    }
}

// ===== PAGE AND BOOK RESULTS =====

/// Reporting counters gathered while a page is converted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    pub page_number: u32,
    pub source_name: Option<String>,
    pub printed_page_number: Option<String>,
    pub verse_line_count: usize,
    pub footnote_count: usize,
    pub footnote_symbols: Vec<String>,
}

/// Output of the state machine for one page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageTree {
    pub page_number: u32,
    pub label: Option<String>,
    pub image: Option<String>,
    pub facs_reference: Option<String>,
    /// Page body: flow content in block order, notes container last
    pub root: OutputNode,
    pub notes: Vec<crate::error::PolicyNote>,
    pub summary: PageSummary,
}

impl PageTree {
    pub fn boundary(&self) -> PageBoundary {
        PageBoundary {
            page_number: self.page_number,
            label: self.label.clone(),
            facs_reference: self.facs_reference.clone(),
        }
    }
}

// ===== FACSIMILE =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    TextBlock,
    TextLine,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::TextBlock => "textblock",
            ZoneKind::TextLine => "textline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub kind: ZoneKind,
    pub bbox: BoundingBox,
    pub polygon: Option<Vec<Point>>,
    pub baseline: Option<Vec<Point>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub id: String,
    pub page_number: u32,
    pub image: Option<String>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub zones: Vec<Zone>,
}

/// Everything a serializer needs for one output document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertedDocument {
    pub body: OutputNode,
    pub surfaces: Vec<Surface>,
    pub pages: Vec<PageSummary>,
}
