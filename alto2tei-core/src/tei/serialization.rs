use crate::config::TeiStructureConfig;
use crate::convert::text::strip_word_break;
use crate::error::ConversionError;
use crate::rules::TextJoin;
use crate::types::{Child, ConvertedDocument, OutputNode, PageBoundary, Point, Surface, TextSpan, Zone};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

type XmlResult = Result<(), ConversionError>;

/// Writes a [`ConvertedDocument`] as a TEI P5 document
pub struct TeiSerializer<'c> {
    config: &'c TeiStructureConfig,
    join: &'c TextJoin,
}

impl<'c> TeiSerializer<'c> {
    pub fn new(config: &'c TeiStructureConfig, join: &'c TextJoin) -> Self {
        Self { config, join }
    }

    pub fn render(&self, document: &ConvertedDocument, title: &str) -> Result<String, ConversionError> {
        let mut writer = if self.config.body.pretty_print {
            Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2)
        } else {
            Writer::new(Cursor::new(Vec::new()))
        };

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(
            BytesStart::new("TEI").with_attributes([("xmlns", self.config.namespace.as_str())]),
        ))?;

        self.write_header(&mut writer, title)?;
        if !document.surfaces.is_empty() {
            write_facsimile(&mut writer, &document.surfaces)?;
        }

        writer.write_event(Event::Start(BytesStart::new("text")))?;
        self.write_node(&mut writer, &document.body)?;
        writer.write_event(Event::End(BytesEnd::new("text")))?;
        writer.write_event(Event::End(BytesEnd::new("TEI")))?;

        let mut xml = String::from_utf8_lossy(&writer.into_inner().into_inner()).into_owned();
        xml.push('\n');
        Ok(xml)
    }

    fn write_header<W: std::io::Write>(&self, writer: &mut Writer<W>, title: &str) -> XmlResult {
        let header = &self.config.header;
        let date = header
            .date
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());

        writer.write_event(Event::Start(BytesStart::new("teiHeader")))?;
        writer.write_event(Event::Start(BytesStart::new("fileDesc")))?;

        writer.write_event(Event::Start(BytesStart::new("titleStmt")))?;
        text_element(writer, "title", title)?;
        writer.write_event(Event::End(BytesEnd::new("titleStmt")))?;

        writer.write_event(Event::Start(BytesStart::new("publicationStmt")))?;
        text_element(writer, "publisher", &header.publisher)?;
        text_element(writer, "date", &date)?;
        writer.write_event(Event::End(BytesEnd::new("publicationStmt")))?;

        writer.write_event(Event::Start(BytesStart::new("sourceDesc")))?;
        text_element(writer, "p", &header.source_description)?;
        writer.write_event(Event::End(BytesEnd::new("sourceDesc")))?;

        writer.write_event(Event::End(BytesEnd::new("fileDesc")))?;
        writer.write_event(Event::End(BytesEnd::new("teiHeader")))?;
        Ok(())
    }

    fn write_node<W: std::io::Write>(&self, writer: &mut Writer<W>, node: &OutputNode) -> XmlResult {
        let mut start = BytesStart::new(node.name.as_str());
        for (key, value) in node.attributes.iter() {
            start.push_attribute((key, value));
        }
        if let Some(facs) = &node.facs {
            start.push_attribute(("facs", facs.as_str()));
        }

        if node.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        writer.write_event(Event::Start(start))?;
        if node.children.iter().any(|c| matches!(c, Child::Text(_))) {
            // Mixed content is written flat; indentation would become text
            let mut flat = Writer::new(Vec::new());
            self.write_children(&mut flat, &node.children)?;
            let inner = String::from_utf8_lossy(&flat.into_inner()).into_owned();
            writer.write_event(Event::Text(BytesText::from_escaped(inner)))?;
        } else {
            self.write_children(writer, &node.children)?;
        }
        writer.write_event(Event::End(BytesEnd::new(node.name.as_str())))?;
        Ok(())
    }

    /// Mixed content. With line breaks preserved every span after the first
    /// is preceded by `lb`; otherwise consecutive spans are joined into
    /// running text, page breaks in between being transparent.
    fn write_children<W: std::io::Write>(&self, writer: &mut Writer<W>, children: &[Child]) -> XmlResult {
        let preserve = self.config.body.preserve_line_breaks;
        let mut spans_written = 0usize;

        for (index, child) in children.iter().enumerate() {
            match child {
                Child::Node(node) => self.write_node(writer, node)?,
                Child::PageBoundary(boundary) => self.write_page_break(writer, boundary)?,
                Child::Text(span) if preserve => {
                    if spans_written > 0 {
                        writer.write_event(Event::Empty(BytesStart::new(self.config.elements.line_break.as_str())))?;
                    }
                    self.write_span(writer, span, span.text.trim())?;
                    spans_written += 1;
                }
                Child::Text(span) => {
                    let text = span.text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    let (piece, separator) = match next_text(&children[index + 1..]) {
                        None => (text, ""),
                        Some(_) => match strip_word_break(text, &self.join.word_break_chars) {
                            Some(stem) => (stem, ""),
                            None => (text, self.join.joiner.as_str()),
                        },
                    };
                    self.write_span(writer, span, piece)?;
                    if !separator.is_empty() {
                        writer.write_event(Event::Text(BytesText::new(separator)))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn write_span<W: std::io::Write>(&self, writer: &mut Writer<W>, span: &TextSpan, text: &str) -> XmlResult {
        match (&span.facs, self.config.body.line_segments) {
            (Some(facs), true) => {
                let segment = self.config.elements.segment.as_str();
                let start = BytesStart::new(segment).with_attributes([("facs", facs.as_str())]);
                writer.write_event(Event::Start(start))?;
                writer.write_event(Event::Text(BytesText::new(text)))?;
                writer.write_event(Event::End(BytesEnd::new(segment)))?;
            }
            _ => writer.write_event(Event::Text(BytesText::new(text)))?,
        }
        Ok(())
    }

    fn write_page_break<W: std::io::Write>(&self, writer: &mut Writer<W>, boundary: &PageBoundary) -> XmlResult {
        let number = boundary
            .label
            .clone()
            .unwrap_or_else(|| boundary.page_number.to_string());
        let mut pb = BytesStart::new(self.config.elements.page_break.as_str());
        pb.push_attribute(("n", number.as_str()));
        if let Some(facs) = &boundary.facs_reference {
            pb.push_attribute(("facs", facs.as_str()));
        }
        writer.write_event(Event::Empty(pb))?;
        Ok(())
    }
}

/// First non-empty text span before the next element, page breaks skipped
fn next_text(children: &[Child]) -> Option<&TextSpan> {
    for child in children {
        match child {
            Child::Text(span) if !span.text.trim().is_empty() => return Some(span),
            Child::Text(_) | Child::PageBoundary(_) => continue,
            Child::Node(_) => return None,
        }
    }
    None
}

fn text_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, text: &str) -> XmlResult {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_facsimile<W: std::io::Write>(writer: &mut Writer<W>, surfaces: &[Surface]) -> XmlResult {
    writer.write_event(Event::Start(BytesStart::new("facsimile")))?;
    for surface in surfaces {
        let mut start = BytesStart::new("surface");
        start.push_attribute(("xml:id", surface.id.as_str()));
        if let (Some(width), Some(height)) = (surface.width, surface.height) {
            start.push_attribute(("ulx", "0"));
            start.push_attribute(("uly", "0"));
            start.push_attribute(("lrx", coordinate(width).as_str()));
            start.push_attribute(("lry", coordinate(height).as_str()));
        }
        writer.write_event(Event::Start(start))?;

        if let Some(image) = &surface.image {
            let mut graphic = BytesStart::new("graphic");
            graphic.push_attribute(("url", image.as_str()));
            if let (Some(width), Some(height)) = (surface.width, surface.height) {
                graphic.push_attribute(("width", format!("{}px", coordinate(width)).as_str()));
                graphic.push_attribute(("height", format!("{}px", coordinate(height)).as_str()));
            }
            writer.write_event(Event::Empty(graphic))?;
        }
        for zone in &surface.zones {
            writer.write_event(Event::Empty(zone_element(zone)))?;
        }
        writer.write_event(Event::End(BytesEnd::new("surface")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("facsimile")))?;
    Ok(())
}

fn zone_element(zone: &Zone) -> BytesStart<'static> {
    let mut start = BytesStart::new("zone");
    start.push_attribute(("xml:id", zone.id.as_str()));
    start.push_attribute(("type", zone.kind.as_str()));
    start.push_attribute(("ulx", coordinate(zone.bbox.x).as_str()));
    start.push_attribute(("uly", coordinate(zone.bbox.y).as_str()));
    start.push_attribute(("lrx", coordinate(zone.bbox.right()).as_str()));
    start.push_attribute(("lry", coordinate(zone.bbox.bottom()).as_str()));
    if let Some(polygon) = &zone.polygon {
        start.push_attribute(("points", points(polygon).as_str()));
    }
    if let Some(baseline) = &zone.baseline {
        start.push_attribute(("baseline", points(baseline).as_str()));
    }
    start
}

/// Whole numbers without a fractional part, as ALTO writes them
fn coordinate(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn points(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", coordinate(p.x), coordinate(p.y)))
        .collect::<Vec<_>>()
        .join(" ")
}
