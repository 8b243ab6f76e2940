//! ALTO XML source
//!
//! Reads ALTO v2-v4 layout files (as exported by eScriptorium) into
//! [`SourcePage`]s. Elements are matched by local name, so any namespace
//! prefix works. Tag references on blocks and lines are resolved against the
//! document's `Tags` section into the raw tag strings the rule table knows
//! (e.g. "MainZone", "CustomLine:verse").

use crate::error::ConversionError;
use crate::sources::{mets, PageSource};
use crate::types::{BoundingBox, Coordinates, Point, SourceBlock, SourceLine, SourcePage};
use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Preferred TAGREFS prefixes for block and line tags
const BLOCK_TAG_PREFIX: &str = "BT";
const LINE_TAG_PREFIX: &str = "LT";

// ===== FILE SOURCE =====

/// ALTO files on disk, one page per file
#[derive(Debug, Clone)]
pub struct AltoFileSource {
    name: String,
    files: Vec<PathBuf>,
}

impl AltoFileSource {
    pub fn new(name: impl Into<String>, files: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }

    /// Every ALTO file in `folder`, ordered by file name. Other XML files
    /// (METS, TEI output from an earlier run) are skipped. A file that cannot
    /// be read stays in the list so the book reports it as a failed page.
    pub fn from_folder(folder: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for path in xml_files(folder)? {
            match fs::read_to_string(&path) {
                Ok(content) if is_alto_document(&content) => files.push(path),
                Ok(_) => log::debug!("⏭️  {} is not ALTO, skipped", path.display()),
                Err(e) => {
                    log::warn!("⚠️  Cannot read {}: {e}", path.display());
                    files.push(path);
                }
            }
        }
        Ok(Self::new(folder_name(folder), files))
    }

    /// Files listed in the METS export group, in METS order, looked up in
    /// `folder`. Listed files that do not exist are reported and left out.
    pub fn from_mets(folder: &Path, mets_path: &Path) -> Result<Self> {
        let order = mets::read_page_order(mets_path)
            .with_context(|| format!("Failed to read page order from {}", mets_path.display()))?;
        let mut files = Vec::with_capacity(order.len());
        for name in order {
            let path = folder.join(&name);
            if path.is_file() {
                files.push(path);
            } else {
                log::warn!("⚠️  METS lists {name} but it is not in {}", folder.display());
            }
        }
        Ok(Self::new(folder_name(folder), files))
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl PageSource for AltoFileSource {
    fn page_count(&self) -> usize {
        self.files.len()
    }

    fn load_page(&self, index: usize) -> Result<SourcePage> {
        let path = self
            .files
            .get(index)
            .with_context(|| format!("page index {index} out of range"))?;
        let xml = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let mut page = parse_alto(&xml, index as u32 + 1).with_context(|| format!("Failed to parse {}", path.display()))?;
        page.source_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        Ok(page)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// `.xml` files directly inside `folder`, sorted by file name
pub fn xml_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(folder)
        .with_context(|| format!("Failed to list {}", folder.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        })
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn folder_name(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.display().to_string())
}

// ===== PARSING =====

/// Root element is `alto` (any namespace prefix)
pub fn is_alto_document(xml: &str) -> bool {
    matches!(root_element(xml), Ok(Some(name)) if name.eq_ignore_ascii_case("alto"))
}

fn root_element(xml: &str) -> Result<Option<String>, ConversionError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned()))
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
struct RawCoords {
    bbox: Option<BoundingBox>,
    polygon: Option<Vec<Point>>,
    baseline: Option<Vec<Point>>,
}

impl RawCoords {
    fn finish(self) -> Option<Coordinates> {
        let bbox = self
            .bbox
            .or_else(|| self.polygon.as_deref().and_then(BoundingBox::enclosing))?;
        Some(Coordinates {
            bbox,
            polygon: self.polygon,
            baseline: self.baseline,
        })
    }
}

#[derive(Debug, Default)]
struct RawLine {
    id: Option<String>,
    tagrefs: Vec<String>,
    coords: RawCoords,
    words: Vec<String>,
}

#[derive(Debug, Default)]
struct RawBlock {
    id: Option<String>,
    tagrefs: Vec<String>,
    coords: RawCoords,
    lines: Vec<RawLine>,
}

#[derive(Debug, Default)]
struct AltoParser {
    tags: HashMap<String, String>,
    blocks: Vec<RawBlock>,
    block: Option<RawBlock>,
    line: Option<RawLine>,
    /// Open String elements; polygons inside them are word shapes
    string_depth: usize,
    in_file_name: bool,
    image: Option<String>,
    width: Option<f32>,
    height: Option<f32>,
}

/// Parse one ALTO document. `page_number` is the page's position in the
/// book (1-based).
pub fn parse_alto(xml: &str, page_number: u32) -> Result<SourcePage, ConversionError> {
    match root_element(xml)? {
        Some(name) if name.eq_ignore_ascii_case("alto") => {}
        other => return Err(ConversionError::NotAlto(other.unwrap_or_default())),
    }

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut parser = AltoParser::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => parser.open(&e, false)?,
            Event::Empty(e) => parser.open(&e, true)?,
            Event::End(e) => parser.close(e.local_name().as_ref()),
            Event::Text(t) if parser.in_file_name => {
                let name = t.unescape()?.trim().to_string();
                if !name.is_empty() {
                    parser.image = Some(name);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(parser.finish(page_number))
}

impl AltoParser {
    fn open(&mut self, e: &BytesStart<'_>, empty: bool) -> Result<(), ConversionError> {
        match e.local_name().as_ref() {
            b"fileName" => self.in_file_name = !empty,
            b"Page" => {
                self.width = number(e, b"WIDTH")?;
                self.height = number(e, b"HEIGHT")?;
            }
            b"TextBlock" => {
                self.close_block();
                self.block = Some(RawBlock {
                    id: attribute(e, b"ID")?,
                    tagrefs: tagrefs(e)?,
                    coords: box_coords(e)?,
                    lines: Vec::new(),
                });
                if empty {
                    self.close_block();
                }
            }
            b"TextLine" => {
                self.close_line();
                let mut coords = box_coords(e)?;
                coords.baseline = attribute(e, b"BASELINE")?.map(|b| parse_points(&b)).filter(|p| !p.is_empty());
                self.line = Some(RawLine {
                    id: attribute(e, b"ID")?,
                    tagrefs: tagrefs(e)?,
                    coords,
                    words: Vec::new(),
                });
                if empty {
                    self.close_line();
                }
            }
            b"String" => {
                if let (Some(line), Some(content)) = (self.line.as_mut(), attribute(e, b"CONTENT")?) {
                    line.words.push(content);
                }
                if !empty {
                    self.string_depth += 1;
                }
            }
            b"Polygon" if self.string_depth == 0 => {
                let points = attribute(e, b"POINTS")?.map(|p| parse_points(&p)).filter(|p| p.len() >= 3);
                if let Some(line) = self.line.as_mut() {
                    line.coords.polygon = points;
                } else if let Some(block) = self.block.as_mut() {
                    block.coords.polygon = points;
                }
            }
            name if name.ends_with(b"Tag") => {
                if let (Some(id), Some(label)) = (attribute(e, b"ID")?, attribute(e, b"LABEL")?) {
                    self.tags.insert(id, label);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"fileName" => self.in_file_name = false,
            b"TextLine" => self.close_line(),
            b"TextBlock" => self.close_block(),
            b"String" => self.string_depth = self.string_depth.saturating_sub(1),
            _ => {}
        }
    }

    fn close_line(&mut self) {
        let Some(line) = self.line.take() else {
            return;
        };
        // Lines outside any TextBlock get a block of their own
        self.block.get_or_insert_with(RawBlock::default).lines.push(line);
    }

    fn close_block(&mut self) {
        self.close_line();
        if let Some(block) = self.block.take() {
            self.blocks.push(block);
        }
    }

    fn finish(mut self, page_number: u32) -> SourcePage {
        self.close_block();
        let tags = &self.tags;
        let blocks = self
            .blocks
            .into_iter()
            .enumerate()
            .map(|(i, raw)| {
                let block_id = raw.id.unwrap_or_else(|| format!("b{i}"));
                let lines = raw
                    .lines
                    .into_iter()
                    .enumerate()
                    .map(|(j, line)| SourceLine {
                        id: line.id.unwrap_or_else(|| format!("{block_id}_l{j}")),
                        tag: resolve_tag(&line.tagrefs, LINE_TAG_PREFIX, tags),
                        text: line
                            .words
                            .iter()
                            .map(|w| w.trim())
                            .filter(|w| !w.is_empty())
                            .collect::<Vec<_>>()
                            .join(" "),
                        coordinates: line.coords.finish(),
                    })
                    .collect();
                SourceBlock {
                    tag: resolve_tag(&raw.tagrefs, BLOCK_TAG_PREFIX, tags),
                    lines,
                    coordinates: raw.coords.finish(),
                    id: block_id,
                }
            })
            .collect();

        SourcePage {
            page_number,
            source_name: None,
            image: self.image,
            width: self.width,
            height: self.height,
            blocks,
        }
    }
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, ConversionError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn number(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<f32>, ConversionError> {
    Ok(attribute(e, name)?.and_then(|v| v.trim().parse::<f32>().ok()))
}

fn box_coords(e: &BytesStart<'_>) -> Result<RawCoords, ConversionError> {
    let bbox = match (
        number(e, b"HPOS")?,
        number(e, b"VPOS")?,
        number(e, b"WIDTH")?,
        number(e, b"HEIGHT")?,
    ) {
        (Some(x), Some(y), Some(width), Some(height)) => Some(BoundingBox { x, y, width, height }),
        _ => None,
    };
    Ok(RawCoords {
        bbox,
        ..RawCoords::default()
    })
}

fn tagrefs(e: &BytesStart<'_>) -> Result<Vec<String>, ConversionError> {
    Ok(attribute(e, b"TAGREFS")?
        .map(|refs| refs.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default())
}

/// Label of the first reference with the preferred prefix, else of the first
/// reference that exists at all
fn resolve_tag(refs: &[String], prefix: &str, tags: &HashMap<String, String>) -> Option<String> {
    refs.iter()
        .find(|r| r.starts_with(prefix) && tags.contains_key(r.as_str()))
        .or_else(|| refs.iter().find(|r| tags.contains_key(r.as_str())))
        .and_then(|r| tags.get(r.as_str()))
        .cloned()
}

/// "x1,y1 x2,y2" and "x1 y1 x2 y2" both parse; a trailing odd number is dropped
fn parse_points(raw: &str) -> Vec<Point> {
    let numbers: Vec<f32> = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    numbers
        .chunks_exact(2)
        .map(|pair| Point { x: pair[0], y: pair[1] })
        .collect()
}
