use crate::config::FacsimileConfig;
use crate::types::{Child, Coordinates, OutputNode, SourcePage, SourceRef, Surface, Zone, ZoneKind};
use std::collections::HashMap;

// Facsimile projection - a decoration pass over a finished tree. Builds one
// surface per source page with a zone per block and line that has
// coordinates, then points nodes, spans and page breaks at those zones.
// Text and structure are never touched.

/// Zones of one page keyed by the source element they were built from
#[derive(Debug, Clone)]
pub struct PageFacsimile {
    pub surface: Surface,
    zones: HashMap<SourceRef, String>,
}

impl PageFacsimile {
    pub fn zone_for(&self, source: &SourceRef) -> Option<&str> {
        self.zones.get(source).map(String::as_str)
    }
}

pub struct FacsimileProjector<'c> {
    config: &'c FacsimileConfig,
}

impl<'c> FacsimileProjector<'c> {
    pub fn new(config: &'c FacsimileConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Surface and zone lookup for one page. Block and line indices count
    /// every block and line, including ones without coordinates, so ids stay
    /// stable when a zone is missing.
    pub fn page_facsimile(&self, page: &SourcePage) -> PageFacsimile {
        let ids = &self.config.ids;
        let page_number = page.page_number.to_string();
        let mut zones = Vec::new();
        let mut lookup = HashMap::new();

        for (block_index, block) in page.blocks.iter().enumerate() {
            let block_index = block_index.to_string();
            if let (true, Some(coords)) = (self.config.include_textblocks, &block.coordinates) {
                let id = fill(&ids.block, &[("page", &page_number), ("block", &block_index)]);
                lookup.insert(source(page, &block.id), id.clone());
                zones.push(self.zone(id, ZoneKind::TextBlock, coords));
            }
            if !self.config.include_textlines {
                continue;
            }
            for (line_index, line) in block.lines.iter().enumerate() {
                let Some(coords) = &line.coordinates else {
                    continue;
                };
                let id = fill(
                    &ids.line,
                    &[
                        ("page", &page_number),
                        ("block", &block_index),
                        ("line", &line_index.to_string()),
                    ],
                );
                lookup.insert(source(page, &line.id), id.clone());
                zones.push(self.zone(id, ZoneKind::TextLine, coords));
            }
        }

        let width = page.width.or_else(|| zones.iter().map(|z| z.bbox.right()).reduce(f32::max));
        let height = page.height.or_else(|| zones.iter().map(|z| z.bbox.bottom()).reduce(f32::max));

        PageFacsimile {
            surface: Surface {
                id: fill(&ids.surface, &[("page", &page_number)]),
                page_number: page.page_number,
                image: page.image.clone().filter(|_| self.config.include_graphic),
                width,
                height,
                zones,
            },
            zones: lookup,
        }
    }

    /// Point every node, span and page break in `body` at its zone or surface
    pub fn project(&self, body: &mut OutputNode, pages: &[PageFacsimile]) {
        let mut zones: HashMap<&SourceRef, &str> = HashMap::new();
        let mut surfaces: HashMap<u32, &str> = HashMap::new();
        for page in pages {
            zones.extend(page.zones.iter().map(|(k, v)| (k, v.as_str())));
            surfaces.insert(page.surface.page_number, page.surface.id.as_str());
        }
        let attached = attach(body, &zones, &surfaces);
        log::debug!("🗺️  {attached} facsimile references attached across {} surfaces", pages.len());
    }

    fn zone(&self, id: String, kind: ZoneKind, coords: &Coordinates) -> Zone {
        Zone {
            id,
            kind,
            bbox: coords.bbox,
            polygon: coords.polygon.clone().filter(|_| self.config.use_polygons),
            baseline: coords
                .baseline
                .clone()
                .filter(|_| self.config.include_baselines && kind == ZoneKind::TextLine),
        }
    }
}

fn source(page: &SourcePage, id: &str) -> SourceRef {
    SourceRef {
        page: page.page_number,
        id: id.to_string(),
    }
}

fn fill(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

fn reference(id: &str) -> String {
    format!("#{id}")
}

fn attach(node: &mut OutputNode, zones: &HashMap<&SourceRef, &str>, surfaces: &HashMap<u32, &str>) -> usize {
    let mut attached = 0;
    if let Some(zone) = node.source.as_ref().and_then(|s| zones.get(s)) {
        node.facs = Some(reference(zone));
        attached += 1;
    }
    for child in &mut node.children {
        match child {
            Child::Text(span) => {
                if let Some(zone) = span.source.as_ref().and_then(|s| zones.get(s)) {
                    span.facs = Some(reference(zone));
                    attached += 1;
                }
            }
            Child::Node(inner) => attached += attach(inner, zones, surfaces),
            Child::PageBoundary(boundary) => {
                if let Some(surface) = surfaces.get(&boundary.page_number) {
                    boundary.facs_reference = Some(reference(surface));
                }
            }
        }
    }
    attached
}
