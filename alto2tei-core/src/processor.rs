use crate::config::ConversionConfig;
use crate::convert::{convert_page, ContinuationPolicy, CrossPageMerger, LowercaseContinuation, PageOptions};
use crate::error::PolicyNote;
use crate::facsimile::{FacsimileProjector, PageFacsimile};
use crate::rules::{validate_config, RuleTable, ValidationReport};
use crate::sources::PageSource;
use crate::tei::TeiSerializer;
use crate::types::*;
use anyhow::{Context, Result};
use serde::Serialize;
use std::time::{Duration, Instant};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Simple profiler that collects timings for pipeline steps
pub struct StepProfiler {
    enabled: bool,
    timings: Vec<(String, Duration)>,
}

impl StepProfiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timings: Vec::new(),
        }
    }

    pub fn time_step<F, R>(&mut self, step_name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if !self.enabled {
            return f();
        }

        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        self.timings.push((step_name.to_string(), elapsed));
        println!("⏱️  {}: {:.0}ms", step_name, elapsed.as_millis());

        result
    }

    pub fn print_summary(&self) {
        if !self.enabled || self.timings.is_empty() {
            return;
        }

        println!("\n📊 Performance Summary:");
        let total: Duration = self.timings.iter().map(|(_, d)| *d).sum();

        for (step, duration) in &self.timings {
            let percentage = if total.is_zero() {
                0.0
            } else {
                (duration.as_secs_f64() / total.as_secs_f64()) * 100.0
            };
            println!(
                "   {:.<35} {:.0}ms ({:.1}%)",
                step,
                duration.as_millis(),
                percentage
            );
        }
        println!("   {:.<35} {:.0}ms", "Total", total.as_millis());
    }
}

/// A page that could not be loaded; the rest of the book is unaffected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageFailure {
    pub page_number: u32,
    pub message: String,
}

/// Everything a run decided on its own, for reporting
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionReport {
    pub pages_total: usize,
    pub pages_converted: usize,
    pub merges: usize,
    pub failures: Vec<PageFailure>,
    pub notes: Vec<PolicyNote>,
}

impl ConversionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn ambiguities(&self) -> usize {
        self.notes
            .iter()
            .filter(|n| matches!(n, PolicyNote::CrossPageAmbiguity { .. }))
            .count()
    }

    pub fn log(&self) {
        log::info!(
            "📖 {}/{} pages converted, {} cross-page merges, {} policy notes",
            self.pages_converted,
            self.pages_total,
            self.merges,
            self.notes.len()
        );
        for failure in &self.failures {
            log::warn!("❌ Page {}: {}", failure.page_number, failure.message);
        }
    }
}

/// Rule-driven ALTO → TEI conversion for single pages and whole books
pub struct DocumentProcessor {
    config: ConversionConfig,
    rules: RuleTable,
    policy: Box<dyn ContinuationPolicy>,
    validation: ValidationReport,
}

impl DocumentProcessor {
    /// Build the rule table once; configuration warnings are logged, a
    /// broken footnote pattern is an error.
    pub fn new(config: ConversionConfig) -> Result<Self> {
        let validation = validate_config(&config);
        validation.log();
        let rules = RuleTable::from_config(&config).context("Failed to build rule table")?;
        let policy = Box::new(LowercaseContinuation::from_config(&config.merge));
        Ok(Self {
            config,
            rules,
            policy,
            validation,
        })
    }

    /// Replace the default lowercase continuation heuristic
    pub fn with_policy(mut self, policy: Box<dyn ContinuationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn validation(&self) -> &ValidationReport {
        &self.validation
    }

    /// State machine output for one page, no merging or facsimile
    pub fn convert_page(&self, page: &SourcePage) -> PageTree {
        convert_page(&self.rules, page, &PageOptions::default())
    }

    /// One page as a standalone document, opened by its own page break
    pub fn convert_document(&self, page: &SourcePage) -> (ConvertedDocument, ConversionReport) {
        let mut tree = self.convert_page(page);
        tree.root.children.insert(0, Child::PageBoundary(tree.boundary()));

        let projector = FacsimileProjector::new(&self.config.facsimile);
        let mut surfaces = Vec::new();
        if projector.enabled() {
            let facsimile = projector.page_facsimile(page);
            projector.project(&mut tree.root, std::slice::from_ref(&facsimile));
            surfaces.push(facsimile.surface);
        }

        let report = ConversionReport {
            pages_total: 1,
            pages_converted: 1,
            merges: 0,
            failures: Vec::new(),
            notes: tree.notes,
        };
        let document = ConvertedDocument {
            body: tree.root,
            surfaces,
            pages: vec![tree.summary],
        };
        (document, report)
    }

    /// Convert every page of `source` and stitch them into one body.
    ///
    /// Pages are independent until the merge step, so with the `parallel`
    /// feature they are loaded and converted on the rayon pool; merging and
    /// facsimile projection run in page order afterwards.
    pub fn convert_book(
        &self,
        source: &dyn PageSource,
        profiler: &mut StepProfiler,
    ) -> Result<(ConvertedDocument, ConversionReport)> {
        let total = source.page_count();
        if total == 0 {
            anyhow::bail!("No pages found in {}", source.name());
        }
        log::info!("📚 Converting {} pages from {}", total, source.name());

        let options = PageOptions::skipping(&self.config.merge.skip_blocks);
        let projector = FacsimileProjector::new(&self.config.facsimile);

        let results = profiler.time_step("Page Conversion", || {
            self.convert_pages(source, total, &options, &projector)
        });

        let mut report = ConversionReport {
            pages_total: total,
            ..ConversionReport::default()
        };
        let book = &self.config.tei_structure.elements.book;
        let book_root = OutputNode::new("book", book.element.clone(), NodeKind::Root)
            .with_attributes(book.attributes.clone());
        let mut merger = CrossPageMerger::new(self.policy.as_ref(), self.rules.join().clone(), book_root);
        let mut facsimiles = Vec::new();

        profiler.time_step("Cross-Page Merge", || {
            for (index, result) in results.into_iter().enumerate() {
                match result {
                    Ok((tree, facsimile)) => {
                        report.pages_converted += 1;
                        merger.push_page(tree);
                        facsimiles.extend(facsimile);
                    }
                    Err(e) => {
                        let page_number = index as u32 + 1;
                        merger.push_gap(page_number);
                        report.failures.push(PageFailure {
                            page_number,
                            message: format!("{e:#}"),
                        });
                    }
                }
            }
        });

        let merged = merger.finish();
        report.merges = merged.merges;
        report.notes = merged.notes;

        let mut book_root = merged.body;
        profiler.time_step("Facsimile Projection", || {
            if projector.enabled() {
                projector.project(&mut book_root, &facsimiles);
            }
        });

        let mut body = OutputNode::new("body", "body", NodeKind::Root);
        body.push_node(book_root);
        report.log();

        Ok((
            ConvertedDocument {
                body,
                surfaces: facsimiles.into_iter().map(|f| f.surface).collect(),
                pages: merged.pages,
            },
            report,
        ))
    }

    #[cfg(feature = "parallel")]
    fn convert_pages(
        &self,
        source: &dyn PageSource,
        total: usize,
        options: &PageOptions,
        projector: &FacsimileProjector<'_>,
    ) -> Vec<Result<(PageTree, Option<PageFacsimile>)>> {
        (0..total)
            .into_par_iter()
            .map(|index| self.load_and_convert(source, index, options, projector))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn convert_pages(
        &self,
        source: &dyn PageSource,
        total: usize,
        options: &PageOptions,
        projector: &FacsimileProjector<'_>,
    ) -> Vec<Result<(PageTree, Option<PageFacsimile>)>> {
        (0..total)
            .map(|index| self.load_and_convert(source, index, options, projector))
            .collect()
    }

    fn load_and_convert(
        &self,
        source: &dyn PageSource,
        index: usize,
        options: &PageOptions,
        projector: &FacsimileProjector<'_>,
    ) -> Result<(PageTree, Option<PageFacsimile>)> {
        let page = source.load_page(index)?;
        log::info!(
            "📄 Page {}/{}: {}",
            index + 1,
            source.page_count(),
            page.source_name.as_deref().unwrap_or("(in memory)")
        );
        let tree = convert_page(&self.rules, &page, options);
        let facsimile = projector.enabled().then(|| projector.page_facsimile(&page));
        Ok((tree, facsimile))
    }

    pub fn page_title(&self, file: &str) -> String {
        self.config.tei_structure.header.page_title.replace("{file}", file)
    }

    pub fn book_title(&self, total_pages: usize) -> String {
        self.config
            .tei_structure
            .header
            .book_title
            .replace("{total_pages}", &total_pages.to_string())
    }

    pub fn render_tei(&self, document: &ConvertedDocument, title: &str) -> Result<String> {
        let serializer = TeiSerializer::new(&self.config.tei_structure, self.rules.join());
        serializer.render(document, title).context("Failed to write TEI")
    }

    pub fn render_json(&self, document: &ConvertedDocument) -> Result<String> {
        serde_json::to_string_pretty(document).context("Failed to serialize document")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::MergeDecision;
    use crate::sources::InMemorySource;

    fn line(id: &str, text: &str) -> SourceLine {
        SourceLine::new(id, None, text)
    }

    fn page(lines: &[(&str, &str)]) -> SourcePage {
        let lines = lines.iter().map(|(id, text)| line(id, text)).collect();
        SourcePage::new(1, vec![SourceBlock::new("b0", Some("MainZone"), lines)])
    }

    #[test]
    fn single_page_document_starts_with_page_break() {
        let processor = DocumentProcessor::new(ConversionConfig::default()).unwrap();
        let (document, report) = processor.convert_document(&page(&[("l1", "Hello")]));
        assert!(matches!(document.body.children[0], Child::PageBoundary(_)));
        assert_eq!(document.surfaces.len(), 1);
        assert_eq!(report.pages_converted, 1);
    }

    #[test]
    fn book_merges_across_pages() {
        let processor = DocumentProcessor::new(ConversionConfig::default()).unwrap();
        let source = InMemorySource::new(
            "test",
            vec![page(&[("a", "It was a wonder-")]), page(&[("b", "ful day.")])],
        );
        let (document, report) = processor
            .convert_book(&source, &mut StepProfiler::new(false))
            .unwrap();
        assert_eq!(report.merges, 1);
        assert_eq!(report.pages_converted, 2);
        let book = document.body.child_nodes().next().unwrap();
        assert_eq!(book.attributes.get("type"), Some("book"));
        assert_eq!(book.child_nodes().count(), 1);
        assert_eq!(document.pages.len(), 2);
    }

    #[test]
    fn catchword_does_not_end_a_continuing_paragraph() {
        let processor = DocumentProcessor::new(ConversionConfig::default()).unwrap();
        let first = SourcePage::new(
            1,
            vec![SourceBlock::new(
                "b0",
                Some("MainZone"),
                vec![
                    line("a", "the end of the"),
                    SourceLine::new("c", Some("CustomLine:catchword"), "story"),
                ],
            )],
        );
        let source = InMemorySource::new("test", vec![first, page(&[("b", "story goes on.")])]);
        let (document, report) = processor
            .convert_book(&source, &mut StepProfiler::new(false))
            .unwrap();
        assert_eq!(report.merges, 1);
        let book = document.body.child_nodes().next().unwrap();
        let names: Vec<&str> = book.child_nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["p", "fw"]);
    }

    #[test]
    fn custom_policy_replaces_default() {
        let never = |_: &OutputNode, _: &OutputNode| MergeDecision::Separate;
        let processor = DocumentProcessor::new(ConversionConfig::default())
            .unwrap()
            .with_policy(Box::new(never));
        let source = InMemorySource::new(
            "test",
            vec![page(&[("a", "It was a wonder-")]), page(&[("b", "ful day.")])],
        );
        let (document, report) = processor
            .convert_book(&source, &mut StepProfiler::new(false))
            .unwrap();
        assert_eq!(report.merges, 0);
        assert_eq!(document.body.child_nodes().next().unwrap().child_nodes().count(), 2);
    }

    #[test]
    fn empty_source_is_an_error() {
        let processor = DocumentProcessor::new(ConversionConfig::default()).unwrap();
        let source = InMemorySource::new("empty", vec![]);
        assert!(processor
            .convert_book(&source, &mut StepProfiler::new(false))
            .is_err());
    }

    #[test]
    fn titles_fill_templates() {
        let processor = DocumentProcessor::new(ConversionConfig::default()).unwrap();
        assert_eq!(processor.page_title("p1.jpg"), "Digital text from p1.jpg");
        assert_eq!(processor.book_title(12), "Book converted from ALTO (pages 1-12)");
    }
}
