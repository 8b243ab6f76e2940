//! Batch and book runs on the filesystem: config lookup, output naming,
//! per-file conversion and the end-of-run summary.

use alto2tei_core::processor::{ConversionReport, DocumentProcessor, StepProfiler};
use alto2tei_core::sources::{alto, is_alto_document, parse_alto, PageSource};
use alto2tei_core::{ConversionConfig, ConvertedDocument, PageSummary};
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "alto_tei_mapping.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Tei,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Tei => "xml",
            OutputFormat::Json => "json",
        }
    }
}

// ===== CONFIG LOOKUP =====

/// Where the rule table came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Explicit(PathBuf),
    UserConfigDir(PathBuf),
    BuiltIn,
}

/// `~/.config/alto2tei/alto_tei_mapping.yaml` or the platform equivalent
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("alto2tei").join(CONFIG_FILE_NAME))
}

/// `--config` first, then the user config directory, then the built-in table
pub fn resolve_config(explicit: Option<&Path>, user_path: Option<&Path>) -> (ConversionConfig, ConfigOrigin) {
    if let Some(path) = explicit {
        return (
            ConversionConfig::load_with_fallback(Some(path)),
            ConfigOrigin::Explicit(path.to_path_buf()),
        );
    }
    match user_path.filter(|p| p.is_file()) {
        Some(path) => (
            ConversionConfig::load_with_fallback(Some(path)),
            ConfigOrigin::UserConfigDir(path.to_path_buf()),
        ),
        None => (ConversionConfig::default(), ConfigOrigin::BuiltIn),
    }
}

// ===== OUTPUT NAMING =====

/// `{stem}{suffix}.{ext}` next to the input, or inside `output_dir`
pub fn output_path_for(input: &Path, output_dir: Option<&Path>, suffix: &str, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = format!("{stem}{suffix}.{}", format.extension());
    match output_dir {
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}

/// Book output defaults to `{folder}{suffix}.{ext}` beside the input folder
pub fn book_output_path(folder: &Path, suffix: &str, format: OutputFormat) -> PathBuf {
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book".to_string());
    let parent = folder.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{name}{suffix}.{}", format.extension()))
}

// ===== SUMMARY =====

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub page_numbers: Vec<(String, String)>,
    pub verse_files: Vec<(String, usize)>,
    pub footnote_files: Vec<(String, usize, Vec<String>)>,
    pub policy_notes: usize,
}

impl BatchSummary {
    pub fn record(&mut self, file: &str, page: &PageSummary, notes: usize) {
        self.successful += 1;
        self.policy_notes += notes;
        if let Some(number) = &page.printed_page_number {
            self.page_numbers.push((file.to_string(), number.clone()));
        }
        if page.verse_line_count > 0 {
            self.verse_files.push((file.to_string(), page.verse_line_count));
        }
        if page.footnote_count > 0 {
            self.footnote_files
                .push((file.to_string(), page.footnote_count, page.footnote_symbols.clone()));
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let mut parts = vec![format!("{} successful", self.successful)];
        if self.failed > 0 {
            parts.push(format!("{} failed", self.failed));
        }
        if self.skipped > 0 {
            parts.push(format!("{} skipped", self.skipped));
        }
        let mut lines = vec![format!("📊 Summary: {}", parts.join(", "))];

        if !self.page_numbers.is_empty() {
            lines.push("📄 Page numbers found:".to_string());
            for (file, number) in &self.page_numbers {
                lines.push(format!("   {file}: {number}"));
            }
        }
        if !self.verse_files.is_empty() {
            lines.push("📝 Verse detected:".to_string());
            for (file, count) in &self.verse_files {
                lines.push(format!("   {file}: {count} verse lines"));
            }
        }
        if !self.footnote_files.is_empty() {
            lines.push("📋 Footnotes detected:".to_string());
            for (file, count, symbols) in &self.footnote_files {
                let symbols = if symbols.is_empty() {
                    "no symbols detected".to_string()
                } else {
                    symbols.join(", ")
                };
                lines.push(format!("   {file}: {count} footnotes ({symbols})"));
            }
        }
        if self.page_numbers.is_empty() && self.verse_files.is_empty() && self.footnote_files.is_empty() {
            lines.push("📄 No page numbers, verse, or footnotes detected in any files".to_string());
        }
        if self.policy_notes > 0 {
            lines.push(format!("🔎 {} policy notes (run with --verbose for details)", self.policy_notes));
        }
        lines
    }

    pub fn print(&self) {
        println!();
        for line in self.lines() {
            println!("{line}");
        }
    }
}

/// Short status suffix for one converted page, e.g. " (Page: 17, Footnotes: 2)"
pub fn page_status(page: &PageSummary) -> String {
    let mut parts = Vec::new();
    if let Some(number) = &page.printed_page_number {
        parts.push(format!("Page: {number}"));
    }
    if page.verse_line_count > 0 {
        parts.push(format!("Verse: {} lines", page.verse_line_count));
    }
    if page.footnote_count > 0 {
        parts.push(format!("Footnotes: {}", page.footnote_count));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

// ===== RUNS =====

pub fn render(processor: &DocumentProcessor, document: &ConvertedDocument, title: &str, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Tei => processor.render_tei(document, title),
        OutputFormat::Json => processor.render_json(document),
    }
}

/// Convert one ALTO file into one output file. `Ok(None)` means the file
/// is not ALTO and was skipped.
pub fn convert_file(
    processor: &DocumentProcessor,
    input: &Path,
    output: &Path,
    format: OutputFormat,
) -> Result<Option<(PageSummary, usize)>> {
    let xml = fs::read_to_string(input).with_context(|| format!("Failed to read {}", input.display()))?;
    if !is_alto_document(&xml) {
        return Ok(None);
    }
    let mut page = parse_alto(&xml, 1).with_context(|| format!("Failed to parse {}", input.display()))?;
    page.source_name = input.file_name().map(|n| n.to_string_lossy().into_owned());

    let (document, report) = processor.convert_document(&page);
    let file = page
        .image
        .clone()
        .or_else(|| page.source_name.clone())
        .unwrap_or_default();
    let content = render(processor, &document, &processor.page_title(&file), format)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(output, content).with_context(|| format!("Failed to write {}", output.display()))?;

    let summary = document.pages.into_iter().next().unwrap_or_default();
    Ok(Some((summary, report.notes.len())))
}

/// Every `.xml` file in `inputs`, one output each
pub fn convert_batch(
    processor: &DocumentProcessor,
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
    suffix: &str,
    format: OutputFormat,
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for (i, input) in inputs.iter().enumerate() {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("[{}/{}] Processing: {name}", i + 1, inputs.len());

        let output = output_path_for(input, output_dir, suffix, format);
        match convert_file(processor, input, &output, format) {
            Ok(Some((page, notes))) => {
                let output_name = output
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                println!("✅ Converted: {name} -> {output_name}{}", page_status(&page));
                summary.record(&name, &page, notes);
            }
            Ok(None) => {
                println!("⚠️  Skipping {name}: not an ALTO document");
                summary.skipped += 1;
            }
            Err(e) => {
                eprintln!("❌ {name}: {e:#}");
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Inputs for a batch run: the file itself, or every `.xml` in the folder
pub fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_dir() {
        alto::xml_files(input)
    } else {
        Ok(vec![input.to_path_buf()])
    }
}

/// Merge every page of `source` into one output file
pub fn convert_book(
    processor: &DocumentProcessor,
    source: &dyn PageSource,
    output: &Path,
    format: OutputFormat,
    profiler: &mut StepProfiler,
) -> Result<ConversionReport> {
    let (document, report) = processor.convert_book(source, profiler)?;
    let title = processor.book_title(source.page_count());
    let content = profiler.time_step("Serialization", || render(processor, &document, &title, format))?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(output, content).with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn output_names_follow_suffix_and_format() {
        let input = Path::new("pages/page_001.xml");
        assert_eq!(
            output_path_for(input, None, "_tei", OutputFormat::Tei),
            PathBuf::from("pages/page_001_tei.xml")
        );
        assert_eq!(
            output_path_for(input, Some(Path::new("out")), "_x", OutputFormat::Json),
            PathBuf::from("out/page_001_x.json")
        );
        assert_eq!(
            book_output_path(Path::new("scans/book1"), "_tei", OutputFormat::Tei),
            PathBuf::from("scans/book1_tei.xml")
        );
    }

    #[test]
    fn config_lookup_prefers_explicit_then_user_dir() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join(CONFIG_FILE_NAME);

        let (_, origin) = resolve_config(None, Some(&user));
        assert_eq!(origin, ConfigOrigin::BuiltIn);

        fs::write(&user, "defaults:\n  block: MainZone\n  line: DefaultLine\n").unwrap();
        let (_, origin) = resolve_config(None, Some(&user));
        assert_eq!(origin, ConfigOrigin::UserConfigDir(user.clone()));

        let explicit = dir.path().join("other.yaml");
        let (config, origin) = resolve_config(Some(&explicit), Some(&user));
        assert_eq!(origin, ConfigOrigin::Explicit(explicit));
        assert!(!config.block_types.is_empty());
    }

    #[test]
    fn summary_lists_findings() {
        let mut summary = BatchSummary::default();
        summary.record(
            "p1.xml",
            &PageSummary {
                printed_page_number: Some("17".to_string()),
                verse_line_count: 4,
                footnote_count: 2,
                footnote_symbols: vec!["(1)".to_string(), "*".to_string()],
                ..PageSummary::default()
            },
            1,
        );
        summary.skipped = 1;
        assert_eq!(
            summary.lines(),
            vec![
                "📊 Summary: 1 successful, 1 skipped",
                "📄 Page numbers found:",
                "   p1.xml: 17",
                "📝 Verse detected:",
                "   p1.xml: 4 verse lines",
                "📋 Footnotes detected:",
                "   p1.xml: 2 footnotes ((1), *)",
                "🔎 1 policy notes (run with --verbose for details)",
            ]
        );
    }

    #[test]
    fn empty_summary_says_so() {
        let summary = BatchSummary::default();
        assert_eq!(
            summary.lines()[1],
            "📄 No page numbers, verse, or footnotes detected in any files"
        );
    }

    #[test]
    fn page_status_is_compact() {
        let page = PageSummary {
            printed_page_number: Some("3".to_string()),
            footnote_count: 1,
            ..PageSummary::default()
        };
        assert_eq!(page_status(&page), " (Page: 3, Footnotes: 1)");
        assert_eq!(page_status(&PageSummary::default()), "");
    }
}
