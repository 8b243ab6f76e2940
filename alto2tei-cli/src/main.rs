use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use std::path::{Path, PathBuf};

use alto2tei_core::config::BUILTIN_CONFIG;
use alto2tei_core::{AltoFileSource, DocumentProcessor, PageSource, StepProfiler};

use alto2tei_cli::batch::{self, ConfigOrigin, OutputFormat};

#[derive(Parser)]
#[command(name = "alto2tei")]
#[command(about = "Convert eScriptorium ALTO XML pages and books into TEI")]
struct Args {
    /// ALTO file, or a folder of ALTO files
    input: Option<PathBuf>,

    /// Output file or folder (default: next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Suffix appended to output file names
    #[arg(long, default_value = "_tei")]
    suffix: String,

    /// Path to a custom mapping file (YAML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep line breaks as <lb/> inside paragraphs
    #[arg(long, overrides_with = "no_line_breaks")]
    preserve_line_breaks: bool,

    /// Join lines into running text
    #[arg(long, overrides_with = "preserve_line_breaks")]
    no_line_breaks: bool,

    /// Merge all pages of the folder into one document
    #[arg(long)]
    book: bool,

    /// METS file giving the page order for --book
    #[arg(long, requires = "book")]
    mets: Option<PathBuf>,

    /// Emit a <facsimile> section with surfaces and zones
    #[arg(long, overrides_with = "no_facsimile")]
    facsimile: bool,

    /// Leave out the <facsimile> section
    #[arg(long, overrides_with = "facsimile")]
    no_facsimile: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "tei")]
    format: OutputFormat,

    /// Print timings for each pipeline step
    #[arg(long)]
    profile: bool,

    /// Debug logging (RUST_LOG still takes precedence)
    #[arg(short, long)]
    verbose: bool,

    /// Print the built-in mapping and exit
    #[arg(long)]
    print_default_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .parse_default_env()
        .init();

    if args.print_default_config {
        print!("{BUILTIN_CONFIG}");
        return Ok(());
    }

    let Some(input) = args.input.clone() else {
        eprintln!("❌ No input given. Pass an ALTO file or a folder of ALTO files.");
        std::process::exit(2);
    };
    if !input.exists() {
        eprintln!("❌ Input not found: {}", input.display());
        std::process::exit(1);
    }

    println!("📜 ALTO → TEI Converter");

    let user_config = batch::user_config_path();
    let (mut config, origin) = batch::resolve_config(args.config.as_deref(), user_config.as_deref());
    match &origin {
        ConfigOrigin::Explicit(path) => println!("📋 Loaded config from: {}", path.display()),
        ConfigOrigin::UserConfigDir(path) => println!("📋 Loaded user config from: {}", path.display()),
        ConfigOrigin::BuiltIn => println!("📋 Using default config"),
    }

    // Apply CLI overrides to config
    if args.preserve_line_breaks {
        config.tei_structure.body.preserve_line_breaks = true;
    }
    if args.no_line_breaks {
        config.tei_structure.body.preserve_line_breaks = false;
    }
    if args.facsimile {
        config.facsimile.enabled = true;
    }
    if args.no_facsimile {
        config.facsimile.enabled = false;
    }

    let processor = DocumentProcessor::new(config)?;
    let mut profiler = StepProfiler::new(args.profile);

    if args.book {
        run_book(&args, &input, &processor, &mut profiler)?;
    } else {
        run_batch(&args, &input, &processor)?;
    }

    profiler.print_summary();
    Ok(())
}

fn run_batch(args: &Args, input: &Path, processor: &DocumentProcessor) -> Result<()> {
    let inputs = batch::collect_inputs(input)?;
    if inputs.is_empty() {
        println!("⚠️  No XML files found in {}", input.display());
        return Ok(());
    }

    // A single file may be written to an explicit file path
    if input.is_file() {
        if let Some(output) = args.output.as_deref().filter(|o| !o.is_dir() && o.extension().is_some()) {
            return match batch::convert_file(processor, input, output, args.format) {
                Ok(Some((page, _))) => {
                    println!("✅ Converted: {} -> {}{}", input.display(), output.display(), batch::page_status(&page));
                    Ok(())
                }
                Ok(None) => {
                    println!("⚠️  Skipping {}: not an ALTO document", input.display());
                    Ok(())
                }
                Err(e) => {
                    eprintln!("❌ Processing failed: {e:#}");
                    std::process::exit(1);
                }
            };
        }
    }

    println!("📄 Processing {} file(s)", inputs.len());
    let summary = batch::convert_batch(processor, &inputs, args.output.as_deref(), &args.suffix, args.format);
    summary.print();

    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn run_book(args: &Args, input: &Path, processor: &DocumentProcessor, profiler: &mut StepProfiler) -> Result<()> {
    if !input.is_dir() {
        eprintln!("❌ --book needs a folder of ALTO files, got: {}", input.display());
        std::process::exit(1);
    }

    let source = profiler.time_step("Page Discovery", || match &args.mets {
        Some(mets) => match AltoFileSource::from_mets(input, mets) {
            Ok(source) => {
                println!("📑 Page order from METS: {}", mets.display());
                Ok(source)
            }
            Err(e) => {
                println!("⚠️  {e:#}, using file name order");
                AltoFileSource::from_folder(input)
            }
        },
        None => AltoFileSource::from_folder(input),
    })?;
    println!("📚 Book mode: {} pages", source.page_count());

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| batch::book_output_path(input, &args.suffix, args.format));

    match batch::convert_book(processor, &source, &output, args.format, profiler)
        .with_context(|| format!("Book conversion of {} failed", input.display()))
    {
        Ok(report) => {
            println!(
                "✅ Book written: {} ({}/{} pages, {} cross-page merges)",
                output.display(),
                report.pages_converted,
                report.pages_total,
                report.merges
            );
            if report.ambiguities() > 0 {
                println!("🔎 {} ambiguous page joins left separate", report.ambiguities());
            }
            if !report.notes.is_empty() {
                println!("🔎 {} policy notes (run with --verbose for details)", report.notes.len());
            }
            for failure in &report.failures {
                eprintln!("❌ Page {}: {}", failure.page_number, failure.message);
            }
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ {e:#}");
            std::process::exit(1);
        }
    }
    Ok(())
}
