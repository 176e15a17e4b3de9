use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use planscan::core::model::{DocumentClassification, RoomCandidate, RoomRegistry};
use planscan::core::page_classifier::PageClassifier;
use planscan::core::page_selector::select_pages;
use planscan::devis::{SpecDocument, SpecParser};
use planscan::export::{read_json, Exporter, JsonExporter, MarkdownExporter};
use planscan::index::{build_index, search, EntryKind, IndexEntry, RagIndex, SearchFilters};
use planscan::parser::{BlockContext, PageSpanSource, PdfReader};
use planscan::pipeline::{
    classify_pdf, detect_pages, open_span_source, parse_spec_document, run_pipeline,
    PipelineConfig,
};
use planscan::rooms::{merge_candidates, BBoxFixer, RoomDetector, RoomMatcher};
use planscan::{ScaleFactor, Settings};

#[derive(Parser, Debug)]
#[command(name = "planscan")]
#[command(version, about = "Room label detection and registry building for architectural plan PDFs", long_about = None)]
struct Cli {
    /// TOML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Warnings only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct SpanArgs {
    /// Pre-extracted spans (JSON) used instead of the PDF text layer
    #[arg(long)]
    spans: Option<PathBuf>,

    /// Block letter for a page, as PAGE=LETTER (repeatable)
    #[arg(long = "block", value_parser = parse_block)]
    blocks: Vec<(u32, String)>,

    /// Block letter for pages without one
    #[arg(long)]
    default_block: Option<String>,

    /// Rendering DPI the pixel coordinates refer to
    #[arg(long, default_value_t = 200)]
    dpi: u32,
}

impl SpanArgs {
    fn block_map(&self) -> BTreeMap<u32, String> {
        self.blocks.iter().cloned().collect()
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show information about a PDF file
    Info {
        /// Input PDF file path
        input: PathBuf,
    },

    /// Classify every page as LEGEND, PLAN, DETAIL, ELEVATION or OTHER
    Classify {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Pick the pages worth analysing from a page_types.json
    Select {
        page_types: PathBuf,

        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Detect room labels on selected pages
    Detect {
        input: PathBuf,

        /// Pages to analyse (default: every page of the source)
        #[arg(long, value_delimiter = ',')]
        pages: Vec<u32>,

        #[command(flatten)]
        spans: SpanArgs,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge candidates.json into a room registry
    Merge {
        candidates: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Recompute room boxes from the text layer
    FixBboxes {
        registry: PathBuf,

        input: PathBuf,

        #[command(flatten)]
        spans: SpanArgs,
    },

    /// Build the retrieval index from a registry
    Index {
        registry: PathBuf,

        #[arg(long)]
        page_types: Option<PathBuf>,

        /// Parsed specification (devis.json) whose room references are attached
        #[arg(long)]
        devis: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse a specification PDF: sections, MasterFormat codes, room references, products
    Devis {
        input: PathBuf,

        /// Pre-extracted spans (JSON) used instead of the PDF text layer
        #[arg(long)]
        spans: Option<PathBuf>,

        /// Page range such as 1-10 or 5 (default: every page)
        #[arg(long, value_parser = parse_page_range)]
        pages: Option<(u32, u32)>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Search an index.json
    Query {
        index: PathBuf,

        #[arg(required = true)]
        query: Vec<String>,

        #[arg(long, value_enum)]
        kind: Option<Kind>,

        #[arg(long)]
        page: Option<u32>,

        #[arg(long, default_value_t = 0.0)]
        min_confidence: f32,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Full pipeline: classify, select, detect, merge, fix, export
    Run {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,

        /// Also render the analysed pages to PNG
        #[arg(long)]
        render: bool,

        /// Specification PDF to index alongside the plans
        #[arg(long)]
        devis: Option<PathBuf>,

        #[command(flatten)]
        spans: SpanArgs,
    },

    /// Run the full pipeline over several PDF files
    Batch {
        inputs: Vec<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,

        #[arg(long, default_value_t = 200)]
        dpi: u32,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum Kind {
    Room,
    Page,
    Section,
    Product,
}

fn parse_page_range(value: &str) -> Result<(u32, u32), String> {
    let page = |text: &str| {
        text.trim()
            .parse::<u32>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| format!("invalid page number '{text}'"))
    };
    let (first, last) = match value.split_once('-') {
        Some((first, last)) => (page(first)?, page(last)?),
        None => {
            let single = page(value)?;
            (single, single)
        }
    };
    if first > last {
        return Err(format!("range '{value}' ends before it starts"));
    }
    Ok((first, last))
}

fn parse_block(value: &str) -> Result<(u32, String), String> {
    let (page, block) = value
        .split_once('=')
        .ok_or_else(|| format!("expected PAGE=LETTER, got '{value}'"))?;
    let page = page
        .trim()
        .parse()
        .map_err(|_| format!("invalid page number '{page}'"))?;
    let block = block.trim().to_uppercase();
    if block.is_empty() {
        return Err(format!("empty block letter in '{value}'"));
    }
    Ok((page, block))
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { input } => show_info(input),
        Commands::Classify { input, output } => classify(&input, output, &settings),
        Commands::Select {
            page_types,
            count,
            output,
        } => select(&page_types, count, output),
        Commands::Detect {
            input,
            pages,
            spans,
            output,
        } => detect(&input, pages, &spans, output, &settings),
        Commands::Merge { candidates, output } => merge(&candidates, output, &settings),
        Commands::FixBboxes {
            registry,
            input,
            spans,
        } => fix_bboxes(&registry, &input, &spans, &settings),
        Commands::Index {
            registry,
            page_types,
            devis,
            output,
        } => index(&registry, page_types.as_deref(), devis.as_deref(), output),
        Commands::Devis {
            input,
            spans,
            pages,
            output,
        } => devis(&input, spans.as_deref(), pages, output, &settings),
        Commands::Query {
            index,
            query,
            kind,
            page,
            min_confidence,
            limit,
        } => {
            let filters = SearchFilters {
                kind: kind.map(|k| match k {
                    Kind::Room => EntryKind::Room,
                    Kind::Page => EntryKind::Page,
                    Kind::Section => EntryKind::Section,
                    Kind::Product => EntryKind::Product,
                }),
                page,
                min_confidence,
                limit,
            };
            run_query(&index, &query.join(" "), &filters, &settings)
        }
        Commands::Run {
            input,
            output,
            count,
            render,
            devis,
            spans,
        } => {
            let output = output.unwrap_or_else(|| default_output(&input));
            let mut config = PipelineConfig::new(input, output, spans.dpi);
            config.count = count;
            config.render = render;
            config.devis = devis;
            config.spans = spans.spans.clone();
            config.blocks = spans.block_map();
            config.default_block = spans.default_block.clone();
            run_single(&config, &settings, false)
        }
        Commands::Batch {
            inputs,
            output,
            count,
            dpi,
        } => run_batch(inputs, output, count, dpi, &settings),
    }
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "planscan".to_string());
    PathBuf::from(format!("{stem}_output"))
}

fn ensure_file(input: &Path) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }
    if !input.is_file() {
        anyhow::bail!("Input is not a file: {}", input.display());
    }
    Ok(())
}

fn show_info(input: PathBuf) -> Result<()> {
    ensure_file(&input)?;
    let reader = PdfReader::new(input.clone());
    let page_count = reader
        .page_count()
        .with_context(|| format!("Failed to open PDF: {}", input.display()))?;

    println!("PDF Information");
    println!("===============");
    println!("File: {}", input.display());
    println!("Pages: {}", page_count);
    Ok(())
}

fn classify(input: &Path, output: Option<PathBuf>, settings: &Settings) -> Result<()> {
    ensure_file(input)?;
    let output = output.unwrap_or_else(|| default_output(input));
    println!("[*] Classifying: {}", input.display());

    let classifier = PageClassifier::new(settings.classifier.clone())?;
    let classification = classify_pdf(input, &classifier)?;
    for (page_type, count) in &classification.summary {
        println!("    {page_type}: {count}");
    }

    JsonExporter::new(output.clone(), "page_types.json").export(&classification)?;
    println!(
        "[✓] {} pages -> {}",
        classification.page_count,
        output.join("page_types.json").display()
    );
    Ok(())
}

fn select(page_types: &Path, count: usize, output: Option<PathBuf>) -> Result<()> {
    let classification: DocumentClassification = read_json(page_types)?;
    let selection = select_pages(&classification, count);
    println!("[*] Strategy: {}", selection.strategy);

    let output = output.unwrap_or_else(|| parent_dir(page_types));
    JsonExporter::new(output.clone(), "selection.json").export(&selection)?;
    println!(
        "[✓] Selected {} pages -> {}",
        selection.selection_count,
        output.join("selection.json").display()
    );
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn detect(
    input: &Path,
    pages: Vec<u32>,
    spans: &SpanArgs,
    output: Option<PathBuf>,
    settings: &Settings,
) -> Result<()> {
    let output = output.unwrap_or_else(|| default_output(input));
    let span_source = open_span_source(input, spans.spans.as_deref())?;
    let source = BlockContext::new(span_source.as_ref(), spans.block_map())
        .with_default(spans.default_block.clone());
    let pages = if pages.is_empty() {
        source.page_numbers()
    } else {
        pages
    };

    println!("[*] Detecting rooms on {} page(s)", pages.len());
    let detector = RoomDetector::new(
        RoomMatcher::new(settings.matcher.clone())?,
        settings.detector.clone(),
    );
    let run = detect_pages(&source, &pages, &detector, ScaleFactor::from_dpi(spans.dpi))?;

    for failure in &run.report.failures {
        eprintln!("  [✗] page {}: {}", failure.page, failure.error);
    }
    if !run.report.skipped_tokens.is_empty() {
        eprintln!(
            "  [!] {} room number(s) skipped for lack of block context",
            run.report.skipped_tokens.len()
        );
    }

    JsonExporter::new(output.clone(), "candidates.json").export(&run.candidates)?;
    println!(
        "[*] Summary: {} succeeded, {} failed",
        run.report.succeeded,
        run.report.failures.len()
    );
    println!(
        "[✓] {} candidates -> {}",
        run.candidates.len(),
        output.join("candidates.json").display()
    );
    Ok(())
}

fn merge(candidates_path: &Path, output: Option<PathBuf>, settings: &Settings) -> Result<()> {
    let candidates: Vec<RoomCandidate> = read_json(candidates_path)?;
    let registry = merge_candidates(&candidates, &settings.merge);
    let output = output.unwrap_or_else(|| parent_dir(candidates_path));

    JsonExporter::new(output.clone(), "rooms.json").export(&registry)?;
    MarkdownExporter::new(output.clone()).export(&registry)?;
    println!(
        "[✓] {} rooms ({} to review) -> {}",
        registry.rooms.len(),
        registry.quality.rooms_needing_review,
        output.join("rooms.json").display()
    );
    Ok(())
}

fn fix_bboxes(registry_path: &Path, input: &Path, spans: &SpanArgs, settings: &Settings) -> Result<()> {
    let mut registry: RoomRegistry = read_json(registry_path)?;
    let span_source = open_span_source(input, spans.spans.as_deref())?;
    let source = BlockContext::new(span_source.as_ref(), spans.block_map());

    let fixer = BBoxFixer::new(settings.fixer.clone())?;
    let summary = fixer.fix_registry(&mut registry, &source, ScaleFactor::from_dpi(spans.dpi));
    for id in &summary.not_found {
        eprintln!("  [!] not found: {id}");
    }

    let output = parent_dir(registry_path);
    let file_name = registry_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rooms.json".to_string());
    JsonExporter::new(output, file_name).export(&registry)?;
    println!(
        "[*] Summary: {} succeeded, {} failed",
        summary.updated,
        summary.not_found.len()
    );
    Ok(())
}

fn devis(
    input: &Path,
    spans: Option<&Path>,
    pages: Option<(u32, u32)>,
    output: Option<PathBuf>,
    settings: &Settings,
) -> Result<()> {
    let output = output.unwrap_or_else(|| default_output(input));
    let source = open_span_source(input, spans)?;
    let pages: Vec<u32> = pages.map_or_else(Vec::new, |(first, last)| (first..=last).collect());
    println!("[*] Parsing specification: {}", input.display());

    let parser = SpecParser::new(settings.devis.clone())?;
    let doc = parse_spec_document(
        source.as_ref(),
        &pages,
        &parser,
        Some(input.display().to_string()),
    )?;

    JsonExporter::new(output.clone(), "devis.json").export(&doc)?;
    println!(
        "[*] {} section(s), {} MasterFormat code(s), {} room reference(s), {} product(s)",
        doc.sections.len(),
        doc.csi_sections.len(),
        doc.local_references.len(),
        doc.products.len()
    );
    println!("[✓] {} pages -> {}", doc.stats.total_pages, output.join("devis.json").display());
    Ok(())
}

fn index(
    registry: &Path,
    page_types: Option<&Path>,
    devis: Option<&Path>,
    output: Option<PathBuf>,
) -> Result<()> {
    let registry_data: RoomRegistry = read_json(registry)?;
    let classification: Option<DocumentClassification> =
        page_types.map(read_json::<DocumentClassification>).transpose()?;
    let devis: Option<SpecDocument> = devis.map(read_json::<SpecDocument>).transpose()?;
    let index = build_index(&registry_data, classification.as_ref(), devis.as_ref());

    let output = output.unwrap_or_else(|| parent_dir(registry));
    JsonExporter::new(output.clone(), "index.json").export(&index)?;
    println!(
        "[✓] {} entries -> {}",
        index.entries.len(),
        output.join("index.json").display()
    );
    Ok(())
}

fn run_query(index: &Path, query: &str, filters: &SearchFilters, settings: &Settings) -> Result<()> {
    let index: RagIndex = read_json(index)?;
    let hits = search(&index, query, filters, &settings.index);
    if hits.is_empty() {
        println!("No results for '{query}'");
        return Ok(());
    }
    for hit in hits {
        match &hit.entry {
            IndexEntry::Room(room) => println!(
                "[{:>2}] {} {} (block {}, pages {:?}, confidence {:.2})",
                hit.score, room.id, room.name, room.block, room.source_pages, room.confidence
            ),
            IndexEntry::Page(page) => println!(
                "[{:>2}] page {} {} (score {})",
                hit.score, page.page, page.page_type, page.score
            ),
            IndexEntry::Section(section) => println!(
                "[{:>2}] section {} {} (devis page {})",
                hit.score, section.code, section.title, section.page
            ),
            IndexEntry::Product(product) => println!(
                "[{:>2}] {} {} (devis page {}, section {})",
                hit.score,
                product.manufacturer,
                product.model.as_deref().unwrap_or("-"),
                product.page,
                product.csi_section.as_deref().unwrap_or("-")
            ),
        }
    }
    Ok(())
}

fn run_single(config: &PipelineConfig, settings: &Settings, quiet: bool) -> Result<()> {
    ensure_file(&config.input)?;
    if !quiet {
        println!("[*] Processing: {}", config.input.display());
        println!("[*] Output: {}", config.output.display());
        println!("[*] DPI: {}", config.dpi);
    }

    let summary = run_pipeline(config, settings)
        .with_context(|| format!("Failed to process PDF: {}", config.input.display()))?;

    if !quiet {
        println!(
            "[*] Pages: {} classified, {} selected",
            summary.page_count, summary.selected
        );
        println!(
            "[*] Summary: {} succeeded, {} failed",
            summary.report.succeeded,
            summary.report.failures.len()
        );
        println!(
            "[*] Rooms: {} ({} boxes refit, {} not found)",
            summary.rooms,
            summary.fix.updated,
            summary.fix.not_found.len()
        );
        if summary.rendered > 0 {
            println!("[*] Rendered {} page image(s)", summary.rendered);
        }
        println!("\n[✓] Done! Results saved to: {}", config.output.display());
    }
    Ok(())
}

fn run_batch(
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    count: usize,
    dpi: u32,
    settings: &Settings,
) -> Result<()> {
    if inputs.is_empty() {
        anyhow::bail!("No input files specified");
    }

    let base_output = output.unwrap_or_else(|| PathBuf::from("batch_output"));

    println!("[*] Batch processing {} file(s)", inputs.len());
    println!("[*] Base output: {}\n", base_output.display());

    let mut success = 0;
    let mut failed = 0;

    for (i, input) in inputs.iter().enumerate() {
        println!("[{}/{}] Processing: {}", i + 1, inputs.len(), input.display());

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("input_{}", i + 1));
        let mut config = PipelineConfig::new(input.clone(), base_output.join(stem), dpi);
        config.count = count;

        match run_single(&config, settings, true) {
            Ok(()) => {
                println!("  [✓] Success");
                success += 1;
            }
            Err(e) => {
                eprintln!("  [✗] Failed: {e:#}");
                failed += 1;
            }
        }
    }

    println!("\n[*] Summary: {} succeeded, {} failed", success, failed);

    if failed > 0 {
        anyhow::bail!("{} file(s) failed to process", failed);
    }
    Ok(())
}
