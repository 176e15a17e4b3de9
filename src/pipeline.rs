use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::core::geometry::ScaleFactor;
use crate::core::model::{
    DocumentClassification, FixSummary, PageSelection, PageType, RoomCandidate, RoomRegistry,
};
use crate::core::page_classifier::PageClassifier;
use crate::core::page_selector::select_pages;
use crate::devis::{SpecDocument, SpecParser};
use crate::export::{Exporter, JsonExporter, MarkdownExporter};
use crate::index::build_index;
use crate::parser::{
    extract_page_text, BlockContext, PageSpanSource, PdfReader, PdfTextLayer, SpanFile,
};
use crate::render::{PageImageStore, PageRenderer};
use crate::rooms::{merge_candidates, BBoxFixer, RoomDetector, RoomMatcher, SkippedToken};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub dpi: u32,
    /// Pages to keep after classification.
    pub count: usize,
    /// Pre-extracted spans used instead of the PDF text layer.
    pub spans: Option<PathBuf>,
    pub blocks: BTreeMap<u32, String>,
    pub default_block: Option<String>,
    pub render: bool,
    /// Specification PDF whose room references enrich the index.
    pub devis: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new(input: PathBuf, output: PathBuf, dpi: u32) -> Self {
        Self {
            input,
            output,
            dpi,
            count: 5,
            spans: None,
            blocks: BTreeMap::new(),
            default_block: None,
            render: false,
            devis: None,
        }
    }

    pub fn scale(&self) -> ScaleFactor {
        ScaleFactor::from_dpi(self.dpi)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailedPage {
    pub page: u32,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<FailedPage>,
    pub skipped_tokens: Vec<SkippedToken>,
    pub rejected_spans: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DetectionRun {
    /// Pixel space, page order.
    pub candidates: Vec<RoomCandidate>,
    pub report: RunReport,
}

/// Runs detection on every requested page in parallel. A failing page is
/// recorded and skipped; the run only fails when no page succeeded.
pub fn detect_pages(
    source: &dyn PageSpanSource,
    pages: &[u32],
    detector: &RoomDetector,
    scale: ScaleFactor,
) -> Result<DetectionRun> {
    let mut results: Vec<_> = pages
        .par_iter()
        .map(|&page| (page, source.page_spans(page).map(|spans| detector.detect_page(&spans))))
        .collect();
    results.sort_by_key(|(page, _)| *page);

    let mut run = DetectionRun::default();
    run.report.attempted = results.len();
    for (page, result) in results {
        match result {
            Ok(detection) => {
                info!(
                    page,
                    candidates = detection.candidates.len(),
                    skipped = detection.skipped.len(),
                    "page detected"
                );
                run.report.succeeded += 1;
                run.report.rejected_spans += detection.rejected_spans;
                run.report.skipped_tokens.extend(detection.skipped);
                run.candidates.extend(
                    detection
                        .candidates
                        .iter()
                        .map(|candidate| candidate.scaled(scale.value())),
                );
            }
            Err(err) => {
                warn!(page, "page failed: {err}");
                run.report.failures.push(FailedPage {
                    page,
                    error: err.to_string(),
                });
            }
        }
    }

    if run.report.attempted > 0 && run.report.succeeded == 0 {
        anyhow::bail!("all {} page(s) failed detection", run.report.attempted);
    }
    Ok(run)
}

/// PLAN pages of the selection, or every selected page when none is a plan.
pub fn detection_pages(selection: &PageSelection) -> Vec<u32> {
    let plans: Vec<u32> = selection
        .selected
        .iter()
        .filter(|p| p.page_type == PageType::Plan)
        .map(|p| p.page)
        .collect();
    if plans.is_empty() {
        selection.selected.iter().map(|p| p.page).collect()
    } else {
        plans
    }
}

pub fn classify_pdf(pdf: &Path, classifier: &PageClassifier) -> Result<DocumentClassification> {
    let reader = PdfReader::new(pdf.to_path_buf());
    let page_count = reader
        .page_count()
        .with_context(|| format!("failed to read page count of {}", pdf.display()))?;
    let texts: Vec<(u32, String)> = (1..=page_count)
        .into_par_iter()
        .map(|page| (page, extract_page_text(pdf, page)))
        .collect();
    Ok(classifier.classify_document(&pdf.display().to_string(), texts))
}

/// Opens the span file when one is given, the PDF text layer otherwise.
pub fn open_span_source(pdf: &Path, spans: Option<&Path>) -> Result<Box<dyn PageSpanSource>> {
    match spans {
        Some(path) => {
            let file = SpanFile::load(path)
                .with_context(|| format!("failed to load spans from {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => {
            let layer = PdfTextLayer::open(&PdfReader::new(pdf.to_path_buf()))
                .with_context(|| format!("failed to open text layer of {}", pdf.display()))?;
            Ok(Box::new(layer))
        }
    }
}

/// Parses the given pages of a specification document, every page when
/// `pages` is empty. Unreadable pages are logged and skipped; the parse
/// only fails when no page could be read.
pub fn parse_spec_document(
    source: &dyn PageSpanSource,
    pages: &[u32],
    parser: &SpecParser,
    name: Option<String>,
) -> Result<SpecDocument> {
    let pages = if pages.is_empty() {
        source.page_numbers()
    } else {
        pages.to_vec()
    };
    let mut results: Vec<_> = pages
        .par_iter()
        .map(|&page| (page, source.page_spans(page)))
        .collect();
    results.sort_by_key(|(page, _)| *page);

    let attempted = results.len();
    let mut read = Vec::new();
    for (page, result) in results {
        match result {
            Ok(spans) => read.push(spans),
            Err(err) => warn!(page, "specification page unreadable: {err}"),
        }
    }
    if attempted > 0 && read.is_empty() {
        anyhow::bail!("all {attempted} specification page(s) unreadable");
    }
    Ok(parser.parse(name, &read))
}

/// Detect, merge and re-fit boxes over already prepared spans.
pub fn build_registry(
    source: &dyn PageSpanSource,
    pages: &[u32],
    settings: &Settings,
    scale: ScaleFactor,
) -> Result<(DetectionRun, RoomRegistry)> {
    let matcher = RoomMatcher::new(settings.matcher.clone())?;
    let detector = RoomDetector::new(matcher, settings.detector.clone());
    let run = detect_pages(source, pages, &detector, scale)?;

    let mut registry = merge_candidates(&run.candidates, &settings.merge);
    let fixer = BBoxFixer::new(settings.fixer.clone())?;
    fixer.fix_registry(&mut registry, source, scale);
    Ok((run, registry))
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub page_count: usize,
    pub selected: usize,
    pub report: RunReport,
    pub rooms: usize,
    pub fix: FixSummary,
    pub rendered: usize,
}

pub fn run_pipeline(config: &PipelineConfig, settings: &Settings) -> Result<PipelineSummary> {
    let classifier = PageClassifier::new(settings.classifier.clone())?;
    let classification = classify_pdf(&config.input, &classifier)?;
    let selection = select_pages(&classification, config.count);
    info!(strategy = %selection.strategy, "selected pages");

    let span_source = open_span_source(&config.input, config.spans.as_deref())?;
    let source = BlockContext::new(span_source.as_ref(), config.blocks.clone())
        .with_default(config.default_block.clone());

    let pages = detection_pages(&selection);
    let scale = config.scale();
    let (run, mut registry) = build_registry(&source, &pages, settings, scale)?;
    registry.source = Some(config.input.display().to_string());

    let mut rendered = 0;
    if config.render {
        let renderer = PageRenderer::new(config.output.join("pages"), config.dpi);
        let mut store = PageImageStore::new();
        store.render_all(&renderer, &config.input, &pages);
        rendered = store.len();
        registry.page_images = store.into_map();
    }

    let devis = match &config.devis {
        Some(path) => {
            let layer = PdfTextLayer::open(&PdfReader::new(path.clone()))
                .with_context(|| format!("failed to open text layer of {}", path.display()))?;
            let parser = SpecParser::new(settings.devis.clone())?;
            Some(parse_spec_document(
                &layer,
                &[],
                &parser,
                Some(path.display().to_string()),
            )?)
        }
        None => None,
    };

    let out = &config.output;
    JsonExporter::new(out.clone(), "page_types.json").export(&classification)?;
    JsonExporter::new(out.clone(), "selection.json").export(&selection)?;
    JsonExporter::new(out.clone(), "candidates.json").export(&run.candidates)?;
    JsonExporter::new(out.clone(), "rooms.json").export(&registry)?;
    if let Some(doc) = &devis {
        JsonExporter::new(out.clone(), "devis.json").export(doc)?;
    }
    JsonExporter::new(out.clone(), "index.json")
        .export(&build_index(&registry, Some(&classification), devis.as_ref()))?;
    MarkdownExporter::new(out.clone()).export(&registry)?;

    Ok(PipelineSummary {
        page_count: classification.page_count,
        selected: selection.selection_count,
        rooms: registry.rooms.len(),
        fix: registry.bbox_fix.clone().unwrap_or_default(),
        report: run.report,
        rendered,
    })
}
