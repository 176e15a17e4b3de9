use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use pretty_assertions::assert_eq;

use planscan::core::page_classifier::{ClassifierConfig, PageClassifier};
use planscan::devis::{SpecDocument, SpecParser};
use planscan::export::{read_json, Exporter, JsonExporter, MarkdownExporter};
use planscan::index::{
    build_index, search, EntryKind, IndexConfig, IndexEntry, RagIndex, SearchFilters,
};
use planscan::parser::{BlockContext, PageSpanSource, PdfReader, SpanFile};
use planscan::pipeline::{build_registry, parse_spec_document, run_pipeline, PipelineConfig};
use planscan::rooms::{BBoxFixer, FixerConfig};
use planscan::{BBox, PageSpans, RoomRegistry, ScaleFactor, Settings, SourceError, TextSpan};

fn temp_output_dir(prefix: &str) -> PathBuf {
    let mut out = std::env::temp_dir();
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis();
    let pid = std::process::id();
    out.push(format!("{prefix}-{pid}-{now}"));
    out
}

fn span(text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> TextSpan {
    TextSpan::new(text, BBox::new(x0, y0, x1, y1), 8.0)
}

/// Two plan pages of block A, one of block B given from outside.
fn plan_spans() -> SpanFile {
    SpanFile::new(vec![
        PageSpans::new(
            12,
            vec![
                span("NIVEAU 1", 40.0, 20.0, 120.0, 35.0),
                span("CLASSE", 100.0, 180.0, 160.0, 195.0),
                span("101", 110.0, 200.0, 135.0, 215.0),
                span("CORRIDOR", 300.0, 180.0, 380.0, 195.0),
                span("102", 320.0, 200.0, 345.0, 215.0),
                span("S.D.B.", 500.0, 180.0, 540.0, 195.0),
                span("102.1", 505.0, 200.0, 535.0, 215.0),
            ],
        )
        .with_size(1224.0, 792.0)
        .with_block("A"),
        PageSpans::new(
            13,
            vec![
                span("CLASSE", 100.0, 180.0, 160.0, 195.0),
                span("101", 110.0, 200.0, 135.0, 215.0),
            ],
        )
        .with_size(1224.0, 792.0)
        .with_block("A"),
        PageSpans::new(
            14,
            vec![
                span("GYMNASE", 600.0, 380.0, 680.0, 395.0),
                span("201", 620.0, 400.0, 645.0, 415.0),
                span("204", 900.0, 400.0, 925.0, 415.0),
            ],
        )
        .with_size(1224.0, 792.0),
    ])
}

#[test]
fn test_registry_from_span_file() -> Result<()> {
    let out = temp_output_dir("planscan-registry");
    fs::create_dir_all(&out)?;

    let spans_path = out.join("spans.json");
    fs::write(&spans_path, serde_json::to_string(&plan_spans())?)?;
    let file = SpanFile::load(&spans_path)?;
    let source = BlockContext::new(&file, BTreeMap::from([(14, "B".to_string())]));

    let settings = Settings::default();
    let scale = ScaleFactor::from_dpi(144);
    let (run, registry) = build_registry(&source, &source.page_numbers(), &settings, scale)?;

    assert_eq!(run.report.attempted, 3);
    assert_eq!(run.report.succeeded, 3);
    assert!(run.report.skipped_tokens.is_empty());

    let ids: Vec<&str> = registry.rooms.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["A-101", "A-102", "A-102-1", "B-201", "B-204"]);

    let classe = registry.get("A-101").unwrap();
    assert_eq!(classe.source_pages, vec![12, 13]);
    assert_eq!(classe.name, "CLASSE");
    assert!(!classe.needs_review);

    let bathroom = registry.get("A-102-1").unwrap();
    assert_eq!(bathroom.name, "S.D.B.");
    assert_eq!(bathroom.floor, Some(1));

    // Unpaired single-page label: 1.0 x 0.6, above the review threshold.
    let unpaired = registry.get("B-204").unwrap();
    assert_eq!(unpaired.confidence, 0.6);
    assert!(!unpaired.needs_review);

    for room in &registry.rooms {
        for bbox in room.bboxes.values() {
            assert!(bbox.is_well_formed(), "{} has malformed bbox", room.id);
            assert!(bbox.x0 >= 0.0 && bbox.y0 >= 0.0);
        }
    }
    assert_eq!(registry.bbox_fix.as_ref().map(|f| f.updated), Some(5));

    JsonExporter::new(out.clone(), "rooms.json").export(&registry)?;
    MarkdownExporter::new(out.clone()).export(&registry)?;
    let back: RoomRegistry = read_json(&out.join("rooms.json"))?;
    assert_eq!(back.rooms, registry.rooms);
    assert!(fs::read_to_string(out.join("rooms.md"))?.contains("| B-201 | GYMNASE |"));

    let index = build_index(&back, None, None);
    JsonExporter::new(out.clone(), "index.json").export(&index)?;
    let index: RagIndex = read_json(&out.join("index.json"))?;
    let hits = search(&index, "gym", &SearchFilters::default(), &IndexConfig::default());
    match hits.first().map(|hit| &hit.entry) {
        Some(IndexEntry::Room(room)) => assert_eq!(room.id, "B-201"),
        other => panic!("unexpected hit {other:?}"),
    }

    let _ = fs::remove_dir_all(&out);
    Ok(())
}

fn devis_spans() -> SpanFile {
    let line = |text: &str, y: f32, size: f32| {
        TextSpan::new(text, BBox::new(72.0, y, 540.0, y + size), size)
    };
    SpanFile::new(vec![
        PageSpans::new(
            1,
            vec![
                line("SECTION 09 91 23", 72.0, 16.0),
                line("PEINTURE INTÉRIEURE", 92.0, 16.0),
                line("Repeindre les murs de la classe A-101 en blanc.", 120.0, 10.0),
                line("Le local 102 reçoit une peinture époxy.", 132.0, 10.0),
                line("Fabricant : Sico.", 144.0, 10.0),
            ],
        ),
        PageSpans::new(
            2,
            vec![
                line("SECTION 09 65 19", 72.0, 16.0),
                line("REVÊTEMENT DE SOL", 92.0, 16.0),
                line("Tuiles de vinyle au gymnase B-201 selon la norme ASTM F1700.", 120.0, 10.0),
            ],
        ),
    ])
}

#[test]
fn test_specification_references_enrich_the_index() -> Result<()> {
    let out = temp_output_dir("planscan-devis");
    fs::create_dir_all(&out)?;

    let plans = plan_spans();
    let source = BlockContext::new(&plans, BTreeMap::from([(14, "B".to_string())]));
    let settings = Settings::default();
    let (_, registry) =
        build_registry(&source, &source.page_numbers(), &settings, ScaleFactor::from_dpi(144))?;

    let parser = SpecParser::new(settings.devis.clone())?;
    let doc = parse_spec_document(&devis_spans(), &[], &parser, Some("devis.pdf".to_string()))?;
    JsonExporter::new(out.clone(), "devis.json").export(&doc)?;
    let doc: SpecDocument = read_json(&out.join("devis.json"))?;

    let codes: Vec<&str> = doc.csi_sections.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(codes, vec!["09 91 23", "09 65 19"]);
    // B-201 sits next to a standard designation and is left out.
    let refs: Vec<&str> = doc.local_references.iter().map(|r| r.room_ref.as_str()).collect();
    assert_eq!(refs, vec!["A-101", "102"]);

    let index = build_index(&registry, None, Some(&doc));
    let cited: Vec<&str> = index
        .entries
        .iter()
        .filter_map(|entry| match entry {
            IndexEntry::Room(room) if !room.spec_references.is_empty() => Some(room.id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(cited, vec!["A-101", "A-102"]);

    let rooms = SearchFilters {
        kind: Some(EntryKind::Room),
        ..SearchFilters::default()
    };
    let hits = search(&index, "époxy", &rooms, &IndexConfig::default());
    match hits.first().map(|hit| &hit.entry) {
        Some(IndexEntry::Room(room)) => assert_eq!(room.id, "A-102"),
        other => panic!("unexpected hit {other:?}"),
    }

    let products = SearchFilters {
        kind: Some(EntryKind::Product),
        ..SearchFilters::default()
    };
    let hits = search(&index, "sico", &products, &IndexConfig::default());
    assert_eq!(hits.len(), 1);

    let _ = fs::remove_dir_all(&out);
    Ok(())
}

#[test]
fn test_missing_block_context_is_skipped_not_fatal() -> Result<()> {
    let file = plan_spans();
    let (run, registry) = build_registry(
        &file,
        &[12, 14],
        &Settings::default(),
        ScaleFactor::default(),
    )?;
    assert_eq!(run.report.succeeded, 2);
    assert_eq!(run.report.skipped_tokens.len(), 2);
    assert!(run.report.skipped_tokens.iter().all(|t| t.page == 14));
    assert!(registry.get("B-201").is_none());
    assert!(registry.get("A-101").is_some());
    Ok(())
}

#[test]
fn test_missing_page_is_page_not_found() {
    let file = plan_spans();
    assert!(matches!(file.page_spans(99), Err(SourceError::PageNotFound(99))));
}

#[test]
fn test_bbox_fixer_scenario() {
    let fixer = BBoxFixer::new(FixerConfig::default()).unwrap();
    let spans = vec![
        span("A-101", 100.0, 200.0, 140.0, 215.0),
        span("CLASSE", 100.0, 220.0, 160.0, 235.0),
    ];
    let page = PageSpans::new(1, spans.clone());
    let bbox = fixer
        .find_room_on_page("A-101", "CLASSE", &page, ScaleFactor::new(5.0))
        .unwrap();
    assert!(bbox.x0 <= 500.0 && bbox.y0 <= 1000.0);
    assert!(bbox.x1 >= 800.0 && bbox.y1 >= 1175.0);
    assert!(bbox.x0 >= 0.0 && bbox.y0 >= 0.0);

    let again = fixer.find_room("A-101", "CLASSE", &spans, ScaleFactor::new(5.0));
    assert_eq!(again, Some(bbox));
}

#[test]
fn test_bbox_fixer_notation_variants() {
    let fixer = BBoxFixer::new(FixerConfig::default()).unwrap();
    let scale = ScaleFactor::from_dpi(200);
    for text in ["102-1", "102.1", "A-102-1", "A102.1"] {
        let spans = vec![span(text, 300.0, 300.0, 330.0, 312.0)];
        let bbox = fixer.find_room("A-102-1", "", &spans, scale);
        assert!(bbox.is_some(), "{text} should match A-102-1");
    }
    let spans = vec![span("B-102-1", 300.0, 300.0, 330.0, 312.0)];
    assert!(fixer.find_room("A-102-1", "", &spans, scale).is_none());
}

#[test]
fn test_settings_file_overrides() -> Result<()> {
    let out = temp_output_dir("planscan-settings");
    fs::create_dir_all(&out)?;
    let path = out.join("planscan.toml");
    fs::write(&path, "[merge]\nlow_confidence = 0.7\n\n[fixer]\npadding_px = 0.0\n")?;

    let settings = Settings::load(Some(&path))?;
    assert_eq!(settings.merge.low_confidence, 0.7);
    assert_eq!(settings.fixer.padding_px, 0.0);
    assert!(Settings::load(Some(&out.join("missing.toml"))).is_err());

    let _ = fs::remove_dir_all(&out);
    Ok(())
}

/// Integration test: classify a real plan set when one is available.
#[test]
fn test_classifier_on_sample_pdf() -> Result<()> {
    let pdf = PathBuf::from("test/plans.pdf");
    if !pdf.exists() {
        eprintln!("Skipping test: test/plans.pdf not found");
        return Ok(());
    }

    let page_count = PdfReader::new(pdf.clone()).page_count()?;
    assert!(page_count > 0);

    let classifier = PageClassifier::new(ClassifierConfig::default())?;
    let classification = planscan::pipeline::classify_pdf(&pdf, &classifier)?;
    assert_eq!(classification.page_count, page_count as usize);
    Ok(())
}

/// Integration test: full run over a real plan set.
#[test]
#[ignore] // needs poppler-utils and test/plans.pdf
fn test_full_pipeline_on_sample_pdf() -> Result<()> {
    let pdf = PathBuf::from("test/plans.pdf");
    if !pdf.exists() {
        eprintln!("Skipping test: test/plans.pdf not found");
        return Ok(());
    }

    let out = temp_output_dir("planscan-pipeline");
    let mut config = PipelineConfig::new(pdf, out.clone(), 100);
    config.default_block = Some("A".to_string());
    let summary = run_pipeline(&config, &Settings::default())?;

    assert!(summary.selected > 0);
    for artifact in [
        "page_types.json",
        "selection.json",
        "candidates.json",
        "rooms.json",
        "index.json",
        "rooms.md",
    ] {
        assert!(out.join(artifact).exists(), "{artifact} should exist");
    }

    let _ = fs::remove_dir_all(&out);
    Ok(())
}
