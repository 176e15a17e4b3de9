use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;
use tracing::{debug, info, warn};

use crate::core::error::RoomError;
use crate::core::geometry::{BBox, ScaleFactor};
use crate::core::model::{spans_extent, FixSummary, PageSpans, RoomRegistry, TextSpan};
use crate::parser::PageSpanSource;
use crate::rooms::matcher::{fold, normalize, room_number_regex};

pub const BBOX_METHOD_TEXT_LAYER: &str = "text_layer";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixerConfig {
    /// Max id-to-name distance as a fraction of the page diagonal.
    pub name_distance_fraction: f32,
    /// Added around the result after scaling, in pixels.
    pub padding_px: f32,
    /// Minimum normalized Levenshtein similarity for a name span to count
    /// as the room's name.
    pub name_similarity: f64,
}

impl Default for FixerConfig {
    fn default() -> Self {
        Self {
            name_distance_fraction: 0.15,
            padding_px: 30.0,
            name_similarity: 0.85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedNumber {
    block: Option<String>,
    number: String,
    letter: Option<String>,
    suffix: Option<String>,
}

impl ParsedNumber {
    /// Dash and dot sub-unit notation parse to the same value.
    fn same_room(&self, other: &ParsedNumber) -> bool {
        self.number == other.number
            && self.letter == other.letter
            && self.suffix == other.suffix
            && match (&self.block, &other.block) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }
}

/// Relocates a known room's label on a page and returns a tight pixel box.
#[derive(Debug, Clone)]
pub struct BBoxFixer {
    config: FixerConfig,
    number: Regex,
}

impl BBoxFixer {
    pub fn new(config: FixerConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            config,
            number: room_number_regex()?,
        })
    }

    /// Page extent is inferred from the spans themselves.
    pub fn find_room(
        &self,
        room_id: &str,
        room_name: &str,
        spans: &[TextSpan],
        scale: ScaleFactor,
    ) -> Option<BBox> {
        self.locate(room_id, room_name, spans, &spans_extent(spans))
            .map(|label| self.to_pixels(&label, scale))
            .ok()
    }

    /// Like [`find_room`](Self::find_room) but uses the page size when the
    /// source knows it, and keeps the result inside the rendered image.
    pub fn find_room_on_page(
        &self,
        room_id: &str,
        room_name: &str,
        page: &PageSpans,
        scale: ScaleFactor,
    ) -> Option<BBox> {
        self.locate_on_page(room_id, room_name, page, scale).ok()
    }

    /// Same search, telling an unusable id apart from a label that is
    /// simply absent from the page.
    pub fn locate_on_page(
        &self,
        room_id: &str,
        room_name: &str,
        page: &PageSpans,
        scale: ScaleFactor,
    ) -> Result<BBox, RoomError> {
        let label = self.locate(room_id, room_name, &page.spans, &page.extent())?;
        let bbox = self.to_pixels(&label, scale);
        Ok(match (page.width, page.height) {
            (Some(w), Some(h)) if w > 0.0 && h > 0.0 => {
                bbox.clamp_to(w * scale.value(), h * scale.value())
            }
            _ => bbox,
        })
    }

    fn to_pixels(&self, label: &BBox, scale: ScaleFactor) -> BBox {
        label
            .scale(scale.value())
            .expand(self.config.padding_px)
            .clamp_non_negative()
    }

    /// Label box in span units: the number span, merged with the name span
    /// when one sits close enough.
    fn locate(
        &self,
        room_id: &str,
        room_name: &str,
        spans: &[TextSpan],
        extent: &BBox,
    ) -> Result<BBox, RoomError> {
        let wanted = self
            .parse(room_id)
            .filter(|p| p.block.is_some())
            .ok_or_else(|| RoomError::MalformedInput(room_id.to_string()))?;

        let candidates: Vec<&TextSpan> = spans
            .iter()
            .filter(|span| span.bbox.is_well_formed())
            .filter(|span| {
                self.parse(&span.text)
                    .is_some_and(|found| wanted.same_room(&found))
            })
            .collect();
        let first = *candidates.first().ok_or(RoomError::NotFound)?;

        let name_spans = self.name_spans(spans, room_name);

        let threshold = extent.diagonal() * self.config.name_distance_fraction;
        let mut best: (&TextSpan, Option<&TextSpan>) = (first, None);
        let mut best_distance = f32::INFINITY;
        for &candidate in &candidates {
            for &name in &name_spans {
                let distance = candidate.bbox.center_distance(&name.bbox);
                if distance <= threshold && distance < best_distance {
                    best_distance = distance;
                    best = (candidate, Some(name));
                }
            }
        }

        let (number_span, name_span) = best;
        Ok(name_span.map_or(number_span.bbox, |name| number_span.bbox.union(&name.bbox)))
    }

    fn parse(&self, text: &str) -> Option<ParsedNumber> {
        let text = normalize(text).to_uppercase().replace(' ', "");
        let caps = self.number.captures(&text)?;
        Some(ParsedNumber {
            block: caps.name("block").map(|m| m.as_str().to_string()),
            number: caps.name("number")?.as_str().to_string(),
            letter: caps.name("letter").map(|m| m.as_str().to_string()),
            suffix: caps.name("suffix").map(|m| m.as_str().to_string()),
        })
    }

    /// Spans spelling the room name. Exact matches after case and accent
    /// folding win; near misses only count when the page has none.
    fn name_spans<'a>(&self, spans: &'a [TextSpan], room_name: &str) -> Vec<&'a TextSpan> {
        let wanted = fold(&normalize(room_name));
        if wanted.is_empty() {
            return Vec::new();
        }
        let folded: Vec<(&TextSpan, String)> = spans
            .iter()
            .filter(|span| span.bbox.is_well_formed())
            .map(|span| (span, fold(&normalize(&span.text))))
            .collect();

        let exact: Vec<&TextSpan> = folded
            .iter()
            .filter(|(_, text)| *text == wanted)
            .map(|(span, _)| *span)
            .collect();
        if !exact.is_empty() {
            return exact;
        }
        folded
            .iter()
            .filter(|(_, text)| normalized_levenshtein(text, &wanted) >= self.config.name_similarity)
            .map(|(span, _)| *span)
            .collect()
    }

    /// Re-locates every room of the registry on its primary source page.
    /// Pages the source cannot provide count as not found.
    pub fn fix_registry(
        &self,
        registry: &mut RoomRegistry,
        source: &dyn PageSpanSource,
        scale: ScaleFactor,
    ) -> FixSummary {
        let mut pages: HashMap<u32, Option<PageSpans>> = HashMap::new();
        let mut summary = FixSummary::default();

        for room in &mut registry.rooms {
            let page = pages.entry(room.primary_source).or_insert_with(|| {
                source
                    .page_spans(room.primary_source)
                    .map_err(|err| warn!(page = room.primary_source, "{err}"))
                    .ok()
            });
            let found = match page {
                Some(page) => self.locate_on_page(&room.id, &room.name, page, scale),
                None => Err(RoomError::NotFound),
            };

            match found {
                Ok(bbox) => {
                    room.bboxes.insert(room.primary_source, bbox);
                    room.bbox_method = Some(BBOX_METHOD_TEXT_LAYER.to_string());
                    summary.updated += 1;
                }
                Err(err) => {
                    debug!(id = %room.id, page = room.primary_source, "{err}");
                    summary.not_found.push(room.id.clone());
                }
            }
        }

        info!(
            updated = summary.updated,
            not_found = summary.not_found.len(),
            "bbox fixing finished"
        );
        registry.bbox_fix = Some(summary.clone());
        summary
    }
}
