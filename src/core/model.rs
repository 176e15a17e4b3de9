use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::geometry::BBox;

/// One run of text from a page's text layer, in text-layer point units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub bbox: BBox,
    #[serde(default, alias = "size")]
    pub font_size: f32,
}

impl TextSpan {
    pub fn new(text: impl Into<String>, bbox: BBox, font_size: f32) -> Self {
        Self {
            text: text.into(),
            bbox,
            font_size,
        }
    }
}

/// All spans of a single page plus whatever page metadata the source knows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSpans {
    pub page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
    #[serde(default)]
    pub spans: Vec<TextSpan>,
}

impl PageSpans {
    pub fn new(page: u32, spans: Vec<TextSpan>) -> Self {
        Self {
            page,
            spans,
            ..Self::default()
        }
    }

    pub fn with_block(mut self, block: impl Into<String>) -> Self {
        self.block = Some(block.into());
        self
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Page rectangle anchored at the origin. Falls back to
    /// [`spans_extent`] when the source did not report page dimensions.
    pub fn extent(&self) -> BBox {
        if let (Some(width), Some(height)) = (self.width, self.height) {
            if width > 0.0 && height > 0.0 {
                return BBox::new(0.0, 0.0, width, height);
            }
        }
        spans_extent(&self.spans)
    }
}

/// US Letter in points, the smallest sheet a plan is printed on.
pub const MIN_PAGE_WIDTH: f32 = 612.0;
pub const MIN_PAGE_HEIGHT: f32 = 792.0;

/// Origin-anchored rectangle covering every well-formed span, never
/// smaller than a letter sheet.
pub fn spans_extent(spans: &[TextSpan]) -> BBox {
    let (max_x, max_y) = spans
        .iter()
        .filter(|span| span.bbox.is_well_formed())
        .fold((MIN_PAGE_WIDTH, MIN_PAGE_HEIGHT), |(x, y), span| {
            (x.max(span.bbox.x1), y.max(span.bbox.y1))
        });
    BBox::new(0.0, 0.0, max_x, max_y)
}

/// A room label found on one page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomCandidate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub bbox: BBox,
    pub confidence: f32,
    pub source_page: u32,
    pub number_bbox: BBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_bbox: Option<BBox>,
}

impl RoomCandidate {
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            bbox: self.bbox.scale(factor).clamp_non_negative(),
            number_bbox: self.number_bbox.scale(factor),
            name_bbox: self.name_bbox.map(|b| b.scale(factor)),
            ..self.clone()
        }
    }
}

/// Canonical room after merging candidates from every page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub block: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<u32>,
    pub confidence: f32,
    pub source_pages: Vec<u32>,
    pub primary_source: u32,
    #[serde(default)]
    pub bboxes: BTreeMap<u32, BBox>,
    #[serde(default)]
    pub needs_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox_method: Option<String>,
}

impl Room {
    pub fn primary_bbox(&self) -> Option<BBox> {
        self.bboxes.get(&self.primary_source).copied()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QualityMeta {
    pub average_confidence: f32,
    pub rooms_high_confidence: usize,
    pub rooms_medium_confidence: usize,
    pub rooms_low_confidence: usize,
    pub rooms_needing_review: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FixSummary {
    pub updated: usize,
    pub not_found: Vec<String>,
}

/// The durable artifact consumed by rendering and indexing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomRegistry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub quality: QualityMeta,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub page_images: BTreeMap<u32, PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox_fix: Option<FixSummary>,
}

impl RoomRegistry {
    pub fn get(&self, id: &str) -> Option<&Room> {
        self.rooms.iter().find(|room| room.id == id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum PageType {
    Legend,
    Plan,
    Detail,
    Elevation,
    Other,
}

impl PageType {
    pub const SCORED: [PageType; 4] = [
        PageType::Legend,
        PageType::Plan,
        PageType::Detail,
        PageType::Elevation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Legend => "LEGEND",
            PageType::Plan => "PLAN",
            PageType::Detail => "DETAIL",
            PageType::Elevation => "ELEVATION",
            PageType::Other => "OTHER",
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub struct PageScores {
    pub legend: u32,
    pub plan: u32,
    pub detail: u32,
    pub elevation: u32,
    pub other: u32,
}

impl PageScores {
    pub fn get(&self, page_type: PageType) -> u32 {
        match page_type {
            PageType::Legend => self.legend,
            PageType::Plan => self.plan,
            PageType::Detail => self.detail,
            PageType::Elevation => self.elevation,
            PageType::Other => self.other,
        }
    }

    pub fn add(&mut self, page_type: PageType, amount: u32) {
        let slot = match page_type {
            PageType::Legend => &mut self.legend,
            PageType::Plan => &mut self.plan,
            PageType::Detail => &mut self.detail,
            PageType::Elevation => &mut self.elevation,
            PageType::Other => &mut self.other,
        };
        *slot = slot.saturating_add(amount);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageClassification {
    pub page: u32,
    #[serde(rename = "type")]
    pub page_type: PageType,
    pub scores: PageScores,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentClassification {
    #[serde(default)]
    pub source_pdf: String,
    pub page_count: usize,
    pub summary: BTreeMap<PageType, usize>,
    pub pages: Vec<PageClassification>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectedPage {
    pub page: u32,
    #[serde(rename = "type")]
    pub page_type: PageType,
    pub score: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageSelection {
    #[serde(default)]
    pub source_pdf: String,
    pub selection_count: usize,
    pub requested_count: usize,
    pub strategy: String,
    pub selected: Vec<SelectedPage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extent_prefers_reported_size() {
        let page = PageSpans::new(
            1,
            vec![TextSpan::new("101", BBox::new(10.0, 10.0, 30.0, 20.0), 8.0)],
        );
        assert_eq!(page.extent(), BBox::new(0.0, 0.0, 612.0, 792.0));
        let page = page.with_size(792.0, 612.0);
        assert_eq!(page.extent(), BBox::new(0.0, 0.0, 792.0, 612.0));
    }

    #[test]
    fn unsized_extent_grows_past_the_letter_sheet() {
        let spans = vec![TextSpan::new("101", BBox::new(900.0, 10.0, 930.0, 20.0), 8.0)];
        assert_eq!(spans_extent(&spans), BBox::new(0.0, 0.0, 930.0, 792.0));
        assert_eq!(spans_extent(&[]), BBox::new(0.0, 0.0, 612.0, 792.0));
    }

    #[test]
    fn span_accepts_size_alias() {
        let span: TextSpan = serde_json::from_str(
            r#"{"text":"A-101","bbox":{"x0":1.0,"y0":2.0,"x1":3.0,"y1":4.0},"size":8.0}"#,
        )
        .unwrap();
        assert_eq!(span.font_size, 8.0);
    }

    #[test]
    fn page_type_serializes_uppercase() {
        let json = serde_json::to_string(&PageType::Elevation).unwrap();
        assert_eq!(json, "\"ELEVATION\"");
    }
}
