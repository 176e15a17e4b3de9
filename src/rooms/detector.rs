use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::confidence::{
    font_is_plausible, median_font_size, score_detection, ConfidenceConfig, LabelEvidence,
};
use crate::core::model::{PageSpans, RoomCandidate, TextSpan};
use crate::rooms::matcher::{RoomMatcher, RoomNumberToken, SpanKind};
use crate::rooms::proximity::Proximity;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Pairing radius as a fraction of the page diagonal.
    pub max_distance_fraction: f32,
    /// Reward for a name below the number, as a fraction of the radius.
    pub direction_bonus_fraction: f32,
    /// Added on every side of the label box, in span units.
    pub margin: f32,
    pub confidence: ConfidenceConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_distance_fraction: 0.05,
            direction_bonus_fraction: 0.25,
            margin: 5.0,
            confidence: ConfidenceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedToken {
    pub page: u32,
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct PageDetection {
    pub page: u32,
    pub candidates: Vec<RoomCandidate>,
    pub skipped: Vec<SkippedToken>,
    pub rejected_spans: usize,
}

/// Finds the room labels printed on a single page.
#[derive(Debug, Clone)]
pub struct RoomDetector {
    matcher: RoomMatcher,
    config: DetectorConfig,
}

impl RoomDetector {
    pub fn new(matcher: RoomMatcher, config: DetectorConfig) -> Self {
        Self { matcher, config }
    }

    pub fn detect_page(&self, page: &PageSpans) -> PageDetection {
        let mut detection = PageDetection {
            page: page.page,
            ..PageDetection::default()
        };

        let mut numbers: Vec<(&TextSpan, RoomNumberToken)> = Vec::new();
        let mut names: Vec<(&TextSpan, String)> = Vec::new();
        for span in &page.spans {
            if !span.bbox.is_well_formed() {
                debug!(page = page.page, text = %span.text, "rejecting span with malformed bbox");
                detection.rejected_spans += 1;
                continue;
            }
            match self.matcher.classify(&span.text) {
                SpanKind::Number(token) => numbers.push((span, token)),
                SpanKind::Name(name) => names.push((span, name)),
                SpanKind::Other => {}
            }
        }

        if numbers.is_empty() {
            return detection;
        }

        let proximity = Proximity::for_page(
            &page.extent(),
            self.config.max_distance_fraction,
            self.config.direction_bonus_fraction,
        );
        let median = median_font_size(
            numbers
                .iter()
                .map(|(span, _)| span.font_size)
                .chain(names.iter().map(|(span, _)| span.font_size)),
        );
        let mut available = vec![true; names.len()];

        for (span, token) in numbers {
            let id = match token.canonical_id(page.block.as_deref()) {
                Ok(id) => id,
                Err(err) => {
                    warn!(page = page.page, text = %span.text, "{err}");
                    detection.skipped.push(SkippedToken {
                        page: page.page,
                        text: span.text.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let paired = proximity.nearest(
                &span.bbox,
                names
                    .iter()
                    .enumerate()
                    .filter(|(idx, _)| available[*idx])
                    .map(|(idx, (name_span, _))| (idx, &name_span.bbox)),
            );

            let (name, name_bbox) = match paired {
                Some(idx) => {
                    available[idx] = false;
                    let (name_span, name) = &names[idx];
                    (name.clone(), Some(name_span.bbox))
                }
                None => (String::new(), None),
            };

            let label = name_bbox.map_or(span.bbox, |b| span.bbox.union(&b));
            let evidence = LabelEvidence {
                pattern_confidence: token.pattern_confidence,
                paired: name_bbox.is_some(),
                font_plausible: font_is_plausible(span.font_size, median, &self.config.confidence),
            };

            debug!(page = page.page, %id, %name, "room label");
            detection.candidates.push(RoomCandidate {
                id,
                name,
                bbox: label.expand(self.config.margin).clamp_non_negative(),
                confidence: score_detection(evidence, &self.config.confidence),
                source_page: page.page,
                number_bbox: span.bbox,
                name_bbox,
            });
        }

        penalize_duplicates(&mut detection.candidates, self.config.confidence.duplicate_factor);
        detection
    }
}

/// The same id printed twice on one page is ambiguous; every copy loses
/// confidence.
fn penalize_duplicates(candidates: &mut [RoomCandidate], factor: f32) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for candidate in candidates.iter() {
        *counts.entry(candidate.id.as_str()).or_default() += 1;
    }
    let duplicated: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, _)| id.to_string())
        .collect();
    for candidate in candidates.iter_mut() {
        if duplicated.contains(&candidate.id) {
            candidate.confidence = (candidate.confidence * factor).clamp(0.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::BBox;
    use crate::rooms::matcher::MatcherConfig;
    use pretty_assertions::assert_eq;

    fn detector() -> RoomDetector {
        RoomDetector::new(
            RoomMatcher::new(MatcherConfig::default()).unwrap(),
            DetectorConfig::default(),
        )
    }

    fn span(text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> TextSpan {
        TextSpan::new(text, BBox::new(x0, y0, x1, y1), 8.0)
    }

    fn plan_page(spans: Vec<TextSpan>) -> PageSpans {
        PageSpans::new(12, spans)
            .with_size(3300.0, 2550.0)
            .with_block("A")
    }

    #[test]
    fn empty_page_yields_no_candidates() {
        let detection = detector().detect_page(&plan_page(vec![]));
        assert!(detection.candidates.is_empty());
        assert!(detection.skipped.is_empty());
    }

    fn pairs(detection: &PageDetection) -> Vec<(&str, &str)> {
        detection
            .candidates
            .iter()
            .map(|c| (c.id.as_str(), c.name.as_str()))
            .collect()
    }

    #[test]
    fn pairs_numbers_with_names_above_when_alone() {
        let page = plan_page(vec![
            span("101", 500.0, 400.0, 530.0, 420.0),
            span("CLASSE", 490.0, 370.0, 550.0, 385.0),
            span("102", 800.0, 400.0, 830.0, 420.0),
            span("BUREAU", 790.0, 370.0, 850.0, 385.0),
            span("Random Text", 2000.0, 2000.0, 2100.0, 2020.0),
        ]);
        let detection = detector().detect_page(&page);
        assert_eq!(pairs(&detection), vec![("A-101", "CLASSE"), ("A-102", "BUREAU")]);
        assert_eq!(detection.candidates[0].confidence, 1.0);
    }

    #[test]
    fn stacked_rows_listed_bottom_up_keep_their_own_names() {
        let page = plan_page(vec![
            span("102", 500.0, 300.0, 530.0, 315.0),
            span("BUREAU", 490.0, 320.0, 550.0, 335.0),
            span("101", 500.0, 200.0, 530.0, 215.0),
            span("CLASSE", 490.0, 220.0, 550.0, 235.0),
        ]);
        let detection = detector().detect_page(&page);
        assert_eq!(pairs(&detection), vec![("A-102", "BUREAU"), ("A-101", "CLASSE")]);
    }

    #[test]
    fn pairs_labels_on_a_page_without_recorded_size() {
        let page = PageSpans::new(
            3,
            vec![
                span("A-101", 100.0, 200.0, 140.0, 215.0),
                span("CLASSE", 100.0, 220.0, 160.0, 235.0),
            ],
        );
        let detection = detector().detect_page(&page);
        assert_eq!(pairs(&detection), vec![("A-101", "CLASSE")]);
        assert_eq!(detection.candidates[0].confidence, 1.0);
    }

    #[test]
    fn a_name_serves_only_one_number() {
        let page = plan_page(vec![
            span("101", 500.0, 400.0, 530.0, 420.0),
            span("102", 540.0, 400.0, 570.0, 420.0),
            span("CLASSE", 500.0, 370.0, 560.0, 385.0),
        ]);
        let detection = detector().detect_page(&page);
        assert_eq!(detection.candidates[0].name, "CLASSE");
        assert_eq!(detection.candidates[1].name, "");
        assert!(detection.candidates[1].confidence < detection.candidates[0].confidence);
    }

    #[test]
    fn bbox_is_expanded_union_clamped_at_zero() {
        let page = plan_page(vec![
            span("101", 2.0, 20.0, 20.0, 30.0),
            span("CLASSE", 1.0, 2.0, 40.0, 12.0),
        ]);
        let detection = detector().detect_page(&page);
        let candidate = &detection.candidates[0];
        assert_eq!(candidate.bbox, BBox::new(0.0, 0.0, 45.0, 35.0));
        assert!(candidate.bbox.is_well_formed());
    }

    #[test]
    fn duplicate_numbers_halve_confidence() {
        let page = plan_page(vec![
            span("101", 500.0, 400.0, 530.0, 420.0),
            span("CLASSE", 490.0, 370.0, 550.0, 385.0),
            span("101", 1500.0, 400.0, 1530.0, 420.0),
            span("CLASSE", 1490.0, 370.0, 1550.0, 385.0),
        ]);
        let detection = detector().detect_page(&page);
        assert_eq!(detection.candidates.len(), 2);
        assert!(detection.candidates.iter().all(|c| c.confidence == 0.5));
    }

    #[test]
    fn malformed_spans_are_rejected() {
        let page = plan_page(vec![
            span("101", 530.0, 400.0, 500.0, 420.0),
            span("102", 800.0, 400.0, 830.0, 420.0),
        ]);
        let detection = detector().detect_page(&page);
        assert_eq!(detection.rejected_spans, 1);
        assert_eq!(detection.candidates.len(), 1);
        assert_eq!(detection.candidates[0].id, "A-102");
    }

    #[test]
    fn bare_numbers_without_block_are_skipped() {
        let mut page = plan_page(vec![
            span("101", 500.0, 400.0, 530.0, 420.0),
            span("B-204", 800.0, 400.0, 850.0, 420.0),
        ]);
        page.block = None;
        let detection = detector().detect_page(&page);
        assert_eq!(detection.candidates.len(), 1);
        assert_eq!(detection.candidates[0].id, "B-204");
        assert_eq!(detection.skipped.len(), 1);
        assert!(detection.skipped[0].reason.contains("no block context"));
    }

    #[test]
    fn oversized_labels_score_lower() {
        let mut big = span("103", 500.0, 400.0, 560.0, 460.0);
        big.font_size = 40.0;
        let page = plan_page(vec![
            span("101", 100.0, 400.0, 130.0, 420.0),
            span("102", 300.0, 400.0, 330.0, 420.0),
            big,
        ]);
        let detection = detector().detect_page(&page);
        let big = detection.candidates.iter().find(|c| c.id == "A-103").unwrap();
        let small = detection.candidates.iter().find(|c| c.id == "A-101").unwrap();
        assert!(big.confidence < small.confidence);
    }
}
