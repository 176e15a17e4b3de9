use serde::{Deserialize, Serialize};

use crate::core::model::{QualityMeta, Room};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub unpaired_factor: f32,
    pub implausible_font_factor: f32,
    pub font_ratio_min: f32,
    pub font_ratio_max: f32,
    pub duplicate_factor: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            unpaired_factor: 0.6,
            implausible_font_factor: 0.7,
            font_ratio_min: 0.5,
            font_ratio_max: 2.0,
            duplicate_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LabelEvidence {
    pub pattern_confidence: f32,
    pub paired: bool,
    pub font_plausible: bool,
}

pub fn score_detection(evidence: LabelEvidence, config: &ConfidenceConfig) -> f32 {
    let mut score = evidence.pattern_confidence;
    if !evidence.paired {
        score *= config.unpaired_factor;
    }
    if !evidence.font_plausible {
        score *= config.implausible_font_factor;
    }
    score.clamp(0.0, 1.0)
}

/// Median of the strictly positive sizes; zero means the source did not
/// report a font size.
pub fn median_font_size(sizes: impl IntoIterator<Item = f32>) -> Option<f32> {
    let mut sizes: Vec<f32> = sizes
        .into_iter()
        .filter(|s| s.is_finite() && *s > 0.0)
        .collect();
    if sizes.is_empty() {
        return None;
    }
    sizes.sort_by(f32::total_cmp);
    let mid = sizes.len() / 2;
    if sizes.len() % 2 == 0 {
        Some((sizes[mid - 1] + sizes[mid]) * 0.5)
    } else {
        Some(sizes[mid])
    }
}

pub fn font_is_plausible(size: f32, median: Option<f32>, config: &ConfidenceConfig) -> bool {
    match median {
        Some(median) if size > 0.0 => {
            let ratio = size / median;
            ratio >= config.font_ratio_min && ratio <= config.font_ratio_max
        }
        _ => true,
    }
}

pub fn quality_meta(rooms: &[Room]) -> QualityMeta {
    if rooms.is_empty() {
        return QualityMeta::default();
    }
    let total: f32 = rooms.iter().map(|room| room.confidence).sum();
    let average = total / rooms.len() as f32;
    QualityMeta {
        average_confidence: (average * 1000.0).round() / 1000.0,
        rooms_high_confidence: rooms.iter().filter(|r| r.confidence >= 0.8).count(),
        rooms_medium_confidence: rooms
            .iter()
            .filter(|r| (0.5..0.8).contains(&r.confidence))
            .count(),
        rooms_low_confidence: rooms.iter().filter(|r| r.confidence < 0.5).count(),
        rooms_needing_review: rooms.iter().filter(|r| r.needs_review).count(),
    }
}
