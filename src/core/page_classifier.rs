use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use tracing::debug;

use crate::core::model::{DocumentClassification, PageClassification, PageScores, PageType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub keywords: BTreeMap<PageType, Vec<(String, u32)>>,
    pub room_number_pattern: String,
    pub room_number_weight: u32,
    pub room_number_max_score: u32,
}

fn table(entries: &[(&str, u32)]) -> Vec<(String, u32)> {
    entries
        .iter()
        .map(|(keyword, weight)| (keyword.to_string(), *weight))
        .collect()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let mut keywords = BTreeMap::new();
        keywords.insert(
            PageType::Legend,
            table(&[
                ("légende", 10),
                ("legend", 10),
                ("symboles", 8),
                ("symbols", 8),
                ("nomenclature", 6),
                ("abréviations", 5),
                ("abbreviations", 5),
            ]),
        );
        keywords.insert(
            PageType::Plan,
            table(&[
                ("étage", 8),
                ("etage", 8),
                ("niveau", 8),
                ("floor", 8),
                ("level", 7),
                ("sous-sol", 6),
                ("rez-de-chaussée", 6),
                ("rdc", 5),
                ("mezzanine", 5),
                ("toiture", 4),
                ("roof", 4),
            ]),
        );
        keywords.insert(
            PageType::Detail,
            table(&[
                ("détail", 10),
                ("detail", 10),
                ("coupe", 8),
                ("section", 8),
                ("assemblage", 6),
                ("assembly", 6),
                ("agrandissement", 5),
                ("enlargement", 5),
            ]),
        );
        keywords.insert(
            PageType::Elevation,
            table(&[
                ("élévation", 10),
                ("elevation", 10),
                ("façade", 8),
                ("facade", 8),
                ("vue", 4),
                ("view", 4),
                ("nord", 3),
                ("sud", 3),
                ("est", 3),
                ("ouest", 3),
            ]),
        );
        Self {
            keywords,
            room_number_pattern: r"\b[1-9]\d{2}\b".to_string(),
            room_number_weight: 2,
            room_number_max_score: 20,
        }
    }
}

/// Keyword scorer deciding what kind of drawing a page holds.
#[derive(Debug, Clone)]
pub struct PageClassifier {
    config: ClassifierConfig,
    room_number: Regex,
}

impl PageClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, regex::Error> {
        let room_number = Regex::new(&config.room_number_pattern)?;
        Ok(Self {
            config,
            room_number,
        })
    }

    pub fn compute_scores(&self, text: &str) -> PageScores {
        let mut scores = PageScores::default();
        if text.is_empty() {
            return scores;
        }
        let lowered = text.to_lowercase();

        for (page_type, keywords) in &self.config.keywords {
            for (keyword, weight) in keywords {
                if keyword.is_empty() {
                    continue;
                }
                let count = lowered.matches(keyword.as_str()).count() as u32;
                scores.add(*page_type, count.saturating_mul(*weight));
            }
        }

        let room_numbers = self.room_number.find_iter(text).count() as u32;
        let room_score = room_numbers
            .saturating_mul(self.config.room_number_weight)
            .min(self.config.room_number_max_score);
        scores.add(PageType::Plan, room_score);

        scores
    }

    pub fn classify(&self, text: &str) -> (PageType, PageScores) {
        let scores = self.compute_scores(text);
        let mut best = PageType::Other;
        let mut max_score = 0;
        for page_type in PageType::SCORED {
            let score = scores.get(page_type);
            if score > max_score {
                max_score = score;
                best = page_type;
            }
        }
        (best, scores)
    }

    /// Classifies `(page, text)` pairs and tallies pages per type.
    pub fn classify_document<I>(&self, source_pdf: &str, pages: I) -> DocumentClassification
    where
        I: IntoIterator<Item = (u32, String)>,
    {
        let mut result = DocumentClassification {
            source_pdf: source_pdf.to_string(),
            ..DocumentClassification::default()
        };
        for (page, text) in pages {
            let (page_type, scores) = self.classify(&text);
            debug!(page, %page_type, "classified page");
            *result.summary.entry(page_type).or_default() += 1;
            result.pages.push(PageClassification {
                page,
                page_type,
                scores,
            });
        }
        result.pages.sort_by_key(|p| p.page);
        result.page_count = result.pages.len();
        result
    }
}
