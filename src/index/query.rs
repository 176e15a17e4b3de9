use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::index::{search_text, EntryKind, IndexEntry, RagIndex};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Groups of interchangeable query terms, French and English.
    pub synonyms: Vec<Vec<String>>,
    pub default_limit: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let groups: &[&[&str]] = &[
            &["room", "local", "pièce", "salle"],
            &["class", "classe"],
            &["corridor", "couloir", "hall"],
            &["bathroom", "toilette", "salle de bain", "wc", "sdb"],
            &["storage", "rangement", "entrepôt"],
            &["stair", "escalier"],
            &["plan", "étage", "floor"],
            &["legend", "légende"],
            &["manufacturer", "fabricant", "fournisseur"],
            &["paint", "peinture"],
            &["door", "porte"],
        ];
        Self {
            synonyms: groups
                .iter()
                .map(|group| group.iter().map(|s| s.to_string()).collect())
                .collect(),
            default_limit: 20,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub kind: Option<EntryKind>,
    pub page: Option<u32>,
    pub min_confidence: f32,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub score: u32,
    pub entry: IndexEntry,
}

/// Query terms after normalization and synonym expansion.
pub fn expand_terms(query: &str, config: &IndexConfig) -> BTreeSet<String> {
    let text = search_text(query);
    let mut terms: BTreeSet<String> = text.split_whitespace().map(str::to_string).collect();
    for term in text.split_whitespace() {
        for group in &config.synonyms {
            if group.iter().any(|s| s == term) {
                terms.extend(group.iter().map(|s| search_text(s)));
            }
        }
    }
    terms
}

/// Ranks entries by how many query terms they mention. Ties keep index
/// order.
pub fn search(
    index: &RagIndex,
    query: &str,
    filters: &SearchFilters,
    config: &IndexConfig,
) -> Vec<SearchHit> {
    let terms = expand_terms(query, config);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit> = index
        .entries
        .iter()
        .filter(|entry| filters.kind.map_or(true, |kind| entry.kind() == kind))
        .filter(|entry| filters.page.map_or(true, |page| entry.on_page(page)))
        .filter(|entry| entry.confidence() >= filters.min_confidence)
        .filter_map(|entry| {
            let score = score_entry(entry, &terms);
            (score > 0).then(|| SearchHit {
                score,
                entry: entry.clone(),
            })
        })
        .collect();

    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits.truncate(filters.limit.unwrap_or(config.default_limit));
    debug!(query, terms = terms.len(), hits = hits.len(), "search");
    hits
}

fn score_entry(entry: &IndexEntry, terms: &BTreeSet<String>) -> u32 {
    let text = entry.search_text();
    let mut score = terms.iter().filter(|term| text.contains(term.as_str())).count() as u32;

    let keys: Vec<String> = match entry {
        IndexEntry::Room(room) => vec![
            search_text(&room.id),
            search_text(&room.name),
            search_text(&room.number),
        ],
        IndexEntry::Page(_) => Vec::new(),
        IndexEntry::Section(section) => vec![search_text(&section.code), search_text(&section.title)],
        IndexEntry::Product(product) => vec![
            search_text(&product.manufacturer),
            search_text(product.model.as_deref().unwrap_or_default()),
        ],
    };
    for term in terms {
        if keys.iter().any(|key| key == term) {
            score += 3;
        } else if keys.iter().any(|key| !key.is_empty() && key.contains(term.as_str())) {
            score += 2;
        }
    }
    score
}
