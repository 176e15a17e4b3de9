use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::confidence::quality_meta;
use crate::core::model::{Room, RoomCandidate, RoomRegistry};
use crate::rooms::matcher::floor_of;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Single-page rooms below this confidence are flagged for review.
    pub low_confidence: f32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            low_confidence: 0.5,
        }
    }
}

/// Higher confidence first, then the lower page number.
fn outranks(a: &RoomCandidate, b: &RoomCandidate) -> bool {
    a.confidence > b.confidence || (a.confidence == b.confidence && a.source_page < b.source_page)
}

/// Folds per-page candidates into one room per canonical id.
pub fn merge_candidates(candidates: &[RoomCandidate], config: &MergeConfig) -> RoomRegistry {
    let mut groups: BTreeMap<&str, Vec<&RoomCandidate>> = BTreeMap::new();
    for candidate in candidates {
        groups.entry(candidate.id.as_str()).or_default().push(candidate);
    }

    let rooms: Vec<Room> = groups
        .into_iter()
        .filter_map(|(id, group)| merge_group(id, &group, config))
        .collect();

    let registry = RoomRegistry {
        quality: quality_meta(&rooms),
        rooms,
        ..RoomRegistry::default()
    };
    info!(
        candidates = candidates.len(),
        rooms = registry.rooms.len(),
        needs_review = registry.quality.rooms_needing_review,
        "merged room candidates"
    );
    registry
}

fn merge_group(id: &str, group: &[&RoomCandidate], config: &MergeConfig) -> Option<Room> {
    let best = group
        .iter()
        .copied()
        .reduce(|best, c| if outranks(c, best) { c } else { best })?;

    let name = group
        .iter()
        .copied()
        .filter(|c| !c.name.is_empty())
        .reduce(|best, c| if outranks(c, best) { c } else { best })
        .map(|c| c.name.clone())
        .unwrap_or_default();

    let mut per_page: BTreeMap<u32, &RoomCandidate> = BTreeMap::new();
    for &candidate in group {
        per_page
            .entry(candidate.source_page)
            .and_modify(|kept| {
                if outranks(candidate, kept) {
                    *kept = candidate;
                }
            })
            .or_insert(candidate);
    }
    let source_pages: Vec<u32> = group
        .iter()
        .map(|c| c.source_page)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let (block, number) = split_id(id);
    let needs_review = source_pages.len() == 1 && best.confidence < config.low_confidence;
    if needs_review {
        debug!(id, confidence = best.confidence, "room flagged for review");
    }

    Some(Room {
        id: id.to_string(),
        name,
        block: block.to_string(),
        floor: floor_of(number),
        confidence: best.confidence,
        source_pages,
        primary_source: best.source_page,
        bboxes: per_page
            .into_iter()
            .map(|(page, c)| (page, c.bbox))
            .collect(),
        needs_review,
        bbox_method: None,
    })
}

/// `A-102B-1` splits into block `A` and the digits `102`.
fn split_id(id: &str) -> (&str, &str) {
    let (block, rest) = id.split_once('-').unwrap_or(("", id));
    let digits_end = rest
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(rest.len(), |(idx, _)| idx);
    (block, &rest[..digits_end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::BBox;
    use pretty_assertions::assert_eq;

    fn candidate(id: &str, name: &str, page: u32, confidence: f32) -> RoomCandidate {
        let bbox = BBox::new(page as f32, 0.0, page as f32 + 10.0, 10.0);
        RoomCandidate {
            id: id.to_string(),
            name: name.to_string(),
            bbox,
            confidence,
            source_page: page,
            number_bbox: bbox,
            name_bbox: None,
        }
    }

    #[test]
    fn empty_input_gives_empty_registry() {
        let registry = merge_candidates(&[], &MergeConfig::default());
        assert!(registry.rooms.is_empty());
        assert_eq!(registry.quality.average_confidence, 0.0);
    }

    #[test]
    fn ids_are_unique_and_sorted() {
        let registry = merge_candidates(
            &[
                candidate("B-201", "GYMNASE", 14, 1.0),
                candidate("A-101", "CLASSE", 12, 1.0),
                candidate("A-101", "CLASSE", 13, 0.6),
            ],
            &MergeConfig::default(),
        );
        let ids: Vec<&str> = registry.rooms.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["A-101", "B-201"]);
    }

    #[test]
    fn keeps_highest_confidence_and_union_of_pages() {
        let registry = merge_candidates(
            &[
                candidate("A-101", "", 14, 0.6),
                candidate("A-101", "CLASSE", 12, 0.9),
                candidate("A-101", "CLASSE", 13, 0.9),
            ],
            &MergeConfig::default(),
        );
        let room = &registry.rooms[0];
        assert_eq!(room.confidence, 0.9);
        assert_eq!(room.source_pages, vec![12, 13, 14]);
        assert_eq!(room.primary_source, 12);
        assert_eq!(room.name, "CLASSE");
        assert_eq!(room.block, "A");
        assert_eq!(room.floor, Some(1));
        assert_eq!(room.bboxes.len(), 3);
        assert!(!room.needs_review);
    }

    #[test]
    fn name_comes_from_best_named_candidate() {
        let registry = merge_candidates(
            &[
                candidate("A-204", "", 20, 1.0),
                candidate("A-204", "BUREAU", 21, 0.6),
            ],
            &MergeConfig::default(),
        );
        assert_eq!(registry.rooms[0].name, "BUREAU");
        assert_eq!(registry.rooms[0].primary_source, 20);
    }

    #[test]
    fn single_page_low_confidence_needs_review() {
        let registry = merge_candidates(
            &[
                candidate("A-25", "", 12, 0.48),
                candidate("A-26", "", 12, 0.48),
                candidate("A-26", "", 13, 0.48),
            ],
            &MergeConfig::default(),
        );
        assert!(registry.rooms[0].needs_review);
        assert!(!registry.rooms[1].needs_review);
        assert_eq!(registry.rooms[0].floor, None);
        assert_eq!(registry.quality.rooms_needing_review, 1);
        assert_eq!(registry.quality.rooms_low_confidence, 2);
    }

    #[test]
    fn same_page_duplicates_keep_best_bbox() {
        let mut weak = candidate("A-101", "", 12, 0.3);
        weak.bbox = BBox::new(900.0, 900.0, 950.0, 950.0);
        let strong = candidate("A-101", "CLASSE", 12, 0.6);
        let registry = merge_candidates(&[weak, strong.clone()], &MergeConfig::default());
        assert_eq!(registry.rooms[0].bboxes.get(&12), Some(&strong.bbox));
        assert_eq!(registry.rooms[0].source_pages, vec![12]);
    }

    #[test]
    fn equal_confidence_on_one_page_keeps_first_seen() {
        let first = candidate("A-101", "", 12, 0.5);
        let mut second = candidate("A-101", "", 12, 0.5);
        second.bbox = BBox::new(900.0, 900.0, 950.0, 950.0);
        let registry = merge_candidates(&[first.clone(), second], &MergeConfig::default());
        assert_eq!(registry.rooms[0].bboxes.get(&12), Some(&first.bbox));
    }

    #[test]
    fn splits_sub_unit_ids() {
        assert_eq!(split_id("A-102B-1"), ("A", "102"));
        assert_eq!(split_id("C-1234"), ("C", "1234"));
    }
}
