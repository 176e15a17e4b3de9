use std::collections::BTreeSet;

use tracing::debug;

use crate::core::model::{
    DocumentClassification, PageClassification, PageSelection, PageType, SelectedPage,
};

/// Picks up to `count` pages worth running detection on: the strongest
/// legend, then plan pages spread across the score ranking, then the
/// earliest remaining pages.
pub fn select_pages(classification: &DocumentClassification, count: usize) -> PageSelection {
    let pages = &classification.pages;
    if pages.is_empty() {
        return PageSelection {
            source_pdf: classification.source_pdf.clone(),
            selection_count: 0,
            requested_count: count,
            strategy: "empty - no pages to select".to_string(),
            selected: Vec::new(),
        };
    }

    let mut legends = of_type(pages, PageType::Legend);
    let mut plans = of_type(pages, PageType::Plan);
    // Stable sorts keep page order among equal scores.
    legends.sort_by(|a, b| b.scores.legend.cmp(&a.scores.legend));
    plans.sort_by(|a, b| b.scores.plan.cmp(&a.scores.plan));

    let mut selected: Vec<&PageClassification> = Vec::new();
    let mut strategy: Vec<String> = Vec::new();
    let mut remaining = count;

    match legends.first() {
        Some(best) if remaining > 0 => {
            selected.push(*best);
            strategy.push("1 LEGEND".to_string());
            remaining -= 1;
        }
        Some(_) => {}
        None => strategy.push("0 LEGEND (none found)".to_string()),
    }

    if plans.is_empty() {
        strategy.push("0 PLAN (none found)".to_string());
    } else {
        let take = plans.len().min(remaining);
        if take > 0 {
            selected.extend(diversify_indices(plans.len(), take).into_iter().map(|i| plans[i]));
            strategy.push(format!("{take} PLAN"));
            remaining -= take;
        }
    }

    if remaining > 0 {
        let taken: BTreeSet<u32> = selected.iter().map(|p| p.page).collect();
        let mut fallback: Vec<&PageClassification> =
            pages.iter().filter(|p| !taken.contains(&p.page)).collect();
        fallback.sort_by_key(|p| p.page);
        let take = fallback.len().min(remaining);
        if take > 0 {
            selected.extend(fallback.into_iter().take(take));
            strategy.push(format!("{take} FALLBACK"));
        }
    }

    selected.sort_by_key(|p| p.page);
    let strategy = strategy.join(" + ");
    debug!(%strategy, selected = selected.len(), "page selection");

    PageSelection {
        source_pdf: classification.source_pdf.clone(),
        selection_count: selected.len(),
        requested_count: count,
        strategy,
        selected: selected
            .into_iter()
            .map(|p| SelectedPage {
                page: p.page,
                page_type: p.page_type,
                score: p.scores.get(p.page_type),
            })
            .collect(),
    }
}

fn of_type(pages: &[PageClassification], page_type: PageType) -> Vec<&PageClassification> {
    pages.iter().filter(|p| p.page_type == page_type).collect()
}

/// `count` indices out of `0..total`: always the first, the rest evenly
/// spaced, rounding half to even.
pub fn diversify_indices(total: usize, count: usize) -> Vec<usize> {
    if count == 0 {
        return Vec::new();
    }
    if count >= total {
        return (0..total).collect();
    }
    if count == 1 {
        return vec![0];
    }

    let mut indices: Vec<usize> = vec![0];
    let step = (total - 1) as f64 / (count - 1) as f64;
    for i in 1..count {
        let idx = (i as f64 * step).round_ties_even() as usize;
        if !indices.contains(&idx) {
            indices.push(idx);
        }
    }
    let mut next = 0;
    while indices.len() < count {
        if !indices.contains(&next) {
            indices.push(next);
        }
        next += 1;
    }
    indices.sort_unstable();
    indices
}
