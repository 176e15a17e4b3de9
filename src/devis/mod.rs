//! Construction specification documents ("devis"): section outline,
//! MasterFormat codes, room references and named products, all read off
//! the page text layer.

pub mod products;
pub mod references;
pub mod sections;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::geometry::BBox;
use crate::core::model::PageSpans;

pub use products::{Product, ProductExtractor};
pub use references::{LocalReference, ReferenceExtractor, ReferenceKind};
pub use sections::{CsiReference, FontStats, Section, SectionExtractor};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecConfig {
    /// Lines kept before and after a MasterFormat code as its context.
    pub context_before: usize,
    pub context_after: usize,
    /// Character limits of the stored context and section body.
    pub max_context: usize,
    pub max_content: usize,
}

impl Default for SpecConfig {
    fn default() -> Self {
        Self {
            context_before: 3,
            context_after: 2,
            max_context: 500,
            max_content: 500,
        }
    }
}

/// One line of text with its page, the unit every extractor works on.
#[derive(Debug, Clone, Copy)]
pub struct TextLine<'a> {
    pub page: u32,
    pub text: &'a str,
    pub bbox: BBox,
    pub font_size: f32,
}

/// Flattens pages into lines, page by page in source order.
pub fn text_lines(pages: &[PageSpans]) -> Vec<TextLine<'_>> {
    pages
        .iter()
        .flat_map(|page| {
            page.spans
                .iter()
                .filter(|span| !span.text.trim().is_empty())
                .map(move |span| TextLine {
                    page: page.page,
                    text: span.text.trim(),
                    bbox: span.bbox,
                    font_size: span.font_size,
                })
        })
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentStats {
    pub total_pages: usize,
    pub total_lines: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_font_size: Option<f32>,
    pub title_font_sizes: Vec<f32>,
    pub font_size_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub stats: DocumentStats,
    pub sections: Vec<Section>,
    pub csi_sections: Vec<CsiReference>,
    pub local_references: Vec<LocalReference>,
    pub products: Vec<Product>,
}

pub struct SpecParser {
    config: SpecConfig,
    sections: SectionExtractor,
    references: ReferenceExtractor,
    products: ProductExtractor,
}

impl SpecParser {
    pub fn new(config: SpecConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            sections: SectionExtractor::new()?,
            references: ReferenceExtractor::new()?,
            products: ProductExtractor::new()?,
            config,
        })
    }

    pub fn parse(&self, source: Option<String>, pages: &[PageSpans]) -> SpecDocument {
        let lines = text_lines(pages);
        let fonts = FontStats::from_lines(&lines);

        let sections = self.sections.outline(&lines, &fonts, &self.config);
        let csi_sections = self.sections.csi_references(&lines, &fonts, &self.config);
        let local_references = self.references.extract(&lines);
        let products = self.products.extract(&lines, &csi_sections);

        let stats = DocumentStats {
            total_pages: pages.len(),
            total_lines: lines.len(),
            dominant_font_size: fonts.dominant(),
            title_font_sizes: fonts.title_sizes(5),
            font_size_count: fonts.len(),
        };
        info!(
            pages = stats.total_pages,
            sections = sections.len(),
            csi = csi_sections.len(),
            references = local_references.len(),
            products = products.len(),
            "parsed specification document"
        );

        SpecDocument {
            source,
            stats,
            sections,
            csi_sections,
            local_references,
            products,
        }
    }
}

/// At most `limit` characters of `text`.
pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// `text[start..end]` widened by up to `before`/`after` characters on each
/// side, trimmed.
pub(crate) fn char_window(text: &str, start: usize, end: usize, before: usize, after: usize) -> &str {
    let from = text[..start]
        .char_indices()
        .rev()
        .take(before)
        .last()
        .map_or(start, |(idx, _)| idx);
    let to = text[end..]
        .char_indices()
        .nth(after)
        .map_or(text.len(), |(idx, _)| end + idx);
    text[from..to].trim()
}

/// Upper case in the sense of "has cased letters, none of them lower".
pub(crate) fn is_upper(text: &str) -> bool {
    text.chars().any(char::is_uppercase) && !text.chars().any(char::is_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::TextSpan;
    use pretty_assertions::assert_eq;

    fn line(text: &str, y: f32, size: f32) -> TextSpan {
        TextSpan::new(text, BBox::new(72.0, y, 72.0 + text.len() as f32 * size * 0.5, y + size), size)
    }

    pub(crate) fn devis_pages() -> Vec<PageSpans> {
        vec![
            PageSpans::new(
                1,
                vec![
                    line("SECTION 09 91 23", 72.0, 16.0),
                    line("PEINTURE INTÉRIEURE", 92.0, 16.0),
                    line("1.1 GÉNÉRALITÉS", 120.0, 12.0),
                    line("Les travaux comprennent la peinture des murs du local 101.", 140.0, 10.0),
                    line("Appliquer deux couches dans la classe A-102 et le corridor.", 152.0, 10.0),
                    line("Fabricant : Sico inc.", 164.0, 10.0),
                    line("Couleur : blanc cassé.", 176.0, 10.0),
                ],
            ),
            PageSpans::new(
                2,
                vec![
                    line("SECTION 08 11 13", 72.0, 16.0),
                    line("PORTES EN ACIER", 92.0, 16.0),
                    line("Portes conformes à la norme CSA A123 pour le local 204.", 120.0, 10.0),
                    line("Fabricants acceptés pour les portes :", 132.0, 10.0),
                    line("- Baron Metal (ou équivalent approuvé)", 144.0, 10.0),
                    line("Fleming | Série 700 porte isolée", 156.0, 10.0),
                ],
            ),
        ]
    }

    #[test]
    fn parses_a_small_devis() {
        let parser = SpecParser::new(SpecConfig::default()).unwrap();
        let doc = parser.parse(Some("devis.pdf".to_string()), &devis_pages());

        assert_eq!(doc.stats.total_pages, 2);
        assert_eq!(doc.stats.dominant_font_size, Some(10.0));
        assert_eq!(doc.stats.title_font_sizes, vec![16.0, 12.0]);

        let codes: Vec<&str> = doc.csi_sections.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["09 91 23", "08 11 13"]);
        assert_eq!(doc.csi_sections[0].title, "PEINTURE INTÉRIEURE");

        let refs: Vec<&str> = doc.local_references.iter().map(|r| r.room_ref.as_str()).collect();
        assert_eq!(refs, vec!["101", "A-102"]);

        let makers: Vec<&str> = doc.products.iter().map(|p| p.manufacturer.as_str()).collect();
        assert_eq!(makers, vec!["Sico inc", "Baron Metal", "Fleming"]);
        assert_eq!(doc.products[0].csi_section.as_deref(), Some("09 91 23"));
        assert_eq!(doc.products[2].csi_section.as_deref(), Some("08 11 13"));
    }

    #[test]
    fn char_window_respects_boundaries() {
        let text = "pièce 101 à repeindre";
        let start = text.find("101").unwrap();
        assert_eq!(char_window(text, start, start + 3, 2, 2), "e 101 à");
        assert_eq!(char_window(text, start, start + 3, 50, 50), text);
    }

    #[test]
    fn upper_case_needs_letters() {
        assert!(is_upper("PEINTURE INTÉRIEURE"));
        assert!(!is_upper("09 91 23"));
        assert!(!is_upper("Peinture"));
    }
}
