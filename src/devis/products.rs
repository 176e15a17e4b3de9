use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::devis::{char_window, truncate_chars, CsiReference, TextLine};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub manufacturer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub specs: BTreeMap<String, String>,
    pub context: String,
    pub page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csi_section: Option<String>,
}

const CONTEXT_LIMIT: usize = 200;

const PIPE_SKIP: &[&str] = &[
    "ou", "et", "le", "la", "les", "un", "une", "de", "du", "des", "or", "and", "the", "a", "an",
    "of", "to", "équivalent", "equivalent", "approuvé", "approved", "produit", "product",
    "référence", "reference", "références", "avant", "après", "selon", "avec", "sans", "pour",
];
const FRAGMENT_WORDS: &[&str] = &["avant", "après", "selon", "avec", "des ", "et de"];
const INTRO_SKIP: &[&str] = &[
    "ou", "et", "le", "la", "les", "un", "une", "or", "and", "the", "a", "an", "équivalent",
    "equivalent", "approuvé", "approved",
];
const LIST_SKIP: &[&str] = &[
    "ou équivalent", "or equivalent", "section", "partie", "article", "note", "voir", "see",
    "référence",
];
const PRODUCT_TYPES: &[&str] = &[
    "porte|door", "fenêtre|window", "peinture|paint", "plancher|flooring|floor",
    "plafond|ceiling", "isolation|insulation", "gypse|drywall|gyproc", "tuile|tile",
    "béton|concrete", "acier|steel", "bois|wood", "verre|glass", "quincaillerie|hardware",
    "membrane", "revêtement|cladding|siding",
];

/// Manufacturers and products named in specification text. Makers are
/// read from "Maker | Product" lines, from introductions such as
/// "Fabricant : X", and from dash lists.
pub struct ProductExtractor {
    pipe: Regex,
    intros: Vec<Regex>,
    list_item: Regex,
    leading_function_word: Regex,
    model: Regex,
    product_types: Vec<Regex>,
    dimension: Regex,
    specs: Vec<(&'static str, Regex)>,
}

impl ProductExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        let intros = [
            r"(?i)\b(?:fabricant|manufacturer|fournisseur)\b\s*[:\-]?\s*(.+?)(?:\.|$)",
            r"(?i)\b(?:marque|brand)\b\s*[:\-]?\s*(.+?)(?:\.|$)",
            r"(?i)\b(?:produit\s+de|product\s+by)\b\s*(.+?)(?:\.|$)",
            r"(?i)\b(?:fabriqué\s+par|made\s+by)\b\s*(.+?)(?:\.|$)",
        ]
        .into_iter()
        .map(Regex::new)
        .collect::<Result<Vec<_>, _>>()?;

        let product_types = PRODUCT_TYPES
            .iter()
            .map(|words| Regex::new(&format!(r"(?i)(?:^|\s)({words})s?\b")))
            .collect::<Result<Vec<_>, _>>()?;

        let specs = vec![
            (
                "thickness",
                Regex::new(r#"(?i)(?:épaisseur|thickness|épais\.?)\s*[:\-]?\s*(\d+(?:[.,]\d+)?)\s*(mm|cm|po|")?"#)?,
            ),
            (
                "color",
                Regex::new(r"(?i)(?:couleur|color|fini|finish)\s*[:\-]?\s*([\p{L}\s]+?)(?:\.|,|$)")?,
            ),
            ("rating", Regex::new(r"(?i)\b(?:classe|class|rating|type)\s*[:\-]?\s*([A-Z0-9]+)")?),
            (
                "fire_rating",
                Regex::new(
                    r"(?i)(?:résistance\s+au\s+feu|fire\s+rating)\s*[:\-]?\s*(\d+(?:[.,]\d+)?\s*(?:h|hr|heure|hour)?)",
                )?,
            ),
        ];

        Ok(Self {
            pipe: Regex::new(r"([A-Z][\p{L}.\-]+(?:\s+[\p{L}&.\-]+)*?)\s*\|\s*([A-Z][\w\s.\-]+)")?,
            intros,
            list_item: Regex::new(r"(?m)^\s*[\-•*]\s*([A-Z][A-Za-z\s&]+?)(?:\s*\(|$)")?,
            leading_function_word: Regex::new(
                r"^(?:et|ou|de|des|le|la|sans|avec|pour|avant|après)\s",
            )?,
            model: Regex::new(
                r"(?i)(?:\b(?:modèle|model|série|series|type|no)\b\.?|#)\s*[:\-]?\s*([A-Z0-9][\w.\-]{2,})",
            )?,
            product_types,
            dimension: Regex::new(
                r#"(?i)(\d+(?:[.,]\d+)?)\s*(?:x|×|par)\s*(\d+(?:[.,]\d+)?)(?:\s*(?:x|×|par)\s*(\d+(?:[.,]\d+)?))?\s*(mm|cm|m|po|pi|"|')?"#,
            )?,
            specs,
        })
    }

    /// Products in document order, one per manufacturer and model. Each
    /// takes the MasterFormat code last cited on its page.
    pub fn extract(&self, lines: &[TextLine<'_>], csi: &[CsiReference]) -> Vec<Product> {
        let csi_by_page: BTreeMap<u32, &str> =
            csi.iter().map(|r| (r.page, r.code.as_str())).collect();

        let mut seen: HashSet<(String, Option<String>)> = HashSet::new();
        let mut products = Vec::new();
        for line in lines {
            let csi_section = csi_by_page.get(&line.page).map(|code| code.to_string());
            let found = self
                .from_pipes(line)
                .into_iter()
                .chain(self.from_intros(line))
                .chain(self.from_list(line));
            for mut product in found {
                product.csi_section = csi_section.clone();
                if seen.insert((product.manufacturer.to_lowercase(), product.model.clone())) {
                    products.push(product);
                }
            }
        }
        products
    }

    fn from_pipes(&self, line: &TextLine<'_>) -> Vec<Product> {
        self.pipe
            .captures_iter(line.text)
            .filter_map(|caps| {
                let manufacturer = clean_name(&caps[1]);
                let model = clean_name(&caps[2]);
                let lower = manufacturer.to_lowercase();
                let len = manufacturer.chars().count();
                if !(2..=40).contains(&len)
                    || PIPE_SKIP.contains(&lower.as_str())
                    || self.leading_function_word.is_match(&lower)
                    || FRAGMENT_WORDS.iter().any(|w| lower.contains(w))
                {
                    return None;
                }
                Some(self.product(manufacturer, Some(model), line))
            })
            .collect()
    }

    fn from_intros(&self, line: &TextLine<'_>) -> Vec<Product> {
        let mut products = Vec::new();
        for pattern in &self.intros {
            for caps in pattern.captures_iter(line.text) {
                let manufacturer = clean_name(&caps[1]);
                let len = manufacturer.chars().count();
                if !(2..=50).contains(&len) || INTRO_SKIP.contains(&manufacturer.to_lowercase().as_str()) {
                    continue;
                }
                let model = self.model.captures(line.text).map(|m| m[1].to_string());
                products.push(self.product(manufacturer, model, line));
            }
        }
        products
    }

    fn from_list(&self, line: &TextLine<'_>) -> Vec<Product> {
        self.list_item
            .captures_iter(line.text)
            .filter_map(|caps| {
                let found = caps.get(1)?;
                let manufacturer = found.as_str().trim().to_string();
                let lower = manufacturer.to_lowercase();
                let len = manufacturer.chars().count();
                if !(2..=40).contains(&len) || LIST_SKIP.iter().any(|w| lower.contains(w)) {
                    return None;
                }
                Some(Product {
                    manufacturer,
                    model: None,
                    product_type: None,
                    specs: BTreeMap::new(),
                    context: char_window(line.text, found.start(), found.end(), 50, 50).to_string(),
                    page: line.page,
                    csi_section: None,
                })
            })
            .collect()
    }

    fn product(&self, manufacturer: String, model: Option<String>, line: &TextLine<'_>) -> Product {
        Product {
            manufacturer,
            model,
            product_type: self.product_type(line.text),
            specs: self.specs(line.text),
            context: truncate_chars(line.text, CONTEXT_LIMIT),
            page: line.page,
            csi_section: None,
        }
    }

    /// First matching type in table order, lower case.
    pub fn product_type(&self, text: &str) -> Option<String> {
        self.product_types
            .iter()
            .find_map(|pattern| pattern.captures(text))
            .map(|caps| caps[1].to_lowercase())
    }

    pub fn specs(&self, text: &str) -> BTreeMap<String, String> {
        let mut specs = BTreeMap::new();
        if let Some(caps) = self.dimension.captures(text) {
            let dims: Vec<&str> = (1..=3).filter_map(|i| caps.get(i)).map(|m| m.as_str()).collect();
            let unit = caps.get(4).map_or("", |m| m.as_str());
            specs.insert(
                "dimension".to_string(),
                format!("{} {}", dims.join(" x "), unit).trim().to_string(),
            );
        }
        for (name, pattern) in &self.specs {
            if let Some(caps) = pattern.captures(text) {
                specs.insert(name.to_string(), caps[1].trim().to_string());
            }
        }
        specs
    }
}

/// Single spaces, no trailing punctuation.
fn clean_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', ',', ';', ':'])
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::BBox;
    use pretty_assertions::assert_eq;

    fn line(page: u32, text: &str) -> TextLine<'_> {
        TextLine {
            page,
            text,
            bbox: BBox::new(0.0, 0.0, 100.0, 10.0),
            font_size: 10.0,
        }
    }

    fn extractor() -> ProductExtractor {
        ProductExtractor::new().unwrap()
    }

    #[test]
    fn reads_maker_and_product_from_pipe_form() {
        let products = extractor().extract(&[line(4, "CGC | Panneau Sheetrock 16 mm")], &[]);
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].manufacturer, "CGC");
        assert_eq!(products[0].model.as_deref(), Some("Panneau Sheetrock 16 mm"));
        assert_eq!(products[0].page, 4);
    }

    #[test]
    fn reads_introduced_maker_with_model_and_specs() {
        let text = "Porte d'acier, fabricant : Baron Metal. Modèle : BM-200, 914 x 2134 mm, couleur : gris.";
        let products = extractor().extract(&[line(2, text)], &[]);
        assert_eq!(products.len(), 1);
        let door = &products[0];
        assert_eq!(door.manufacturer, "Baron Metal");
        assert_eq!(door.model.as_deref(), Some("BM-200"));
        assert_eq!(door.product_type.as_deref(), Some("porte"));
        assert_eq!(door.specs.get("dimension").map(String::as_str), Some("914 x 2134 mm"));
        assert_eq!(door.specs.get("color").map(String::as_str), Some("gris"));
    }

    #[test]
    fn reads_dash_lists_of_makers() {
        let lines = [
            line(7, "- Armstrong (ou équivalent approuvé)"),
            line(7, "- CertainTeed"),
            line(7, "- Voir section 09 51 13"),
        ];
        let makers: Vec<String> = extractor()
            .extract(&lines, &[])
            .into_iter()
            .map(|p| p.manufacturer)
            .collect();
        assert_eq!(makers, vec!["Armstrong", "CertainTeed"]);
    }

    #[test]
    fn skips_function_words_and_duplicates() {
        let lines = [
            line(1, "Et de | Autre chose"),
            line(1, "Fabricant : Sico."),
            line(3, "Fabricant : SICO."),
        ];
        let products = extractor().extract(&lines, &[]);
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].page, 1);
    }
}
