use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::devis::{is_upper, truncate_chars, SpecConfig, TextLine};

/// Character-weighted usage of each font size, rounded to 0.1 pt.
#[derive(Debug, Clone, Default)]
pub struct FontStats {
    sizes: BTreeMap<i32, usize>,
}

fn size_key(size: f32) -> i32 {
    (size * 10.0).round() as i32
}

impl FontStats {
    pub fn from_lines(lines: &[TextLine<'_>]) -> Self {
        let mut sizes: BTreeMap<i32, usize> = BTreeMap::new();
        for line in lines {
            *sizes.entry(size_key(line.font_size)).or_default() += line.text.chars().count();
        }
        Self { sizes }
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    fn dominant_key(&self) -> Option<i32> {
        self.sizes
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(key, _)| *key)
    }

    /// Body text size: the one carrying the most characters.
    pub fn dominant(&self) -> Option<f32> {
        self.dominant_key().map(|key| key as f32 / 10.0)
    }

    /// Sizes above the body size, most used first.
    pub fn title_sizes(&self, limit: usize) -> Vec<f32> {
        let Some(body) = self.dominant_key() else {
            return Vec::new();
        };
        let mut larger: Vec<(i32, usize)> = self
            .sizes
            .iter()
            .filter(|(key, _)| **key > body)
            .map(|(key, count)| (*key, *count))
            .collect();
        larger.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
        larger
            .into_iter()
            .take(limit)
            .map(|(key, _)| key as f32 / 10.0)
            .collect()
    }

    pub fn is_title(&self, line: &TextLine<'_>) -> bool {
        let larger = self
            .dominant_key()
            .is_some_and(|body| size_key(line.font_size) > body);
        larger || (is_upper(line.text) && line.text.chars().count() > 3)
    }

    /// 1 for headings at least 4 pt above body text, 2 for at least 2 pt,
    /// 3 otherwise.
    pub fn level(&self, line: &TextLine<'_>) -> u8 {
        let body = self.dominant().unwrap_or(10.0);
        let diff = line.font_size - body;
        if diff >= 4.0 {
            1
        } else if diff >= 2.0 {
            2
        } else {
            3
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub title: String,
    pub level: u8,
    pub page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csi_code: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsections: Vec<Section>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CsiReference {
    /// Normalized to `DD DD DD`.
    pub code: String,
    pub division: String,
    #[serde(default)]
    pub title: String,
    pub context: String,
    pub page: u32,
    pub is_header: bool,
}

pub struct SectionExtractor {
    csi: Regex,
}

impl SectionExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            csi: Regex::new(r"\b(\d{2})[\s\-]+(\d{2})[\s\-]+(\d{2})\b")?,
        })
    }

    pub fn csi_code(&self, text: &str) -> Option<String> {
        self.csi
            .captures(text)
            .map(|caps| format!("{} {} {}", &caps[1], &caps[2], &caps[3]))
    }

    /// Heading tree in reading order. Text before the first heading is
    /// dropped.
    pub fn outline(&self, lines: &[TextLine<'_>], fonts: &FontStats, config: &SpecConfig) -> Vec<Section> {
        let mut ordered: Vec<&TextLine<'_>> = lines.iter().collect();
        ordered.sort_by(|a, b| {
            a.page
                .cmp(&b.page)
                .then(a.bbox.y0.total_cmp(&b.bbox.y0))
                .then(a.bbox.x0.total_cmp(&b.bbox.x0))
        });

        let mut roots: Vec<Section> = Vec::new();
        let mut open: Vec<Section> = Vec::new();
        for line in ordered {
            if fonts.is_title(line) {
                let level = fonts.level(line);
                close_sections(&mut open, &mut roots, level, config.max_content);
                open.push(Section {
                    title: line.text.to_string(),
                    level,
                    page: line.page,
                    csi_code: self.csi_code(line.text),
                    content: String::new(),
                    subsections: Vec::new(),
                });
            } else if let Some(current) = open.last_mut() {
                if !current.content.is_empty() {
                    current.content.push('\n');
                }
                current.content.push_str(line.text);
            }
        }
        close_sections(&mut open, &mut roots, 0, config.max_content);
        roots
    }

    /// Every MasterFormat code with the lines around it, one entry per code.
    /// A later occurrence replaces the first only when it found a title and
    /// the first did not.
    pub fn csi_references(
        &self,
        lines: &[TextLine<'_>],
        fonts: &FontStats,
        config: &SpecConfig,
    ) -> Vec<CsiReference> {
        let mut by_page: BTreeMap<u32, Vec<&TextLine<'_>>> = BTreeMap::new();
        for line in lines {
            by_page.entry(line.page).or_default().push(line);
        }

        let mut refs: Vec<CsiReference> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for (page, mut page_lines) in by_page {
            page_lines.sort_by(|a, b| {
                a.bbox
                    .y0
                    .total_cmp(&b.bbox.y0)
                    .then(a.bbox.x0.total_cmp(&b.bbox.x0))
            });

            for (idx, line) in page_lines.iter().enumerate() {
                for caps in self.csi.captures_iter(line.text) {
                    let code = format!("{} {} {}", &caps[1], &caps[2], &caps[3]);
                    let meaningful = |l: &&&TextLine<'_>| l.text.chars().count() > 3;
                    let before: Vec<&str> = page_lines[idx.saturating_sub(config.context_before)..idx]
                        .iter()
                        .filter(meaningful)
                        .map(|l| l.text)
                        .collect();
                    let after_end = (idx + 1 + config.context_after).min(page_lines.len());
                    let after: Vec<&str> = page_lines[idx + 1..after_end]
                        .iter()
                        .filter(meaningful)
                        .map(|l| l.text)
                        .collect();

                    // Headings read "SECTION 09 91 23" followed by the title,
                    // so lines after the code are tried before lines above it.
                    let title = after
                        .iter()
                        .chain(before.iter().rev())
                        .find(|text| is_title_text(text))
                        .map(|text| text.to_string())
                        .unwrap_or_default();

                    let context = before
                        .iter()
                        .chain(std::iter::once(&line.text))
                        .chain(after.iter())
                        .copied()
                        .collect::<Vec<&str>>()
                        .join(" | ");

                    let reference = CsiReference {
                        division: caps[1].to_string(),
                        title,
                        context: truncate_chars(&context, config.max_context),
                        page,
                        is_header: fonts.is_title(line),
                        code,
                    };
                    match seen.get(&reference.code) {
                        Some(&at) => {
                            if refs[at].title.is_empty() && !reference.title.is_empty() {
                                refs[at] = reference;
                            }
                        }
                        None => {
                            seen.insert(reference.code.clone(), refs.len());
                            refs.push(reference);
                        }
                    }
                }
            }
        }
        refs
    }
}

fn is_title_text(text: &str) -> bool {
    is_upper(text) && text.chars().count() > 5 && !text.starts_with("SECTION")
}

/// Closes every open section at `level` or deeper, attaching each to its
/// parent.
fn close_sections(open: &mut Vec<Section>, roots: &mut Vec<Section>, level: u8, max_content: usize) {
    while let Some(mut done) = open.pop() {
        if done.level < level {
            open.push(done);
            break;
        }
        done.content = truncate_chars(&done.content, max_content);
        match open.last_mut() {
            Some(parent) => parent.subsections.push(done),
            None => roots.push(done),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::BBox;
    use pretty_assertions::assert_eq;

    fn line(page: u32, text: &str, y: f32, size: f32) -> TextLine<'_> {
        TextLine {
            page,
            text,
            bbox: BBox::new(72.0, y, 400.0, y + size),
            font_size: size,
        }
    }

    fn body(page: u32, text: &str, y: f32) -> TextLine<'_> {
        line(page, text, y, 10.0)
    }

    #[test]
    fn normalizes_code_separators() {
        let extractor = SectionExtractor::new().unwrap();
        assert_eq!(extractor.csi_code("Section 09-91-23"), Some("09 91 23".to_string()));
        assert_eq!(extractor.csi_code("SECTION 08 11 13"), Some("08 11 13".to_string()));
        assert_eq!(extractor.csi_code("ligne 123 456"), None);
    }

    #[test]
    fn builds_heading_tree_from_font_sizes() {
        let lines = vec![
            line(1, "SECTION 09 91 23", 50.0, 16.0),
            line(1, "1.1 Généralités", 80.0, 12.0),
            body(1, "Texte courant des travaux de peinture sur les murs.", 100.0),
            body(1, "Deuxième ligne de texte courant assez longue.", 112.0),
            line(1, "1.2 Produits", 130.0, 12.0),
            body(1, "Peinture latex acrylique approuvée par le professionnel.", 150.0),
            line(2, "SECTION 09 30 13", 50.0, 16.0),
        ];
        let fonts = FontStats::from_lines(&lines);
        let extractor = SectionExtractor::new().unwrap();
        let outline = extractor.outline(&lines, &fonts, &SpecConfig::default());

        assert_eq!(outline.len(), 2);
        assert_eq!(outline[0].csi_code.as_deref(), Some("09 91 23"));
        assert_eq!(outline[0].level, 1);
        let subs: Vec<&str> = outline[0].subsections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(subs, vec!["1.1 Généralités", "1.2 Produits"]);
        assert_eq!(
            outline[0].subsections[0].content,
            "Texte courant des travaux de peinture sur les murs.\nDeuxième ligne de texte courant assez longue."
        );
        assert_eq!(outline[1].page, 2);
    }

    #[test]
    fn content_is_truncated() {
        let lines = vec![
            line(1, "SECTION 01 00 00", 50.0, 16.0),
            body(1, "abcdefghij abcdefghij abcdefghij abcdefghij", 80.0),
        ];
        let fonts = FontStats::from_lines(&lines);
        let config = SpecConfig {
            max_content: 10,
            ..SpecConfig::default()
        };
        let outline = SectionExtractor::new().unwrap().outline(&lines, &fonts, &config);
        assert_eq!(outline[0].content, "abcdefghij");
    }

    #[test]
    fn keeps_titled_occurrence_of_a_code() {
        let lines = vec![
            body(3, "Voir la section 09 91 23 pour les finis.", 100.0),
            body(3, "Autres exigences générales du projet.", 112.0),
            line(5, "SECTION 09 91 23", 50.0, 16.0),
            line(5, "PEINTURE", 70.0, 16.0),
        ];
        let fonts = FontStats::from_lines(&lines);
        let extractor = SectionExtractor::new().unwrap();
        let refs = extractor.csi_references(&lines, &fonts, &SpecConfig::default());
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].page, 5);
        assert_eq!(refs[0].title, "PEINTURE");
        assert_eq!(refs[0].division, "09");
        assert!(refs[0].is_header);
        assert_eq!(refs[0].context, "SECTION 09 91 23 | PEINTURE");
    }
}
