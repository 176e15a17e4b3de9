use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::devis::{char_window, TextLine};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    /// "local 101", "classe 204".
    Local,
    /// A plan room code such as "A-101" or "101A".
    Code,
    /// "plan A-1", a drawing sheet rather than a room.
    Drawing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalReference {
    pub room_ref: String,
    pub kind: ReferenceKind,
    pub context: String,
    pub page: u32,
}

impl LocalReference {
    /// Upper case without separators, e.g. `A101`.
    pub fn compact(&self) -> String {
        compact(&self.room_ref)
    }

    pub fn names_a_room(&self) -> bool {
        self.kind != ReferenceKind::Drawing
    }
}

pub(crate) fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '-' | ' ' | '.'))
        .collect::<String>()
        .to_uppercase()
}

const STANDARD_BODIES: [&str; 5] = ["CSA", "ASTM", "ANSI", "ISO", "NORM"];

/// Finds room numbers cited in running text while leaving out standard
/// designations (CSA A123, ASTM C979) and years.
pub struct ReferenceExtractor {
    room: Regex,
    standard: Regex,
}

impl ReferenceExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            room: Regex::new(
                r"(?i)\b(?:(?:local|pièce|salle|classe|bureau)[\s\-]*(\d{3,})|([A-Z]{1,2}-?\d{3}[A-Z]?)|(?:plan|dessin|drawing)\s+([A-Z]-?\d+))",
            )?,
            standard: Regex::new(
                r"(?i)^(?:(?:CSA|ASTM|CAN|ISO|ANSI|NFPA|ULC)[\s\-]*[A-Z]?\d+|[A-Z]\d{3,5}|\d{4,})\b",
            )?,
        })
    }

    /// First mention of each reference, in document order.
    pub fn extract(&self, lines: &[TextLine<'_>]) -> Vec<LocalReference> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut refs = Vec::new();
        for line in lines {
            for caps in self.room.captures_iter(line.text) {
                let (found, kind) = match (caps.get(1), caps.get(2), caps.get(3)) {
                    (Some(m), _, _) => (m, ReferenceKind::Local),
                    (_, Some(m), _) => (m, ReferenceKind::Code),
                    (_, _, Some(m)) => (m, ReferenceKind::Drawing),
                    _ => continue,
                };
                let room_ref = found.as_str();
                if self.standard.is_match(room_ref) {
                    continue;
                }
                let Some(whole) = caps.get(0) else {
                    continue;
                };
                let context = char_window(line.text, whole.start(), whole.end(), 30, 50);
                let upper = context.to_uppercase();
                if STANDARD_BODIES.iter().any(|body| upper.contains(body)) {
                    debug!(page = line.page, room_ref, "reference next to a standard, skipped");
                    continue;
                }
                if seen.insert(room_ref.to_uppercase()) {
                    refs.push(LocalReference {
                        room_ref: room_ref.to_string(),
                        kind,
                        context: context.to_string(),
                        page: line.page,
                    });
                }
            }
        }
        refs
    }
}
