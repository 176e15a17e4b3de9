use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::core::error::RoomError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Room designations, compared after accent folding and with dots and
    /// spaces removed ("S.D.B." matches "SDB").
    pub lexicon: Vec<String>,
    /// Also accept all-caps words outside the lexicon.
    pub uppercase_heuristic: bool,
    pub min_name_len: usize,
    pub max_name_len: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        let lexicon = [
            "CLASSE", "CLASS", "CORRIDOR", "CORR", "SDB", "SALLEDEBAIN", "WC", "TOILET",
            "TOILETS", "TOILETT", "TOILETTE", "TOILETTES", "RANG", "RANGEMENT", "MEC",
            "MECANIQUE", "ELEC", "ELECTRIQUE", "CONCIERGERIE", "CONC", "BUREAU", "BUR",
            "SECRETARIAT", "SECR", "DIRECTION", "DIR", "VESTIAIRE", "VEST", "CUISINE", "CUIS",
            "GYMNASE", "GYM", "BIBLIOTHEQUE", "BIBLIO", "SALLE", "LOCAL", "ENTREE", "HALL",
            "ESCALIER", "ESC", "ASCENSEUR", "ASC",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        Self {
            lexicon,
            uppercase_heuristic: true,
            min_name_len: 3,
            max_name_len: 32,
        }
    }
}

/// A span recognised as a room number, before block context is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomNumberToken {
    pub block: Option<String>,
    pub number: String,
    pub letter: Option<char>,
    pub suffix: Option<String>,
    pub pattern_confidence: f32,
}

impl RoomNumberToken {
    /// `<block>-<number>[letter][-<suffix>]`, e.g. `A-102-1`. The token's own
    /// block letter wins over the page context.
    pub fn canonical_id(&self, block_context: Option<&str>) -> Result<String, RoomError> {
        let block = self
            .block
            .as_deref()
            .or(block_context)
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| RoomError::NoBlockContext(self.raw_number()))?;
        Ok(format!("{}-{}", block.to_uppercase(), self.raw_number()))
    }

    fn raw_number(&self) -> String {
        let mut out = self.number.clone();
        if let Some(letter) = self.letter {
            out.push(letter);
        }
        if let Some(suffix) = &self.suffix {
            out.push('-');
            out.push_str(suffix);
        }
        out
    }

    pub fn floor(&self) -> Option<u32> {
        floor_of(&self.number)
    }
}

/// Leading digit of a 3 or 4 digit room number (`204` is on floor 2).
pub fn floor_of(number: &str) -> Option<u32> {
    if !(3..=4).contains(&number.len()) {
        return None;
    }
    number.chars().next().and_then(|c| c.to_digit(10))
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpanKind {
    Number(RoomNumberToken),
    Name(String),
    Other,
}

/// Classifies span text as a room number, a room name, or neither.
#[derive(Debug, Clone)]
pub struct RoomMatcher {
    config: MatcherConfig,
    number: Regex,
    folded_lexicon: Vec<String>,
}

impl RoomMatcher {
    pub fn new(config: MatcherConfig) -> Result<Self, regex::Error> {
        let folded_lexicon = config.lexicon.iter().map(|w| squash(&fold(w))).collect();
        Ok(Self {
            config,
            number: room_number_regex()?,
            folded_lexicon,
        })
    }

    pub fn classify(&self, text: &str) -> SpanKind {
        if let Some(token) = self.match_number(text) {
            SpanKind::Number(token)
        } else if self.is_room_name(text) {
            SpanKind::Name(normalize(text))
        } else {
            SpanKind::Other
        }
    }

    pub fn match_number(&self, text: &str) -> Option<RoomNumberToken> {
        let text = normalize(text).to_uppercase();
        let caps = self.number.captures(&text)?;
        let number = caps.name("number")?.as_str().to_string();
        let letter = caps.name("letter").and_then(|m| m.as_str().chars().next());
        let suffix = caps.name("suffix").map(|m| m.as_str().to_string());

        let pattern_confidence = if number.len() != 3 {
            0.8
        } else if letter.is_some() {
            0.95
        } else {
            1.0
        };

        Some(RoomNumberToken {
            block: caps.name("block").map(|m| m.as_str().to_string()),
            number,
            letter,
            suffix,
            pattern_confidence,
        })
    }

    pub fn is_room_name(&self, text: &str) -> bool {
        let text = normalize(text);
        if text.is_empty() {
            return false;
        }
        let folded = fold(&text);
        let squashed = squash(&folded);
        if squashed.is_empty() {
            return false;
        }
        if self.folded_lexicon.iter().any(|w| *w == squashed) {
            return true;
        }
        self.config.uppercase_heuristic && self.looks_like_designation(&text)
    }

    fn looks_like_designation(&self, text: &str) -> bool {
        let len = text.chars().count();
        if len < self.config.min_name_len || len > self.config.max_name_len {
            return false;
        }
        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        letters >= self.config.min_name_len
            && text
                .chars()
                .all(|c| c.is_uppercase() || matches!(c, ' ' | '.' | '-' | '\'' | '/'))
    }
}

/// Accepts `101`, `A-101`, `B204`, `101A`, `102-1`, `102.1`, `A-102-1` and
/// 2 or 4 digit numbers.
pub(crate) fn room_number_regex() -> Result<Regex, regex::Error> {
    Regex::new(
        r"^(?:(?P<block>[A-Z])-?)?(?P<number>\d{2,4})(?P<letter>[A-Z])?(?:[-.](?P<suffix>\d{1,2}))?$",
    )
}

/// NFC form with surrounding whitespace removed and inner runs collapsed.
pub fn normalize(text: &str) -> String {
    text.nfc()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Uppercase with accents stripped.
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_uppercase()
}

fn squash(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '.' | ' ')).collect()
}
