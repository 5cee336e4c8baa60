//! Offline language detection.
//!
//! Used when the translation service cannot detect a language. Non-Latin
//! scripts map straight to a language; Latin text is scored against short
//! stop-word lists.

use serde::{Deserialize, Serialize};

use crate::core::LanguageCode;

/// A detected language with confidence in 0.0-1.0
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedLanguage {
    pub language: LanguageCode,
    pub confidence: f32,
}

impl DetectedLanguage {
    pub fn new(language: &str, confidence: f32) -> Self {
        Self {
            language: language.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Undetermined language
    pub fn undetermined() -> Self {
        Self::new("und", 0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Script {
    Latin,
    Cyrillic,
    Greek,
    Arabic,
    Hebrew,
    Devanagari,
    Thai,
    Hangul,
    Kana,
    Han,
}

impl Script {
    fn of(c: char) -> Option<Self> {
        let script = match c as u32 {
            0x0041..=0x005A | 0x0061..=0x007A | 0x00C0..=0x024F => Self::Latin,
            0x0370..=0x03FF => Self::Greek,
            0x0400..=0x04FF => Self::Cyrillic,
            0x0590..=0x05FF => Self::Hebrew,
            0x0600..=0x06FF => Self::Arabic,
            0x0900..=0x097F => Self::Devanagari,
            0x0E00..=0x0E7F => Self::Thai,
            0x1100..=0x11FF | 0xAC00..=0xD7AF => Self::Hangul,
            0x3040..=0x30FF => Self::Kana,
            0x4E00..=0x9FFF | 0x3400..=0x4DBF => Self::Han,
            _ => return None,
        };
        Some(script)
    }

    fn language(self) -> Option<&'static str> {
        match self {
            Self::Latin => None,
            Self::Cyrillic => Some("ru"),
            Self::Greek => Some("el"),
            Self::Arabic => Some("ar"),
            Self::Hebrew => Some("he"),
            Self::Devanagari => Some("hi"),
            Self::Thai => Some("th"),
            Self::Hangul => Some("ko"),
            Self::Kana => Some("ja"),
            Self::Han => Some("zh"),
        }
    }
}

const STOP_WORDS: &[(&str, &[&str])] = &[
    (
        "en",
        &["the", "and", "is", "of", "to", "in", "that", "it", "you", "was", "for", "are", "with", "this", "what"],
    ),
    (
        "es",
        &["el", "la", "de", "que", "y", "en", "los", "las", "es", "por", "una", "con", "para", "del", "está"],
    ),
    (
        "fr",
        &["le", "la", "les", "de", "et", "est", "un", "une", "des", "que", "pas", "pour", "dans", "ce", "je"],
    ),
    (
        "de",
        &["der", "die", "das", "und", "ist", "nicht", "ein", "eine", "ich", "zu", "mit", "den", "auf", "sie", "es"],
    ),
    (
        "pt",
        &["o", "a", "de", "que", "e", "do", "da", "em", "um", "uma", "não", "para", "os", "com", "é"],
    ),
    (
        "it",
        &["il", "la", "di", "che", "e", "è", "un", "una", "per", "non", "sono", "con", "del", "gli", "lo"],
    ),
];

/// Detects the language of `text` from its script and common words
pub fn detect_offline(text: &str) -> Option<DetectedLanguage> {
    let mut counts: Vec<(Script, usize)> = Vec::new();
    let mut letters = 0usize;
    for script in text.chars().filter_map(Script::of) {
        letters += 1;
        match counts.iter_mut().find(|(s, _)| *s == script) {
            Some((_, n)) => *n += 1,
            None => counts.push((script, 1)),
        }
    }
    if letters == 0 {
        return None;
    }

    // Japanese mixes kana with Han characters
    if counts.iter().any(|(s, _)| *s == Script::Kana) {
        let cjk: usize = counts
            .iter()
            .filter(|(s, _)| matches!(s, Script::Kana | Script::Han))
            .map(|(_, n)| n)
            .sum();
        return Some(DetectedLanguage::new("ja", cjk as f32 / letters as f32));
    }

    let (script, count) = counts.iter().copied().max_by_key(|(_, n)| *n)?;
    let share = count as f32 / letters as f32;
    match script.language() {
        Some(language) => Some(DetectedLanguage::new(language, share)),
        None => detect_latin(text).map(|(language, ratio)| DetectedLanguage::new(language, share * ratio)),
    }
}

fn detect_latin(text: &str) -> Option<(&'static str, f32)> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();

    let scores: Vec<(&'static str, usize)> = STOP_WORDS
        .iter()
        .map(|(language, stop_words)| {
            let hits = words.iter().filter(|w| stop_words.contains(*w)).count();
            (*language, hits)
        })
        .collect();

    let total: usize = scores.iter().map(|(_, hits)| hits).sum();
    // First listed language wins ties
    let (language, best) = scores
        .iter()
        .copied()
        .fold(None::<(&'static str, usize)>, |best, (language, hits)| match best {
            Some((_, top)) if top >= hits => best,
            _ => Some((language, hits)),
        })?;
    if best == 0 {
        return None;
    }
    Some((language, best as f32 / total as f32))
}
