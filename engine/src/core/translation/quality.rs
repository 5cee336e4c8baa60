//! Advisory translation quality heuristics.
//!
//! Scores are cheap plausibility checks. They are stored on the record and
//! shown to reviewers but never block saving a translation.

/// Length ratio window considered plausible for ordinary sentences
const RATIO_WINDOW: (f32, f32) = (0.5, 2.0);
/// Short phrases vary a lot in length between languages
const SHORT_RATIO_WINDOW: (f32, f32) = (0.25, 4.0);
const SHORT_TEXT_CHARS: usize = 10;

/// Scores a translation between 0.0 (implausible) and 1.0.
///
/// - empty output for non-empty input scores 0
/// - the translated/original length ratio must fall inside a window
/// - output identical to a multi-word input is probably untranslated
/// - numbers in the input should survive translation
pub fn validate_quality(original: &str, translated: &str) -> f32 {
    let original = original.trim();
    let translated = translated.trim();

    if original.is_empty() {
        return if translated.is_empty() { 1.0 } else { 0.5 };
    }
    if translated.is_empty() {
        return 0.0;
    }

    let original_len = original.chars().filter(|c| !c.is_whitespace()).count().max(1);
    let translated_len = translated.chars().filter(|c| !c.is_whitespace()).count();
    let ratio = translated_len as f32 / original_len as f32;

    let (low, high) = if original_len < SHORT_TEXT_CHARS {
        SHORT_RATIO_WINDOW
    } else {
        RATIO_WINDOW
    };
    let mut score = if ratio < low {
        ratio / low
    } else if ratio > high {
        high / ratio
    } else {
        1.0
    };

    let multi_word = original.split_whitespace().count() >= 2;
    if multi_word && original.to_lowercase() == translated.to_lowercase() {
        score *= 0.5;
    }

    let missing_numbers = numbers(original)
        .into_iter()
        .filter(|n| !translated.contains(n.as_str()))
        .count();
    if missing_numbers > 0 {
        score *= 0.8;
    }

    score.clamp(0.0, 1.0)
}

/// Mean score over aligned pairs; `None` for no pairs
pub fn mean_quality<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Option<f32> {
    let (sum, count) = pairs
        .into_iter()
        .fold((0.0f32, 0usize), |(sum, count), (o, t)| {
            (sum + validate_quality(o, t), count + 1)
        });
    (count > 0).then(|| sum / count as f32)
}

fn numbers(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
