//! Cue Grouping
//!
//! Packs word-timed transcript segments into display cues, then resolves
//! timing so cues never overlap and stay within the style's display window.

use super::models::Cue;
use crate::core::styles::StyleSettings;
use crate::core::transcripts::{TranscriptSegment, Word};
use crate::core::{CoreError, CoreResult, TimeSec};

/// Groups segments into cues according to the style's line settings.
///
/// Within a segment, words are packed while the cue holds at most
/// `words_per_line * max_lines` words and lasts no longer than
/// `max_display_duration`; a break always falls between words. Cues from
/// different segments only join when the earlier one is too short to show.
pub fn group_cues(segments: &[TranscriptSegment], settings: &StyleSettings) -> CoreResult<Vec<Cue>> {
    let max_words = settings.max_words_per_cue();
    let max_duration = settings.max_display_duration;

    let mut ordered: Vec<&TranscriptSegment> = segments.iter().collect();
    ordered.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));

    let mut cues = Vec::new();
    for segment in ordered {
        if !segment.start_sec.is_finite() || !segment.end_sec.is_finite() {
            return Err(CoreError::SubtitleGeneration(format!(
                "Segment {} has non-finite timestamps",
                segment.id
            )));
        }

        let mut current: Vec<Word> = Vec::new();
        for word in segment.word_timings() {
            if let Some(first) = current.first() {
                let too_many = current.len() >= max_words;
                let too_long = word.end_sec - first.start_sec > max_duration;
                if too_many || too_long {
                    cues.push(build_cue(std::mem::take(&mut current), settings));
                }
            }
            current.push(word);
        }
        if !current.is_empty() {
            cues.push(build_cue(current, settings));
        }
    }

    cues.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));
    let mut cues = merge_crowded_cues(cues, settings);
    resolve_timing(&mut cues, settings.min_display_duration, max_duration);
    Ok(cues)
}

/// Folds a cue into the one before it when the earlier cue could not stay
/// up for `min_display_duration` and the pair fits the word and duration
/// limits. Keeps rapid speech on its own timestamps instead of stretching
/// every cue and pushing the rest of the transcript later.
fn merge_crowded_cues(cues: Vec<Cue>, settings: &StyleSettings) -> Vec<Cue> {
    let max_words = settings.max_words_per_cue();
    let min = settings.min_display_duration;
    let max = settings.max_display_duration;

    let mut merged: Vec<Cue> = Vec::with_capacity(cues.len());
    for cue in cues {
        if let Some(last) = merged.last_mut() {
            let crowded = cue.start_sec < last.start_sec + min;
            let fits = last.words.len() + cue.words.len() <= max_words
                && cue.end_sec.max(last.end_sec) - last.start_sec <= max;
            if crowded && fits {
                let mut words = std::mem::take(&mut last.words);
                words.extend(cue.words);
                *last = build_cue(words, settings);
                continue;
            }
        }
        merged.push(cue);
    }
    merged
}

/// Lays words out in lines of `words_per_line`
fn build_cue(words: Vec<Word>, settings: &StyleSettings) -> Cue {
    let per_line = settings.words_per_line.max(1) as usize;
    let lines = words
        .chunks(per_line)
        .map(|chunk| {
            chunk
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    Cue {
        start_sec: words.first().map(|w| w.start_sec).unwrap_or(0.0),
        end_sec: words.last().map(|w| w.end_sec).unwrap_or(0.0),
        lines,
        words,
    }
}

/// Longest a cue's start may be held back behind its first word
pub const MAX_START_DELAY: TimeSec = 0.25;

/// Shortest cue ever emitted, one SRT millisecond tick above zero
const MIN_CUE_SEC: TimeSec = 0.01;

/// Enforces the display window and removes overlaps.
///
/// Each cue is stretched to at least `min` and cut to at most `max`. A cue
/// that runs into the next one is clamped to the next start. A cue left
/// shorter than `min` may hold the next cue back by at most
/// [`MAX_START_DELAY`] past that cue's own first word, so delays never
/// accumulate across the transcript.
pub fn resolve_timing(cues: &mut [Cue], min: TimeSec, max: TimeSec) {
    let min = min.max(0.0);
    let max = max.max(min);

    cues.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));

    for i in 0..cues.len() {
        if i > 0 && cues[i].start_sec < cues[i - 1].end_sec {
            cues[i].start_sec = cues[i - 1].end_sec;
        }

        let start = cues[i].start_sec;
        let mut end = cues[i].end_sec.clamp(start + min, start + max);

        if let Some(next) = cues.get(i + 1) {
            let spoken = next.start_sec;
            if end > spoken {
                let latest = (spoken + MAX_START_DELAY).min(start + min);
                end = latest.max(spoken).max(start + MIN_CUE_SEC);
            }
        }

        cues[i].end_sec = end;
        clamp_word_times(&mut cues[i]);
    }
}

/// Keeps karaoke word timings inside the (possibly moved) cue
fn clamp_word_times(cue: &mut Cue) {
    let (start, end) = (cue.start_sec, cue.end_sec);
    for word in &mut cue.words {
        word.start_sec = word.start_sec.clamp(start, end);
        word.end_sec = word.end_sec.clamp(word.start_sec, end);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn words(timings: &[(&str, f64, f64)]) -> Vec<Word> {
        timings.iter().map(|(t, s, e)| Word::new(t, *s, *e)).collect()
    }

    fn evenly_timed(start: f64, count: usize, step: f64) -> TranscriptSegment {
        let words = (0..count)
            .map(|i| {
                let s = start + i as f64 * step;
                Word::new(&format!("w{i}"), s, s + step * 0.9)
            })
            .collect();
        TranscriptSegment::from_words(words)
    }

    fn assert_well_formed(cues: &[Cue], settings: &StyleSettings) {
        for pair in cues.windows(2) {
            assert!(
                pair[0].end_sec <= pair[1].start_sec,
                "overlap: {:?} / {:?}",
                pair[0],
                pair[1]
            );
        }
        for (i, cue) in cues.iter().enumerate() {
            let d = cue.duration();
            // Only a cue cut off by the next one may fall short of the minimum
            let cut_off = cues.get(i + 1).is_some_and(|next| (next.start_sec - cue.end_sec).abs() < 1e-9);
            assert!(
                d >= settings.min_display_duration - 1e-9 || cut_off,
                "cue {i} too short: {d}"
            );
            assert!(d > 0.0, "cue {i} is empty");
            if i + 1 < cues.len() {
                assert!(d <= settings.max_display_duration + 1e-9, "cue {i} too long: {d}");
            }
            assert!(cue.lines.len() <= settings.max_lines as usize);
        }
    }

    #[test]
    fn test_one_cue_per_short_segment() {
        let settings = StyleSettings::default();
        let segments: Vec<_> = (0..10)
            .map(|i| {
                let start = i as f64 * 3.0;
                TranscriptSegment::new(start, start + 2.0, "hello there friend")
            })
            .collect();

        let cues = group_cues(&segments, &settings).unwrap();
        assert_eq!(cues.len(), 10);
        assert_well_formed(&cues, &settings);
    }

    #[test]
    fn test_splits_on_word_count() {
        let settings = StyleSettings {
            words_per_line: 2,
            max_lines: 2,
            ..Default::default()
        };
        let segment = evenly_timed(0.0, 9, 0.3);

        let cues = group_cues(&[segment], &settings).unwrap();

        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].lines, vec!["w0 w1", "w2 w3"]);
        assert_eq!(cues[2].lines, vec!["w8"]);
        assert_well_formed(&cues, &settings);
    }

    #[test]
    fn test_splits_long_sentence_on_duration() {
        let settings = StyleSettings {
            words_per_line: 10,
            max_lines: 2,
            max_display_duration: 2.0,
            ..Default::default()
        };
        // 10 words at 0.5s each: 5 seconds of speech, ceiling is 2 seconds
        let segment = evenly_timed(0.0, 10, 0.5);

        let cues = group_cues(&[segment], &settings).unwrap();

        assert!(cues.len() >= 3);
        let total_words: usize = cues.iter().map(|c| c.words.len()).sum();
        assert_eq!(total_words, 10);
        assert_well_formed(&cues, &settings);
    }

    #[test]
    fn test_overlapping_segments_are_clamped() {
        let settings = StyleSettings::default();
        let segments = vec![
            TranscriptSegment::new(0.0, 3.0, "first segment"),
            TranscriptSegment::new(2.0, 4.0, "second segment"),
        ];

        let cues = group_cues(&segments, &settings).unwrap();

        assert_eq!(cues[0].end_sec, 2.0);
        assert_eq!(cues[1].start_sec, 2.0);
        assert_well_formed(&cues, &settings);
    }

    #[test]
    fn test_short_cue_merges_into_next() {
        let settings = StyleSettings {
            min_display_duration: 1.0,
            ..Default::default()
        };
        let segments = vec![
            TranscriptSegment::new(0.0, 0.3, "hi"),
            TranscriptSegment::new(0.5, 2.0, "there"),
        ];

        let cues = group_cues(&segments, &settings).unwrap();

        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].lines, vec!["hi there"]);
        assert_eq!(cues[0].start_sec, 0.0);
        assert_eq!(cues[0].end_sec, 2.0);
        assert_well_formed(&cues, &settings);
    }

    #[test]
    fn test_short_cue_holds_next_back_briefly() {
        let settings = StyleSettings {
            words_per_line: 1,
            max_lines: 1,
            min_display_duration: 1.0,
            ..Default::default()
        };
        let segments = vec![
            TranscriptSegment::new(0.0, 0.3, "hi"),
            TranscriptSegment::new(0.5, 2.0, "there"),
        ];

        let cues = group_cues(&segments, &settings).unwrap();

        assert_eq!(cues.len(), 2);
        assert!((cues[0].end_sec - 0.75).abs() < 1e-9);
        assert!((cues[1].start_sec - 0.75).abs() < 1e-9);
        assert_well_formed(&cues, &settings);
    }

    fn rapid_speech() -> Vec<TranscriptSegment> {
        // One word every 0.2s, the last spoken at 3.8s
        (0..20)
            .map(|i| {
                let start = i as f64 / 5.0;
                TranscriptSegment::new(start, start + 0.15, &format!("w{i}"))
            })
            .collect()
    }

    fn assert_no_drift(cues: &[Cue], segments: &[TranscriptSegment]) {
        let total_words: usize = cues.iter().map(|c| c.words.len()).sum();
        assert_eq!(total_words, segments.len());
        for cue in cues {
            let spoken = segments
                .iter()
                .find(|s| s.text == cue.words[0].text)
                .map(|s| s.start_sec)
                .unwrap();
            assert!(
                cue.start_sec - spoken <= MAX_START_DELAY + 1e-9,
                "cue starting {} drifted from {spoken}",
                cue.start_sec
            );
        }
        let last = cues.last().unwrap();
        assert!(last.end_sec < 6.0, "final cue ends at {}", last.end_sec);
    }

    #[test]
    fn test_rapid_speech_keeps_its_timing() {
        let settings = StyleSettings::default();
        let segments = rapid_speech();

        let cues = group_cues(&segments, &settings).unwrap();

        assert_no_drift(&cues, &segments);
        assert_eq!(cues.len(), 4);
        assert!((cues[3].start_sec - 3.0).abs() < 1e-9);
        assert_well_formed(&cues, &settings);
    }

    #[test]
    fn test_rapid_speech_one_word_per_cue_stays_bounded() {
        let settings = StyleSettings {
            words_per_line: 1,
            max_lines: 1,
            ..Default::default()
        };
        let segments = rapid_speech();

        let cues = group_cues(&segments, &settings).unwrap();

        assert_eq!(cues.len(), 20);
        assert_no_drift(&cues, &segments);
        assert!(cues[19].start_sec <= 3.8 + MAX_START_DELAY + 1e-9);
        assert_well_formed(&cues, &settings);
    }

    #[test]
    fn test_single_long_word_is_capped() {
        let settings = StyleSettings::default();
        let segments = vec![
            TranscriptSegment::from_words(words(&[("Aaaaah", 0.0, 9.0)])),
            TranscriptSegment::new(10.0, 11.0, "ok"),
        ];

        let cues = group_cues(&segments, &settings).unwrap();

        assert_eq!(cues[0].end_sec, 5.0);
        assert_eq!(cues[0].words[0].end_sec, 5.0);
        assert_well_formed(&cues, &settings);
    }

    #[test]
    fn test_dense_transcript_stays_well_formed() {
        let settings = StyleSettings {
            words_per_line: 3,
            max_lines: 1,
            min_display_duration: 0.8,
            max_display_duration: 2.5,
            ..Default::default()
        };
        let segments: Vec<_> = (0..20)
            .map(|i| evenly_timed(i as f64 * 1.1, 7, 0.2))
            .collect();

        let cues = group_cues(&segments, &settings).unwrap();
        assert_well_formed(&cues, &settings);
    }

    #[test]
    fn test_empty_segments_produce_no_cues() {
        let settings = StyleSettings::default();
        let segments = vec![TranscriptSegment::new(0.0, 1.0, "   ")];
        assert!(group_cues(&segments, &settings).unwrap().is_empty());
    }
}
