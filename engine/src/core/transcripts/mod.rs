//! Transcript Module
//!
//! Word-timed transcripts as delivered by the transcription service.
//! Generation happens elsewhere; this module stores and serves them.

use serde::{Deserialize, Serialize};

use crate::core::db::Database;
use crate::core::{
    is_valid_language_code, is_valid_time_sec, CoreError, CoreResult, FieldErrors, LanguageCode,
    TimeSec, VideoId,
};

// =============================================================================
// Transcript Model
// =============================================================================

/// Complete transcript for a video in one language
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub video_id: VideoId,
    pub language: LanguageCode,
    /// Segments ordered by start time
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    pub fn new(video_id: &str, language: &str, segments: Vec<TranscriptSegment>) -> Self {
        Self {
            video_id: video_id.to_string(),
            language: language.to_string(),
            segments,
        }
    }

    /// End time of the last segment
    pub fn end_time(&self) -> TimeSec {
        self.segments.iter().map(|s| s.end_sec).fold(0.0, f64::max)
    }

    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn character_count(&self) -> usize {
        self.segments.iter().map(|s| s.text.chars().count()).sum()
    }
}

// =============================================================================
// Transcript Segment
// =============================================================================

/// A single word with its timing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub text: String,
    pub start_sec: TimeSec,
    pub end_sec: TimeSec,
}

impl Word {
    pub fn new(text: &str, start_sec: TimeSec, end_sec: TimeSec) -> Self {
        Self {
            text: text.to_string(),
            start_sec,
            end_sec,
        }
    }
}

/// A single segment of a transcript
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub id: String,
    pub start_sec: TimeSec,
    pub end_sec: TimeSec,
    pub text: String,
    /// Word-level timing; may be empty for imported or translated text
    #[serde(default)]
    pub words: Vec<Word>,
    pub confidence: Option<f64>,
}

impl TranscriptSegment {
    /// Creates a segment without word timing
    pub fn new(start_sec: TimeSec, end_sec: TimeSec, text: &str) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            start_sec,
            end_sec,
            text: text.to_string(),
            words: Vec::new(),
            confidence: None,
        }
    }

    /// Creates a segment from timed words; text is the words joined by spaces
    pub fn from_words(words: Vec<Word>) -> Self {
        let start_sec = words.first().map(|w| w.start_sec).unwrap_or(0.0);
        let end_sec = words.last().map(|w| w.end_sec).unwrap_or(start_sec);
        let text = words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            id: ulid::Ulid::new().to_string(),
            start_sec,
            end_sec,
            text,
            words,
            confidence: None,
        }
    }

    pub fn duration(&self) -> TimeSec {
        self.end_sec - self.start_sec
    }

    /// Word timings for cue grouping.
    ///
    /// Uses the stored word timings when they match the text; otherwise the
    /// segment span is divided across the whitespace-separated words in
    /// proportion to their length.
    pub fn word_timings(&self) -> Vec<Word> {
        let tokens: Vec<&str> = self.text.split_whitespace().collect();
        if !self.words.is_empty() && self.words.len() == tokens.len() {
            return self.words.clone();
        }
        if tokens.is_empty() {
            return Vec::new();
        }

        let weights: Vec<f64> = tokens
            .iter()
            .map(|t| t.chars().count().max(1) as f64)
            .collect();
        let total: f64 = weights.iter().sum();
        let span = self.duration().max(0.0);

        let mut cursor = self.start_sec;
        tokens
            .iter()
            .zip(weights)
            .enumerate()
            .map(|(i, (token, weight))| {
                let end = if i + 1 == tokens.len() {
                    self.end_sec
                } else {
                    cursor + span * weight / total
                };
                let word = Word::new(token, cursor, end);
                cursor = end;
                word
            })
            .collect()
    }
}

/// Validates segment timing before it is stored
pub fn validate_segments(segments: &[TranscriptSegment]) -> CoreResult<()> {
    let mut errors = FieldErrors::new();
    for (i, segment) in segments.iter().enumerate() {
        if !is_valid_time_sec(segment.start_sec) || !is_valid_time_sec(segment.end_sec) {
            errors.insert(format!("segments[{i}]"), "timestamps must be finite and non-negative");
        } else if segment.end_sec < segment.start_sec {
            errors.insert(format!("segments[{i}]"), "end time precedes start time");
        }
    }
    errors.into_result()
}

// =============================================================================
// Transcript Database Operations
// =============================================================================

/// Replaces the stored transcript for (video, language)
pub fn save_transcript(db: &Database, transcript: &Transcript) -> CoreResult<()> {
    if !is_valid_language_code(&transcript.language) {
        return Err(CoreError::field("language", "must be a language code such as 'en' or 'pt-BR'"));
    }
    validate_segments(&transcript.segments)?;
    db.require_video(&transcript.video_id)?;

    let mut segments = transcript.segments.clone();
    segments.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));

    db.with_transaction(|tx| {
        tx.execute(
            "DELETE FROM transcript_segments WHERE video_id = ? AND language = ?",
            [&transcript.video_id, &transcript.language],
        )?;

        for (seq, segment) in segments.iter().enumerate() {
            let words = serde_json::to_string(&segment.words)?;
            tx.execute(
                r#"
                INSERT INTO transcript_segments
                    (id, video_id, language, seq, start_sec, end_sec, text, words, confidence)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                rusqlite::params![
                    segment.id,
                    transcript.video_id,
                    transcript.language,
                    seq as i64,
                    segment.start_sec,
                    segment.end_sec,
                    segment.text,
                    words,
                    segment.confidence,
                ],
            )?;
        }
        Ok(())
    })?;

    tracing::debug!(
        video_id = %transcript.video_id,
        language = %transcript.language,
        segments = segments.len(),
        "Saved transcript"
    );
    Ok(())
}

/// Loads the transcript for (video, language), if any segments exist
pub fn load_transcript(
    db: &Database,
    video_id: &str,
    language: &str,
) -> CoreResult<Option<Transcript>> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, start_sec, end_sec, text, words, confidence
            FROM transcript_segments
            WHERE video_id = ? AND language = ?
            ORDER BY start_sec, seq
            "#,
        )?;
        let rows = stmt
            .query_map([video_id, language], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;

    if rows.is_empty() {
        return Ok(None);
    }

    let segments = rows
        .into_iter()
        .map(|(id, start_sec, end_sec, text, words, confidence)| {
            Ok(TranscriptSegment {
                id,
                start_sec,
                end_sec,
                text,
                words: serde_json::from_str(&words)?,
                confidence,
            })
        })
        .collect::<CoreResult<Vec<_>>>()?;

    Ok(Some(Transcript::new(video_id, language, segments)))
}

/// Languages with a stored transcript for a video
pub fn transcript_languages(db: &Database, video_id: &str) -> CoreResult<Vec<LanguageCode>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT language FROM transcript_segments WHERE video_id = ? ORDER BY language",
        )?;
        let langs = stmt
            .query_map([video_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(langs)
    })
}

/// Loads the transcript in the video's detected language.
///
/// Falls back to the only stored language when no language was detected.
pub fn load_primary_transcript(db: &Database, video_id: &str) -> CoreResult<Transcript> {
    let video = db.require_video(video_id)?;
    let language = match video.source_language {
        Some(lang) => lang,
        None => {
            let mut langs = transcript_languages(db, video_id)?;
            if langs.len() == 1 {
                langs.remove(0)
            } else {
                "und".to_string()
            }
        }
    };

    load_transcript(db, video_id, &language)?.ok_or(CoreError::MissingTranscript {
        video_id: video_id.to_string(),
        language,
    })
}

// =============================================================================
// Tests
// =============================================================================
