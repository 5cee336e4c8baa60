//! Translation records and their state machine.

use serde::{Deserialize, Serialize};

use crate::core::transcripts::TranscriptSegment;
use crate::core::{LanguageCode, TimeSec, TranslationId, VideoId};

/// How much human review a translation received
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    #[default]
    Machine,
    Reviewed,
    Professional,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Machine => "machine",
            Self::Reviewed => "reviewed",
            Self::Professional => "professional",
        }
    }
}

impl std::str::FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "machine" => Ok(Self::Machine),
            "reviewed" => Ok(Self::Reviewed),
            "professional" => Ok(Self::Professional),
            other => Err(format!("Unknown quality tier: {other}")),
        }
    }
}

/// `pending → processing → completed | failed`; finished records may be
/// re-queued as pending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TranslationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn can_transition_to(&self, next: TranslationStatus) -> bool {
        use TranslationStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Pending)
                | (Failed, Pending)
        )
    }
}

impl std::str::FromStr for TranslationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown translation status: {other}")),
        }
    }
}

/// One translated transcript segment; timings are copied from the source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationSegment {
    pub start_time: TimeSec,
    pub end_time: TimeSec,
    pub original_text: String,
    pub translated_text: String,
    /// 0.0-1.0
    pub confidence: f32,
}

/// Provider output for one input text
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranslatedText {
    pub text: String,
    /// Provider confidence when it reports one
    pub confidence: Option<f32>,
}

/// One translation per (video, target language)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRecord {
    pub id: TranslationId,
    pub video_id: VideoId,
    pub source_language: LanguageCode,
    pub target_language: LanguageCode,
    /// Ordered by start time
    pub segments: Vec<TranslationSegment>,
    pub quality: QualityTier,
    pub status: TranslationStatus,
    /// Source characters billed
    pub character_count: u64,
    /// Words in the translated text
    pub word_count: u64,
    /// Advisory plausibility score, 0.0-1.0
    pub quality_score: Option<f32>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TranslationRecord {
    pub fn new(video_id: &str, source_language: &str, target_language: &str) -> Self {
        let now = crate::core::now_rfc3339();
        Self {
            id: ulid::Ulid::new().to_string(),
            video_id: video_id.to_string(),
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            segments: Vec::new(),
            quality: QualityTier::Machine,
            status: TranslationStatus::Pending,
            character_count: 0,
            word_count: 0,
            quality_score: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Recomputes counts from the segments
    pub fn refresh_counts(&mut self) {
        self.segments
            .sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        self.character_count = self
            .segments
            .iter()
            .map(|s| s.original_text.chars().count() as u64)
            .sum();
        self.word_count = self
            .segments
            .iter()
            .map(|s| s.translated_text.split_whitespace().count() as u64)
            .sum();
    }

    /// Translated text as transcript segments for rendering.
    ///
    /// Word timings are dropped; the renderer spreads each segment's span
    /// across the translated words.
    pub fn to_transcript_segments(&self) -> Vec<TranscriptSegment> {
        self.segments
            .iter()
            .filter(|s| !s.translated_text.trim().is_empty())
            .map(|s| TranscriptSegment::new(s.start_time, s.end_time, &s.translated_text))
            .collect()
    }

    /// Raises the tier; never lowers it
    pub fn promote(&mut self, tier: QualityTier) {
        self.quality = self.quality.max(tier);
    }
}
