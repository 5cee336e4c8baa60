//! Burn-in Module
//!
//! Embeds rendered subtitles into a copy of a source video.
//!
//! A burn runs in four weighted stages:
//! - retrieving source: 0-10%
//! - generating subtitles: 10-20%
//! - encoding: 20-90%
//! - publishing: 90-100%

mod orchestrator;

pub use orchestrator::*;

use serde::{Deserialize, Serialize};

use crate::core::db::Video;
use crate::core::jobs::JobStage;
use crate::core::styles::StyleSettings;
use crate::core::transcripts::{Transcript, TranscriptSegment};
use crate::core::translation::TranslationRecord;
use crate::core::{LanguageCode, OutputFormat, PresetId, StyleId, VideoId};

// =============================================================================
// Request
// =============================================================================

/// Which style a burn uses
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum StyleRef {
    /// The stored style for (video, language), created on first use
    #[default]
    Stored,
    /// A specific stored style
    StyleId(StyleId),
    /// A preset by name, used as-is without touching the stored style
    Preset(String),
}

/// A burn request as submitted by a client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnJobRequest {
    pub video_id: VideoId,
    pub language: LanguageCode,
    #[serde(default)]
    pub style: StyleRef,
    #[serde(default)]
    pub output_format: OutputFormat,
}

impl BurnJobRequest {
    pub fn new(video_id: &str, language: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            language: language.to_string(),
            style: StyleRef::Stored,
            output_format: OutputFormat::default(),
        }
    }

    pub fn with_style(mut self, style: StyleRef) -> Self {
        self.style = style;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Text the subtitles are rendered from
#[derive(Clone, Debug, PartialEq)]
pub enum SubtitleSource {
    /// Transcript in the requested language
    Transcript(Transcript),
    /// Completed translation into the requested language
    Translation(TranslationRecord),
}

impl SubtitleSource {
    pub fn segments(&self) -> Vec<TranscriptSegment> {
        match self {
            Self::Transcript(transcript) => transcript.segments.clone(),
            Self::Translation(record) => record.to_transcript_segments(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transcript(_) => "transcript",
            Self::Translation(_) => "translation",
        }
    }
}

/// A validated burn, ready to run
#[derive(Clone, Debug, PartialEq)]
pub struct BurnPlan {
    pub request: BurnJobRequest,
    pub video: Video,
    pub settings: StyleSettings,
    /// Stored style used, if any
    pub style_id: Option<StyleId>,
    /// Preset used directly, if any
    pub preset_id: Option<PresetId>,
    pub source: SubtitleSource,
    pub estimated_seconds: u64,
}

// =============================================================================
// Stage weights
// =============================================================================

/// Cumulative percent range covered by a stage
pub fn stage_span(stage: JobStage) -> (f32, f32) {
    match stage {
        JobStage::Queued => (0.0, 0.0),
        JobStage::RetrievingSource => (0.0, 10.0),
        JobStage::GeneratingSubtitles => (10.0, 20.0),
        JobStage::Encoding => (20.0, 90.0),
        JobStage::Publishing => (90.0, 100.0),
        _ => (100.0, 100.0),
    }
}

/// Overall percent for `fraction` (0.0-1.0) of the way through `stage`
pub fn stage_percent(stage: JobStage, fraction: f32) -> f32 {
    let (start, end) = stage_span(stage);
    start + (end - start) * fraction.clamp(0.0, 1.0)
}
