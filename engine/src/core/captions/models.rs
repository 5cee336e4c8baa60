//! Caption Models
//!
//! Timed cues and the rendered subtitle document.

use serde::{Deserialize, Serialize};

use crate::core::transcripts::Word;
use crate::core::{SubtitleFormat, TimeSec};

// =============================================================================
// Cue
// =============================================================================

/// One timed caption unit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cue {
    pub start_sec: TimeSec,
    pub end_sec: TimeSec,
    /// Display lines, at most `max_lines`
    pub lines: Vec<String>,
    /// Word timings used for karaoke highlighting
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<Word>,
}

impl Cue {
    /// Creates a single-line cue without word timing
    pub fn new(start_sec: TimeSec, end_sec: TimeSec, text: &str) -> Self {
        Self {
            start_sec,
            end_sec,
            lines: text.lines().map(str::to_string).collect(),
            words: Vec::new(),
        }
    }

    pub fn duration(&self) -> TimeSec {
        self.end_sec - self.start_sec
    }

    /// Lines joined with `\n`
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn overlaps(&self, other: &Cue) -> bool {
        self.start_sec < other.end_sec && other.start_sec < self.end_sec
    }
}

// =============================================================================
// Render Options
// =============================================================================

/// Video canvas the subtitles are laid out on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayResolution {
    pub width: u32,
    pub height: u32,
}

impl Default for PlayResolution {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Encoding-level options that are not part of the style
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    pub format: SubtitleFormat,
    pub resolution: PlayResolution,
    /// Written into the ASS `Title:` field
    pub title: Option<String>,
}

impl RenderOptions {
    pub fn new(format: SubtitleFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        if width > 0 && height > 0 {
            self.resolution = PlayResolution { width, height };
        }
        self
    }
}

// =============================================================================
// Subtitle Document
// =============================================================================

/// A rendered, validated subtitle file
#[derive(Clone, Debug, PartialEq)]
pub struct SubtitleDocument {
    pub format: SubtitleFormat,
    pub cues: Vec<Cue>,
    pub content: String,
}

impl SubtitleDocument {
    pub fn as_bytes(&self) -> &[u8] {
        self.content.as_bytes()
    }

    /// File name with the format's extension
    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.format.extension())
    }
}
