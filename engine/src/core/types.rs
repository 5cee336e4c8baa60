//! subburn Core Type Definitions
//!
//! Defines fundamental types used throughout the engine.

use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Video identifier (owned by the external video-storage service)
pub type VideoId = String;

/// Style unique identifier (ULID)
pub type StyleId = String;

/// Preset unique identifier (ULID)
pub type PresetId = String;

/// Translation record unique identifier (ULID)
pub type TranslationId = String;

/// Job unique identifier (ULID)
pub type JobId = String;

/// Account identifier used for translation quota accounting
pub type AccountId = String;

/// BCP-47 style language code (e.g. "en", "es", "pt-BR")
pub type LanguageCode = String;

// =============================================================================
// Time Types
// =============================================================================

/// Time in seconds (floating point)
pub type TimeSec = f64;

/// Current UTC time as RFC 3339 with millisecond precision.
///
/// The fixed width keeps lexicographic order equal to chronological order,
/// which the `newest` sorts rely on.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Returns true when `value` is a usable timestamp (finite, non-negative).
pub fn is_valid_time_sec(value: TimeSec) -> bool {
    value.is_finite() && value >= 0.0
}

/// Validates a language code such as `en`, `es`, `zh-Hans` or `pt-BR`.
pub fn is_valid_language_code(code: &str) -> bool {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex::Regex::new(r"^[a-z]{2,3}(-[A-Za-z]{2,4})?$").expect("language code regex")
    });
    re.is_match(code)
}

// =============================================================================
// Subtitle Encoding
// =============================================================================

/// Subtitle file encoding produced by the renderer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    /// Advanced SubStation Alpha (styled, primary)
    #[default]
    Ass,
    /// SubRip (plain fallback)
    Srt,
    /// WebVTT (export only)
    Vtt,
}

impl SubtitleFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Ass => "ass",
            Self::Srt => "srt",
            Self::Vtt => "vtt",
        }
    }
}

impl std::fmt::Display for SubtitleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for SubtitleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ass" | "ssa" => Ok(Self::Ass),
            "srt" => Ok(Self::Srt),
            "vtt" | "webvtt" => Ok(Self::Vtt),
            other => Err(format!("Unsupported subtitle format: {other}")),
        }
    }
}

/// Output container for burned videos.
///
/// Audio is stream-copied, so only containers that accept the common
/// source audio codecs (AAC/MP3/Opus) are offered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Mov,
    Mkv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Mkv => "mkv",
        }
    }

    /// Parses an extension back into a format (case-insensitive)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" => Some(Self::Mp4),
            "mov" => Some(Self::Mov),
            "mkv" => Some(Self::Mkv),
            _ => None,
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s.trim()).ok_or_else(|| format!("Unsupported output format: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_code_validation() {
        assert!(is_valid_language_code("en"));
        assert!(is_valid_language_code("pt-BR"));
        assert!(is_valid_language_code("zh-Hans"));
        assert!(is_valid_language_code("fil"));

        assert!(!is_valid_language_code(""));
        assert!(!is_valid_language_code("EN"));
        assert!(!is_valid_language_code("english"));
        assert!(!is_valid_language_code("en_US"));
    }

    #[test]
    fn test_time_validation() {
        assert!(is_valid_time_sec(0.0));
        assert!(is_valid_time_sec(12.5));
        assert!(!is_valid_time_sec(-0.1));
        assert!(!is_valid_time_sec(f64::NAN));
        assert!(!is_valid_time_sec(f64::INFINITY));
    }

    #[test]
    fn test_subtitle_format_parse() {
        assert_eq!("ASS".parse::<SubtitleFormat>().unwrap(), SubtitleFormat::Ass);
        assert_eq!("srt".parse::<SubtitleFormat>().unwrap(), SubtitleFormat::Srt);
        assert_eq!("webvtt".parse::<SubtitleFormat>().unwrap(), SubtitleFormat::Vtt);
        assert!("sub".parse::<SubtitleFormat>().is_err());
    }

    #[test]
    fn test_output_format_extension_roundtrip() {
        for format in [OutputFormat::Mp4, OutputFormat::Mov, OutputFormat::Mkv] {
            assert_eq!(OutputFormat::from_extension(format.extension()), Some(format));
        }
        assert_eq!(OutputFormat::from_extension("webm"), None);
    }
}
