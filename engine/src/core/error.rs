//! subburn Error Definitions
//!
//! Defines error types used throughout the engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{JobId, LanguageCode, PresetId, StyleId, VideoId};

// =============================================================================
// Field Errors
// =============================================================================

/// Field name → human readable reason.
///
/// Validation never collapses into a single opaque message: every failing
/// field keeps its own entry so callers can highlight it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an error map with a single entry
    pub fn single(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.insert(field, reason);
        errors
    }

    /// Records a failure for `field`. The first reason recorded for a field wins.
    pub fn insert(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| reason.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Converts into `Err(CoreError::Validation)` when any field failed
    pub fn into_result(self) -> CoreResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(self))
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, reason) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {reason}")?;
            first = false;
        }
        Ok(())
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Validation
    // =========================================================================
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    // =========================================================================
    // Lookup Errors
    // =========================================================================
    #[error("Video not found: {0}")]
    VideoNotFound(VideoId),

    #[error("Style not found: {0}")]
    StyleNotFound(StyleId),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    #[error("System preset cannot be modified or deleted: {0}")]
    PresetImmutable(PresetId),

    #[error("No transcript for video {video_id} ({language})")]
    MissingTranscript {
        video_id: VideoId,
        language: LanguageCode,
    },

    #[error("No translation for video {video_id} into {language}")]
    TranslationNotFound {
        video_id: VideoId,
        language: LanguageCode,
    },

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    // =========================================================================
    // Translation Errors
    // =========================================================================
    #[error("Translation quota exceeded: {used} used + {requested} requested > {quota} characters")]
    TranslationQuotaExceeded { used: u64, requested: u64, quota: u64 },

    #[error("Translation service error: {0}")]
    TranslationApi(String),

    // =========================================================================
    // Render / Encode Errors
    // =========================================================================
    #[error("Subtitle generation failed: {0}")]
    SubtitleGeneration(String),

    #[error("Encode failed: {0}")]
    EncodeFailure(String),

    // =========================================================================
    // Job Errors
    // =========================================================================
    #[error("Cancelled")]
    Cancelled,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Database(e.to_string())
    }
}

impl CoreError {
    /// Shorthand for a validation error on a single field
    pub fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::Validation(FieldErrors::single(field, reason))
    }

    /// Returns the field errors when this is a validation failure
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            CoreError::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// Quota and validation failures are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::TranslationApi(_)
                | CoreError::EncodeFailure(_)
                | CoreError::Timeout(_)
                | CoreError::IoError(_)
        )
    }

    /// Short, actionable message safe to show to end users.
    ///
    /// Never includes process output, SQL or file system paths.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Validation(errors) => format!("Invalid request: {errors}"),
            CoreError::VideoNotFound(_) => "The source video could not be found".to_string(),
            CoreError::StyleNotFound(_) => "The subtitle style no longer exists".to_string(),
            CoreError::PresetNotFound(name) => format!("Preset '{name}' does not exist"),
            CoreError::PresetImmutable(_) => "System presets cannot be changed".to_string(),
            CoreError::MissingTranscript { language, .. } => format!(
                "No transcript is available ({language}); generate a transcript first"
            ),
            CoreError::TranslationNotFound { language, .. } => {
                format!("No completed translation into '{language}'; translate the video first")
            }
            CoreError::JobNotFound(_) => "The job no longer exists".to_string(),
            CoreError::TranslationQuotaExceeded { .. } => {
                "Monthly translation quota exceeded; upgrade the plan or wait for the next cycle"
                    .to_string()
            }
            CoreError::TranslationApi(_) => {
                "The translation service is unavailable; try again later".to_string()
            }
            CoreError::SubtitleGeneration(_) => {
                "Subtitles could not be generated from the transcript".to_string()
            }
            CoreError::EncodeFailure(_) => {
                "Video encoding failed; try again or choose another output format".to_string()
            }
            CoreError::Cancelled => "Cancelled by user".to_string(),
            CoreError::Timeout(_) => "The job took too long and was stopped".to_string(),
            CoreError::ResourceExhausted(_) => {
                "The server is busy; try again in a few minutes".to_string()
            }
            CoreError::Database(_)
            | CoreError::IoError(_)
            | CoreError::JsonError(_)
            | CoreError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_display() {
        let mut errors = FieldErrors::new();
        errors.insert("font_size", "out of range (12-72)");
        errors.insert("font_color", "must be a #RRGGBB or #RRGGBBAA hex color");

        assert_eq!(
            errors.to_string(),
            "font_color: must be a #RRGGBB or #RRGGBBAA hex color; font_size: out of range (12-72)"
        );
    }

    #[test]
    fn test_field_errors_first_reason_wins() {
        let mut errors = FieldErrors::new();
        errors.insert("font_size", "out of range (12-72)");
        errors.insert("font_size", "must be an integer");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get("font_size"), Some("out of range (12-72)"));
    }

    #[test]
    fn test_into_result() {
        assert!(FieldErrors::new().into_result().is_ok());

        let err = FieldErrors::single("margin_vertical", "out of range (0-200)")
            .into_result()
            .unwrap_err();
        assert!(err.field_errors().unwrap().contains("margin_vertical"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(CoreError::EncodeFailure("exit 1".into()).is_transient());
        assert!(CoreError::TranslationApi("502".into()).is_transient());
        assert!(!CoreError::TranslationQuotaExceeded {
            used: 10,
            requested: 5,
            quota: 12
        }
        .is_transient());
        assert!(!CoreError::field("font_size", "out of range (12-72)").is_transient());
    }

    #[test]
    fn test_user_message_hides_internal_detail() {
        let err = CoreError::EncodeFailure("/tmp/x/in.mp4: Invalid data found".into());
        assert!(!err.user_message().contains("/tmp"));

        let err = CoreError::Database("UNIQUE constraint failed: styles.video_id".into());
        assert_eq!(err.user_message(), "An internal error occurred");
    }
}
