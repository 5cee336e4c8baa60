//! Request and response shapes
//!
//! Kept free of any transport so serialization can be checked with plain
//! `cargo test`. Everything is camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::core::jobs::{JobStage, JobState};
use crate::core::presets::Platform;
use crate::core::storage::SubtitledVersion;
use crate::core::{CoreError, FieldErrors, JobId, LanguageCode, OutputFormat, VideoId};

// =============================================================================
// Burn
// =============================================================================

/// Response for a queued burn
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnJobResponse {
    pub job_id: JobId,
    pub estimated_seconds: u64,
}

/// Pollable job progress
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub job_id: Option<JobId>,
    pub stage: JobStage,
    pub percent: f32,
    pub eta_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl From<JobState> for ProgressResponse {
    fn from(state: JobState) -> Self {
        Self {
            job_id: state.job_id,
            stage: state.stage,
            percent: state.percent,
            eta_seconds: state.estimated_seconds_remaining,
            error: state.error,
            result: state.result,
        }
    }
}

/// One published language version
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitledVersionResponse {
    pub language: LanguageCode,
    pub format: OutputFormat,
    pub created_at: String,
    /// Bytes
    pub size: u64,
    pub download_url: String,
}

impl From<SubtitledVersion> for SubtitledVersionResponse {
    fn from(version: SubtitledVersion) -> Self {
        Self {
            language: version.language,
            format: version.format,
            created_at: version.created_at,
            size: version.size_bytes,
            download_url: version.download_url,
        }
    }
}

// =============================================================================
// Presets
// =============================================================================

/// Creates a preset from an existing style
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePresetRequest {
    pub style_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub platform: Platform,
}

// =============================================================================
// Translation
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    pub video_id: VideoId,
    pub target_languages: Vec<LanguageCode>,
    /// Defaults to the video's detected language
    #[serde(default)]
    pub source_language: Option<LanguageCode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateResponse {
    /// One job per target language, in request order
    pub job_ids: Vec<JobId>,
    /// USD
    pub estimated_cost: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub download_url: String,
}

// =============================================================================
// Errors
// =============================================================================

/// Error body returned to clients
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    /// Per-field reasons for validation errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

impl From<&CoreError> for ErrorResponse {
    fn from(err: &CoreError) -> Self {
        let code = match err {
            CoreError::Validation(_) => "validation_error",
            CoreError::VideoNotFound(_)
            | CoreError::StyleNotFound(_)
            | CoreError::PresetNotFound(_)
            | CoreError::TranslationNotFound { .. }
            | CoreError::JobNotFound(_) => "not_found",
            CoreError::PresetImmutable(_) => "preset_immutable",
            CoreError::MissingTranscript { .. } => "missing_transcript",
            CoreError::TranslationQuotaExceeded { .. } => "translation_quota_exceeded",
            CoreError::TranslationApi(_) => "translation_api_error",
            CoreError::SubtitleGeneration(_) => "subtitle_generation_error",
            CoreError::EncodeFailure(_) => "encode_failure",
            CoreError::Cancelled => "cancelled",
            CoreError::Timeout(_) => "timeout",
            CoreError::ResourceExhausted(_) => "busy",
            _ => "internal_error",
        };
        Self {
            code: code.to_string(),
            message: err.user_message(),
            fields: err.field_errors().cloned(),
        }
    }
}
