//! FFmpeg Integration Module
//!
//! Drives the external transcoder that burns subtitles into video:
//! - Binary discovery (config override, environment, common paths, PATH)
//! - Hardware encoder probing with a software fallback
//! - Burn command construction and `-progress` parsing
//! - Media probing through ffprobe
//!
//! The orchestrator only sees the [`Transcoder`] trait so tests can swap in
//! an in-process fake.

mod detection;
mod encoders;
mod progress;
mod runner;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::{CoreError, CoreResult, OutputFormat, SubtitleFormat};

pub use detection::*;
pub use encoders::{EncodeSettings, HardwareEncoder};
pub use progress::{FFmpegProgress, ProgressParser};
pub use runner::{
    build_burn_args, parse_probe_output, AudioStreamInfo, FFmpegRunner, MediaInfo,
    VideoStreamInfo,
};

/// FFmpeg-related error types
#[derive(Debug, thiserror::Error)]
pub enum FFmpegError {
    #[error("FFmpeg not found. Install FFmpeg or set SUBBURN_FFMPEG_PATH.")]
    NotFound,

    #[error("FFmpeg execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Subtitle filter failed: {0}")]
    SubtitleFilter(String),

    #[error("Invalid input file: {0}")]
    InvalidInput(String),

    #[error("Output path error: {0}")]
    OutputError(String),

    #[error("FFprobe error: {0}")]
    ProbeError(String),

    #[error("Process error: {0}")]
    ProcessError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Timeout: operation took too long")]
    Timeout,
}

pub type FFmpegResult<T> = Result<T, FFmpegError>;

impl From<FFmpegError> for CoreError {
    fn from(e: FFmpegError) -> Self {
        match e {
            // The burn orchestrator falls back to SRT on generation errors
            FFmpegError::SubtitleFilter(msg) => CoreError::SubtitleGeneration(msg),
            FFmpegError::Timeout => CoreError::Timeout("transcoder".to_string()),
            FFmpegError::NotFound | FFmpegError::InvalidInput(_) => {
                CoreError::Internal(e.to_string())
            }
            FFmpegError::ExecutionFailed(_)
            | FFmpegError::OutputError(_)
            | FFmpegError::ProbeError(_)
            | FFmpegError::ProcessError(_)
            | FFmpegError::ParseError(_) => CoreError::EncodeFailure(e.to_string()),
        }
    }
}

// =============================================================================
// Transcoder Seam
// =============================================================================

/// One burn invocation: overlay `subtitle_path` onto `input`, copy audio,
/// re-encode video into `output`.
#[derive(Debug, Clone)]
pub struct BurnRequest {
    pub input: PathBuf,
    pub subtitle_path: PathBuf,
    pub subtitle_format: SubtitleFormat,
    pub output: PathBuf,
    pub output_format: OutputFormat,
    /// Source duration, used to turn `out_time` into a percentage
    pub duration_sec: Option<f64>,
}

/// External media transcoder
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Reads stream information from a media file
    async fn probe(&self, input: &Path) -> CoreResult<MediaInfo>;

    /// Runs one burn. Progress updates are best effort; a closed channel
    /// never fails the encode.
    async fn burn_subtitles(
        &self,
        request: &BurnRequest,
        progress_tx: Option<mpsc::Sender<FFmpegProgress>>,
    ) -> CoreResult<()>;
}
