//! External Collaborators
//!
//! Video bytes and transcripts are owned by other services. The pipeline
//! talks to them through these traits; `LocalVideoStorage` and the SQLite
//! transcript store are the in-tree implementations.

mod local;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::db::Database;
use crate::core::transcripts::{load_primary_transcript, load_transcript, Transcript};
use crate::core::{CoreResult, LanguageCode, OutputFormat, VideoId};

pub use local::LocalVideoStorage;

// =============================================================================
// Video Storage
// =============================================================================

/// A published, subtitled copy of a video
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitledVersion {
    pub video_id: VideoId,
    pub language: LanguageCode,
    pub format: OutputFormat,
    pub created_at: String,
    pub size_bytes: u64,
    /// Where clients can fetch the file
    pub download_url: String,
}

/// Source and output bytes for videos
#[async_trait]
pub trait VideoStorage: Send + Sync {
    /// Local path of the source video (`VideoNotFound` when absent)
    async fn source_path(&self, video_id: &str) -> CoreResult<PathBuf>;

    /// Takes ownership of an encoded file and publishes it as the
    /// `language` version of `video_id`. Replaces any previous version.
    async fn publish(
        &self,
        video_id: &str,
        language: &str,
        format: OutputFormat,
        file: &Path,
    ) -> CoreResult<SubtitledVersion>;

    /// Published versions, newest first
    async fn list_versions(&self, video_id: &str) -> CoreResult<Vec<SubtitledVersion>>;

    /// Stores an exported sidecar file and returns its download URL
    async fn store_export(&self, video_id: &str, file_name: &str, bytes: &[u8])
        -> CoreResult<String>;
}

// =============================================================================
// Transcript Source
// =============================================================================

/// Word-timed transcripts produced by the transcription service
pub trait TranscriptSource: Send + Sync {
    fn transcript(&self, video_id: &str, language: &str) -> CoreResult<Option<Transcript>>;

    /// Transcript in the video's detected language
    fn primary_transcript(&self, video_id: &str) -> CoreResult<Transcript>;
}

impl TranscriptSource for Database {
    fn transcript(&self, video_id: &str, language: &str) -> CoreResult<Option<Transcript>> {
        load_transcript(self, video_id, language)
    }

    fn primary_transcript(&self, video_id: &str) -> CoreResult<Transcript> {
        load_primary_transcript(self, video_id)
    }
}
