//! Filesystem-backed video storage.
//!
//! Layout under the media root:
//!
//! ```text
//! sources/{video_id}.{ext}
//! outputs/{video_id}/{video_id}_{lang}.{ext}
//! exports/{video_id}/{file_name}
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use super::{SubtitledVersion, VideoStorage};
use crate::core::fs::{atomic_copy_file, atomic_write_bytes, ensure_path_id};
use crate::core::{CoreError, CoreResult, OutputFormat};

const SOURCE_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm", "avi", "m4v"];

#[derive(Debug, Clone)]
pub struct LocalVideoStorage {
    root: PathBuf,
}

impl LocalVideoStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sources_dir(&self) -> PathBuf {
        self.root.join("sources")
    }

    fn outputs_dir(&self, video_id: &str) -> PathBuf {
        self.root.join("outputs").join(video_id)
    }

    /// Copies a file into `sources/` as the source of `video_id`
    pub async fn import_source(&self, video_id: &str, file: &Path) -> CoreResult<PathBuf> {
        ensure_path_id(video_id, "video_id")?;
        let ext = file
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .filter(|e| SOURCE_EXTENSIONS.contains(&e.as_str()))
            .ok_or_else(|| CoreError::field("file", "unsupported video container"))?;

        let dest = self.sources_dir().join(format!("{video_id}.{ext}"));
        atomic_copy_file(file, &dest).await?;
        tracing::info!(video_id, path = %dest.display(), "Imported source video");
        Ok(dest)
    }

    /// Output file name for a language version
    pub fn output_file_name(video_id: &str, language: &str, format: OutputFormat) -> String {
        format!("{video_id}_{language}.{}", format.extension())
    }
}

fn modified_rfc3339(meta: &std::fs::Metadata) -> String {
    meta.modified()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.to_string_lossy().replace('\\', "/"))
}

#[async_trait]
impl VideoStorage for LocalVideoStorage {
    async fn source_path(&self, video_id: &str) -> CoreResult<PathBuf> {
        ensure_path_id(video_id, "video_id")?;
        for ext in SOURCE_EXTENSIONS {
            let candidate = self.sources_dir().join(format!("{video_id}.{ext}"));
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(candidate);
            }
        }
        Err(CoreError::VideoNotFound(video_id.to_string()))
    }

    async fn publish(
        &self,
        video_id: &str,
        language: &str,
        format: OutputFormat,
        file: &Path,
    ) -> CoreResult<SubtitledVersion> {
        ensure_path_id(video_id, "video_id")?;
        ensure_path_id(language, "language")?;

        let dest = self
            .outputs_dir(video_id)
            .join(Self::output_file_name(video_id, language, format));
        let size_bytes = atomic_copy_file(file, &dest).await?;
        let meta = tokio::fs::metadata(&dest).await?;

        tracing::info!(video_id, language, size_bytes, "Published subtitled video");
        Ok(SubtitledVersion {
            video_id: video_id.to_string(),
            language: language.to_string(),
            format,
            created_at: modified_rfc3339(&meta),
            size_bytes,
            download_url: file_url(&dest),
        })
    }

    async fn list_versions(&self, video_id: &str) -> CoreResult<Vec<SubtitledVersion>> {
        ensure_path_id(video_id, "video_id")?;
        let dir = self.outputs_dir(video_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let prefix = format!("{video_id}_");
        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let (Some(stem), Some(ext)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|s| s.to_str()),
            ) else {
                continue;
            };
            let (Some(language), Some(format)) =
                (stem.strip_prefix(&prefix), OutputFormat::from_extension(ext))
            else {
                continue;
            };

            let meta = entry.metadata().await?;
            versions.push(SubtitledVersion {
                video_id: video_id.to_string(),
                language: language.to_string(),
                format,
                created_at: modified_rfc3339(&meta),
                size_bytes: meta.len(),
                download_url: file_url(&path),
            });
        }

        versions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.language.cmp(&b.language))
        });
        Ok(versions)
    }

    async fn store_export(
        &self,
        video_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> CoreResult<String> {
        ensure_path_id(video_id, "video_id")?;
        ensure_path_id(file_name, "file_name")?;

        let dest = self.root.join("exports").join(video_id).join(file_name);
        let bytes = bytes.to_vec();
        let target = dest.clone();
        tokio::task::spawn_blocking(move || atomic_write_bytes(&target, &bytes))
            .await
            .map_err(|e| CoreError::Internal(format!("Export task panicked: {e}")))??;

        Ok(file_url(&dest))
    }
}
