//! Filesystem utilities.
//!
//! Crash-tolerant writes for config files and published videos, plus the
//! path hygiene needed before identifiers reach the file system or an
//! ffmpeg filter graph.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::{CoreError, CoreResult};

// =============================================================================
// Path Validation Utilities
// =============================================================================

/// Validates that an identifier component is safe to use in file paths.
///
/// Rejects empty identifiers, traversal sequences (`..`), path separators,
/// drive letter indicators (`:`) and control characters. Any identifier that
/// becomes part of a path (video ids, language codes) goes through here.
pub fn validate_path_id_component(id: &str, label: &str) -> Result<(), String> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(format!("{label} is empty or contains only whitespace"));
    }
    if trimmed.contains("..")
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains(':')
    {
        return Err(format!("Invalid {label}: contains path traversal characters"));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(format!("Invalid {label}: contains control characters"));
    }
    Ok(())
}

/// Same as [`validate_path_id_component`] but mapped into a field error.
pub fn ensure_path_id(id: &str, field: &str) -> CoreResult<()> {
    validate_path_id_component(id, field).map_err(|reason| CoreError::field(field, reason))
}

// =============================================================================
// FFmpeg Filter Paths
// =============================================================================

/// Escapes a path for use as the `filename` option of the `ass`/`subtitles`
/// filters.
///
/// The filter graph parser treats `\`, `:` and `'` specially, and Windows
/// drive letters contain a colon. Backslashes are normalized to forward
/// slashes first (ffmpeg accepts both on Windows).
pub fn escape_ffmpeg_filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut escaped = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            ':' => escaped.push_str("\\:"),
            '\'' => escaped.push_str("\\'"),
            ',' => escaped.push_str("\\,"),
            '[' => escaped.push_str("\\["),
            ']' => escaped.push_str("\\]"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// =============================================================================
// Atomic Writes
// =============================================================================

/// Write bytes to `path` atomically.
///
/// - Write to a sibling temporary file.
/// - Flush and sync the temp file.
/// - Swap into place by renaming.
/// - If the destination exists, it is first moved aside as a `.bak` file, then removed.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_path_for(path);
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    atomic_replace(path, &tmp_path)?;
    Ok(())
}

/// Write a JSON file atomically with pretty formatting.
pub fn atomic_write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

/// Copies `src` to `dest` so that readers never observe a half-written file.
///
/// Used when publishing an encoded video: the artifact is first copied next
/// to its destination, then swapped in. Returns the number of bytes copied.
pub async fn atomic_copy_file(src: &Path, dest: &Path) -> CoreResult<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp_path = tmp_path_for(dest);
    let copied = match tokio::fs::copy(src, &tmp_path).await {
        Ok(n) => n,
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(CoreError::IoError(e));
        }
    };

    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || atomic_replace(&dest, &tmp_path))
        .await
        .map_err(|e| CoreError::Internal(format!("Publish task panicked: {e}")))??;

    Ok(copied)
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "tmp".to_string());
    tmp.set_file_name(format!("{file_name}.tmp"));
    tmp
}

fn bak_path_for(path: &Path) -> PathBuf {
    let mut bak = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "bak".to_string());
    bak.set_file_name(format!("{file_name}.bak"));
    bak
}

fn atomic_replace(dest: &Path, src_tmp: &Path) -> CoreResult<()> {
    if !dest.exists() {
        std::fs::rename(src_tmp, dest)?;
        return Ok(());
    }

    // Windows: rename-over-existing may fail depending on filesystem; use a backup swap.
    let bak = bak_path_for(dest);
    if bak.exists() {
        let _ = std::fs::remove_file(&bak);
    }

    std::fs::rename(dest, &bak)?;
    match std::fs::rename(src_tmp, dest) {
        Ok(()) => {
            let _ = std::fs::remove_file(&bak);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::rename(&bak, dest);
            let _ = std::fs::remove_file(src_tmp);
            Err(CoreError::IoError(e))
        }
    }
}
