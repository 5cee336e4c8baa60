//! Database Module
//!
//! SQLite persistence for videos, transcripts, styles, presets,
//! translations, quota usage and job progress.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::core::{now_rfc3339, CoreError, CoreResult, LanguageCode, VideoId};

// =============================================================================
// Database
// =============================================================================

/// Shared SQLite handle.
///
/// Cloning is cheap; every clone talks to the same connection. Statements are
/// short, so a single mutex-guarded connection is enough for the worker pool.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Opens (or creates) the database at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| CoreError::Database(format!("Failed to open database: {}", e)))?;

        Self::from_connection(conn)
    }

    /// Creates an in-memory database (for testing)
    pub fn in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            CoreError::Database(format!("Failed to create in-memory database: {}", e))
        })?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> CoreResult<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initializes the database schema
    fn init_schema(&self) -> CoreResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r#"
                PRAGMA foreign_keys = ON;

                -- Videos known to the pipeline (bytes live in video storage)
                CREATE TABLE IF NOT EXISTS videos (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL DEFAULT '',
                    source_language TEXT,
                    width INTEGER,
                    height INTEGER,
                    duration_sec REAL,
                    created_at TEXT NOT NULL
                );

                -- Transcript segments with word-level timing (JSON)
                CREATE TABLE IF NOT EXISTS transcript_segments (
                    id TEXT PRIMARY KEY,
                    video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
                    language TEXT NOT NULL,
                    seq INTEGER NOT NULL,
                    start_sec REAL NOT NULL,
                    end_sec REAL NOT NULL,
                    text TEXT NOT NULL,
                    words TEXT NOT NULL DEFAULT '[]',
                    confidence REAL
                );

                -- One style per (video, language)
                CREATE TABLE IF NOT EXISTS styles (
                    id TEXT PRIMARY KEY,
                    video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
                    language_code TEXT NOT NULL,
                    settings TEXT NOT NULL,
                    preset_name TEXT,
                    created_by TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE(video_id, language_code)
                );

                -- Reusable style templates
                CREATE TABLE IF NOT EXISTS presets (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    description TEXT NOT NULL DEFAULT '',
                    platform TEXT NOT NULL,
                    settings TEXT NOT NULL,
                    is_system INTEGER NOT NULL DEFAULT 0,
                    usage_count INTEGER NOT NULL DEFAULT 0,
                    created_by TEXT,
                    created_at TEXT NOT NULL
                );

                -- One translation per (video, target language)
                CREATE TABLE IF NOT EXISTS translations (
                    id TEXT PRIMARY KEY,
                    video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
                    source_language TEXT NOT NULL,
                    target_language TEXT NOT NULL,
                    segments TEXT NOT NULL DEFAULT '[]',
                    quality TEXT NOT NULL,
                    status TEXT NOT NULL,
                    character_count INTEGER NOT NULL DEFAULT 0,
                    word_count INTEGER NOT NULL DEFAULT 0,
                    quality_score REAL,
                    error TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE(video_id, target_language)
                );

                -- Characters sent to the translation service per account and month
                CREATE TABLE IF NOT EXISTS translation_usage (
                    account_id TEXT NOT NULL,
                    month TEXT NOT NULL,
                    characters INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (account_id, month)
                );

                -- Pollable job progress
                CREATE TABLE IF NOT EXISTS job_progress (
                    key TEXT PRIMARY KEY,
                    state TEXT NOT NULL,
                    terminal INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_segments_video
                    ON transcript_segments(video_id, language, seq);
                CREATE INDEX IF NOT EXISTS idx_styles_video ON styles(video_id);
                CREATE INDEX IF NOT EXISTS idx_translations_video ON translations(video_id);
                "#,
            )
        })
        .map_err(|e| CoreError::Database(format!("Failed to initialize schema: {}", e)))
    }

    /// Runs `f` with exclusive access to the connection
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> CoreResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::Internal("Database lock poisoned".to_string()))?;
        Ok(f(&conn)?)
    }

    /// Runs `f` inside a transaction, committing only if it succeeds
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::Internal("Database lock poisoned".to_string()))?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // =========================================================================
    // Videos
    // =========================================================================

    /// Inserts or updates a video row
    pub fn upsert_video(&self, video: &Video) -> CoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO videos (id, title, source_language, width, height, duration_sec, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    source_language = excluded.source_language,
                    width = excluded.width,
                    height = excluded.height,
                    duration_sec = excluded.duration_sec
                "#,
                rusqlite::params![
                    video.id,
                    video.title,
                    video.source_language,
                    video.width,
                    video.height,
                    video.duration_sec,
                    video.created_at,
                ],
            )
        })?;
        Ok(())
    }

    /// Loads a video by id
    pub fn get_video(&self, video_id: &str) -> CoreResult<Option<Video>> {
        self.with_conn(|conn| {
            conn.query_row(
                r#"
                SELECT id, title, source_language, width, height, duration_sec, created_at
                FROM videos WHERE id = ?
                "#,
                [video_id],
                |row| {
                    Ok(Video {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        source_language: row.get(2)?,
                        width: row.get(3)?,
                        height: row.get(4)?,
                        duration_sec: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Loads a video or fails with `VideoNotFound`
    pub fn require_video(&self, video_id: &str) -> CoreResult<Video> {
        self.get_video(video_id)?
            .ok_or_else(|| CoreError::VideoNotFound(video_id.to_string()))
    }

    /// Deletes a video together with its transcripts, styles and translations
    pub fn delete_video(&self, video_id: &str) -> CoreResult<bool> {
        let deleted = self.with_conn(|conn| conn.execute("DELETE FROM videos WHERE id = ?", [video_id]))?;
        if deleted > 0 {
            tracing::info!(video_id = %video_id, "Deleted video and dependent records");
        }
        Ok(deleted > 0)
    }

    /// Gets row counts, mostly for diagnostics
    pub fn get_stats(&self) -> CoreResult<DbStats> {
        self.with_conn(|conn| {
            let count = |table: &str| -> rusqlite::Result<usize> {
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| n as usize)
            };
            Ok(DbStats {
                video_count: count("videos")?,
                segment_count: count("transcript_segments")?,
                style_count: count("styles")?,
                preset_count: count("presets")?,
                translation_count: count("translations")?,
            })
        })
    }
}

// =============================================================================
// Video
// =============================================================================

/// A video known to the pipeline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: VideoId,
    pub title: String,
    /// Language detected by the transcript service
    pub source_language: Option<LanguageCode>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_sec: Option<f64>,
    pub created_at: String,
}

impl Video {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            source_language: None,
            width: None,
            height: None,
            duration_sec: None,
            created_at: now_rfc3339(),
        }
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.source_language = Some(language.to_string());
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Row counts per table
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStats {
    pub video_count: usize,
    pub segment_count: usize,
    pub style_count: usize,
    pub preset_count: usize,
    pub translation_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
