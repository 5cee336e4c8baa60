//! Pollable job progress.
//!
//! Jobs write a [`JobState`] under a resource key
//! (`burn_progress:{video_id}`, `translation_progress:{video_id}:{lang}`)
//! and clients poll it without holding a connection open. Terminal states
//! are kept for a retention window, then purged.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::core::db::Database;
use crate::core::{now_rfc3339, CoreError, CoreResult, JobId};

pub fn burn_progress_key(video_id: &str) -> String {
    format!("burn_progress:{video_id}")
}

pub fn translation_progress_key(video_id: &str, language: &str) -> String {
    format!("translation_progress:{video_id}:{language}")
}

/// Named stage of a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Queued,
    RetrievingSource,
    GeneratingSubtitles,
    Encoding,
    Publishing,
    Translating,
    Saving,
    Completed,
    Failed,
    Cancelled,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::RetrievingSource => "retrieving_source",
            Self::GeneratingSubtitles => "generating_subtitles",
            Self::Encoding => "encoding",
            Self::Publishing => "publishing",
            Self::Translating => "translating",
            Self::Saving => "saving",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot a client sees when polling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    pub job_id: Option<JobId>,
    pub stage: JobStage,
    /// 0-100
    pub percent: f32,
    pub estimated_seconds_remaining: Option<u64>,
    /// "{stage}: {message}" on failure
    pub error: Option<String>,
    /// Job output once completed (e.g. the published location)
    pub result: Option<serde_json::Value>,
    pub updated_at: String,
}

impl JobState {
    pub fn new(job_id: Option<JobId>, stage: JobStage, percent: f32) -> Self {
        Self {
            job_id,
            stage,
            percent: percent.clamp(0.0, 100.0),
            estimated_seconds_remaining: None,
            error: None,
            result: None,
            updated_at: now_rfc3339(),
        }
    }

    pub fn queued(job_id: &str) -> Self {
        Self::new(Some(job_id.to_string()), JobStage::Queued, 0.0)
    }

    pub fn with_eta(mut self, seconds: Option<u64>) -> Self {
        self.estimated_seconds_remaining = seconds;
        self
    }

    pub fn completed(job_id: Option<JobId>, result: serde_json::Value) -> Self {
        let mut state = Self::new(job_id, JobStage::Completed, 100.0);
        state.estimated_seconds_remaining = Some(0);
        state.result = Some(result);
        state
    }

    /// Terminal failure. `failed_stage` is where the job was when it failed;
    /// the error renders the user-safe message only.
    pub fn failed(job_id: Option<JobId>, failed_stage: JobStage, percent: f32, err: &CoreError) -> Self {
        let stage = if matches!(err, CoreError::Cancelled) {
            JobStage::Cancelled
        } else {
            JobStage::Failed
        };
        let mut state = Self::new(job_id, stage, percent);
        state.error = Some(format!("{}: {}", failed_stage, err.user_message()));
        state
    }
}

/// Keyed store clients poll for progress
pub trait ProgressStore: Send + Sync {
    fn put(&self, key: &str, state: &JobState) -> CoreResult<()>;

    fn get(&self, key: &str) -> CoreResult<Option<JobState>>;

    fn remove(&self, key: &str) -> CoreResult<()>;

    /// Drops terminal states older than `retention`; returns how many
    fn purge_finished(&self, retention: Duration) -> CoreResult<usize>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store for single-node deployments and tests
#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    entries: Mutex<HashMap<String, (JobState, Instant)>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CoreResult<std::sync::MutexGuard<'_, HashMap<String, (JobState, Instant)>>> {
        self.entries
            .lock()
            .map_err(|_| CoreError::Internal("Progress store lock poisoned".to_string()))
    }
}

impl ProgressStore for InMemoryProgressStore {
    fn put(&self, key: &str, state: &JobState) -> CoreResult<()> {
        self.lock()?
            .insert(key.to_string(), (state.clone(), Instant::now()));
        Ok(())
    }

    fn get(&self, key: &str) -> CoreResult<Option<JobState>> {
        Ok(self.lock()?.get(key).map(|(state, _)| state.clone()))
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn purge_finished(&self, retention: Duration) -> CoreResult<usize> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, (state, written)| {
            !(state.stage.is_terminal() && written.elapsed() >= retention)
        });
        Ok(before - entries.len())
    }
}

// =============================================================================
// SQLite store
// =============================================================================

/// Store shared by every process using the same database
#[derive(Clone)]
pub struct SqliteProgressStore {
    db: Database,
}

impl SqliteProgressStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl ProgressStore for SqliteProgressStore {
    fn put(&self, key: &str, state: &JobState) -> CoreResult<()> {
        let json = serde_json::to_string(state)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO job_progress (key, state, terminal, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET state = excluded.state,
                     terminal = excluded.terminal, updated_at = excluded.updated_at",
                params![key, json, state.stage.is_terminal(), now_rfc3339()],
            )?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> CoreResult<Option<JobState>> {
        let json: Option<String> = self.db.with_conn(|conn| {
            conn.query_row("SELECT state FROM job_progress WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()
        })?;
        json.map(|j| serde_json::from_str(&j).map_err(CoreError::from))
            .transpose()
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM job_progress WHERE key = ?", [key])?;
            Ok(())
        })
    }

    fn purge_finished(&self, retention: Duration) -> CoreResult<usize> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| CoreError::Internal(format!("Invalid retention: {e}")))?;
        let cutoff = (chrono::Utc::now() - retention)
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM job_progress WHERE terminal = 1 AND updated_at <= ?",
                [cutoff],
            )
        })
    }
}
