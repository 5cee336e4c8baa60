//! Job System Module
//!
//! Runs burn and translation work as cancellable background jobs and
//! publishes their progress to a pollable store.

mod progress;
mod worker;

pub use progress::*;
pub use worker::*;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{now_rfc3339, JobId};

// =============================================================================
// Job Types
// =============================================================================

/// Job type enumeration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobType {
    /// Burn subtitles into a video
    Burn,
    /// Translate a transcript into one language
    Translation,
}

/// Per-kind wall clock limits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobTimeouts {
    pub burn: Duration,
    pub translation: Duration,
}

impl Default for JobTimeouts {
    fn default() -> Self {
        Self {
            burn: Duration::from_secs(20 * 60),
            translation: Duration::from_secs(5 * 60),
        }
    }
}

impl JobTimeouts {
    pub fn for_type(&self, job_type: JobType) -> Duration {
        match job_type {
            JobType::Burn => self.burn,
            JobType::Translation => self.translation,
        }
    }
}

/// Job priority levels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Priority {
    /// Background tasks (lowest)
    Background = 0,
    /// Normal priority
    #[default]
    Normal = 1,
    /// User-requested tasks (highest)
    UserRequest = 2,
}

/// Job status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobStatus {
    /// Waiting in queue
    #[default]
    Queued,
    /// Currently running
    Running,
    /// Successfully completed
    Completed { result: serde_json::Value },
    /// Failed with a user-facing error
    Failed { error: String },
    /// Cancelled by user
    Cancelled,
}

/// Job definition
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job ID
    pub id: JobId,
    pub job_type: JobType,
    pub priority: Priority,
    pub status: JobStatus,
    /// Progress store key the job reports under
    pub progress_key: String,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl Job {
    /// Creates a new job
    pub fn new(job_type: JobType, progress_key: impl Into<String>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            job_type,
            priority: Priority::default(),
            status: JobStatus::Queued,
            progress_key: progress_key.into(),
            created_at: now_rfc3339(),
            completed_at: None,
        }
    }

    /// Sets the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Checks if job is running
    pub fn is_running(&self) -> bool {
        matches!(self.status, JobStatus::Running)
    }

    /// Checks if job is completed (success or failure)
    pub fn is_done(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Completed { .. } | JobStatus::Failed { .. } | JobStatus::Cancelled
        )
    }
}
