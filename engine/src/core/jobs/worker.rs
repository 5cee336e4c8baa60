//! Worker Pool Module
//!
//! A fixed number of workers consume a priority queue. Each job runs as its
//! own task with a cancellation token and a per-kind timeout; when a job
//! ends without leaving a terminal progress state the pool writes one.

use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::{Job, JobStage, JobState, JobStatus, JobTimeouts, ProgressStore};
use crate::core::{now_rfc3339, CoreError, CoreResult, JobId};

/// Future produced by a job body
pub type JobFuture = Pin<Box<dyn Future<Output = CoreResult<serde_json::Value>> + Send>>;

/// Job body; receives the job's cancellation token
pub type JobTask = Box<dyn FnOnce(CancellationToken) -> JobFuture + Send>;

// =============================================================================
// Priority Queue Entry
// =============================================================================

/// Entry in the priority queue
pub(crate) struct QueueEntry {
    job: Job,
    seq: u64,
    cancel: CancellationToken,
    task: JobTask,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.job.id == other.job.id
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first, then FIFO
        self.job
            .priority
            .cmp(&other.job.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

// =============================================================================
// Worker Pool Configuration
// =============================================================================

/// Worker pool configuration
#[derive(Clone, Debug)]
pub struct WorkerPoolConfig {
    /// Number of concurrent jobs
    pub num_workers: usize,
    /// Maximum queued (not yet running) jobs
    pub max_queue_size: usize,
    pub timeouts: JobTimeouts,
    /// How long finished jobs stay visible
    pub retention: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get().max(1),
            max_queue_size: 100,
            timeouts: JobTimeouts::default(),
            retention: Duration::from_secs(60 * 60),
        }
    }
}

// =============================================================================
// Worker Pool
// =============================================================================

struct JobRecord {
    job: Job,
    cancel: CancellationToken,
    finished_at: Option<Instant>,
}

struct Shared {
    config: WorkerPoolConfig,
    queue: Mutex<BinaryHeap<QueueEntry>>,
    jobs: Mutex<HashMap<JobId, JobRecord>>,
    progress: Arc<dyn ProgressStore>,
    notify: Notify,
    shutdown: CancellationToken,
    seq: AtomicU64,
}

/// Poisoning only happens when a holder panicked; the maps stay consistent
/// because every critical section is a single insert/remove.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Manages background workers for job execution
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Creates a new worker pool. Call [`WorkerPool::start`] to spawn workers.
    pub fn new(config: WorkerPoolConfig, progress: Arc<dyn ProgressStore>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                queue: Mutex::new(BinaryHeap::new()),
                jobs: Mutex::new(HashMap::new()),
                progress,
                notify: Notify::new(),
                shutdown: CancellationToken::new(),
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// Queues a job.
    ///
    /// Rejected when the queue is full or another unfinished job reports
    /// under the same progress key.
    pub fn submit(&self, job: Job, task: JobTask) -> CoreResult<JobId> {
        let shared = &self.shared;
        let job_id = job.id.clone();
        let cancel = shared.shutdown.child_token();

        {
            let mut jobs = lock(&shared.jobs);
            if jobs
                .values()
                .any(|r| r.job.progress_key == job.progress_key && !r.job.is_done())
            {
                return Err(CoreError::field(
                    "job",
                    format!("a job is already active for {}", job.progress_key),
                ));
            }

            let mut queue = lock(&shared.queue);
            if queue.len() >= shared.config.max_queue_size {
                return Err(CoreError::ResourceExhausted("Job queue is full".to_string()));
            }

            shared.progress.put(&job.progress_key, &JobState::queued(&job_id))?;

            jobs.insert(
                job_id.clone(),
                JobRecord {
                    job: job.clone(),
                    cancel: cancel.clone(),
                    finished_at: None,
                },
            );
            queue.push(QueueEntry {
                job,
                seq: shared.seq.fetch_add(1, Ordering::Relaxed),
                cancel,
                task,
            });
        }

        tracing::debug!(job_id = %job_id, "Job queued");
        shared.notify.notify_one();
        Ok(job_id)
    }

    /// Spawns the workers. They run until [`WorkerPool::shutdown`].
    pub fn start(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let num_workers = self.shared.config.num_workers.max(1);
        (0..num_workers)
            .map(|worker_id| {
                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    tracing::info!(worker_id, "Worker started");
                    loop {
                        if shared.shutdown.is_cancelled() {
                            break;
                        }
                        let next = lock(&shared.queue).pop();
                        match next {
                            Some(entry) => shared.run(worker_id, entry).await,
                            None => {
                                tokio::select! {
                                    _ = shared.shutdown.cancelled() => break,
                                    _ = shared.notify.notified() => {}
                                }
                            }
                        }
                    }
                    tracing::info!(worker_id, "Worker shutting down");
                })
            })
            .collect()
    }

    /// Stops workers after their current job and cancels every job
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    /// Gets the current queue length
    pub fn queue_len(&self) -> usize {
        lock(&self.shared.queue).len()
    }

    /// Gets a job by ID
    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        lock(&self.shared.jobs).get(job_id).map(|r| r.job.clone())
    }

    /// Known jobs, newest first
    pub fn list_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = lock(&self.shared.jobs)
            .values()
            .map(|r| r.job.clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        jobs
    }

    /// Cancels a job.
    ///
    /// Queued jobs are removed immediately. Running jobs see their token
    /// cancelled and stop at their next checkpoint; an encode already in
    /// progress runs to completion. Returns false for finished jobs.
    pub fn cancel(&self, job_id: &str) -> CoreResult<bool> {
        let shared = &self.shared;

        let removed = {
            let mut queue = lock(&shared.queue);
            let entries: Vec<QueueEntry> = queue.drain().collect();
            let mut removed = None;
            for entry in entries {
                if entry.job.id == job_id {
                    removed = Some(entry);
                } else {
                    queue.push(entry);
                }
            }
            removed
        };

        if let Some(entry) = removed {
            entry.cancel.cancel();
            let state = JobState::failed(
                Some(job_id.to_string()),
                JobStage::Queued,
                0.0,
                &CoreError::Cancelled,
            );
            shared.progress.put(&entry.job.progress_key, &state)?;
            shared.finish(job_id, JobStatus::Cancelled);
            tracing::info!(job_id, "Cancelled queued job");
            return Ok(true);
        }

        let jobs = lock(&shared.jobs);
        let record = jobs
            .get(job_id)
            .ok_or_else(|| CoreError::JobNotFound(job_id.to_string()))?;
        if record.job.is_done() {
            return Ok(false);
        }
        record.cancel.cancel();
        tracing::info!(job_id, "Cancellation requested for running job");
        Ok(true)
    }
}

impl Shared {
    async fn run(&self, worker_id: usize, entry: QueueEntry) {
        let QueueEntry {
            job, cancel, task, ..
        } = entry;
        let job_id = job.id.clone();

        if let Some(record) = lock(&self.jobs).get_mut(&job_id) {
            record.job.status = JobStatus::Running;
        }

        let timeout = self.config.timeouts.for_type(job.job_type);
        tracing::info!(
            worker_id,
            job_id = %job_id,
            job_type = ?job.job_type,
            "Processing job"
        );

        let mut handle = tokio::spawn(task(cancel.clone()));
        let outcome = match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(CoreError::Internal(format!("Job task failed: {join_err}"))),
            Err(_) => {
                // Dropping the task kills the transcoder and its temp files
                cancel.cancel();
                handle.abort();
                Err(CoreError::Timeout(format!(
                    "{:?} job exceeded {}s",
                    job.job_type,
                    timeout.as_secs()
                )))
            }
        };

        let status = match &outcome {
            Ok(result) => {
                tracing::info!(job_id = %job_id, "Job completed");
                JobStatus::Completed {
                    result: result.clone(),
                }
            }
            Err(CoreError::Cancelled) => {
                tracing::info!(job_id = %job_id, "Job cancelled");
                JobStatus::Cancelled
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job failed");
                JobStatus::Failed {
                    error: e.user_message(),
                }
            }
        };

        self.ensure_terminal_progress(&job, &outcome);
        self.finish(&job_id, status);
        self.purge_expired();
    }

    /// Writes a terminal state unless the job body already did
    fn ensure_terminal_progress(&self, job: &Job, outcome: &CoreResult<serde_json::Value>) {
        let last = self.progress.get(&job.progress_key).ok().flatten();
        let owned_by_job = last.as_ref().and_then(|s| s.job_id.as_deref()) == Some(job.id.as_str());
        if let Some(last) = &last {
            if owned_by_job && last.stage.is_terminal() {
                return;
            }
        }

        let (stage, percent) = last
            .filter(|_| owned_by_job)
            .map(|s| (s.stage, s.percent))
            .unwrap_or((JobStage::Queued, 0.0));

        let state = match outcome {
            Ok(result) => JobState::completed(Some(job.id.clone()), result.clone()),
            Err(e) => JobState::failed(Some(job.id.clone()), stage, percent, e),
        };
        if let Err(e) = self.progress.put(&job.progress_key, &state) {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to write final job state");
        }
    }

    fn finish(&self, job_id: &str, status: JobStatus) {
        if let Some(record) = lock(&self.jobs).get_mut(job_id) {
            record.job.status = status;
            record.job.completed_at = Some(now_rfc3339());
            record.finished_at = Some(Instant::now());
        }
    }

    fn purge_expired(&self) {
        let retention = self.config.retention;
        lock(&self.jobs).retain(|_, r| {
            r.finished_at
                .map(|done| done.elapsed() < retention)
                .unwrap_or(true)
        });
        if let Err(e) = self.progress.purge_finished(retention) {
            tracing::warn!(error = %e, "Failed to purge finished progress");
        }
    }
}
