// Fetch Service - Use cases exposed to the API layer

pub mod info;
pub mod submit;

pub use info::InfoRequest;
pub use submit::SubmitRequest;

use super::admission::AdmissionQueue;
use super::config::EngineConfig;
use super::history::HistoryLedger;
use super::job_store::JobStore;
use super::sweeper::{RetentionSweeper, SweepReport};
use super::validation::UrlPolicy;
use super::worker::WorkerPool;
use crate::domain::{Artifact, HistoryEntry, JobId, JobRecord, JobStatus};
use crate::error::{AppError, Result};
use crate::port::{ExtractionBackend, IdProvider, MediaInfo, MediaInfoSource, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Point-in-time counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub error: usize,
    pub cancelled: usize,
    /// Ids waiting in the admission queue (includes cancelled ids not yet skipped)
    pub queue_depth: usize,
    pub history_len: usize,
    pub max_concurrent: usize,
    pub uptime_secs: u64,
}

/// Fetch Service
pub struct FetchService {
    config: EngineConfig,
    policy: UrlPolicy,
    store: Arc<JobStore>,
    queue: Arc<AdmissionQueue>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    info_source: Option<Arc<dyn MediaInfoSource>>,
    started_at: i64,
}

impl FetchService {
    pub fn new(
        config: EngineConfig,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let policy = UrlPolicy::new(&config.allowed_domains);
        let store = Arc::new(JobStore::new(Arc::new(HistoryLedger::new())));
        let started_at = time_provider.now_millis();
        Self {
            config,
            policy,
            store,
            queue: Arc::new(AdmissionQueue::new()),
            id_provider,
            time_provider,
            info_source: None,
            started_at,
        }
    }

    /// Enable `info` lookups through `source`
    pub fn with_info_source(mut self, source: Arc<dyn MediaInfoSource>) -> Self {
        self.info_source = Some(source);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Start `config.max_concurrent` workers draining this service's queue
    pub fn spawn_workers(&self, backend: Arc<dyn ExtractionBackend>) -> WorkerPool {
        WorkerPool::spawn(
            self.config.max_concurrent,
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            backend,
            Arc::clone(&self.time_provider),
            self.config.work_dir.clone(),
        )
    }

    /// Sweeper bound to this service's history and retention settings
    pub fn sweeper(&self) -> RetentionSweeper {
        RetentionSweeper::new(
            Arc::clone(&self.store),
            Arc::clone(&self.time_provider),
            self.config.record_retention,
        )
    }

    /// Submit a job
    ///
    /// # Errors
    /// - AppError::Validation for a bad URL, domain, format or name
    /// - AppError::Conflict if the id provider repeats an id
    pub fn submit(&self, req: SubmitRequest) -> Result<JobId> {
        submit::execute(
            &self.store,
            &self.queue,
            &self.policy,
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            req,
        )
    }

    /// Metadata of a URL; no job is created
    ///
    /// # Errors
    /// - AppError::Validation for a URL submit would reject
    /// - AppError::Backend if the lookup fails
    /// - AppError::Config if no info source is wired
    pub async fn info(&self, req: InfoRequest) -> Result<MediaInfo> {
        info::execute(&self.policy, self.info_source.as_deref(), req).await
    }

    /// Current snapshot of a job
    pub fn status(&self, id: &str) -> Result<JobRecord> {
        self.store
            .snapshot(id)
            .ok_or_else(|| AppError::NotFound(format!("Job not found: {}", id)))
    }

    /// All live records (any status), in submission order
    pub fn list_active(&self) -> Vec<JobRecord> {
        self.store.list()
    }

    /// Most recent terminal snapshots, oldest first
    pub fn list_history(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
        self.store
            .history()
            .recent(limit.unwrap_or(self.config.history_limit))
    }

    /// Request cancellation; false for unknown or already finished jobs
    pub fn cancel(&self, id: &str) -> bool {
        let cancelled = self.store.cancel(id, self.time_provider.now_millis());
        if cancelled {
            info!(job_id = %id, "Job cancelled");
        }
        cancelled
    }

    /// Artifact of a completed job whose file is still on disk
    ///
    /// # Errors
    /// - AppError::NotFound for unknown ids or a deleted file
    /// - AppError::NotReady while the job has not completed
    pub async fn artifact_path(&self, id: &str) -> Result<Artifact> {
        let record = self.status(id)?;

        let artifact = match (record.status, record.artifact) {
            (JobStatus::Completed, Some(artifact)) => artifact,
            (status, _) => {
                return Err(AppError::NotReady(format!(
                    "Job {} is {}, not completed",
                    id, status
                )))
            }
        };

        match tokio::fs::try_exists(&artifact.path).await {
            Ok(true) => Ok(artifact),
            Ok(false) => Err(AppError::NotFound(format!(
                "Artifact of job {} no longer exists",
                id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete artifacts of jobs that ended more than `max_age_hours` ago
    pub async fn sweep(&self, max_age_hours: u64) -> SweepReport {
        self.sweeper()
            .sweep(Duration::from_secs(max_age_hours.saturating_mul(3600)))
            .await
    }

    pub fn stats(&self) -> ServiceStats {
        let counts = self.store.counts();
        let count = |s: JobStatus| counts.get(&s).copied().unwrap_or(0);
        let uptime_ms = self.time_provider.now_millis() - self.started_at;

        ServiceStats {
            queued: count(JobStatus::Queued),
            running: count(JobStatus::Running),
            completed: count(JobStatus::Completed),
            error: count(JobStatus::Error),
            cancelled: count(JobStatus::Cancelled),
            queue_depth: self.queue.len(),
            history_len: self.store.history().len(),
            max_concurrent: self.config.max_concurrent,
            uptime_secs: u64::try_from(uptime_ms / 1000).unwrap_or(0),
        }
    }
}
