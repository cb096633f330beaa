// Worker - Job execution loop and fixed-size pool

pub mod constants;
mod panic_guard;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use super::admission::AdmissionQueue;
use super::job_store::{BeginOutcome, FinishOutcome, JobCell, JobStore};
use super::progress::ProgressBridge;
use crate::domain::{Artifact, FetchRequest, JobStatus};
use crate::port::{
    CancelToken, ExtractionBackend, FetchError, FetchJob, FetchOutput, ProgressSink, TimeProvider,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// One worker slot: processes at most one job at a time
pub struct Worker {
    slot: usize,
    store: Arc<JobStore>,
    queue: Arc<AdmissionQueue>,
    backend: Arc<dyn ExtractionBackend>,
    time_provider: Arc<dyn TimeProvider>,
    work_dir: PathBuf,
}

impl Worker {
    pub fn new(
        slot: usize,
        store: Arc<JobStore>,
        queue: Arc<AdmissionQueue>,
        backend: Arc<dyn ExtractionBackend>,
        time_provider: Arc<dyn TimeProvider>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            slot,
            store,
            queue,
            backend,
            time_provider,
            work_dir: work_dir.into(),
        }
    }

    /// Run the slot until shutdown. A job already taken is always finished.
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(worker = self.slot, backend = self.backend.name(), "Worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }

            let id = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                id = self.queue.pop() => id,
            };

            self.process_job(&id).await;
        }
        info!(worker = self.slot, "Worker stopped");
    }

    /// Process one dequeued id
    ///
    /// Returns the final status, or None if the job was not claimable
    /// (cancelled while queued, or unknown).
    pub async fn process_job(&self, id: &str) -> Option<JobStatus> {
        let (cell, request, token) = match self.store.begin(id, self.time_provider.now_millis()) {
            BeginOutcome::Started {
                cell,
                request,
                token,
            } => (cell, request, token),
            BeginOutcome::Skipped(status) => {
                info!(job_id = %id, worker = self.slot, status = %status, "Skipping job that is no longer queued");
                return None;
            }
            BeginOutcome::Missing => {
                warn!(job_id = %id, worker = self.slot, "Dequeued unknown job id");
                return None;
            }
        };

        info!(
            job_id = %id,
            worker = self.slot,
            url = %request.url,
            quality = %request.quality,
            format = %request.format,
            "Job started"
        );

        let output_dir = self.work_dir.join(id);
        let outcome = match self.fetch(id, request, cell, token, &output_dir).await {
            Ok(artifact) => FinishOutcome::Completed(artifact),
            Err(e) => FinishOutcome::Failed(e.to_string()),
        };

        let status = match self
            .store
            .finish(id, outcome.clone(), self.time_provider.now_millis())
        {
            Ok(status) => status,
            Err(e) => {
                error!(job_id = %id, error = %e, "Failed to record job outcome");
                JobStatus::Error
            }
        };

        match (&status, &outcome) {
            (JobStatus::Completed, FinishOutcome::Completed(artifact)) => info!(
                job_id = %id,
                worker = self.slot,
                path = %artifact.path.display(),
                size_bytes = artifact.size_bytes,
                "Job completed"
            ),
            (JobStatus::Cancelled, _) => {
                info!(job_id = %id, worker = self.slot, "Job cancelled, backend result discarded")
            }
            (_, FinishOutcome::Failed(msg)) => {
                error!(job_id = %id, worker = self.slot, error = %msg, "Job failed")
            }
            _ => {}
        }

        if status != JobStatus::Completed {
            remove_job_dir(id, &output_dir).await;
        }

        Some(status)
    }

    async fn fetch(
        &self,
        id: &str,
        request: FetchRequest,
        cell: Arc<JobCell>,
        token: CancelToken,
        output_dir: &Path,
    ) -> Result<Artifact, FetchError> {
        tokio::fs::create_dir_all(output_dir).await?;

        let job = FetchJob {
            job_id: id.to_string(),
            request,
            output_dir: output_dir.to_path_buf(),
        };
        let progress: Arc<dyn ProgressSink> = Arc::new(ProgressBridge::new(cell));
        let backend = Arc::clone(&self.backend);

        // Spawned so a panicking backend fails this job instead of the slot
        let handle = tokio::spawn(async move { backend.fetch(job, progress, token).await });

        let output = match handle.await {
            Ok(result) => result?,
            Err(join_err) => return Err(panic_guard::join_error_to_fetch_error(id, join_err)),
        };

        verify_artifact(&output).await
    }
}

/// Check the reported artifact on disk: it must exist and be non-empty
pub async fn verify_artifact(output: &FetchOutput) -> Result<Artifact, FetchError> {
    let metadata = match tokio::fs::metadata(&output.path).await {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Err(FetchError::EmptyOutput),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(FetchError::EmptyOutput),
        Err(e) => return Err(e.into()),
    };

    if metadata.len() == 0 {
        return Err(FetchError::ZeroBytes);
    }

    Ok(Artifact {
        path: output.path.clone(),
        size_bytes: metadata.len(),
    })
}

async fn remove_job_dir(id: &str, dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(job_id = %id, error = %e, "Failed to remove job directory"),
    }
}

/// Fixed set of worker slots sharing one admission queue
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: ShutdownSender,
    store: Arc<JobStore>,
    time_provider: Arc<dyn TimeProvider>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) on the current runtime
    pub fn spawn(
        size: usize,
        store: Arc<JobStore>,
        queue: Arc<AdmissionQueue>,
        backend: Arc<dyn ExtractionBackend>,
        time_provider: Arc<dyn TimeProvider>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        let work_dir = work_dir.into();
        let (shutdown, token) = shutdown_channel();

        let handles = (0..size.max(1))
            .map(|slot| {
                let worker = Worker::new(
                    slot,
                    Arc::clone(&store),
                    Arc::clone(&queue),
                    Arc::clone(&backend),
                    Arc::clone(&time_provider),
                    work_dir.clone(),
                );
                let token = token.clone();
                tokio::spawn(async move { worker.run(token).await })
            })
            .collect::<Vec<_>>();

        info!(workers = handles.len(), work_dir = %work_dir.display(), "Worker pool started");
        Self {
            handles,
            shutdown,
            store,
            time_provider,
        }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Token tied to this pool's shutdown signal
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.token()
    }

    /// Stop taking jobs and wait for in-flight jobs
    ///
    /// After `timeout` the jobs still running are cancelled, so their
    /// records end and their backends see the cancel, then the slots are
    /// aborted.
    pub async fn shutdown_and_join(self, timeout: Duration) {
        self.shutdown.shutdown();
        let deadline = Instant::now() + timeout;

        let mut stuck = Vec::new();
        for mut handle in self.handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Worker task ended abnormally"),
                Err(_) => stuck.push(handle),
            }
        }

        if !stuck.is_empty() {
            let now = self.time_provider.now_millis();
            for record in self.store.list() {
                if record.status == JobStatus::Running && self.store.cancel(&record.id, now) {
                    warn!(job_id = %record.id, "Cancelled in-flight job at shutdown");
                }
            }
            warn!(workers = stuck.len(), "Workers did not stop in time, aborting");
            for handle in stuck {
                handle.abort();
            }
        }
        info!("Worker pool stopped");
    }

    /// Shutdown with the default join timeout
    pub async fn shutdown(self) {
        self.shutdown_and_join(SHUTDOWN_JOIN_TIMEOUT).await
    }
}
