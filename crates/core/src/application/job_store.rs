// Job Store
// id -> per-record cell. Every transition happens under the record's own lock.

use super::history::HistoryLedger;
use crate::domain::{Artifact, FetchRequest, JobId, JobRecord, JobStatus};
use crate::error::{AppError, Result};
use crate::port::{CancelHandle, CancelToken};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, warn};

/// One live job: its record plus the cancellation handle for its fetch
pub struct JobCell {
    seq: u64,
    record: Mutex<JobRecord>,
    cancel: CancelHandle,
}

impl JobCell {
    fn new(seq: u64, record: JobRecord) -> Self {
        Self {
            seq,
            record: Mutex::new(record),
            cancel: CancelHandle::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> JobId {
        self.lock().id.clone()
    }

    /// Consistent copy of the record
    pub fn snapshot(&self) -> JobRecord {
        self.lock().clone()
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.token()
    }

    /// Raise progress; ignored unless the job is running
    pub fn advance_progress(&self, percent: f64) -> bool {
        self.lock().advance_progress(percent)
    }
}

/// Result of a worker claiming a job
pub enum BeginOutcome {
    /// The job moved to running and belongs to the caller
    Started {
        cell: Arc<JobCell>,
        request: FetchRequest,
        token: CancelToken,
    },
    /// The job was no longer queued (cancelled before pickup)
    Skipped(JobStatus),
    /// The id is unknown (evicted or never stored)
    Missing,
}

/// How the worker wants a running job to end
#[derive(Debug, Clone)]
pub enum FinishOutcome {
    Completed(Artifact),
    Failed(String),
}

/// Job Store
///
/// Lock order: map -> record -> history ledger. No lock is held across `.await`.
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Arc<JobCell>>>,
    history: Arc<HistoryLedger>,
    next_seq: AtomicU64,
}

impl JobStore {
    pub fn new(history: Arc<HistoryLedger>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            history,
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn history(&self) -> &Arc<HistoryLedger> {
        &self.history
    }

    /// Insert a new (queued) record
    ///
    /// # Errors
    /// - AppError::Conflict if the id is already present
    pub fn insert(&self, record: JobRecord) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&record.id) || self.history.contains(&record.id) {
            return Err(AppError::Conflict(format!("Job id already used: {}", record.id)));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        jobs.insert(record.id.clone(), Arc::new(JobCell::new(seq, record)));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<JobCell>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn snapshot(&self, id: &str) -> Option<JobRecord> {
        self.get(id).map(|cell| cell.snapshot())
    }

    fn cells_in_order(&self) -> Vec<Arc<JobCell>> {
        let mut cells: Vec<_> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        cells.sort_by_key(|c| c.seq);
        cells
    }

    /// All live records, in submission order
    pub fn list(&self) -> Vec<JobRecord> {
        self.cells_in_order()
            .iter()
            .map(|cell| cell.snapshot())
            .collect()
    }

    /// Number of live records per status
    pub fn counts(&self) -> HashMap<JobStatus, usize> {
        let mut counts = HashMap::new();
        for cell in self.cells_in_order() {
            *counts.entry(cell.status()).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claim a queued job for execution
    pub fn begin(&self, id: &str, now_millis: i64) -> BeginOutcome {
        let Some(cell) = self.get(id) else {
            return BeginOutcome::Missing;
        };

        let request = {
            let mut record = cell.lock();
            if let Err(e) = record.start(now_millis) {
                debug!(job_id = %id, error = %e, "Job not claimable");
                return BeginOutcome::Skipped(record.status);
            }
            record.request.clone()
        };

        let token = cell.cancel_token();
        BeginOutcome::Started {
            cell,
            request,
            token,
        }
    }

    /// Move a running job to its terminal status
    ///
    /// Returns the status the record actually ended in. If the job was
    /// cancelled meanwhile the outcome is dropped and `Cancelled` is returned.
    ///
    /// # Errors
    /// - AppError::NotFound if the id is unknown
    /// - AppError::Domain if the job was never started
    pub fn finish(&self, id: &str, outcome: FinishOutcome, now_millis: i64) -> Result<JobStatus> {
        let cell = self
            .get(id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        let mut record = cell.lock();
        if record.status.is_terminal() {
            debug!(job_id = %id, status = %record.status, "Late finish ignored");
            return Ok(record.status);
        }

        match outcome {
            FinishOutcome::Completed(artifact) => record.complete(artifact, now_millis)?,
            FinishOutcome::Failed(message) => record.fail(message, now_millis)?,
        }
        self.history.append(&record);
        Ok(record.status)
    }

    /// Cancel a queued or running job
    ///
    /// Returns false for unknown ids and jobs that already ended.
    pub fn cancel(&self, id: &str, now_millis: i64) -> bool {
        let Some(cell) = self.get(id) else {
            return false;
        };

        {
            let mut record = cell.lock();
            if record.cancel(now_millis).is_err() {
                return false;
            }
            self.history.append(&record);
        }

        cell.cancel.cancel();
        true
    }

    /// Drop terminal records that ended before `cutoff_millis`
    ///
    /// Their history entries are kept. Returns the number of records removed.
    pub fn evict_terminal_before(&self, cutoff_millis: i64) -> usize {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let before = jobs.len();
        jobs.retain(|id, cell| {
            let stale = cell.lock().ended_before(cutoff_millis);
            if stale {
                debug!(job_id = %id, "Evicting terminal job record");
            }
            !stale
        });
        let removed = before - jobs.len();
        if removed > 0 {
            warn!(removed, "Evicted terminal job records from the live store");
        }
        removed
    }
}
