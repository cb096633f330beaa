// Job Domain Model

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::error::{DomainError, Result};
use super::request::FetchRequest;

/// Job ID (UUID v4 in production, injected via IdProvider)
pub type JobId = String;

/// Progress ceiling for backend-reported progress.
/// Only the worker's completion transition may set exactly 100.
pub const MAX_REPORTED_PROGRESS: f64 = 99.0;

/// Job Status
///
/// `queued -> running -> {completed | error | cancelled}` or `queued -> cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output file of a completed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Job Entity
///
/// Mutated only through the transition methods below, which enforce the
/// status state machine and the artifact/error exclusivity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub request: FetchRequest,
    pub status: JobStatus,

    /// Percentage in [0, 100]
    pub progress: f64,

    pub error: Option<String>,
    pub artifact: Option<Artifact>,

    pub submitted_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
}

impl JobRecord {
    /// Create a queued job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `request` - Submission parameters, frozen for the job's lifetime
    /// * `submitted_at` - Submission timestamp in epoch ms (injected, not system time)
    pub fn new(id: impl Into<String>, request: FetchRequest, submitted_at: i64) -> Self {
        Self {
            id: id.into(),
            request,
            status: JobStatus::Queued,
            progress: 0.0,
            error: None,
            artifact: None,
            submitted_at,
            started_at: None,
            ended_at: None,
        }
    }

    fn transition_error(&self, to: JobStatus) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// Transition to Running with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::Queued {
            return Err(self.transition_error(JobStatus::Running));
        }
        self.status = JobStatus::Running;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Completed; progress is forced to 100
    pub fn complete(&mut self, artifact: Artifact, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::Running {
            return Err(self.transition_error(JobStatus::Completed));
        }
        self.status = JobStatus::Completed;
        self.progress = 100.0;
        self.artifact = Some(artifact);
        self.ended_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Error; progress keeps its last value
    pub fn fail(&mut self, message: impl Into<String>, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::Running {
            return Err(self.transition_error(JobStatus::Error));
        }
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "unknown failure".to_string();
        }
        self.status = JobStatus::Error;
        self.error = Some(message);
        self.ended_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Cancelled from any non-terminal status
    pub fn cancel(&mut self, now_millis: i64) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.transition_error(JobStatus::Cancelled));
        }
        self.status = JobStatus::Cancelled;
        self.ended_at = Some(now_millis);
        Ok(())
    }

    /// Raise progress while running.
    ///
    /// Returns true if the stored value changed. Values are clamped to
    /// `[0, MAX_REPORTED_PROGRESS]` and never lower the current value.
    pub fn advance_progress(&mut self, percent: f64) -> bool {
        if self.status != JobStatus::Running || !percent.is_finite() {
            return false;
        }
        let percent = percent.clamp(0.0, MAX_REPORTED_PROGRESS);
        if percent > self.progress {
            self.progress = percent;
            true
        } else {
            false
        }
    }

    /// True when the job ended before `cutoff_millis`
    pub fn ended_before(&self, cutoff_millis: i64) -> bool {
        self.status.is_terminal() && self.ended_at.is_some_and(|t| t < cutoff_millis)
    }
}

/// Snapshot of a job at the moment it became terminal
///
/// Owned by the history ledger; a clone, so later changes to the live record
/// (there should be none) never leak into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryEntry(JobRecord);

impl HistoryEntry {
    pub fn record(&self) -> &JobRecord {
        &self.0
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }
}

impl From<&JobRecord> for HistoryEntry {
    fn from(record: &JobRecord) -> Self {
        Self(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued() -> JobRecord {
        JobRecord::new("job-1", FetchRequest::new("https://youtu.be/x"), 1_000)
    }

    fn artifact() -> Artifact {
        Artifact {
            path: PathBuf::from("/tmp/job-1/video.mp4"),
            size_bytes: 42,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = queued();
        job.start(2_000).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.started_at, Some(2_000));

        job.advance_progress(40.0);
        job.complete(artifact(), 3_000).unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100.0);
        assert!(job.artifact.is_some());
        assert!(job.error.is_none());
        assert_eq!(job.ended_at, Some(3_000));
    }

    #[test]
    fn test_cannot_complete_from_queued() {
        let mut job = queued();
        let err = job.complete(artifact(), 2_000).unwrap_err();
        assert!(err.to_string().contains("queued -> completed"));
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn test_fail_keeps_progress_and_sets_error() {
        let mut job = queued();
        job.start(2_000).unwrap();
        job.advance_progress(37.5);
        job.fail("network unreachable", 3_000).unwrap();

        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.progress, 37.5);
        assert_eq!(job.error.as_deref(), Some("network unreachable"));
        assert!(job.artifact.is_none());
    }

    #[test]
    fn test_fail_with_empty_message_still_sets_error_text() {
        let mut job = queued();
        job.start(2_000).unwrap();
        job.fail("  ", 3_000).unwrap();
        assert!(!job.error.unwrap().trim().is_empty());
    }

    #[test]
    fn test_terminal_is_irreversible() {
        let mut job = queued();
        job.cancel(1_500).unwrap();

        assert!(job.start(2_000).is_err());
        assert!(job.cancel(2_000).is_err());
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.ended_at, Some(1_500));
    }

    #[test]
    fn test_cancel_dominates_late_completion() {
        let mut job = queued();
        job.start(2_000).unwrap();
        job.cancel(2_500).unwrap();

        assert!(job.complete(artifact(), 3_000).is_err());
        assert!(job.fail("late", 3_000).is_err());
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.artifact.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_progress_is_monotone_and_capped() {
        let mut job = queued();
        assert!(!job.advance_progress(10.0), "queued jobs ignore progress");

        job.start(2_000).unwrap();
        assert!(job.advance_progress(50.0));
        assert!(!job.advance_progress(20.0));
        assert_eq!(job.progress, 50.0);

        job.advance_progress(150.0);
        assert_eq!(job.progress, MAX_REPORTED_PROGRESS);
        assert!(!job.advance_progress(f64::NAN));
    }

    #[test]
    fn test_history_entry_is_independent_copy() {
        let mut job = queued();
        job.cancel(1_200).unwrap();
        let entry = HistoryEntry::from(&job);

        job.progress = 77.0;
        assert_eq!(entry.record().progress, 0.0);
        assert_eq!(entry.id(), "job-1");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }
}
