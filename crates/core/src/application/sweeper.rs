// Retention Sweeper
// Deletes artifacts of jobs that ended more than `max_age` ago.

use super::job_store::JobStore;
use super::worker::ShutdownToken;
use crate::port::TimeProvider;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Expired history entries that carried an artifact
    pub examined: usize,
    /// Artifact files deleted by this sweep
    pub removed: usize,
    /// Artifacts already gone (earlier sweep or external deletion)
    pub missing: usize,
    /// Deletions that failed; retried by the next sweep
    pub failed: usize,
    /// Terminal live records dropped (only with record retention configured)
    pub evicted_records: usize,
}

/// Retention Sweeper
///
/// Never mutates the history ledger; running it twice is harmless.
#[derive(Clone)]
pub struct RetentionSweeper {
    store: Arc<JobStore>,
    time_provider: Arc<dyn TimeProvider>,
    record_retention: Option<Duration>,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<JobStore>,
        time_provider: Arc<dyn TimeProvider>,
        record_retention: Option<Duration>,
    ) -> Self {
        Self {
            store,
            time_provider,
            record_retention,
        }
    }

    /// Sweep once
    pub async fn sweep(&self, max_age: Duration) -> SweepReport {
        let now = self.time_provider.now_millis();
        let cutoff = now.saturating_sub(duration_millis(max_age));
        let mut report = SweepReport::default();

        for entry in self.store.history().ended_before(cutoff) {
            let Some(artifact) = &entry.record().artifact else {
                continue;
            };
            report.examined += 1;

            match tokio::fs::remove_file(&artifact.path).await {
                Ok(()) => {
                    report.removed += 1;
                    debug!(job_id = %entry.id(), path = %artifact.path.display(), "Removed expired artifact");
                }
                Err(e) if e.kind() == ErrorKind::NotFound => report.missing += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(job_id = %entry.id(), path = %artifact.path.display(), error = %e, "Failed to remove artifact");
                    continue;
                }
            }

            if let Some(dir) = artifact.path.parent() {
                remove_dir_if_empty(dir).await;
            }
        }

        if let Some(retention) = self.record_retention {
            let record_cutoff = now.saturating_sub(duration_millis(retention));
            report.evicted_records = self.store.evict_terminal_before(record_cutoff);
        }

        info!(
            examined = report.examined,
            removed = report.removed,
            missing = report.missing,
            failed = report.failed,
            evicted_records = report.evicted_records,
            "Sweep finished"
        );
        report
    }

    /// Sweep every `every` until shutdown (background task)
    ///
    /// The first sweep runs immediately.
    pub async fn run(self, every: Duration, max_age: Duration, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = every.as_secs(),
            max_age_hours = max_age.as_secs() / 3600,
            "Retention sweeper started"
        );

        let mut tick = interval(every.max(Duration::from_secs(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = tick.tick() => {
                    self.sweep(max_age).await;
                }
            }
        }
        info!("Retention sweeper stopped");
    }
}

fn duration_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

async fn remove_dir_if_empty(dir: &Path) {
    // remove_dir refuses non-empty directories, which is what we want
    if let Err(e) = tokio::fs::remove_dir(dir).await {
        if e.kind() != ErrorKind::NotFound {
            debug!(dir = %dir.display(), error = %e, "Job directory kept");
        }
    }
}
