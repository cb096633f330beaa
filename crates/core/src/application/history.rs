// History Ledger
// Append-only snapshots of terminal jobs, at most one per job id.

use crate::domain::{HistoryEntry, JobId, JobRecord};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

#[derive(Default)]
struct LedgerInner {
    entries: Vec<HistoryEntry>,
    seen: HashSet<JobId>,
}

/// History Ledger
///
/// Entries are kept in terminal-transition order (oldest first).
#[derive(Default)]
pub struct HistoryLedger {
    inner: Mutex<LedgerInner>,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a snapshot of a terminal record
    ///
    /// Returns false (and leaves the ledger untouched) if the record is not
    /// terminal or its id was already recorded.
    pub fn append(&self, record: &JobRecord) -> bool {
        if !record.status.is_terminal() {
            warn!(job_id = %record.id, status = %record.status, "Refusing to record non-terminal job");
            return false;
        }

        let mut inner = self.lock();
        if !inner.seen.insert(record.id.clone()) {
            warn!(job_id = %record.id, "Job already recorded in history, ignoring duplicate");
            return false;
        }
        inner.entries.push(HistoryEntry::from(record));
        true
    }

    /// Most recent `limit` entries, oldest first
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let inner = self.lock();
        let start = inner.entries.len().saturating_sub(limit);
        inner.entries[start..].to_vec()
    }

    /// Entries whose job ended strictly before `cutoff_millis`
    pub fn ended_before(&self, cutoff_millis: i64) -> Vec<HistoryEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.record().ended_before(cutoff_millis))
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FetchRequest;

    fn terminal(id: &str, ended_at: i64) -> JobRecord {
        let mut job = JobRecord::new(id, FetchRequest::new("https://youtu.be/x"), 0);
        job.cancel(ended_at).unwrap();
        job
    }

    #[test]
    fn test_append_once_per_job() {
        let ledger = HistoryLedger::new();
        let job = terminal("a", 10);

        assert!(ledger.append(&job));
        assert!(!ledger.append(&job));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains("a"));
    }

    #[test]
    fn test_rejects_non_terminal() {
        let ledger = HistoryLedger::new();
        let job = JobRecord::new("q", FetchRequest::new("https://youtu.be/x"), 0);
        assert!(!ledger.append(&job));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_recent_returns_suffix_in_append_order() {
        let ledger = HistoryLedger::new();
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            ledger.append(&terminal(id, i as i64));
        }

        let ids: Vec<_> = ledger.recent(2).iter().map(|e| e.id().to_string()).collect();
        assert_eq!(ids, vec!["c", "d"]);
        assert_eq!(ledger.recent(50).len(), 4);
        assert!(ledger.recent(0).is_empty());
    }

    #[test]
    fn test_ended_before() {
        let ledger = HistoryLedger::new();
        ledger.append(&terminal("old", 100));
        ledger.append(&terminal("new", 900));

        let old: Vec<_> = ledger.ended_before(500).iter().map(|e| e.id().to_string()).collect();
        assert_eq!(old, vec!["old"]);
    }
}
