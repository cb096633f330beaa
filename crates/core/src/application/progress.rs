// Progress Bridge
// Turns backend byte counts into the record's percentage.

use super::job_store::JobCell;
use crate::domain::MAX_REPORTED_PROGRESS;
use crate::port::{ProgressEvent, ProgressSink};
use std::sync::Arc;
use tracing::trace;

/// ProgressSink bound to one job record
pub struct ProgressBridge {
    cell: Arc<JobCell>,
}

impl ProgressBridge {
    pub fn new(cell: Arc<JobCell>) -> Self {
        Self { cell }
    }
}

/// Percentage for a transfer event, or None when no usable total is known
pub fn percent_of(event: &ProgressEvent) -> Option<f64> {
    match *event {
        ProgressEvent::Transferred {
            bytes_done,
            bytes_total,
            bytes_total_estimate,
        } => {
            let total = bytes_total
                .filter(|t| *t > 0)
                .or(bytes_total_estimate.filter(|t| *t > 0))?;
            let pct = bytes_done as f64 / total as f64 * 100.0;
            Some(pct.min(MAX_REPORTED_PROGRESS))
        }
        ProgressEvent::Finished => None,
    }
}

impl ProgressSink for ProgressBridge {
    fn report(&self, event: ProgressEvent) {
        if let Some(pct) = percent_of(&event) {
            if self.cell.advance_progress(pct) {
                trace!(progress = pct, "Progress advanced");
            }
        }
    }
}
