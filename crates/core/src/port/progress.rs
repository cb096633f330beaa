// Progress Port
// Backend -> core progress channel (single writer per job, many readers)

/// A progress signal emitted by an extraction backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    /// Bytes moved so far; totals are optional and may be estimates
    Transferred {
        bytes_done: u64,
        bytes_total: Option<u64>,
        bytes_total_estimate: Option<u64>,
    },
    /// The backend finished transferring. The worker decides the final status.
    Finished,
}

impl ProgressEvent {
    pub fn transferred(bytes_done: u64, bytes_total: Option<u64>) -> Self {
        ProgressEvent::Transferred {
            bytes_done,
            bytes_total,
            bytes_total_estimate: None,
        }
    }
}

/// Receiver of progress events
///
/// Called synchronously from whatever thread or task drives the backend, so
/// implementations must not block for long.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}
