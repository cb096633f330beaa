// Panic isolation helpers
use std::any::Any;
use tokio::task::JoinError;
use tracing::error;

use crate::port::FetchError;

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Map a failed backend task into a job failure
pub fn join_error_to_fetch_error(job_id: &str, err: JoinError) -> FetchError {
    if err.is_panic() {
        let msg = panic_message(err.into_panic().as_ref());
        error!(job_id = %job_id, panic_msg = %msg, "Backend panicked");
        FetchError::Panicked(msg)
    } else {
        error!(job_id = %job_id, "Backend task aborted");
        FetchError::Failed(format!("backend task aborted: {}", err))
    }
}
