// Admission Queue
// Unbounded FIFO of pending job ids. Push never blocks; pop waits only when empty.

use crate::domain::JobId;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;

#[derive(Default)]
pub struct AdmissionQueue {
    ids: Mutex<VecDeque<JobId>>,
    notify: Notify,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, id: JobId) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(id);
        self.notify.notify_one();
    }

    pub fn try_pop(&self) -> Option<JobId> {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Wait for the next id
    pub async fn pop(&self) -> JobId {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push between check and await is not lost
            notified.as_mut().enable();

            if let Some(id) = self.try_pop() {
                return id;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
