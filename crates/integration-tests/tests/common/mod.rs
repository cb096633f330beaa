//! Shared fixtures for the integration tests

#![allow(dead_code)]

use mediafetch_core::application::{EngineConfig, FetchService, SubmitRequest};
use mediafetch_core::domain::{JobId, JobRecord, JobStatus};
use mediafetch_core::port::id_provider::mocks::SequentialIdProvider;
use mediafetch_core::port::MediaInfoSource;
use mediafetch_core::port::time_provider::mocks::ManualTimeProvider;
use std::sync::Arc;
use std::time::Duration;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Engine over a temporary work dir with a manual clock
pub struct Engine {
    pub service: Arc<FetchService>,
    pub clock: Arc<ManualTimeProvider>,
    pub dir: tempfile::TempDir,
}

impl Engine {
    pub fn new(max_concurrent: usize) -> Self {
        Self::with_config(|c| c.with_max_concurrent(max_concurrent))
    }

    pub fn with_config(customize: impl FnOnce(EngineConfig) -> EngineConfig) -> Self {
        Self::build(customize, None)
    }

    /// Default engine that can answer `info` through `source`
    pub fn with_info_source(source: Arc<dyn MediaInfoSource>) -> Self {
        Self::build(|c| c, Some(source))
    }

    fn build(
        customize: impl FnOnce(EngineConfig) -> EngineConfig,
        source: Option<Arc<dyn MediaInfoSource>>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualTimeProvider::new(1_700_000_000_000));
        let config = customize(EngineConfig::default().with_work_dir(dir.path()));
        let mut service = FetchService::new(
            config,
            Arc::new(SequentialIdProvider::new()),
            clock.clone(),
        );
        if let Some(source) = source {
            service = service.with_info_source(source);
        }
        let service = Arc::new(service);
        Self {
            service,
            clock,
            dir,
        }
    }

    pub fn submit(&self, url: &str) -> JobId {
        self.service.submit(SubmitRequest::new(url)).unwrap()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.service
            .list_active()
            .iter()
            .filter(|r| r.status == status)
            .count()
    }

    /// Poll until the job reaches `status`
    pub async fn wait_for_status(&self, id: &str, status: JobStatus) -> JobRecord {
        let service = Arc::clone(&self.service);
        let id = id.to_string();
        tokio::time::timeout(WAIT_TIMEOUT, async move {
            loop {
                let record = service.status(&id).unwrap();
                if record.status == status {
                    return record;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("job never reached {}", status))
    }

    /// Poll until `check` holds
    pub async fn wait_until(&self, what: &str, check: impl Fn(&Engine) -> bool) {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        while !check(self) {
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for {}", what);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub fn video_url(n: usize) -> String {
    format!("https://www.youtube.com/watch?v=clip{}", n)
}
