// Extraction Backend Port
// Abstraction over the fetch/transcode capability (yt-dlp subprocess, stubs, ...)

use crate::domain::{FetchRequest, JobId};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use super::cancellation::CancelToken;
use super::progress::ProgressSink;

/// Work order handed to a backend
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub job_id: JobId,
    pub request: FetchRequest,
    /// Directory reserved for this job; the artifact must land inside it
    pub output_dir: PathBuf,
}

/// Result of a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Fetch errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Spawn failed: {0}")]
    Spawn(String),

    #[error("Fetch failed: {0}")]
    Failed(String),

    #[error("Fetch cancelled")]
    Cancelled,

    #[error("No file was downloaded")]
    EmptyOutput,

    #[error("Downloaded file is empty")]
    ZeroBytes,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Backend panicked: {0}")]
    Panicked(String),
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(err.to_string())
    }
}

/// Extraction Backend trait
///
/// Implementations:
/// - YtDlpBackend (infra-system): drives an external yt-dlp process
/// - StubBackend (mocks): deterministic outcomes for tests
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Fetch one job's media into `job.output_dir`
    ///
    /// `progress` may be called any number of times. When `cancel` fires the
    /// backend should stop as soon as practical and return
    /// `FetchError::Cancelled`; backends that cannot stop may ignore it.
    ///
    /// # Errors
    /// - FetchError::Spawn if the backend cannot start
    /// - FetchError::Failed for extraction/transcode failures
    /// - FetchError::Cancelled when stopped through the token
    async fn fetch(
        &self,
        job: FetchJob,
        progress: Arc<dyn ProgressSink>,
        cancel: CancelToken,
    ) -> Result<FetchOutput, FetchError>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "backend"
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::port::progress::ProgressEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    /// File name written by the stub into the job directory
    pub const STUB_ARTIFACT_NAME: &str = "artifact.bin";

    /// Mock backend behavior
    #[derive(Debug, Clone)]
    pub enum StubBehavior {
        /// Write `bytes` bytes and succeed
        Succeed { bytes: u64 },
        /// Wait for `release()`, then write `bytes` bytes and succeed.
        /// With `honor_cancel`, a cancel while waiting returns `Cancelled`.
        Gated { bytes: u64, honor_cancel: bool },
        /// Write an empty file and report success
        ZeroBytes,
        /// Report success without writing anything
        NoOutput,
        /// Always fail with message
        Fail(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
    }

    /// Stub extraction backend with invocation counting
    pub struct StubBackend {
        behavior: Mutex<StubBehavior>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        gate: Semaphore,
    }

    impl StubBackend {
        pub fn new(behavior: StubBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                gate: Semaphore::new(0),
            }
        }

        pub fn new_success(bytes: u64) -> Self {
            Self::new(StubBehavior::Succeed { bytes })
        }

        pub fn new_gated(bytes: u64) -> Self {
            Self::new(StubBehavior::Gated {
                bytes,
                honor_cancel: false,
            })
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(StubBehavior::Fail(message.into()))
        }

        pub fn new_panic_inducing(message: impl Into<String>) -> Self {
            Self::new(StubBehavior::Panic(message.into()))
        }

        pub fn set_behavior(&self, behavior: StubBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        /// Let `n` gated fetches proceed
        pub fn release(&self, n: usize) {
            self.gate.add_permits(n);
        }

        /// Number of times `fetch` was invoked
        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Highest number of concurrent `fetch` calls observed
        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        async fn write_artifact(
            job: &FetchJob,
            bytes: u64,
            progress: &Arc<dyn ProgressSink>,
        ) -> Result<FetchOutput, FetchError> {
            for quarter in 1..=3u64 {
                progress.report(ProgressEvent::transferred(bytes * quarter / 4, Some(bytes)));
            }
            let path = job.output_dir.join(STUB_ARTIFACT_NAME);
            tokio::fs::write(&path, vec![0u8; bytes as usize]).await?;
            progress.report(ProgressEvent::Finished);
            Ok(FetchOutput {
                path,
                size_bytes: bytes,
            })
        }

        async fn run(
            &self,
            job: FetchJob,
            progress: Arc<dyn ProgressSink>,
            mut cancel: CancelToken,
        ) -> Result<FetchOutput, FetchError> {
            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                StubBehavior::Succeed { bytes } => Self::write_artifact(&job, bytes, &progress).await,
                StubBehavior::Gated {
                    bytes,
                    honor_cancel,
                } => {
                    if honor_cancel {
                        tokio::select! {
                            permit = self.gate.acquire() => {
                                permit.map_err(|e| FetchError::Failed(e.to_string()))?.forget();
                            }
                            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                        }
                    } else {
                        self.gate
                            .acquire()
                            .await
                            .map_err(|e| FetchError::Failed(e.to_string()))?
                            .forget();
                    }
                    Self::write_artifact(&job, bytes, &progress).await
                }
                StubBehavior::ZeroBytes => {
                    let path = job.output_dir.join(STUB_ARTIFACT_NAME);
                    tokio::fs::write(&path, b"").await?;
                    Ok(FetchOutput {
                        path,
                        size_bytes: 0,
                    })
                }
                StubBehavior::NoOutput => Ok(FetchOutput {
                    path: job.output_dir.join(STUB_ARTIFACT_NAME),
                    size_bytes: 0,
                }),
                StubBehavior::Fail(msg) => Err(FetchError::Failed(msg)),
                StubBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
            }
        }
    }

    #[async_trait]
    impl ExtractionBackend for StubBackend {
        async fn fetch(
            &self,
            job: FetchJob,
            progress: Arc<dyn ProgressSink>,
            cancel: CancelToken,
        ) -> Result<FetchOutput, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let guard = InFlightGuard(&self.in_flight);
            let result = self.run(job, progress, cancel).await;
            drop(guard);
            result
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    struct InFlightGuard<'a>(&'a AtomicUsize);

    impl Drop for InFlightGuard<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
