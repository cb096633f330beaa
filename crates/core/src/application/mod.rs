// Application Layer - Use Cases and Job Lifecycle

pub mod admission;
pub mod config;
pub mod fetch_service;
pub mod history;
pub mod job_store;
pub mod progress;
pub mod sweeper;
pub mod validation;
pub mod worker;

// Re-exports
pub use admission::AdmissionQueue;
pub use config::EngineConfig;
pub use fetch_service::{FetchService, InfoRequest, ServiceStats, SubmitRequest};
pub use history::HistoryLedger;
pub use job_store::JobStore;
pub use progress::ProgressBridge;
pub use sweeper::{RetentionSweeper, SweepReport};
pub use validation::UrlPolicy;
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker, WorkerPool};
