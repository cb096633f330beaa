// Domain Layer - Pure job lifecycle entities

pub mod error;
pub mod job;
pub mod request;

// Re-exports
pub use error::DomainError;
pub use job::{Artifact, HistoryEntry, JobId, JobRecord, JobStatus, MAX_REPORTED_PROGRESS};
pub use request::{AuthMaterial, FetchRequest, MediaFormat, Quality};
