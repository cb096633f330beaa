// Port Layer - Interfaces for external dependencies

pub mod cancellation;
pub mod extraction_backend;
pub mod id_provider; // For deterministic testing
pub mod media_info;
pub mod progress;
pub mod time_provider;

// Re-exports
pub use cancellation::{CancelHandle, CancelToken};
pub use extraction_backend::{ExtractionBackend, FetchError, FetchJob, FetchOutput};
pub use id_provider::IdProvider;
pub use media_info::{FormatInfo, MediaInfo, MediaInfoSource};
pub use progress::{ProgressEvent, ProgressSink};
pub use time_provider::TimeProvider;
