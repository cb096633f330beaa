//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use mediafetch_core::application::{ServiceStats, SweepReport};
use mediafetch_core::port::MediaInfo;
use mediafetch_core::domain::{AuthMaterial, HistoryEntry, JobRecord};
use serde::{Deserialize, Serialize};

/// jobs.submit.v1 - Submit a fetch job
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub url: String,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default, alias = "format_type")]
    pub format: Option<String>,
    /// Netscape cookie jar text
    #[serde(default, alias = "cookies")]
    pub auth: Option<AuthMaterial>,
    #[serde(default, alias = "custom_filename")]
    pub custom_name: Option<String>,
}

impl From<SubmitRequest> for mediafetch_core::application::SubmitRequest {
    fn from(req: SubmitRequest) -> Self {
        Self {
            url: req.url,
            quality: req.quality,
            format: req.format,
            auth: req.auth,
            custom_name: req.custom_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: String,
}

/// jobs.info.v1 - Metadata of a URL, no job is created
#[derive(Debug, Deserialize)]
pub struct InfoRequest {
    pub url: String,
    #[serde(default, alias = "cookies")]
    pub auth: Option<AuthMaterial>,
}

impl From<InfoRequest> for mediafetch_core::application::InfoRequest {
    fn from(req: InfoRequest) -> Self {
        Self {
            url: req.url,
            auth: req.auth,
        }
    }
}

pub type InfoResponse = MediaInfo;

/// jobs.status.v1 / jobs.cancel.v1 / jobs.artifact.v1
#[derive(Debug, Deserialize)]
pub struct JobIdRequest {
    pub job_id: String,
}

/// Client-facing view of a job (auth material is never included)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: String,
    pub url: String,
    pub quality: String,
    pub format: String,
    pub custom_name: Option<String>,
    pub status: String,
    pub progress: f64,
    pub error: Option<String>,
    pub file_name: Option<String>,
    pub size_bytes: Option<u64>,
    pub submitted_at: i64,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
}

impl From<&JobRecord> for JobView {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.id.clone(),
            url: record.request.url.clone(),
            quality: record.request.quality.to_string(),
            format: record.request.format.to_string(),
            custom_name: record.request.custom_name.clone(),
            status: record.status.to_string(),
            progress: (record.progress * 10.0).round() / 10.0,
            error: record.error.clone(),
            file_name: record.artifact.as_ref().and_then(|a| {
                a.path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            }),
            size_bytes: record.artifact.as_ref().map(|a| a.size_bytes),
            submitted_at: record.submitted_at,
            started_at: record.started_at,
            ended_at: record.ended_at,
        }
    }
}

impl From<&HistoryEntry> for JobView {
    fn from(entry: &HistoryEntry) -> Self {
        JobView::from(entry.record())
    }
}

/// jobs.list.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub jobs: Vec<JobView>,
}

/// jobs.history.v1
#[derive(Debug, Default, Deserialize)]
pub struct HistoryRequest {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub entries: Vec<JobView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled: bool,
}

/// jobs.artifact.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactResponse {
    pub job_id: String,
    pub path: String,
    pub file_name: String,
    pub size_bytes: u64,
}

/// admin.sweep.v1 - Delete expired artifacts
#[derive(Debug, Deserialize)]
pub struct SweepRequest {
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

impl Default for SweepRequest {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
        }
    }
}

fn default_max_age_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    pub max_age_hours: u64,
    #[serde(flatten)]
    pub report: SweepReport,
}

/// admin.stats.v1 - Engine counters
#[derive(Debug, Default, Deserialize)]
pub struct StatsRequest {
    // No parameters needed
}

pub type StatsResponse = ServiceStats;

#[cfg(test)]
mod tests {
    use super::*;
    use mediafetch_core::domain::{Artifact, FetchRequest};
    use std::path::PathBuf;

    #[test]
    fn test_submit_request_accepts_original_field_names() {
        let req: SubmitRequest = serde_json::from_value(serde_json::json!({
            "url": "https://youtu.be/x",
            "format_type": "mp3",
            "cookies": "secret",
            "custom_filename": "clip"
        }))
        .unwrap();
        assert_eq!(req.format.as_deref(), Some("mp3"));
        assert_eq!(req.custom_name.as_deref(), Some("clip"));
        assert!(req.auth.is_some());
    }

    #[test]
    fn test_job_view_hides_auth_and_full_path() {
        let request = FetchRequest::new("https://youtu.be/x")
            .with_auth(AuthMaterial::new("session=secret"));
        let mut record = JobRecord::new("job-1", request, 1);
        record.start(2).unwrap();
        record
            .complete(
                Artifact {
                    path: PathBuf::from("/tmp/work/job-1/clip.mp4"),
                    size_bytes: 9,
                },
                3,
            )
            .unwrap();

        let json = serde_json::to_string(&JobView::from(&record)).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("/tmp/work"));
        assert!(json.contains("\"file_name\":\"clip.mp4\""));
        assert!(json.contains("\"status\":\"completed\""));
    }

    #[test]
    fn test_sweep_request_default() {
        let req: SweepRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.max_age_hours, 24);
    }
}
