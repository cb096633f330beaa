// Submit Use Case

use crate::application::admission::AdmissionQueue;
use crate::application::job_store::JobStore;
use crate::application::validation::{validate_request, UrlPolicy};
use crate::domain::{AuthMaterial, DomainError, FetchRequest, JobId, JobRecord, MediaFormat, Quality};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, TimeProvider};
use serde::Deserialize;
use tracing::info;

/// Submission as received from a client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitRequest {
    pub url: String,

    /// `best` or `<height>p`; anything else means best
    #[serde(default)]
    pub quality: Option<String>,

    /// `mp4` (default) or `mp3`
    #[serde(default)]
    pub format: Option<String>,

    #[serde(default)]
    pub auth: Option<AuthMaterial>,

    #[serde(default)]
    pub custom_name: Option<String>,
}

impl SubmitRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Normalize into the immutable request stored on the job
    pub fn into_fetch_request(self) -> Result<FetchRequest> {
        let format = match self.format.as_deref().map(str::trim) {
            None | Some("") => MediaFormat::default(),
            Some(raw) => raw.parse::<MediaFormat>().map_err(|e| match e {
                DomainError::ValidationError(msg) => AppError::Validation(msg),
                other => AppError::Domain(other),
            })?,
        };

        let quality = self
            .quality
            .as_deref()
            .map(Quality::parse_lenient)
            .unwrap_or_default();

        let mut request = FetchRequest::new(self.url.trim())
            .with_quality(quality)
            .with_format(format);

        if let Some(auth) = self.auth.filter(|a| !a.expose().trim().is_empty()) {
            request = request.with_auth(auth);
        }
        if let Some(name) = self.custom_name.map(|n| n.trim().to_string()) {
            if !name.is_empty() {
                request = request.with_custom_name(name);
            }
        }
        Ok(request)
    }
}

/// Execute submit: validate, store a queued record, enqueue its id
///
/// Never blocks on workers. On any error no job exists.
pub fn execute(
    store: &JobStore,
    queue: &AdmissionQueue,
    policy: &UrlPolicy,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    req: SubmitRequest,
) -> Result<JobId> {
    let request = req.into_fetch_request()?;
    validate_request(policy, &request)?;

    let job_id = id_provider.generate_id();
    let submitted_at = time_provider.now_millis();

    let url = request.url.clone();
    let format = request.format;
    let quality = request.quality;
    store.insert(JobRecord::new(job_id.clone(), request, submitted_at))?;
    queue.push(job_id.clone());

    info!(job_id = %job_id, url = %url, format = %format, quality = %quality, "Job submitted");
    Ok(job_id)
}
