// Info Use Case
// Metadata of a URL without creating a job

use crate::application::validation::UrlPolicy;
use crate::domain::AuthMaterial;
use crate::error::{AppError, Result};
use crate::port::{MediaInfo, MediaInfoSource};
use serde::Deserialize;
use tracing::{info, warn};

/// Formats returned per lookup, tallest first
pub const MAX_FORMATS: usize = 10;

/// Description length kept, in characters
pub const MAX_DESCRIPTION_CHARS: usize = 500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfoRequest {
    pub url: String,

    #[serde(default)]
    pub auth: Option<AuthMaterial>,
}

impl InfoRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Execute info: same URL policy as submit, then one lookup
pub async fn execute(
    policy: &UrlPolicy,
    source: Option<&dyn MediaInfoSource>,
    req: InfoRequest,
) -> Result<MediaInfo> {
    let source = source
        .ok_or_else(|| AppError::Config("No media info source configured".to_string()))?;

    let url = policy.validate(req.url.trim())?;
    let auth = req.auth.filter(|a| !a.expose().trim().is_empty());

    let raw = source.lookup(url.as_str(), auth.as_ref()).await.map_err(|e| {
        warn!(url = %url, error = %e, "Media info lookup failed");
        AppError::Backend(e)
    })?;

    let shaped = shape(raw);
    info!(url = %url, formats = shaped.formats.len(), "Media info fetched");
    Ok(shaped)
}

/// Tallest formats first, capped; description clipped on a char boundary
pub fn shape(mut info: MediaInfo) -> MediaInfo {
    info.formats.sort_by(|a, b| b.height.cmp(&a.height));
    info.formats.truncate(MAX_FORMATS);

    if info.description.chars().count() > MAX_DESCRIPTION_CHARS {
        let mut clipped: String = info.description.chars().take(MAX_DESCRIPTION_CHARS).collect();
        clipped.push_str("...");
        info.description = clipped;
    }
    info
}
