// Fetch Request Domain Model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::DomainError;

/// Requested quality selector
///
/// `Best` lets the backend pick the highest available rendition; `MaxHeight`
/// caps the video height (e.g. `720p`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Quality {
    #[default]
    Best,
    MaxHeight(u32),
}

impl Quality {
    /// Parse a quality string leniently.
    ///
    /// Anything that is not `best` or `<digits>p` falls back to `Best`.
    pub fn parse_lenient(s: &str) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case("best") {
            return Quality::Best;
        }
        s.trim_end_matches(|c: char| c == 'p' || c == 'P')
            .parse::<u32>()
            .ok()
            .filter(|h| *h > 0)
            .map(Quality::MaxHeight)
            .unwrap_or(Quality::Best)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Best => write!(f, "best"),
            Quality::MaxHeight(h) => write!(f, "{}p", h),
        }
    }
}

impl From<Quality> for String {
    fn from(q: Quality) -> Self {
        q.to_string()
    }
}

impl From<String> for Quality {
    fn from(s: String) -> Self {
        Quality::parse_lenient(&s)
    }
}

/// Output container / codec family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    /// Video merged and remuxed into mp4
    #[default]
    Mp4,
    /// Audio only, extracted to mp3
    Mp3,
}

impl MediaFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Mp3 => "mp3",
        }
    }

    pub fn is_audio_only(&self) -> bool {
        matches!(self, MediaFormat::Mp3)
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for MediaFormat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(MediaFormat::Mp4),
            "mp3" => Ok(MediaFormat::Mp3),
            other => Err(DomainError::ValidationError(format!(
                "unsupported format type: {}",
                other
            ))),
        }
    }
}

/// Opaque authentication material (cookie jar text)
///
/// Never printed and never serialized back to clients.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct AuthMaterial(String);

impl AuthMaterial {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthMaterial(<redacted>)")
    }
}

/// Immutable submission parameters of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub format: MediaFormat,
    #[serde(default, skip_serializing)]
    pub auth: Option<AuthMaterial>,
    #[serde(default)]
    pub custom_name: Option<String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            quality: Quality::Best,
            format: MediaFormat::Mp4,
            auth: None,
            custom_name: None,
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_format(mut self, format: MediaFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_auth(mut self, auth: AuthMaterial) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_custom_name(mut self, name: impl Into<String>) -> Self {
        self.custom_name = Some(name.into());
        self
    }
}
