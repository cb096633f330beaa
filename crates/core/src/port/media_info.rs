// Media Info Port
// Metadata lookup for a source URL; nothing is downloaded

use crate::domain::AuthMaterial;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::extraction_backend::FetchError;

/// One downloadable video format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub format_id: String,
    pub ext: String,
    pub height: u32,
    pub width: Option<u32>,
    pub filesize: Option<u64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub fps: Option<f64>,
}

/// Metadata of a media page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    /// `YYYYMMDD` as reported by the extractor
    pub upload_date: Option<String>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub thumbnail: Option<String>,
    pub description: String,
    pub formats: Vec<FormatInfo>,
    pub webpage_url: Option<String>,
    pub extractor: Option<String>,
}

/// Media info lookup
///
/// Implementations:
/// - YtDlpBackend (infra-system): `yt-dlp -J --skip-download`
/// - StubInfoSource (mocks): canned answers for tests
#[async_trait]
pub trait MediaInfoSource: Send + Sync {
    /// Look up metadata for `url`, optionally with a cookie jar
    ///
    /// # Errors
    /// - FetchError::Spawn if the lookup cannot start
    /// - FetchError::Failed if the extractor rejects the URL or times out
    async fn lookup(&self, url: &str, auth: Option<&AuthMaterial>)
        -> Result<MediaInfo, FetchError>;
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the same answer for every URL
    pub struct StubInfoSource {
        answer: Result<MediaInfo, FetchError>,
        calls: AtomicUsize,
        with_auth: AtomicUsize,
    }

    impl StubInfoSource {
        pub fn new(info: MediaInfo) -> Self {
            Self {
                answer: Ok(info),
                calls: AtomicUsize::new(0),
                with_auth: AtomicUsize::new(0),
            }
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self {
                answer: Err(FetchError::Failed(message.into())),
                calls: AtomicUsize::new(0),
                with_auth: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Calls that carried a cookie jar
        pub fn auth_count(&self) -> usize {
            self.with_auth.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MediaInfoSource for StubInfoSource {
        async fn lookup(
            &self,
            _url: &str,
            auth: Option<&AuthMaterial>,
        ) -> Result<MediaInfo, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if auth.is_some() {
                self.with_auth.fetch_add(1, Ordering::SeqCst);
            }
            self.answer.clone()
        }
    }
}
