// yt-dlp metadata dump (`-J`) handling

use serde::Deserialize;
use std::path::Path;

use mediafetch_core::port::{FetchError, FormatInfo, MediaInfo};

use crate::ytdlp_args::NetworkOptions;

#[derive(Debug, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    upload_date: Option<String>,
    view_count: Option<u64>,
    like_count: Option<u64>,
    thumbnail: Option<String>,
    description: Option<String>,
    #[serde(default)]
    formats: Option<Vec<RawFormat>>,
    webpage_url: Option<String>,
    extractor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: Option<String>,
    ext: Option<String>,
    height: Option<u32>,
    width: Option<u32>,
    filesize: Option<u64>,
    vcodec: Option<String>,
    acodec: Option<String>,
    fps: Option<f64>,
}

impl RawFormat {
    /// Formats without a height or extension (audio-only, storyboards) are dropped
    fn into_format(self) -> Option<FormatInfo> {
        let height = self.height.filter(|h| *h > 0)?;
        let ext = self.ext.filter(|e| !e.is_empty())?;
        Some(FormatInfo {
            format_id: self.format_id.unwrap_or_default(),
            ext,
            height,
            width: self.width,
            filesize: self.filesize,
            vcodec: self.vcodec,
            acodec: self.acodec,
            fps: self.fps,
        })
    }
}

/// Arguments for a metadata-only run against `url`
pub fn info_args(url: &str, cookie_file: Option<&Path>, net: NetworkOptions) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-J".into(),
        "--skip-download".into(),
        "--no-playlist".into(),
        "--no-warnings".into(),
        "--no-color".into(),
        "--extractor-retries".into(),
        net.retries.to_string(),
        "--socket-timeout".into(),
        net.socket_timeout_secs.to_string(),
    ];
    if let Some(path) = cookie_file {
        args.push("--cookies".into());
        args.push(path.to_string_lossy().into_owned());
    }
    args.push("--".into());
    args.push(url.to_string());
    args
}

/// Parse the JSON document yt-dlp prints for `-J`
pub fn parse_media_info(stdout: &[u8]) -> Result<MediaInfo, FetchError> {
    let raw: RawInfo = serde_json::from_slice(stdout)
        .map_err(|e| FetchError::Failed(format!("Unreadable yt-dlp metadata: {}", e)))?;

    Ok(MediaInfo {
        id: raw.id,
        title: raw.title,
        duration: raw.duration,
        uploader: raw.uploader,
        upload_date: raw.upload_date,
        view_count: raw.view_count,
        like_count: raw.like_count,
        thumbnail: raw.thumbnail,
        description: raw.description.unwrap_or_default(),
        formats: raw
            .formats
            .unwrap_or_default()
            .into_iter()
            .filter_map(RawFormat::into_format)
            .collect(),
        webpage_url: raw.webpage_url,
        extractor: raw.extractor,
    })
}
