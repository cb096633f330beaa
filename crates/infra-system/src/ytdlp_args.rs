// yt-dlp command line construction and output parsing

use mediafetch_core::domain::{FetchRequest, MediaFormat, Quality};
use mediafetch_core::port::ProgressEvent;
use std::path::Path;

/// Marker that prefixes our progress lines on stdout
pub const PROGRESS_PREFIX: &str = "mediafetch-progress";

/// Output template used when the caller gives no name
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s [%(id)s].%(ext)s";

/// Longest stem kept from a caller-supplied name
const MAX_STEM_LEN: usize = 90;

/// Network knobs passed to every invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkOptions {
    pub retries: u32,
    pub socket_timeout_secs: u32,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            socket_timeout_secs: 30,
        }
    }
}

/// yt-dlp `-f` selector for a request
pub fn format_selector(quality: Quality, format: MediaFormat) -> String {
    if format.is_audio_only() {
        return "bestaudio/best".to_string();
    }
    match quality {
        Quality::Best => "bestvideo+bestaudio/best".to_string(),
        Quality::MaxHeight(h) => format!(
            "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height<={h}]+bestaudio/best[height<={h}]"
        ),
    }
}

/// Make a caller-supplied name safe to use as a file stem
///
/// Anything outside `[A-Za-z0-9_.-]` becomes `_`; the result never starts
/// with a non-alphanumeric character.
pub fn sanitize_stem(name: &str) -> String {
    let mut stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();

    if !stem.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        stem.insert_str(0, "video_");
    }
    stem
}

/// Full argument list (after the program and any leading args)
pub fn build_args(
    request: &FetchRequest,
    output_dir: &Path,
    cookie_file: Option<&Path>,
    net: NetworkOptions,
) -> Vec<String> {
    let template = match &request.custom_name {
        Some(name) => format!("{}.%(ext)s", sanitize_stem(name)),
        None => DEFAULT_OUTPUT_TEMPLATE.to_string(),
    };

    let mut args: Vec<String> = vec![
        "--no-playlist".into(),
        "--no-color".into(),
        "--newline".into(),
        "--progress".into(),
        "--progress-template".into(),
        format!(
            "download:{} %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s",
            PROGRESS_PREFIX
        ),
        "--no-simulate".into(),
        "--print".into(),
        "after_move:filepath".into(),
        "--retries".into(),
        net.retries.to_string(),
        "--fragment-retries".into(),
        net.retries.to_string(),
        "--extractor-retries".into(),
        net.retries.to_string(),
        "--socket-timeout".into(),
        net.socket_timeout_secs.to_string(),
        "-f".into(),
        format_selector(request.quality, request.format),
        "-P".into(),
        output_dir.to_string_lossy().into_owned(),
        "-o".into(),
        template,
    ];

    match request.format {
        MediaFormat::Mp3 => args.extend([
            "--extract-audio".into(),
            "--audio-format".into(),
            "mp3".into(),
            "--audio-quality".into(),
            "192K".into(),
        ]),
        MediaFormat::Mp4 => args.extend([
            "--merge-output-format".into(),
            "mp4".into(),
            "--remux-video".into(),
            "mp4".into(),
        ]),
    }

    if let Some(cookies) = cookie_file {
        args.push("--cookies".into());
        args.push(cookies.to_string_lossy().into_owned());
    }

    args.push("--".into());
    args.push(request.url.clone());
    args
}

fn parse_count(field: &str) -> Option<u64> {
    let value: f64 = field.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value as u64)
}

/// Parse one stdout line produced by our progress template
///
/// Unknown fields are printed by yt-dlp as `NA`.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let mut fields = line.split_whitespace();
    if fields.next()? != PROGRESS_PREFIX {
        return None;
    }
    let bytes_done = parse_count(fields.next()?)?;
    let bytes_total = fields.next().and_then(parse_count);
    let bytes_total_estimate = fields.next().and_then(parse_count);

    Some(ProgressEvent::Transferred {
        bytes_done,
        bytes_total,
        bytes_total_estimate,
    })
}

/// Most useful line of yt-dlp's stderr for an error message
pub fn summarize_stderr(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
}
