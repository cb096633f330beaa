// yt-dlp extraction backend
// Drives an external yt-dlp process per job or metadata lookup (tokio::process)
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use mediafetch_core::domain::AuthMaterial;
use mediafetch_core::port::{
    CancelToken, ExtractionBackend, FetchError, FetchJob, FetchOutput, MediaInfo, MediaInfoSource,
    ProgressEvent, ProgressSink,
};

use crate::process::{terminate_gracefully, GRACEFUL_KILL_TIMEOUT_MS};
use crate::ytdlp_args::{build_args, parse_progress_line, summarize_stderr, NetworkOptions};
use crate::ytdlp_info::{info_args, parse_media_info};

/// Cookie jar written next to the download for the duration of one run
pub const COOKIE_FILE_NAME: &str = ".cookies.txt";

/// stderr lines kept for error reporting
const STDERR_TAIL_LINES: usize = 40;

/// Upper bound for one metadata lookup (60 seconds)
pub const INFO_TIMEOUT_SECS: u64 = 60;

/// Environment variables passed through to yt-dlp by default
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LANG",
    "LC_ALL",
    "TMPDIR",
    "SSL_CERT_FILE",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
];

/// YtDlpBackend configuration
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// Executable to run (`yt-dlp`, or e.g. `python3`)
    pub program: PathBuf,
    /// Arguments placed before ours (e.g. `-m yt_dlp`)
    pub leading_args: Vec<String>,
    pub network: NetworkOptions,
    /// Inherited environment variables (everything else is cleared)
    pub env_allowlist: Vec<String>,
    /// SIGTERM -> SIGKILL grace period on cancellation
    pub kill_grace: Duration,
    /// A metadata lookup still running after this is killed
    pub info_timeout: Duration,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            leading_args: Vec::new(),
            network: NetworkOptions::default(),
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            kill_grace: Duration::from_millis(GRACEFUL_KILL_TIMEOUT_MS),
            info_timeout: Duration::from_secs(INFO_TIMEOUT_SECS),
        }
    }
}

impl YtDlpConfig {
    /// Parse a command line such as `yt-dlp` or `python3 -m yt_dlp`
    pub fn with_command(mut self, command: &str) -> Self {
        let mut parts = command.split_whitespace();
        if let Some(program) = parts.next() {
            self.program = PathBuf::from(shellexpand::tilde(program).into_owned());
            self.leading_args = parts.map(str::to_string).collect();
        }
        self
    }
}

/// Extraction backend backed by the yt-dlp CLI
pub struct YtDlpBackend {
    config: YtDlpConfig,
}

impl YtDlpBackend {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    /// Filter the current environment to the allowlist
    fn filtered_env(&self) -> HashMap<String, String> {
        std::env::vars()
            .filter(|(k, _)| self.config.env_allowlist.contains(k))
            .collect()
    }

    async fn write_cookies(&self, job: &FetchJob) -> Result<Option<PathBuf>, FetchError> {
        let Some(auth) = &job.request.auth else {
            return Ok(None);
        };
        let path = job.output_dir.join(COOKIE_FILE_NAME);
        write_cookie_file(&path, auth).await?;
        Ok(Some(path))
    }

    async fn run(
        &self,
        job: &FetchJob,
        cookie_file: Option<&Path>,
        progress: Arc<dyn ProgressSink>,
        mut cancel: CancelToken,
    ) -> Result<FetchOutput, FetchError> {
        let args = build_args(&job.request, &job.output_dir, cookie_file, self.config.network);

        info!(
            job_id = %job.job_id,
            program = %self.config.program.display(),
            output_dir = %job.output_dir.display(),
            "Starting yt-dlp"
        );

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.leading_args)
            .args(&args)
            .env_clear()
            .envs(self.filtered_env())
            .current_dir(&job.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            FetchError::Spawn(format!("{}: {}", self.config.program.display(), e))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::Spawn("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FetchError::Spawn("stderr not captured".to_string()))?;

        let stdout_task = tokio::spawn(read_stdout(stdout, Arc::clone(&progress)));
        let stderr_task = tokio::spawn(read_tail(stderr, STDERR_TAIL_LINES));

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                info!(job_id = %job.job_id, "Cancellation requested, stopping yt-dlp");
                if let Err(e) = terminate_gracefully(&mut child, self.config.kill_grace).await {
                    warn!(job_id = %job.job_id, error = %e, "Failed to stop yt-dlp");
                }
                return Err(FetchError::Cancelled);
            }
        };

        let printed_path = stdout_task.await.unwrap_or(None);
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let reason = summarize_stderr(&stderr_tail)
                .unwrap_or_else(|| "no diagnostic output".to_string());
            return Err(FetchError::Failed(format!(
                "yt-dlp exited with {}: {}",
                status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                reason
            )));
        }

        progress.report(ProgressEvent::Finished);

        let path = match printed_path {
            Some(p) if p.is_file() => p,
            _ => locate_artifact(&job.output_dir)
                .await?
                .ok_or(FetchError::EmptyOutput)?,
        };
        let size_bytes = tokio::fs::metadata(&path).await?.len();

        info!(job_id = %job.job_id, path = %path.display(), size_bytes, "yt-dlp finished");
        Ok(FetchOutput { path, size_bytes })
    }
}

#[async_trait]
impl MediaInfoSource for YtDlpBackend {
    async fn lookup(
        &self,
        url: &str,
        auth: Option<&AuthMaterial>,
    ) -> Result<MediaInfo, FetchError> {
        // Removed with its contents when dropped
        let jar_dir = match auth {
            Some(auth) => {
                let dir = tempfile::Builder::new()
                    .prefix("mediafetch-info-")
                    .tempdir()?;
                write_cookie_file(&dir.path().join(COOKIE_FILE_NAME), auth).await?;
                Some(dir)
            }
            None => None,
        };
        let cookie_file = jar_dir.as_ref().map(|d| d.path().join(COOKIE_FILE_NAME));
        let args = info_args(url, cookie_file.as_deref(), self.config.network);

        debug!(url = %url, program = %self.config.program.display(), "Fetching media info");

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.leading_args)
            .args(&args)
            .env_clear()
            .envs(self.filtered_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            FetchError::Spawn(format!("{}: {}", self.config.program.display(), e))
        })?;

        let output = match tokio::time::timeout(self.config.info_timeout, child.wait_with_output())
            .await
        {
            Ok(output) => output?,
            Err(_) => {
                return Err(FetchError::Failed(format!(
                    "yt-dlp metadata lookup timed out after {}s",
                    self.config.info_timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason =
                summarize_stderr(&stderr).unwrap_or_else(|| "no diagnostic output".to_string());
            return Err(FetchError::Failed(format!(
                "yt-dlp metadata lookup failed: {}",
                reason
            )));
        }

        parse_media_info(&output.stdout)
    }
}

#[async_trait]
impl ExtractionBackend for YtDlpBackend {
    async fn fetch(
        &self,
        job: FetchJob,
        progress: Arc<dyn ProgressSink>,
        cancel: CancelToken,
    ) -> Result<FetchOutput, FetchError> {
        let cookie_file = self.write_cookies(&job).await?;
        let result = self
            .run(&job, cookie_file.as_deref(), progress, cancel)
            .await;

        if let Some(path) = cookie_file {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(job_id = %job.job_id, error = %e, "Failed to remove cookie file");
            }
        }
        result
    }

    fn name(&self) -> &str {
        "yt-dlp"
    }
}

/// Write a cookie jar readable by the owner only
async fn write_cookie_file(path: &Path, auth: &AuthMaterial) -> Result<(), FetchError> {
    tokio::fs::write(path, auth.expose()).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}

/// Forward progress lines; return the last printed file path
async fn read_stdout<R>(stdout: R, progress: Arc<dyn ProgressSink>) -> Option<PathBuf>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    let mut last_path = None;

    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(event) = parse_progress_line(&line) {
            progress.report(event);
            continue;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let candidate = Path::new(trimmed);
        if candidate.is_absolute() {
            last_path = Some(candidate.to_path_buf());
        } else {
            debug!(line = %trimmed, "yt-dlp output");
        }
    }
    last_path
}

/// Keep the last `max_lines` lines of a stream
async fn read_tail<R>(stream: R, max_lines: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    let mut tail: std::collections::VecDeque<String> = std::collections::VecDeque::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == max_lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

fn is_candidate(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with(".part") && !name.ends_with(".ytdl")
}

/// Largest visible, finished file directly inside `dir`
pub async fn locate_artifact(dir: &Path) -> Result<Option<PathBuf>, FetchError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut best: Option<(u64, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !is_candidate(&name.to_string_lossy()) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        if best.as_ref().map_or(true, |(size, _)| metadata.len() > *size) {
            best = Some((metadata.len(), entry.path()));
        }
    }
    Ok(best.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediafetch_core::domain::{AuthMaterial, FetchRequest};
    use mediafetch_core::port::CancelHandle;
    use std::sync::Mutex;

    /// Records every event it receives
    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressSink for RecordingSink {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_with_command_splits_leading_args() {
        let config = YtDlpConfig::default().with_command("python3 -m yt_dlp");
        assert_eq!(config.program, PathBuf::from("python3"));
        assert_eq!(config.leading_args, vec!["-m", "yt_dlp"]);
    }

    #[test]
    fn test_default_timeouts() {
        let config = YtDlpConfig::default();
        assert_eq!(config.kill_grace, Duration::from_secs(5));
        assert_eq!(config.info_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_locate_artifact_skips_partial_and_hidden() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("small.mp4"), b"ab").unwrap();
        std::fs::write(dir.path().join("big.mp4"), b"abcdef").unwrap();
        std::fs::write(dir.path().join("huge.mp4.part"), vec![0u8; 100]).unwrap();
        std::fs::write(dir.path().join(COOKIE_FILE_NAME), vec![0u8; 100]).unwrap();

        let found = locate_artifact(dir.path()).await.unwrap();
        assert_eq!(found, Some(dir.path().join("big.mp4")));

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(locate_artifact(empty.path()).await.unwrap(), None);
    }

    #[cfg(unix)]
    mod fake_ytdlp {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Backend that runs `/bin/sh <script>` instead of yt-dlp
        fn backend_with_script(dir: &Path, body: &str) -> YtDlpBackend {
            let script = dir.join("fake-yt-dlp.sh");
            std::fs::write(&script, body).unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

            YtDlpBackend::new(YtDlpConfig {
                program: PathBuf::from("/bin/sh"),
                leading_args: vec![script.to_string_lossy().into_owned()],
                kill_grace: Duration::from_secs(2),
                ..YtDlpConfig::default()
            })
        }

        fn job(output_dir: &Path, request: FetchRequest) -> FetchJob {
            std::fs::create_dir_all(output_dir).unwrap();
            FetchJob {
                job_id: "job-1".to_string(),
                request,
                output_dir: output_dir.to_path_buf(),
            }
        }

        #[tokio::test]
        async fn test_success_reports_progress_and_printed_path() {
            let scripts = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            let backend = backend_with_script(
                scripts.path(),
                r#"
echo "mediafetch-progress 50 100 NA"
echo "mediafetch-progress 100 100 NA"
printf 'payload' > "$PWD/clip.mp4"
echo "$PWD/clip.mp4"
"#,
            );
            let sink = Arc::new(RecordingSink::default());
            let output_dir = work.path().join("job-1");

            let output = backend
                .fetch(
                    job(&output_dir, FetchRequest::new("https://youtu.be/x")),
                    sink.clone(),
                    CancelHandle::new().token(),
                )
                .await
                .unwrap();

            assert_eq!(output.path.file_name().unwrap(), "clip.mp4");
            assert_eq!(output.size_bytes, 7);

            let events = sink.events.lock().unwrap();
            assert_eq!(events.len(), 3);
            assert_eq!(events[0], ProgressEvent::transferred(50, Some(100)));
            assert_eq!(events[2], ProgressEvent::Finished);
        }

        #[tokio::test]
        async fn test_nonzero_exit_is_failure_with_stderr_reason() {
            let scripts = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            let backend = backend_with_script(
                scripts.path(),
                "echo 'ERROR: Video unavailable' >&2\nexit 1\n",
            );

            let err = backend
                .fetch(
                    job(&work.path().join("j"), FetchRequest::new("https://youtu.be/x")),
                    Arc::new(RecordingSink::default()),
                    CancelHandle::new().token(),
                )
                .await
                .unwrap_err();

            match err {
                FetchError::Failed(msg) => assert!(msg.contains("Video unavailable"), "{}", msg),
                other => panic!("unexpected error: {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_no_output_file_is_empty_output() {
            let scripts = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            let backend = backend_with_script(scripts.path(), "exit 0\n");

            let err = backend
                .fetch(
                    job(&work.path().join("j"), FetchRequest::new("https://youtu.be/x")),
                    Arc::new(RecordingSink::default()),
                    CancelHandle::new().token(),
                )
                .await
                .unwrap_err();
            assert_eq!(err, FetchError::EmptyOutput);
        }

        #[tokio::test]
        async fn test_cancel_stops_process() {
            let scripts = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            let backend = Arc::new(backend_with_script(scripts.path(), "sleep 30\n"));
            let handle = CancelHandle::new();
            let token = handle.token();
            let output_dir = work.path().join("j");
            let fetch_job = job(&output_dir, FetchRequest::new("https://youtu.be/x"));

            let task = tokio::spawn({
                let backend = Arc::clone(&backend);
                async move {
                    backend
                        .fetch(fetch_job, Arc::new(RecordingSink::default()), token)
                        .await
                }
            });

            tokio::time::sleep(Duration::from_millis(200)).await;
            handle.cancel();

            let result = tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("fetch should stop promptly")
                .unwrap();
            assert_eq!(result.unwrap_err(), FetchError::Cancelled);
        }

        #[tokio::test]
        async fn test_cookie_file_is_passed_then_removed() {
            let scripts = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            // Copy the cookie jar into the artifact so the test can inspect it
            let backend = backend_with_script(
                scripts.path(),
                r#"
prev=""
for arg in "$@"; do
  if [ "$prev" = "--cookies" ]; then cp "$arg" "$PWD/out.mp4"; fi
  prev="$arg"
done
"#,
            );
            let output_dir = work.path().join("j");
            let request = FetchRequest::new("https://youtu.be/x")
                .with_auth(AuthMaterial::new("# Netscape HTTP Cookie File\n"));

            let output = backend
                .fetch(
                    job(&output_dir, request),
                    Arc::new(RecordingSink::default()),
                    CancelHandle::new().token(),
                )
                .await
                .unwrap();

            let copied = std::fs::read_to_string(&output.path).unwrap();
            assert!(copied.starts_with("# Netscape"));
            assert!(!output_dir.join(COOKIE_FILE_NAME).exists());
        }

        #[tokio::test]
        async fn test_lookup_parses_metadata_dump() {
            let scripts = tempfile::tempdir().unwrap();
            // Refuse to answer unless asked for a metadata-only dump
            let backend = backend_with_script(
                scripts.path(),
                r#"
case " $* " in *" -J "*) ;; *) exit 3 ;; esac
case " $* " in *" --skip-download "*) ;; *) exit 4 ;; esac
cat <<'JSON'
{"id":"abc","title":"Clip","duration":61,"uploader":"someone","upload_date":"20240101",
 "view_count":5,"thumbnail":"https://i.ytimg.com/vi/abc/hq.jpg","description":"hello",
 "webpage_url":"https://www.youtube.com/watch?v=abc","extractor":"youtube",
 "formats":[{"format_id":"18","ext":"mp4","height":360,"width":640},
            {"format_id":"140","ext":"m4a","height":null}]}
JSON
"#,
            );

            let info = backend
                .lookup("https://www.youtube.com/watch?v=abc", None)
                .await
                .unwrap();

            assert_eq!(info.title.as_deref(), Some("Clip"));
            assert_eq!(info.duration, Some(61.0));
            assert_eq!(info.upload_date.as_deref(), Some("20240101"));
            assert_eq!(info.extractor.as_deref(), Some("youtube"));
            assert_eq!(info.formats.len(), 1);
            assert_eq!(info.formats[0].height, 360);
        }

        #[tokio::test]
        async fn test_lookup_cookie_jar_is_private_and_removed() {
            let scripts = tempfile::tempdir().unwrap();
            // Echo the jar's path, first line and mode back through the JSON
            let backend = backend_with_script(
                scripts.path(),
                r#"
jar=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "--cookies" ]; then jar="$arg"; fi
  prev="$arg"
done
[ -n "$jar" ] || exit 5
first=$(head -n 1 "$jar")
mode=$(stat -c %a "$jar")
printf '{"title":"%s","uploader":"%s","webpage_url":"%s"}' "$first" "$mode" "$jar"
"#,
            );

            let auth = AuthMaterial::new("# Netscape HTTP Cookie File\n");
            let info = backend
                .lookup("https://youtu.be/abc", Some(&auth))
                .await
                .unwrap();

            assert_eq!(info.title.as_deref(), Some("# Netscape HTTP Cookie File"));
            assert_eq!(info.uploader.as_deref(), Some("600"));
            let jar = info.webpage_url.unwrap();
            assert!(jar.ends_with(COOKIE_FILE_NAME));
            assert!(!Path::new(&jar).exists());
        }

        #[tokio::test]
        async fn test_lookup_failure_carries_stderr_reason() {
            let scripts = tempfile::tempdir().unwrap();
            let backend = backend_with_script(
                scripts.path(),
                "echo 'ERROR: [youtube] abc: Private video' >&2\nexit 1\n",
            );

            let err = backend.lookup("https://youtu.be/abc", None).await.unwrap_err();
            match err {
                FetchError::Failed(msg) => assert!(msg.contains("Private video"), "{}", msg),
                other => panic!("unexpected error: {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_lookup_timeout_kills_process() {
            let scripts = tempfile::tempdir().unwrap();
            let script = scripts.path().join("slow.sh");
            std::fs::write(&script, "sleep 30\n").unwrap();
            let backend = YtDlpBackend::new(YtDlpConfig {
                program: PathBuf::from("/bin/sh"),
                leading_args: vec![script.to_string_lossy().into_owned()],
                info_timeout: Duration::from_millis(200),
                ..YtDlpConfig::default()
            });

            let started = std::time::Instant::now();
            let err = backend.lookup("https://youtu.be/abc", None).await.unwrap_err();
            assert!(matches!(err, FetchError::Failed(msg) if msg.contains("timed out")));
            assert!(started.elapsed() < Duration::from_secs(5));
        }
    }
}
