//! Mediafetch CLI - talks to the daemon over JSON-RPC

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9531";

#[derive(Parser)]
#[command(name = "mediafetch")]
#[command(about = "Mediafetch job engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "MEDIAFETCH_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a new fetch job
    Submit {
        /// Media page URL
        url: String,

        /// Quality (best, 1080p, 720p, 480p, 360p)
        #[arg(short, long, default_value = "best")]
        quality: String,

        /// Output format (mp4 or mp3)
        #[arg(short, long, default_value = "mp4")]
        format: String,

        /// Netscape cookie jar to pass to the extractor
        #[arg(long)]
        cookies_file: Option<PathBuf>,

        /// Output file stem
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show title, duration and available formats without downloading
    Info {
        /// Media page URL
        url: String,

        /// Netscape cookie jar to pass to the extractor
        #[arg(long)]
        cookies_file: Option<PathBuf>,
    },

    /// Show one job
    Status {
        /// Job ID
        job_id: String,
    },

    /// List live jobs
    List,

    /// Show finished jobs, most recent last
    History {
        /// Maximum number of entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Cancel a job
    Cancel {
        /// Job ID
        job_id: String,
    },

    /// Print the artifact path of a completed job
    Artifact {
        /// Job ID
        job_id: String,
    },

    /// Delete artifacts older than the given age
    Sweep {
        #[arg(long, default_value = "24")]
        max_age_hours: u64,
    },

    /// Show engine counters
    Stats,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct SubmitResult {
    job_id: String,
    status: String,
}

#[derive(Deserialize)]
struct JobView {
    job_id: String,
    url: String,
    quality: String,
    format: String,
    status: String,
    progress: f64,
    error: Option<String>,
    file_name: Option<String>,
    size_bytes: Option<u64>,
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Progress")]
    progress: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "File / Error")]
    detail: String,
    #[tabled(rename = "URL")]
    url: String,
}

impl From<&JobView> for JobRow {
    fn from(job: &JobView) -> Self {
        let detail = match (&job.file_name, &job.error) {
            (Some(name), _) => match job.size_bytes {
                Some(size) => format!("{} ({})", name, human_size(size)),
                None => name.clone(),
            },
            (None, Some(err)) => err.clone(),
            (None, None) => String::new(),
        };
        Self {
            id: job.job_id.clone(),
            status: job.status.clone(),
            progress: format!("{:.1}%", job.progress),
            format: format!("{} {}", job.format, job.quality),
            detail,
            url: job.url.clone(),
        }
    }
}

#[derive(Deserialize)]
struct JobList {
    #[serde(alias = "entries")]
    jobs: Vec<JobView>,
}

#[derive(Deserialize)]
struct MediaInfoView {
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    upload_date: Option<String>,
    view_count: Option<u64>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    formats: Vec<FormatView>,
}

#[derive(Deserialize)]
struct FormatView {
    format_id: String,
    ext: String,
    height: u32,
    width: Option<u32>,
    fps: Option<f64>,
    filesize: Option<u64>,
}

#[derive(Tabled)]
struct FormatRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Ext")]
    ext: String,
    #[tabled(rename = "Resolution")]
    resolution: String,
    #[tabled(rename = "FPS")]
    fps: String,
    #[tabled(rename = "Size")]
    size: String,
}

impl From<&FormatView> for FormatRow {
    fn from(f: &FormatView) -> Self {
        Self {
            id: f.format_id.clone(),
            ext: f.ext.clone(),
            resolution: match f.width {
                Some(w) => format!("{}x{}", w, f.height),
                None => format!("{}p", f.height),
            },
            fps: f.fps.map(|v| format!("{}", v)).unwrap_or_default(),
            size: f.filesize.map(human_size).unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct ArtifactResult {
    path: String,
    size_bytes: u64,
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

fn colored_status(status: &str) -> String {
    match status {
        "completed" => status.green().to_string(),
        "error" => status.red().to_string(),
        "cancelled" => status.yellow().to_string(),
        "running" => status.cyan().to_string(),
        _ => status.to_string(),
    }
}

fn human_size(bytes: u64) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    if bytes as f64 >= MB {
        format!("{:.2} MB", bytes as f64 / MB)
    } else {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    }
}

/// `h:mm:ss` or `m:ss`
fn clock_duration(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

fn read_cookies(path: Option<PathBuf>) -> Result<Option<String>> {
    match path {
        Some(path) => std::fs::read_to_string(&path)
            .map(Some)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => Ok(None),
    }
}

fn print_jobs(jobs: &[JobView], empty: &str) {
    if jobs.is_empty() {
        println!("{}", empty.yellow());
        return;
    }
    let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
    println!("{}", Table::new(rows));
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            url,
            quality,
            format,
            cookies_file,
            name,
        } => {
            let cookies = read_cookies(cookies_file)?;

            let params = json!({
                "url": url,
                "quality": quality,
                "format": format,
                "auth": cookies,
                "custom_name": name,
            });

            let result = call_rpc(&cli.rpc_url, "jobs.submit.v1", params).await?;
            let submit_result: SubmitResult = serde_json::from_value(result)?;

            println!("{}", "✓ Job submitted".green().bold());
            println!();
            println!("{}", Table::new(vec![submit_result]));
        }

        Commands::Info { url, cookies_file } => {
            let cookies = read_cookies(cookies_file)?;
            let params = json!({ "url": url, "auth": cookies });

            let result = call_rpc(&cli.rpc_url, "jobs.info.v1", params).await?;
            let info: MediaInfoView = serde_json::from_value(result)?;

            println!(
                "{}",
                info.title.as_deref().unwrap_or("(untitled)").cyan().bold()
            );
            println!();
            if let Some(uploader) = &info.uploader {
                println!("  {} {}", "Uploader:".bold(), uploader);
            }
            if let Some(duration) = info.duration {
                println!("  {} {}", "Duration:".bold(), clock_duration(duration));
            }
            if let Some(date) = &info.upload_date {
                println!("  {} {}", "Uploaded:".bold(), date);
            }
            if let Some(views) = info.view_count {
                println!("  {} {}", "Views:".bold(), views);
            }
            if !info.description.is_empty() {
                println!();
                println!("{}", info.description);
            }
            println!();
            if info.formats.is_empty() {
                println!("{}", "No video formats listed".yellow());
            } else {
                let rows: Vec<FormatRow> = info.formats.iter().map(FormatRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Status { job_id } => {
            let result = call_rpc(&cli.rpc_url, "jobs.status.v1", json!({ "job_id": job_id })).await?;
            let job: JobView = serde_json::from_value(result)?;

            println!("{}", format!("Job {}", job.job_id).cyan().bold());
            println!();
            println!("  {} {}", "URL:".bold(), job.url);
            println!("  {} {}", "Status:".bold(), colored_status(&job.status));
            println!("  {} {:.1}%", "Progress:".bold(), job.progress);
            println!("  {} {} {}", "Format:".bold(), job.format, job.quality);
            if let Some(name) = &job.file_name {
                println!("  {} {}", "File:".bold(), name);
            }
            if let Some(size) = job.size_bytes {
                println!("  {} {}", "Size:".bold(), human_size(size));
            }
            if let Some(err) = &job.error {
                println!("  {} {}", "Error:".bold(), err.red());
            }
        }

        Commands::List => {
            let result = call_rpc(&cli.rpc_url, "jobs.list.v1", json!({})).await?;
            let list: JobList = serde_json::from_value(result)?;
            print_jobs(&list.jobs, "No jobs");
        }

        Commands::History { limit } => {
            let result = call_rpc(&cli.rpc_url, "jobs.history.v1", json!({ "limit": limit })).await?;
            let list: JobList = serde_json::from_value(result)?;
            print_jobs(&list.jobs, "History is empty");
        }

        Commands::Cancel { job_id } => {
            let result = call_rpc(&cli.rpc_url, "jobs.cancel.v1", json!({ "job_id": job_id })).await?;

            if result["cancelled"].as_bool().unwrap_or(false) {
                println!("{}", format!("✓ Job {} cancelled", job_id).green().bold());
            } else {
                println!(
                    "{}",
                    format!("Job {} was already finished or unknown", job_id).yellow()
                );
            }
        }

        Commands::Artifact { job_id } => {
            let result =
                call_rpc(&cli.rpc_url, "jobs.artifact.v1", json!({ "job_id": job_id })).await?;
            let artifact: ArtifactResult = serde_json::from_value(result)?;
            println!("{} ({})", artifact.path, human_size(artifact.size_bytes));
        }

        Commands::Sweep { max_age_hours } => {
            println!("{}", "Running retention sweep...".cyan().bold());
            println!();

            let params = json!({ "max_age_hours": max_age_hours });
            match call_rpc(&cli.rpc_url, "admin.sweep.v1", params).await {
                Ok(result) => {
                    println!("  {} {} artifacts examined", "•".bold(), result["examined"]);
                    println!("  {} {} artifacts deleted", "✓".green(), result["removed"]);
                    println!("  {} {} already gone", "○".bold(), result["missing"]);
                    if result["failed"].as_u64().unwrap_or(0) > 0 {
                        println!("  {} {} could not be deleted", "✗".red(), result["failed"]);
                    }
                }
                Err(e) => {
                    println!("  {} Sweep failed: {}", "✗".red(), e);
                }
            }
        }

        Commands::Stats => {
            println!("{}", "Engine Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Queued:".bold(), stats["queued"]);
                    println!(
                        "  {} {} / {}",
                        "Running:".bold(),
                        stats["running"],
                        stats["max_concurrent"]
                    );
                    println!("  {} {}", "Completed:".bold(), stats["completed"]);
                    println!("  {} {}", "Failed:".bold(), stats["error"]);
                    println!("  {} {}", "Cancelled:".bold(), stats["cancelled"]);
                    println!("  {} {}", "History:".bold(), stats["history_len"]);
                    println!();
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_secs"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}
