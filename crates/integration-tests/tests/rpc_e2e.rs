//! End-to-end tests over JSON-RPC
//!
//! Real server on an ephemeral port, stub extraction backend.

mod common;

use common::{video_url, Engine};
use jsonrpsee::core::client::{ClientT, Error as ClientError};
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use jsonrpsee::server::ServerHandle;
use mediafetch_api_rpc::error::code;
use mediafetch_api_rpc::{RateLimitConfig, RpcServer, RpcServerConfig};
use mediafetch_core::application::WorkerPool;
use mediafetch_core::domain::JobStatus;
use mediafetch_core::port::extraction_backend::mocks::StubBackend;
use mediafetch_core::port::media_info::mocks::StubInfoSource;
use mediafetch_core::port::{FormatInfo, MediaInfo};
use serde_json::Value;
use std::sync::Arc;

struct Daemon {
    engine: Engine,
    backend: Arc<StubBackend>,
    pool: WorkerPool,
    handle: ServerHandle,
    client: HttpClient,
}

async fn start_daemon(backend: StubBackend) -> Daemon {
    start_daemon_with(Engine::new(5), backend, RateLimitConfig::default()).await
}

async fn start_daemon_with(
    engine: Engine,
    backend: StubBackend,
    rate_limit: RateLimitConfig,
) -> Daemon {
    let backend = Arc::new(backend);
    let pool = engine.service.spawn_workers(backend.clone());

    let config = RpcServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        rate_limit,
    };
    let (handle, addr) = RpcServer::new(config, Arc::clone(&engine.service))
        .start()
        .await
        .unwrap();
    let client = HttpClientBuilder::default()
        .build(format!("http://{}", addr))
        .unwrap();

    Daemon {
        engine,
        backend,
        pool,
        handle,
        client,
    }
}

impl Daemon {
    async fn stop(self) {
        self.handle.stop().unwrap();
        self.pool.shutdown().await;
    }
}

fn job_params(job_id: &str) -> ObjectParams {
    let mut params = ObjectParams::new();
    params.insert("job_id", job_id).unwrap();
    params
}

fn error_code(err: ClientError) -> i32 {
    match err {
        ClientError::Call(obj) => obj.code(),
        other => panic!("expected call error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_submit_complete_and_fetch_artifact() {
    let daemon = start_daemon(StubBackend::new_success(256)).await;

    let mut params = ObjectParams::new();
    params.insert("url", video_url(1)).unwrap();
    params.insert("quality", "720p").unwrap();
    params.insert("format", "mp4").unwrap();
    params.insert("cookies", "# Netscape HTTP Cookie File").unwrap();
    let submitted: Value = daemon
        .client
        .request("jobs.submit.v1", params)
        .await
        .unwrap();
    assert_eq!(submitted["status"], "queued");
    let job_id = submitted["job_id"].as_str().unwrap().to_string();

    daemon
        .engine
        .wait_for_status(&job_id, JobStatus::Completed)
        .await;

    let status: Value = daemon
        .client
        .request("jobs.status.v1", job_params(&job_id))
        .await
        .unwrap();
    assert_eq!(status["status"], "completed");
    assert_eq!(status["quality"], "720p");
    assert_eq!(status["size_bytes"], 256);
    assert!(!status.to_string().contains("Netscape"));

    let artifact: Value = daemon
        .client
        .request("jobs.artifact.v1", job_params(&job_id))
        .await
        .unwrap();
    assert_eq!(artifact["size_bytes"], 256);
    let path = artifact["path"].as_str().unwrap();
    assert!(std::path::Path::new(path).exists());

    let list: Value = daemon
        .client
        .request("jobs.list.v1", rpc_params![])
        .await
        .unwrap();
    assert_eq!(list["jobs"].as_array().unwrap().len(), 1);

    let history: Value = daemon
        .client
        .request("jobs.history.v1", rpc_params![])
        .await
        .unwrap();
    assert_eq!(history["entries"][0]["job_id"], job_id.as_str());

    daemon.stop().await;
    println!("✅ Submit → complete → artifact over RPC");
}

#[tokio::test]
async fn test_error_codes_over_rpc() {
    let daemon = start_daemon(StubBackend::new_gated(8)).await;

    let mut params = ObjectParams::new();
    params.insert("url", "https://example.com/video").unwrap();
    let err = daemon
        .client
        .request::<Value, _>("jobs.submit.v1", params)
        .await
        .unwrap_err();
    assert_eq!(error_code(err), code::VALIDATION_ERROR);

    let err = daemon
        .client
        .request::<Value, _>("jobs.status.v1", job_params("missing"))
        .await
        .unwrap_err();
    assert_eq!(error_code(err), code::NOT_FOUND);

    let id = daemon.engine.submit(&video_url(1));
    daemon
        .engine
        .wait_for_status(&id, JobStatus::Running)
        .await;
    let err = daemon
        .client
        .request::<Value, _>("jobs.artifact.v1", job_params(&id))
        .await
        .unwrap_err();
    assert_eq!(error_code(err), code::NOT_READY);

    let cancelled: Value = daemon
        .client
        .request("jobs.cancel.v1", job_params(&id))
        .await
        .unwrap();
    assert_eq!(cancelled["cancelled"], true);
    daemon.backend.release(1);

    daemon.stop().await;
}

#[tokio::test]
async fn test_admin_stats_and_sweep() {
    let daemon = start_daemon(StubBackend::new_success(64)).await;

    let id = daemon.engine.submit(&video_url(1));
    daemon
        .engine
        .wait_for_status(&id, JobStatus::Completed)
        .await;

    let stats: Value = daemon
        .client
        .request("admin.stats.v1", rpc_params![])
        .await
        .unwrap();
    assert_eq!(stats["completed"], 1);
    assert_eq!(stats["max_concurrent"], 5);

    daemon.engine.clock.advance_hours(25);

    let mut params = ObjectParams::new();
    params.insert("max_age_hours", 24).unwrap();
    let sweep: Value = daemon
        .client
        .request("admin.sweep.v1", params)
        .await
        .unwrap();
    assert_eq!(sweep["max_age_hours"], 24);
    assert_eq!(sweep["removed"], 1);

    let err = daemon
        .client
        .request::<Value, _>("jobs.artifact.v1", job_params(&id))
        .await
        .unwrap_err();
    assert_eq!(error_code(err), code::NOT_FOUND);

    daemon.stop().await;
}

#[tokio::test]
async fn test_info_over_rpc_creates_no_job() {
    let source = Arc::new(StubInfoSource::new(MediaInfo {
        id: Some("clip1".into()),
        title: Some("Clip".into()),
        formats: vec![FormatInfo {
            format_id: "22".into(),
            ext: "mp4".into(),
            height: 720,
            width: Some(1280),
            filesize: None,
            vcodec: Some("avc1".into()),
            acodec: Some("mp4a".into()),
            fps: Some(30.0),
        }],
        ..Default::default()
    }));
    let engine = Engine::with_info_source(source.clone());
    let daemon = start_daemon_with(
        engine,
        StubBackend::new_success(8),
        RateLimitConfig::default(),
    )
    .await;

    let mut params = ObjectParams::new();
    params.insert("url", video_url(1)).unwrap();
    params.insert("cookies", "# Netscape HTTP Cookie File").unwrap();
    let info: Value = daemon
        .client
        .request("jobs.info.v1", params)
        .await
        .unwrap();
    assert_eq!(info["title"], "Clip");
    assert_eq!(info["formats"][0]["height"], 720);
    assert_eq!(source.auth_count(), 1);
    assert!(daemon.engine.service.list_active().is_empty());

    let mut params = ObjectParams::new();
    params.insert("url", "https://example.com/video").unwrap();
    let err = daemon
        .client
        .request::<Value, _>("jobs.info.v1", params)
        .await
        .unwrap_err();
    assert_eq!(error_code(err), code::VALIDATION_ERROR);

    daemon.stop().await;
    println!("✅ Metadata lookup over RPC");
}

#[tokio::test]
async fn test_submissions_past_burst_are_throttled() {
    let daemon = start_daemon_with(
        Engine::new(5),
        StubBackend::new_success(8),
        RateLimitConfig {
            burst: 3,
            per_minute: 1,
        },
    )
    .await;

    for i in 0..3 {
        let mut params = ObjectParams::new();
        params.insert("url", video_url(i)).unwrap();
        daemon
            .client
            .request::<Value, _>("jobs.submit.v1", params)
            .await
            .unwrap();
    }

    let mut params = ObjectParams::new();
    params.insert("url", video_url(99)).unwrap();
    let err = daemon
        .client
        .request::<Value, _>("jobs.submit.v1", params)
        .await
        .unwrap_err();
    assert_eq!(error_code(err), code::RATE_LIMITED);
    assert_eq!(daemon.engine.service.list_active().len(), 3);

    // Status reads stay available
    let list: Value = daemon
        .client
        .request("jobs.list.v1", rpc_params![])
        .await
        .unwrap();
    assert_eq!(list["jobs"].as_array().unwrap().len(), 3);

    daemon.stop().await;
    println!("✅ Submissions throttled after the burst");
}
