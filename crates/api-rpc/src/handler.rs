//! RPC Method Handlers
//!
//! Thin adapters from JSON-RPC params to FetchService calls.

use crate::error::{rate_limited, to_rpc_error};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::types::{
    ArtifactResponse, CancelResponse, HistoryRequest, HistoryResponse, InfoRequest, InfoResponse,
    JobIdRequest, JobView, ListResponse, StatsRequest, StatsResponse, SubmitRequest,
    SubmitResponse, SweepRequest, SweepResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use mediafetch_core::application::FetchService;
use mediafetch_core::domain::JobStatus;
use std::sync::Arc;
use tracing::{debug, warn};

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    service: Arc<FetchService>,
    rate_limiter: Option<RateLimiter>,
}

impl RpcHandler {
    /// Handler without request throttling
    pub fn new(service: Arc<FetchService>) -> Self {
        Self {
            service,
            rate_limiter: None,
        }
    }

    /// Throttle submissions and metadata lookups; a zero burst leaves them unlimited
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limiter = config.is_enabled().then(|| RateLimiter::new(config));
        self
    }

    fn throttle(&self, method: &str) -> Result<(), ErrorObjectOwned> {
        match &self.rate_limiter {
            Some(limiter) if !limiter.check() => {
                warn!(method, "Rate limit exceeded");
                Err(rate_limited())
            }
            _ => Ok(()),
        }
    }

    /// jobs.submit.v1
    pub async fn submit(&self, params: SubmitRequest) -> Result<SubmitResponse, ErrorObjectOwned> {
        self.throttle("jobs.submit.v1")?;

        let job_id = self
            .service
            .submit(params.into())
            .map_err(to_rpc_error)?;

        Ok(SubmitResponse {
            job_id,
            status: JobStatus::Queued.to_string(),
        })
    }

    /// jobs.info.v1
    pub async fn info(&self, params: InfoRequest) -> Result<InfoResponse, ErrorObjectOwned> {
        self.throttle("jobs.info.v1")?;

        self.service
            .info(params.into())
            .await
            .map_err(to_rpc_error)
    }

    /// jobs.status.v1
    pub async fn status(&self, params: JobIdRequest) -> Result<JobView, ErrorObjectOwned> {
        let record = self.service.status(&params.job_id).map_err(to_rpc_error)?;
        Ok(JobView::from(&record))
    }

    /// jobs.list.v1
    pub async fn list(&self) -> Result<ListResponse, ErrorObjectOwned> {
        let jobs = self
            .service
            .list_active()
            .iter()
            .map(JobView::from)
            .collect();
        Ok(ListResponse { jobs })
    }

    /// jobs.history.v1
    pub async fn history(
        &self,
        params: HistoryRequest,
    ) -> Result<HistoryResponse, ErrorObjectOwned> {
        let entries = self
            .service
            .list_history(params.limit)
            .iter()
            .map(JobView::from)
            .collect();
        Ok(HistoryResponse { entries })
    }

    /// jobs.cancel.v1
    pub async fn cancel(&self, params: JobIdRequest) -> Result<CancelResponse, ErrorObjectOwned> {
        let cancelled = self.service.cancel(&params.job_id);
        debug!(job_id = %params.job_id, cancelled, "Cancel requested over RPC");
        Ok(CancelResponse {
            job_id: params.job_id,
            cancelled,
        })
    }

    /// jobs.artifact.v1
    pub async fn artifact(
        &self,
        params: JobIdRequest,
    ) -> Result<ArtifactResponse, ErrorObjectOwned> {
        let artifact = self
            .service
            .artifact_path(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        let file_name = artifact
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(ArtifactResponse {
            job_id: params.job_id,
            path: artifact.path.to_string_lossy().into_owned(),
            file_name,
            size_bytes: artifact.size_bytes,
        })
    }

    /// admin.sweep.v1
    pub async fn sweep(&self, params: SweepRequest) -> Result<SweepResponse, ErrorObjectOwned> {
        let report = self.service.sweep(params.max_age_hours).await;
        Ok(SweepResponse {
            max_age_hours: params.max_age_hours,
            report,
        })
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        Ok(self.service.stats())
    }
}
