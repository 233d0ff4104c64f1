// src/server/register.rs
//! Worker registry admission
//!
//! Registration is a one-time gate: capacity fields are validated and the
//! candidate address is probed with a bounded-timeout GET before the
//! worker enters the rotation. The pool never re-probes liveness after
//! admission.

use crate::pool::worker::{HttpClient, Worker};
use crate::server::AppState;
use crate::utils::errors::{HostError, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Uri};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// Registration payload posted by a worker
#[derive(Debug, Deserialize)]
pub struct RegisterWorkerRequest {
    /// Advertised base address the host will dial back
    #[serde(rename = "workerUrl")]
    pub worker_url: String,

    /// Maximum concurrent runs the worker accepts (0 = unlimited)
    #[serde(rename = "maxConcurrentRuns")]
    pub max_concurrent_runs: i64,

    /// Total runs before the worker retires itself, if it has a budget
    #[serde(rename = "maxTotalRuns", default)]
    pub max_total_runs: Option<i64>,
}

impl RegisterWorkerRequest {
    /// Validate the request and probe the worker, producing the record to
    /// admit into the pool
    pub async fn validate(&self, http: &HttpClient, probe_timeout: Duration) -> Result<Worker> {
        let max_concurrent_runs = u32::try_from(self.max_concurrent_runs).map_err(|_| {
            HostError::RegistrationRejected(format!(
                "maxConcurrentRuns must be between 0 and {}, got {}",
                u32::MAX,
                self.max_concurrent_runs
            ))
        })?;
        let max_total_runs = self
            .max_total_runs
            .map(|n| {
                u64::try_from(n).map_err(|_| {
                    HostError::RegistrationRejected(format!(
                        "maxTotalRuns must not be negative, got {n}"
                    ))
                })
            })
            .transpose()?;

        let url: Uri = self.worker_url.parse().map_err(|e| {
            HostError::RegistrationRejected(format!("invalid worker url {:?}: {e}", self.worker_url))
        })?;
        if url.authority().is_none() {
            return Err(HostError::RegistrationRejected(format!(
                "worker url {:?} is not an absolute address",
                self.worker_url
            )));
        }

        probe(http, &url, probe_timeout).await?;

        Ok(Worker {
            url,
            max_concurrent_runs,
            max_total_runs,
        })
    }
}

/// Bounded-timeout reachability probe against the worker's base address
async fn probe(http: &HttpClient, url: &Uri, timeout: Duration) -> Result<()> {
    let req = Request::get(url.clone())
        .body(Full::new(Bytes::new()))
        .map_err(|e| HostError::Http(format!("failed to build probe request: {e}")))?;

    let response = tokio::time::timeout(timeout, http.request(req))
        .await
        .map_err(|_| {
            HostError::RegistrationRejected(format!(
                "worker at {url} did not answer the reachability probe within {timeout:?}"
            ))
        })?
        .map_err(|e| {
            HostError::RegistrationRejected(format!("failed to reach worker at {url}: {e}"))
        })?;

    if !response.status().is_success() {
        return Err(HostError::RegistrationRejected(format!(
            "worker at {url} answered the probe with status {}",
            response.status()
        )));
    }

    Ok(())
}

/// Admit a worker described by a JSON registration payload
pub async fn register_worker(state: &AppState, body: &[u8]) -> Result<Worker> {
    let request: RegisterWorkerRequest = serde_json::from_slice(body)
        .map_err(|e| HostError::InvalidRequest(format!("bad registration payload: {e}")))?;

    info!(
        url = %request.worker_url,
        max_concurrent_runs = request.max_concurrent_runs,
        "registering worker"
    );

    let worker = match request
        .validate(&state.http, state.config.registry.probe_timeout())
        .await
    {
        Ok(worker) => worker,
        Err(e) => {
            warn!(url = %request.worker_url, error = %e, "worker registration rejected");
            return Err(e);
        }
    };

    state.pool.add(worker.clone());
    info!(url = %worker.url, count = state.pool.count(), "worker registered");
    Ok(worker)
}
