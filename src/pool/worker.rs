// src/pool/worker.rs
//! Registered worker record and its downstream execution call
//!
//! A worker is an external executor node reached over HTTP. The host
//! stores only its address and capacity declarations; all execution
//! state lives on the worker side.

use crate::utils::errors::{HostError, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Shared HTTP client used for worker probes and downstream run calls
pub type HttpClient = hyper_util::client::legacy::Client<HttpConnector, Full<Bytes>>;

/// Build the shared HTTP client
pub fn http_client() -> HttpClient {
    hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build_http()
}

/// A code-execution request forwarded verbatim to a worker
///
/// The pool and relay never inspect `code`; it is an opaque payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// Source snippet to execute
    pub code: String,

    /// Execution timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Warmup runs prime the worker without counting as real work
    #[serde(rename = "isWarmup", default)]
    pub is_warmup: bool,
}

fn default_timeout() -> u64 {
    30_000
}

/// An external executor node registered with the pool
///
/// `max_concurrent_runs` bounds admission (0 means unlimited).
/// `max_total_runs` is the worker's advisory self-retirement budget; the
/// host records it but never uses it for admission, the worker enforces
/// it on its own side.
#[derive(Debug, Clone)]
pub struct Worker {
    /// Advertised base address of the worker
    pub url: Uri,

    /// Maximum concurrent runs admitted by the pool (0 = unlimited)
    pub max_concurrent_runs: u32,

    /// Total runs before the worker retires itself, if it declared one
    pub max_total_runs: Option<u64>,
}

impl Worker {
    /// Issue `POST /run` against this worker, returning the response with
    /// its body still streaming
    ///
    /// The send phase is bounded at twice the run timeout so a hung worker
    /// cannot pin the caller indefinitely; the body is read by the relay.
    pub async fn run(&self, http: &HttpClient, request: &RunRequest) -> Result<Response<Incoming>> {
        let uri = join_path(&self.url, "/run")?;
        let body = serde_json::to_vec(request)
            .map_err(|e| HostError::Http(format!("failed to encode run request: {e}")))?;

        let req = Request::post(uri.clone())
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| HostError::Http(format!("failed to build run request: {e}")))?;

        debug!(worker = %self.url, timeout_ms = request.timeout, "dispatching run");

        let send_timeout = Duration::from_millis(request.timeout.saturating_mul(2));
        let response = tokio::time::timeout(send_timeout, http.request(req))
            .await
            .map_err(|_| HostError::DownstreamUnavailable {
                status: 504,
                body: format!("worker at {uri} did not respond within {send_timeout:?}"),
            })?
            .map_err(|e| HostError::DownstreamUnavailable {
                status: 502,
                body: format!("failed to reach worker at {uri}: {e}"),
            })?;

        Ok(response)
    }
}

/// Resolve a path against a worker's base address
pub(crate) fn join_path(base: &Uri, path: &str) -> Result<Uri> {
    let authority = base
        .authority()
        .ok_or_else(|| HostError::Http(format!("worker url {base} has no authority")))?;
    let base_path = base.path().trim_end_matches('/');

    Uri::builder()
        .scheme(base.scheme_str().unwrap_or("http"))
        .authority(authority.as_str())
        .path_and_query(format!("{base_path}{path}"))
        .build()
        .map_err(|e| HostError::Http(format!("failed to build worker uri: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_request_defaults() {
        let request: RunRequest = serde_json::from_str(r#"{"code":"3+4"}"#).unwrap();
        assert_eq!(request.code, "3+4");
        assert_eq!(request.timeout, 30_000);
        assert!(!request.is_warmup);
    }

    #[test]
    fn test_run_request_wire_names() {
        let request = RunRequest {
            code: "1+1".into(),
            timeout: 5000,
            is_warmup: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["code"], "1+1");
        assert_eq!(json["timeout"], 5000);
        assert_eq!(json["isWarmup"], true);
    }

    #[test]
    fn test_join_path() {
        let base: Uri = "http://10.0.0.7:8080".parse().unwrap();
        assert_eq!(join_path(&base, "/run").unwrap().to_string(), "http://10.0.0.7:8080/run");

        let with_slash: Uri = "http://10.0.0.7:8080/".parse().unwrap();
        assert_eq!(
            join_path(&with_slash, "/run").unwrap().to_string(),
            "http://10.0.0.7:8080/run"
        );
    }

    #[test]
    fn test_join_path_requires_authority() {
        let relative: Uri = "/only-a-path".parse().unwrap();
        assert!(join_path(&relative, "/run").is_err());
    }
}
