// src/server/mod.rs
//! HTTP surface of the dispatch host
//!
//! Routes:
//!
//! - `GET /` — status page with the registered worker count
//! - `POST /workers/register` — worker registry admission
//! - `POST /run` — dispatch a run, relaying the worker's event stream
//! - `POST /run/result` — dispatch a run, answering with the aggregated
//!   terminal result
//!
//! One connection task per client; routing is a plain method/path match
//! and responses stream through [`HostBody`].

pub mod dispatch;
pub mod register;

use crate::pool::round_robin::RoundRobinPool;
use crate::pool::worker::{http_client, HttpClient, RunRequest};
use crate::utils::config::HostConfig;
use crate::utils::errors::{HostError, Result};
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Response body type: either a buffered payload or a relayed stream
pub type HostBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Shared state handed to every request handler
pub struct AppState {
    /// The worker pool
    pub pool: RoundRobinPool,

    /// Client for probes and downstream run calls
    pub http: HttpClient,

    /// Host configuration
    pub config: HostConfig,

    /// Fires on shutdown; admission waiters select on it so a stopping
    /// host does not strand callers in the queue
    pub shutdown: CancellationToken,
}

/// Wrap a buffered payload as a [`HostBody`]
pub(crate) fn full_body(bytes: impl Into<Bytes>) -> HostBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// The dispatch host's HTTP server
pub struct HostServer {
    state: Arc<AppState>,
}

impl HostServer {
    /// Create a server around an existing pool; cancelling `shutdown`
    /// stops the accept loop and wakes blocked admission waiters
    pub fn new(config: HostConfig, pool: RoundRobinPool, shutdown: CancellationToken) -> Self {
        Self {
            state: Arc::new(AppState {
                pool,
                http: http_client(),
                config,
                shutdown,
            }),
        }
    }

    /// Shared handler state (exposed for composition and tests)
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Serve until the shutdown token fires
    pub async fn run(self) -> Result<()> {
        let shutdown = self.state.shutdown.clone();
        let addr: SocketAddr = format!(
            "{}:{}",
            self.state.config.server.host, self.state.config.server.port
        )
        .parse()
        .map_err(|e| HostError::Http(format!("invalid listen address: {e}")))?;

        let listener = TcpListener::bind(addr).await?;
        info!("dispatch host listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("shutdown signal received, stopping accept loop");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                                let state = Arc::clone(&state);
                                async move {
                                    Ok::<_, Infallible>(route(&state, req).await)
                                }
                            });
                            if let Err(e) = hyper::server::conn::http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                debug!("connection closed: {}", e);
                            }
                        });
                    }
                    Err(e) => error!("failed to accept connection: {}", e),
                }
            }
        }

        Ok(())
    }
}

/// Dispatch one request to its handler and map errors to responses
pub async fn route<B>(state: &AppState, req: Request<B>) -> Response<HostBody>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let result = match (&method, path.as_str()) {
        (&Method::GET, "/") => Ok(home(state)),
        (&Method::POST, "/workers/register") => handle_register(state, req).await,
        (&Method::POST, "/run") => match parse_run_request(req).await {
            Ok(request) => dispatch::run_stream(state, request).await,
            Err(e) => Err(e),
        },
        (&Method::POST, "/run/result") => match parse_run_request(req).await {
            Ok(request) => dispatch::run_result(state, request).await,
            Err(e) => Err(e),
        },
        _ => Ok(not_found()),
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            warn!(%method, %path, error = %e, "request failed");
            error_response(e)
        }
    }
}

async fn handle_register<B>(state: &AppState, req: Request<B>) -> Result<Response<HostBody>>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    let body = collect_body(req).await?;
    register::register_worker(state, &body).await?;

    let payload = serde_json::json!({ "message": "Worker registered successfully." });
    Response::builder()
        .header(CONTENT_TYPE, "application/json; charset=utf-8")
        .body(full_body(payload.to_string()))
        .map_err(|e| HostError::Http(format!("failed to build response: {e}")))
}

async fn parse_run_request<B>(req: Request<B>) -> Result<RunRequest>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    let body = collect_body(req).await?;
    let request: RunRequest = serde_json::from_slice(&body)
        .map_err(|e| HostError::InvalidRequest(format!("bad run payload: {e}")))?;
    // A zero timeout would give the downstream call a zero deadline.
    if request.timeout == 0 {
        return Err(HostError::InvalidRequest(
            "timeout must be a positive number of milliseconds".into(),
        ));
    }
    Ok(request)
}

async fn collect_body<B>(req: Request<B>) -> Result<Bytes>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    req.into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| HostError::InvalidRequest(format!("failed to read request body: {e}")))
}

/// Status page mirroring what a dashboard needs at a glance
fn home(state: &AppState) -> Response<HostBody> {
    let stats = state.pool.stats();
    let html = format!(
        "<!doctype html><html lang=\"en\">\n\
         <head><meta charset=\"utf-8\"><title>Runhub is Ready</title></head>\n\
         <body style=\"font-family:sans-serif\">\n\
           <h1>Runhub dispatch host is READY</h1>\n\
           <p>POST <code>/run</code> with <code>{{\"code\":\"3+4\"}}</code> to run it.</p>\n\
           <p>Registered Worker Count: <b>{}</b></p>\n\
           <p>Leases outstanding: {} (saturated workers: {})</p>\n\
         </body></html>",
        stats.workers, stats.in_use, stats.saturated
    );

    Response::builder()
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .body(full_body(html))
        .unwrap_or_else(|_| Response::new(full_body("")))
}

fn not_found() -> Response<HostBody> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(full_body("not found"))
        .unwrap_or_else(|_| Response::new(full_body("")))
}

/// Map a pipeline error to the caller-facing response
///
/// Downstream failures pass the original status and body through
/// unchanged; everything else reports the error text under its mapped
/// status.
fn error_response(error: HostError) -> Response<HostBody> {
    let status = error.status_code();
    let body = match error {
        HostError::DownstreamUnavailable { body, .. } => body,
        other => other.to_string(),
    };

    Response::builder()
        .status(status)
        .body(full_body(body))
        .unwrap_or_else(|_| Response::new(full_body("")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::body::Incoming;
    use hyper::service::service_fn;
    use std::time::Duration;

    fn test_state() -> AppState {
        AppState {
            pool: RoundRobinPool::new(),
            http: http_client(),
            config: HostConfig::default(),
            shutdown: CancellationToken::new(),
        }
    }

    fn request(method: Method, path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn body_text(response: Response<HostBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn test_home_shows_worker_count() {
        let state = test_state();
        let response = route(&state, request(Method::GET, "/", "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("Registered Worker Count: <b>0</b>"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let state = test_state();
        let response = route(&state, request(Method::GET, "/nope", "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_with_empty_pool_is_503() {
        let state = test_state();
        let response = route(
            &state,
            request(Method::POST, "/run", r#"{"code":"3+4"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_bad_run_payload_is_400() {
        let state = test_state();
        let response = route(&state, request(Method::POST, "/run", "not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_zero_timeout_is_400() {
        let state = test_state();
        let response = route(
            &state,
            request(Method::POST, "/run", r#"{"code":"3+4","timeout":0}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("timeout"));
    }

    #[tokio::test]
    async fn test_register_rejection_reports_reason() {
        let state = test_state();
        let payload = r#"{"workerUrl":"http://127.0.0.1:1","maxConcurrentRuns":-2}"#;
        let response = route(
            &state,
            request(Method::POST, "/workers/register", payload),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let text = body_text(response).await;
        assert!(text.contains("maxConcurrentRuns"));
        assert_eq!(state.pool.count(), 0);
    }

    #[tokio::test]
    async fn test_register_then_count_visible_on_home() {
        // Reachable stub for the probe.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let service = service_fn(|_req: Request<Incoming>| async {
                        Ok::<_, Infallible>(Response::new(full_body("ready")))
                    });
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        let state = test_state();
        let mut count_rx = state.pool.subscribe();
        let payload = format!(r#"{{"workerUrl":"http://{addr}","maxConcurrentRuns":2}}"#);
        let response = route(
            &state,
            request(Method::POST, "/workers/register", &payload),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        tokio::time::timeout(Duration::from_secs(1), count_rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*count_rx.borrow(), 1);

        let home = route(&state, request(Method::GET, "/", "")).await;
        assert!(body_text(home).await.contains("Registered Worker Count: <b>1</b>"));
    }

    #[tokio::test]
    async fn test_downstream_error_body_passes_through() {
        let response = error_response(HostError::DownstreamUnavailable {
            status: 500,
            body: "boom".into(),
        });
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "boom");
    }
}
