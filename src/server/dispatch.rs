// src/server/dispatch.rs
//! Dispatch pipeline: lease, downstream call, relay, release
//!
//! Per request the pipeline moves through lease acquisition, the
//! downstream `POST /run`, and stream relaying; the lease travels with
//! the stream and is released by drop on every path, success or failure.
//! A non-success downstream status is passed through to the caller before
//! any event framing is opened.

use crate::pool::lease::RunLease;
use crate::pool::worker::RunRequest;
use crate::relay::event::{EndEvent, StreamEvent};
use crate::relay::sse::event_stream;
use crate::server::{full_body, AppState, HostBody};
use crate::utils::errors::{HostError, Result};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{CACHE_CONTROL, CONTENT_TYPE};
use hyper::Response;
use tracing::{debug, warn};

/// Channel depth between the downstream read loop and the caller-facing
/// body; small, so backpressure reaches the worker quickly
const RELAY_QUEUE_DEPTH: usize = 16;

/// Acquire a lease and open the downstream run, failing fast on a
/// non-success status
///
/// Admission waits on the host shutdown token so a stopping server
/// answers queued callers instead of stranding them until the deadline.
async fn open_run(state: &AppState, request: &RunRequest) -> Result<(RunLease, Incoming)> {
    let lease = state
        .pool
        .acquire_timeout(state.config.dispatch.admission_timeout(), &state.shutdown)
        .await?;
    debug!(worker = %lease.worker().url, "lease acquired, dispatching");

    let response = lease.worker().run(&state.http, request).await?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .into_body()
            .collect()
            .await
            .map(|b| String::from_utf8_lossy(&b.to_bytes()).into_owned())
            .unwrap_or_default();
        return Err(HostError::DownstreamUnavailable {
            status: status.as_u16(),
            body,
        });
    }

    Ok((lease, response.into_body()))
}

/// `POST /run`: relay the worker's event stream to the caller unmodified
///
/// Chunks are forwarded as they arrive; a caller disconnect tears down
/// the downstream connection instead of letting the run stream into the
/// void.
pub async fn run_stream(state: &AppState, request: RunRequest) -> Result<Response<HostBody>> {
    let (lease, body) = open_run(state, &request).await?;

    let (tx, rx) = mpsc::channel::<std::result::Result<Frame<Bytes>, std::io::Error>>(
        RELAY_QUEUE_DEPTH,
    );
    tokio::spawn(relay_raw(lease, body, tx));

    Response::builder()
        .header(CONTENT_TYPE, "text/event-stream; charset=utf-8")
        .header(CACHE_CONTROL, "no-cache")
        .body(StreamBody::new(rx).boxed_unsync())
        .map_err(|e| HostError::Http(format!("failed to build stream response: {e}")))
}

/// Read loop feeding the caller-facing body; owns the lease for the
/// lifetime of the stream
async fn relay_raw(
    lease: RunLease,
    mut body: Incoming,
    mut tx: mpsc::Sender<std::result::Result<Frame<Bytes>, std::io::Error>>,
) {
    // Dropping `lease` at the end of this function releases the slot on
    // every exit path.
    let worker_url = lease.worker().url.clone();
    loop {
        match body.frame().await {
            None => break,
            Some(Err(e)) => {
                warn!(worker = %worker_url, error = %e, "worker stream failed mid-relay");
                break;
            }
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    if tx.send(Ok(Frame::data(data))).await.is_err() {
                        // Caller went away; dropping the body cancels the
                        // outbound request so the worker stops streaming.
                        debug!(worker = %worker_url, "caller disconnected, cancelling run");
                        break;
                    }
                }
            }
        }
    }
}

/// `POST /run/result`: consume the typed event stream and answer with the
/// aggregated outcome of the terminal event
pub async fn run_result(state: &AppState, request: RunRequest) -> Result<Response<HostBody>> {
    let (lease, body) = open_run(state, &request).await?;

    let end = read_to_end(body).await;
    drop(lease);
    let end = end?;

    let payload = serde_json::json!({
        "result": end.final_text(),
        "elapsed": end.elapsed,
    });
    Response::builder()
        .header(CONTENT_TYPE, "application/json; charset=utf-8")
        .body(full_body(payload.to_string()))
        .map_err(|e| HostError::Http(format!("failed to build result response: {e}")))
}

/// Drain a run stream down to its terminal event
async fn read_to_end(body: Incoming) -> Result<EndEvent> {
    let mut events = std::pin::pin!(event_stream(body));
    let mut end = None;
    while let Some(event) = events.next().await {
        if let StreamEvent::End(e) = event? {
            end = Some(e);
        }
    }
    end.ok_or_else(|| HostError::Relay("stream closed without a terminal event".into()))
}
