// src/utils/errors.rs
//! Error types for the dispatch host
//!
//! The taxonomy mirrors the failure surfaces of the dispatch pipeline:
//! admission, registration, downstream calls, and stream relaying.
//! No variant is retried automatically; retry policy belongs to callers.

use hyper::StatusCode;
use thiserror::Error;

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors produced by the dispatch host
#[derive(Debug, Error)]
pub enum HostError {
    /// Acquire was called against a pool with no registered workers
    #[error("no workers registered")]
    NoWorkers,

    /// Acquire gave up before a worker slot freed (deadline reached)
    #[error("timed out waiting for a free worker slot")]
    AdmissionTimeout,

    /// Acquire was cancelled by the caller's cancellation signal
    #[error("admission cancelled by caller")]
    AdmissionCancelled,

    /// A worker failed the registration gate (probe or capacity check)
    #[error("worker registration rejected: {0}")]
    RegistrationRejected(String),

    /// The leased worker returned a non-success status or transport error
    #[error("worker unavailable (status {status}): {body}")]
    DownstreamUnavailable { status: u16, body: String },

    /// Framing or deserialization failed mid-stream; the stream truncates
    #[error("stream relay failed: {0}")]
    Relay(String),

    /// The caller's request body could not be parsed
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// HTTP plumbing error (request build, connection handling)
    #[error("http error: {0}")]
    Http(String),

    /// Configuration loading failed
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error (listener bind, socket operations)
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// HTTP status this error surfaces as when it reaches a caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            HostError::NoWorkers
            | HostError::AdmissionTimeout
            | HostError::AdmissionCancelled => StatusCode::SERVICE_UNAVAILABLE,
            HostError::RegistrationRejected(_) | HostError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            HostError::DownstreamUnavailable { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            HostError::Relay(_) | HostError::Http(_) => StatusCode::BAD_GATEWAY,
            HostError::Config(_) | HostError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_errors_are_service_unavailable() {
        assert_eq!(
            HostError::NoWorkers.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            HostError::AdmissionTimeout.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_downstream_status_passes_through() {
        let err = HostError::DownstreamUnavailable {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_registration_rejection_is_bad_request() {
        let err = HostError::RegistrationRejected("unreachable".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
