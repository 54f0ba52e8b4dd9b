//! Transport-level error taxonomy.
//!
//! These errors describe failures talking to the job-dispatch API. They are
//! kept apart from the cryptographic errors of the client crate so that a
//! network failure is never mistaken for a bad key or a forged payload.

use std::time::Duration;

use thiserror::Error;

/// Failure of an outbound API call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be built (bad URL, header value with control characters).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The connection could not be established or broke mid-request.
    #[error("connection failed: {0}")]
    Connect(String),

    /// No response arrived within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The API answered with a non-2xx status.
    #[error("api returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, decoded lossily as UTF-8.
        body: String,
    },

    /// The API answered 2xx but the body was not valid JSON.
    #[error("invalid response body: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Returns `true` when repeating the same call could plausibly succeed.
    ///
    /// Retrying is left to the caller; this only classifies.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connect(_) | TransportError::Timeout(_) => true,
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::InvalidRequest(_) | TransportError::InvalidResponse(_) => false,
        }
    }
}
