//! Outbound HTTP transport.
//!
//! The [`Client`](crate::Client) builds fully-formed requests and hands them
//! to a [`Transport`]. [`HttpTransport`] is the production implementation
//! (hyper + rustls); tests substitute a mock.

pub mod http;

pub use self::http::HttpTransport;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::HeaderMap;
use shq_common::TransportError;

/// A `POST` request ready to send.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Absolute URL of the endpoint.
    pub url: String,
    /// Complete header set, including `content-type` and `shq-token`.
    pub headers: HeaderMap,
    /// `text/plain` request body.
    pub body: String,
}

/// Raw response from the API.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Bytes,
}

/// Sends one request and returns the raw response.
///
/// Implementations report connection failures and timeouts as
/// [`TransportError`]; status handling is left to the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and wait for the full response body.
    async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;
}
