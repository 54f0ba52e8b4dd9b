//! Endpoints and header names of the job-dispatch HTTP API.
//!
//! Every call is a `POST` with a `text/plain` body to
//! `{api_host}{api_path}{endpoint}`. Routing and auth metadata travel in the
//! `shq-*` headers below.

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// Auth token of the calling client. Sent on every request.
pub const HEADER_TOKEN: &str = "shq-token";

/// Name of the function being enqueued or nacked.
pub const HEADER_FUNCTION: &str = "shq-function";

/// URL the service calls back when the job runs.
pub const HEADER_CALLBACK: &str = "shq-callback";

/// Error message attached to a nack.
pub const HEADER_ERROR: &str = "shq-error";

/// Path of the scheduled task being nacked.
pub const HEADER_PATH: &str = "shq-path";

/// Content type of every request body.
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// Headers added by proxies and load balancers on the inbound callback.
///
/// They describe the hop the callback arrived on, not the job, and are dropped
/// before the callback headers are forwarded in a nack.
pub const STRIPPED_HEADERS: &[&str] = &["host", "x-forwarded-proto", "x-forwarded-for"];

/// Hop-by-hop and framing headers of the inbound request. They apply to the
/// connection or body the callback arrived on, not to the new request.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "expect",
    "content-length",
];

/// Content negotiation headers. The response to a nack is read as plain JSON,
/// so the callback's `accept-encoding` must not reach the API.
pub const NEGOTIATION_HEADERS: &[&str] = &["accept-encoding"];

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// The three API operations the client performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `POST /function/enqueue`
    Enqueue,
    /// `POST /function/nack`
    Nack,
    /// `POST /scheduled-task/nack`
    NackScheduledTask,
}

impl Endpoint {
    /// Path of the endpoint relative to the configured API path.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Enqueue => "/function/enqueue",
            Endpoint::Nack => "/function/nack",
            Endpoint::NackScheduledTask => "/scheduled-task/nack",
        }
    }

    /// Full URL of the endpoint under `api_host` and `api_path`.
    pub fn url(self, api_host: &str, api_path: &str) -> String {
        format!(
            "{}{}{}",
            api_host.trim_end_matches('/'),
            api_path.trim_end_matches('/'),
            self.path()
        )
    }
}

/// Returns `true` if `name` must not be forwarded from an inbound callback.
pub fn is_stripped_header(name: &str) -> bool {
    STRIPPED_HEADERS
        .iter()
        .chain(HOP_BY_HOP_HEADERS)
        .chain(NEGOTIATION_HEADERS)
        .any(|h| h.eq_ignore_ascii_case(name))
}
