//! [`HttpTransport`]: hyper client over rustls.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use shq_common::TransportError;
use tracing::debug;

use super::{OutboundRequest, Transport, TransportResponse};

/// HTTP/1.1 transport with TLS via rustls and the webpki root store.
///
/// Plain `http://` URLs are allowed so the client can talk to a local API
/// during development. Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

impl HttpTransport {
    /// Build a transport whose calls give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidRequest`] if the TLS configuration
    /// cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|e| TransportError::InvalidRequest(format!("tls setup failed: {e}")))?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(Self { client, timeout })
    }

    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = Request::builder().method(Method::POST).uri(&request.url);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers);
        }
        let req = builder
            .body(Full::new(Bytes::from(request.body)))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?
            .to_bytes();

        debug!(status, bytes = body.len(), "response received");
        Ok(TransportResponse { status, body })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        tokio::time::timeout(self.timeout, self.send(request))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::HeaderMap;

    #[tokio::test]
    async fn invalid_url_is_an_invalid_request() {
        let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        let req = OutboundRequest {
            url: "not a url".into(),
            headers: HeaderMap::new(),
            body: String::new(),
        };
        let err = transport.post(req).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_connect_error() {
        // Bind then drop a listener to get a local port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let req = OutboundRequest {
            url: format!("http://127.0.0.1:{port}/api/function/enqueue"),
            headers: HeaderMap::new(),
            body: String::new(),
        };
        let err = transport.post(req).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        // Accepts the connection but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let transport = HttpTransport::new(Duration::from_millis(200)).unwrap();
        let req = OutboundRequest {
            url: format!("http://{addr}/api/function/enqueue"),
            headers: HeaderMap::new(),
            body: String::new(),
        };
        let err = transport.post(req).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }
}
