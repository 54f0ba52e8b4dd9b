//! [`Client`]: enqueue jobs, report failures, and trust callbacks.
//!
//! # Outbound
//!
//! ```text
//! Value ─stringify─► text ─encrypt (if configured)─► POST {api_host}{api_path}/function/enqueue
//! ```
//!
//! # Inbound
//!
//! ```text
//! body + signature ─verify(token)─► decrypt (if configured) ─parse─► Value
//! ```
//!
//! Verification always happens first; an unauthenticated body is never
//! decrypted or parsed.

use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::HeaderMap;
use shq_common::protocol::{
    is_stripped_header, Endpoint, CONTENT_TYPE_TEXT, HEADER_CALLBACK, HEADER_ERROR,
    HEADER_FUNCTION, HEADER_PATH, HEADER_TOKEN,
};
use shq_common::TransportError;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ConfigError};
use crate::crypto::{self, CipherError, Encryptor};
use crate::serializer::{self, ParseError, Value};
use crate::transport::{HttpTransport, OutboundRequest, Transport};

/// Any failure surfaced by [`Client`].
///
/// Cryptographic, serialisation and transport failures stay distinct so a
/// network error is never confused with a bad key.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The payload text is not valid serialised output.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Encryption or decryption failed.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// The API call failed or returned a non-2xx status.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Arguments of [`Client::enqueue`].
#[derive(Debug, Clone, Copy)]
pub struct EnqueueArgs<'a> {
    /// Name of the function to invoke.
    pub function_name: &'a str,
    /// Payload passed to the function.
    pub payload: &'a Value,
    /// URL the service calls to run the function.
    pub callback_url: &'a str,
}

/// Arguments of [`Client::nack`].
#[derive(Debug, Clone, Copy)]
pub struct NackArgs<'a> {
    /// Name of the function that failed.
    pub function_name: &'a str,
    /// Callback body exactly as received (still encrypted, if it was).
    pub payload: &'a str,
    /// Failure description.
    pub error: &'a str,
    /// Headers of the inbound callback request.
    pub headers: &'a HeaderMap,
}

/// Arguments of [`Client::nack_scheduled_task`].
#[derive(Debug, Clone, Copy)]
pub struct NackScheduledTaskArgs<'a> {
    /// Path of the scheduled task that failed.
    pub path: &'a str,
    /// Failure description.
    pub error: &'a str,
}

/// Client for the job-dispatch API.
///
/// All methods take `&self`; share one client between tasks. Calls are
/// independent and carry no ordering guarantee relative to each other.
pub struct Client<T = HttpTransport> {
    token: String,
    api_host: String,
    api_path: String,
    encryptor: Option<Encryptor>,
    transport: T,
}

impl<T: std::fmt::Debug> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("token", &"<redacted>")
            .field("api_host", &self.api_host)
            .field("api_path", &self.api_path)
            .field("encryptor", &self.encryptor)
            .field("transport", &self.transport)
            .finish()
    }
}

impl Client<HttpTransport> {
    /// Build a client using the HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or TLS cannot be set up.
    pub fn new(token: impl Into<String>, config: &ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(config.request_timeout())?;
        Self::with_transport(token, config, transport)
    }

    /// Build a client from `SHQ_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment holds an invalid configuration.
    pub fn from_env(token: impl Into<String>) -> Result<Self, ClientError> {
        let config = ClientConfig::from_env()?;
        Self::new(token, &config)
    }
}

impl<T: Transport> Client<T> {
    /// Build a client that sends requests through `transport`.
    ///
    /// Whether payloads are encrypted is decided here, once: only when
    /// `config` carries a non-empty encryption secret.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if `config` fails validation.
    pub fn with_transport(
        token: impl Into<String>,
        config: &ClientConfig,
        transport: T,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let encryptor = config.encryptor();
        info!(
            api_host = %config.api_host,
            encryption = encryptor.is_some(),
            rotating = encryptor.as_ref().is_some_and(Encryptor::is_rotating),
            "shq client initialised"
        );
        Ok(Self {
            token: token.into(),
            api_host: config.api_host.clone(),
            api_path: config.api_path.clone(),
            encryptor,
            transport,
        })
    }

    /// Returns `true` if payloads are encrypted.
    pub fn is_encrypting(&self) -> bool {
        self.encryptor.is_some()
    }

    /// Enqueue an invocation of `function_name` with `payload`.
    ///
    /// Returns the API's JSON response.
    ///
    /// # Errors
    ///
    /// Fails on encryption errors, header values with invalid characters, and
    /// transport failures.
    pub async fn enqueue(&self, args: EnqueueArgs<'_>) -> Result<serde_json::Value, ClientError> {
        let mut body = serializer::stringify(args.payload);
        if let Some(encryptor) = &self.encryptor {
            body = encryptor.encrypt(&body)?;
        }

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, HEADER_FUNCTION, args.function_name)?;
        insert_header(&mut headers, HEADER_CALLBACK, args.callback_url)?;
        self.request(Endpoint::Enqueue, body, headers).await
    }

    /// Report that a function invocation failed.
    ///
    /// The callback headers are forwarded minus proxy and framing headers;
    /// `args.headers` itself is left untouched.
    ///
    /// # Errors
    ///
    /// Fails on header values with invalid characters and transport failures.
    pub async fn nack(&self, args: NackArgs<'_>) -> Result<serde_json::Value, ClientError> {
        let mut headers = forwardable_headers(args.headers);
        insert_header(&mut headers, HEADER_FUNCTION, args.function_name)?;
        insert_header(&mut headers, HEADER_ERROR, args.error)?;
        self.request(Endpoint::Nack, args.payload.to_owned(), headers)
            .await
    }

    /// Report that a scheduled task failed.
    ///
    /// # Errors
    ///
    /// Fails on header values with invalid characters and transport failures.
    pub async fn nack_scheduled_task(
        &self,
        args: NackScheduledTaskArgs<'_>,
    ) -> Result<serde_json::Value, ClientError> {
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, HEADER_PATH, args.path)?;
        insert_header(&mut headers, HEADER_ERROR, args.error)?;
        self.request(Endpoint::NackScheduledTask, String::new(), headers)
            .await
    }

    /// Sign `payload` with `secret`, or with the client token when `None`.
    pub fn sign(&self, payload: &str, secret: Option<&str>) -> String {
        crypto::sign(payload, secret.unwrap_or(&self.token))
    }

    /// Check a callback signature against the client token.
    pub fn verify(&self, input: &str, signature: &str) -> bool {
        crypto::verify(input, &self.token, signature)
    }

    /// Recover the payload from a callback body.
    ///
    /// Decrypts first when encryption is configured. Does not check any
    /// signature; use [`Client::verify_and_decrypt`] for untrusted input.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cipher`] or [`ClientError::Parse`].
    pub fn decrypt(&self, input: &str) -> Result<Value, ClientError> {
        let value = match &self.encryptor {
            Some(encryptor) => serializer::parse(&encryptor.decrypt(input)?)?,
            None => serializer::parse(input)?,
        };
        Ok(value)
    }

    /// Verify a callback body and, only if authentic, recover its payload.
    ///
    /// Returns `Ok(None)` when the signature does not match; decryption is not
    /// attempted in that case.
    ///
    /// # Errors
    ///
    /// Errors from [`Client::decrypt`] for authentic bodies that cannot be
    /// decrypted or parsed.
    pub fn verify_and_decrypt(
        &self,
        input: &str,
        signature: &str,
    ) -> Result<Option<Value>, ClientError> {
        if !self.verify(input, signature) {
            warn!("callback signature verification failed");
            return Ok(None);
        }
        self.decrypt(input).map(Some)
    }

    async fn request(
        &self,
        endpoint: Endpoint,
        body: String,
        mut headers: HeaderMap,
    ) -> Result<serde_json::Value, ClientError> {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_TEXT));
        // Inserted last so a forwarded header can never replace the token.
        insert_header(&mut headers, HEADER_TOKEN, &self.token)?;

        debug!(
            endpoint = endpoint.path(),
            encrypted = self.encryptor.is_some(),
            bytes = body.len(),
            "sending request"
        );

        let url = endpoint.url(&self.api_host, &self.api_path);
        let resp = self
            .transport
            .post(OutboundRequest { url, headers, body })
            .await?;

        if !(200..300).contains(&resp.status) {
            warn!(endpoint = endpoint.path(), status = resp.status, "api returned error status");
            return Err(TransportError::Status {
                status: resp.status,
                body: String::from_utf8_lossy(&resp.body).into_owned(),
            }
            .into());
        }

        if resp.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&resp.body)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()).into())
    }
}

/// Copy `headers` without the proxy, hop-by-hop and encoding headers of the
/// inbound hop.
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !is_stripped_header(name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), ClientError> {
    let value = HeaderValue::from_str(value).map_err(|_| {
        TransportError::InvalidRequest(format!("{name} header value contains invalid characters"))
    })?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Secret;
    use crate::transport::{MockTransport, TransportResponse};
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};

    const TOKEN: &str = "tok_test";

    fn ok_response(body: &'static str) -> TransportResponse {
        TransportResponse {
            status: 200,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn plain_client(transport: MockTransport) -> Client<MockTransport> {
        Client::with_transport(TOKEN, &ClientConfig::default(), transport).unwrap()
    }

    fn encrypting_client(transport: MockTransport, secret: &str) -> Client<MockTransport> {
        let cfg = ClientConfig::default().with_secrets(secret, None);
        Client::with_transport(TOKEN, &cfg, transport).unwrap()
    }

    fn header<'a>(req: &'a OutboundRequest, name: &str) -> Option<&'a str> {
        req.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn sample_payload() -> Value {
        [
            ("n", Value::Number(42.0)),
            (
                "when",
                Value::Date(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            ),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn enqueue_sends_serialised_payload_and_routing_headers() {
        let mut transport = MockTransport::new();
        transport
            .expect_post()
            .times(1)
            .withf(|req| {
                req.url == "https://www.serverlesshq.com/api/function/enqueue"
                    && header(req, "shq-token") == Some(TOKEN)
                    && header(req, "shq-function") == Some("sendEmail")
                    && header(req, "shq-callback") == Some("https://app.example.com/api/queue")
                    && header(req, "content-type") == Some("text/plain")
                    && serializer::parse(&req.body).is_ok()
            })
            .returning(|_| Ok(ok_response(r#"{"id":"job_1"}"#)));

        let client = plain_client(transport);
        let resp = client
            .enqueue(EnqueueArgs {
                function_name: "sendEmail",
                payload: &sample_payload(),
                callback_url: "https://app.example.com/api/queue",
            })
            .await
            .unwrap();
        assert_eq!(resp["id"], "job_1");
    }

    #[tokio::test]
    async fn enqueue_encrypts_when_configured() {
        let mut transport = MockTransport::new();
        transport
            .expect_post()
            .times(1)
            .withf(|req| {
                req.body.starts_with("v1:")
                    && Encryptor::new(&Secret::new("abc123"), None)
                        .decrypt(&req.body)
                        .is_ok_and(|plain| serializer::parse(&plain).is_ok())
            })
            .returning(|_| Ok(ok_response("{}")));

        let client = encrypting_client(transport, "abc123");
        assert!(client.is_encrypting());
        client
            .enqueue(EnqueueArgs {
                function_name: "f",
                payload: &sample_payload(),
                callback_url: "https://app.example.com/cb",
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn nack_strips_transport_headers_and_keeps_the_rest() {
        let mut inbound = HeaderMap::new();
        inbound.insert("host", HeaderValue::from_static("app.example.com"));
        inbound.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        inbound.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        inbound.insert("content-length", HeaderValue::from_static("999"));
        inbound.insert("accept-encoding", HeaderValue::from_static("gzip, br"));
        inbound.insert("te", HeaderValue::from_static("trailers"));
        inbound.insert("upgrade", HeaderValue::from_static("websocket"));
        inbound.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        inbound.insert("expect", HeaderValue::from_static("100-continue"));
        inbound.insert("accept", HeaderValue::from_static("application/json"));
        inbound.insert("x-request-id", HeaderValue::from_static("req_1"));
        inbound.insert("shq-token", HeaderValue::from_static("forged"));
        let original = inbound.clone();

        let mut transport = MockTransport::new();
        transport
            .expect_post()
            .times(1)
            .withf(|req| {
                req.url.ends_with("/api/function/nack")
                    && req.body == "raw-callback-body"
                    && header(req, "host").is_none()
                    && header(req, "x-forwarded-for").is_none()
                    && header(req, "x-forwarded-proto").is_none()
                    && header(req, "content-length").is_none()
                    && header(req, "accept-encoding").is_none()
                    && header(req, "te").is_none()
                    && header(req, "upgrade").is_none()
                    && header(req, "keep-alive").is_none()
                    && header(req, "expect").is_none()
                    && header(req, "accept") == Some("application/json")
                    && header(req, "x-request-id") == Some("req_1")
                    && header(req, "shq-token") == Some(TOKEN)
                    && header(req, "shq-function") == Some("sendEmail")
                    && header(req, "shq-error") == Some("boom")
            })
            .returning(|_| Ok(ok_response(r#"{"ok":true}"#)));

        let client = plain_client(transport);
        client
            .nack(NackArgs {
                function_name: "sendEmail",
                payload: "raw-callback-body",
                error: "boom",
                headers: &inbound,
            })
            .await
            .unwrap();
        assert_eq!(inbound, original);
    }

    #[tokio::test]
    async fn nack_scheduled_task_sends_empty_body() {
        let mut transport = MockTransport::new();
        transport
            .expect_post()
            .times(1)
            .withf(|req| {
                req.url == "https://www.serverlesshq.com/api/scheduled-task/nack"
                    && req.body.is_empty()
                    && header(req, "shq-path") == Some("/api/cron/daily")
                    && header(req, "shq-error") == Some("timeout")
            })
            .returning(|_| Ok(ok_response("{}")));

        plain_client(transport)
            .nack_scheduled_task(NackScheduledTaskArgs {
                path: "/api/cron/daily",
                error: "timeout",
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_2xx_is_a_transport_error() {
        let mut transport = MockTransport::new();
        transport.expect_post().returning(|_| {
            Ok(TransportResponse {
                status: 401,
                body: Bytes::from_static(b"{\"error\":\"bad token\"}"),
            })
        });

        let err = plain_client(transport)
            .nack_scheduled_task(NackScheduledTaskArgs { path: "/p", error: "e" })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::Status { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn non_json_response_is_invalid_response() {
        let mut transport = MockTransport::new();
        transport
            .expect_post()
            .returning(|_| Ok(ok_response("<html>")));

        let err = plain_client(transport)
            .nack_scheduled_task(NackScheduledTaskArgs { path: "/p", error: "e" })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn connection_failure_propagates_as_transport_error() {
        let mut transport = MockTransport::new();
        transport
            .expect_post()
            .returning(|_| Err(TransportError::Connect("refused".into())));

        let err = plain_client(transport)
            .nack_scheduled_task(NackScheduledTaskArgs { path: "/p", error: "e" })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn invalid_header_value_is_rejected_before_sending() {
        let mut transport = MockTransport::new();
        transport.expect_post().never();

        let err = plain_client(transport)
            .nack_scheduled_task(NackScheduledTaskArgs {
                path: "/p",
                error: "line one\nline two",
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::InvalidRequest(_))
        ));
    }

    #[test]
    fn sign_defaults_to_token() {
        let client = plain_client(MockTransport::new());
        assert_eq!(client.sign("body", None), crypto::sign("body", TOKEN));
        assert_eq!(client.sign("body", Some("other")), crypto::sign("body", "other"));
    }

    #[test]
    fn verify_and_decrypt_round_trip_with_encryption() {
        let client = encrypting_client(MockTransport::new(), "abc123");
        let payload = sample_payload();
        let body = Encryptor::new(&Secret::new("abc123"), None)
            .encrypt(&serializer::stringify(&payload))
            .unwrap();
        let signature = crypto::sign(&body, TOKEN);

        let value = client.verify_and_decrypt(&body, &signature).unwrap().unwrap();
        assert_eq!(value, payload);
        assert!(value.get("when").and_then(Value::as_date).is_some());
    }

    #[test]
    fn verify_and_decrypt_without_encryption_parses_plaintext() {
        let client = plain_client(MockTransport::new());
        let body = serializer::stringify(&sample_payload());
        let signature = crypto::sign(&body, TOKEN);
        assert_eq!(
            client.verify_and_decrypt(&body, &signature).unwrap(),
            Some(sample_payload())
        );
    }

    #[test]
    fn bad_signature_returns_none_without_decrypting() {
        let client = encrypting_client(MockTransport::new(), "abc123");
        // Encrypted under a secret the client does not know: decrypting would fail.
        let body = Encryptor::new(&Secret::new("unconfigured"), None)
            .encrypt(&serializer::stringify(&sample_payload()))
            .unwrap();
        let bad_signature = crypto::sign(&body, "not-the-token");

        assert!(client.verify_and_decrypt(&body, &bad_signature).unwrap().is_none());
        assert!(client.verify_and_decrypt(&body, "garbage").unwrap().is_none());

        // With a valid signature the decryption error does surface.
        let good_signature = crypto::sign(&body, TOKEN);
        assert!(matches!(
            client.verify_and_decrypt(&body, &good_signature),
            Err(ClientError::Cipher(CipherError::Authentication))
        ));
    }

    #[test]
    fn decrypt_rejects_malformed_plaintext() {
        let client = plain_client(MockTransport::new());
        assert!(matches!(client.decrypt("{\"n\":1}"), Err(ClientError::Parse(_))));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = ClientConfig::default().with_api_host("ftp://example.com");
        assert!(matches!(
            Client::with_transport(TOKEN, &cfg, MockTransport::new()),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn forwardable_headers_preserves_multi_values() {
        let mut inbound = HeaderMap::new();
        inbound.append("x-tag", HeaderValue::from_static("a"));
        inbound.append("x-tag", HeaderValue::from_static("b"));
        inbound.insert("host", HeaderValue::from_static("h"));
        let out = forwardable_headers(&inbound);
        assert_eq!(out.get_all("x-tag").iter().count(), 2);
        assert!(out.get("host").is_none());
    }

    #[test]
    fn rotated_secret_still_reads_old_callbacks() {
        let old_body = Encryptor::new(&Secret::new("old-secret"), None)
            .encrypt(&serializer::stringify(&sample_payload()))
            .unwrap();

        let cfg = ClientConfig::default()
            .with_secrets("new-secret", Some(Secret::new("old-secret")));
        let client = Client::with_transport(TOKEN, &cfg, MockTransport::new()).unwrap();

        let signature = client.sign(&old_body, None);
        assert_eq!(
            client.verify_and_decrypt(&old_body, &signature).unwrap(),
            Some(sample_payload())
        );
    }

    #[test]
    fn debug_redacts_token_and_secrets() {
        let cfg = ClientConfig::default().with_secrets("hunter2", None);
        let client = Client::new(TOKEN, &cfg).unwrap();
        let out = format!("{client:?}");
        assert!(!out.contains(TOKEN));
        assert!(!out.contains("hunter2"));
        assert!(out.contains("https://www.serverlesshq.com"));
    }
}
