//! HTTP transport for the assistant backend.

use super::error::ClientError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{
    ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER,
};
use std::pin::Pin;
use std::time::Duration;

/// Live response body of a streaming request.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// Timeout for buffered requests. Streams are only bounded by the connect timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path relative to the transport's base URL, e.g. `/api/recipes`.
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Convert a non-2xx response into [`ClientError::Status`].
    pub fn error_for_status(self) -> Result<Self, ClientError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(status_error(
            self.status,
            &self.headers,
            String::from_utf8_lossy(&self.body).into_owned(),
        ))
    }
}

/// The network side of the client.
///
/// `send` returns responses of any status; `open_stream` fails with
/// [`ClientError::Status`] unless the server accepted the stream.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ClientError>;

    async fn open_stream(&self, request: &HttpRequest) -> Result<ByteStream, ClientError>;
}

/// Authentication configuration.
#[derive(Clone)]
pub enum AuthConfig {
    /// Bearer token authentication (Authorization: Bearer {token}).
    Bearer(String),
    /// Custom header authentication (e.g., x-api-key: {key}).
    ApiKey { header: String, key: String },
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
            Self::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("key", &"[REDACTED]")
                .finish(),
        }
    }
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    auth: Option<AuthConfig>,
    request_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, auth: Option<AuthConfig>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// Build headers including authentication.
    fn build_headers(&self) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match &self.auth {
            Some(AuthConfig::Bearer(token)) => {
                let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                    ClientError::InvalidRequest("Bearer token contains invalid header characters".into())
                })?;
                headers.insert(AUTHORIZATION, value);
            }
            Some(AuthConfig::ApiKey { header, key }) => {
                let name = HeaderName::try_from(header)
                    .map_err(|_| ClientError::InvalidRequest("API key header name is invalid".into()))?;
                let value = HeaderValue::from_str(key).map_err(|_| {
                    ClientError::InvalidRequest("API key contains invalid header characters".into())
                })?;
                headers.insert(name, value);
            }
            None => {}
        }

        Ok(headers)
    }

    fn request(&self, request: &HttpRequest, headers: HeaderMap) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(request.method.to_reqwest(), self.url(&request.path))
            .headers(headers);
        match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ClientError> {
        let headers = self.build_headers()?;
        tracing::debug!(method = %request.method, path = %request.path, "HTTP request");

        let response = self
            .request(request, headers)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// Sets `Accept: text/event-stream` and hands back the live body.
    async fn open_stream(&self, request: &HttpRequest) -> Result<ByteStream, ClientError> {
        let mut headers = self.build_headers()?;
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        tracing::debug!(method = %request.method, path = %request.path, "HTTP stream request");

        let response = self.request(request, headers).send().await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &headers, text));
        }

        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| ClientError::Stream(e.to_string()))),
        ))
    }
}

pub(crate) fn status_error(status: u16, headers: &HeaderMap, body: String) -> ClientError {
    ClientError::Status {
        status,
        body,
        retry_after: parse_retry_after(headers),
    }
}

/// Extract and parse `Retry-After` header from response headers.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(RETRY_AFTER)?;
    let s = value.to_str().ok()?;
    parse_retry_after_value(s)
}

/// Parse a `Retry-After` header value as seconds.
///
/// Handles integer and fractional seconds (rounds up). HTTP-date values and
/// non-finite numbers yield None.
fn parse_retry_after_value(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        Some(secs.max(1))
    } else if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() && f > 0.0 {
            Some((f.ceil() as u64).max(1))
        } else {
            None
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_auth() {
        let transport = ReqwestTransport::new(
            "https://kitchen.example.com",
            Some(AuthConfig::Bearer("test-token".into())),
        );
        let headers = transport.build_headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer test-token");
    }

    #[test]
    fn test_api_key_auth() {
        let transport = ReqwestTransport::new(
            "https://kitchen.example.com",
            Some(AuthConfig::ApiKey {
                header: "x-api-key".into(),
                key: "secret".into(),
            }),
        );
        let headers = transport.build_headers().unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "secret");
    }

    #[test]
    fn test_no_auth() {
        let transport = ReqwestTransport::new("https://kitchen.example.com", None);
        let headers = transport.build_headers().unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_invalid_bearer_rejected() {
        let transport = ReqwestTransport::new(
            "https://kitchen.example.com",
            Some(AuthConfig::Bearer("bad\ntoken".into())),
        );
        assert!(matches!(
            transport.build_headers(),
            Err(ClientError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_url_joining() {
        let transport = ReqwestTransport::new("http://localhost:3000/", None);
        assert_eq!(transport.base_url(), "http://localhost:3000");
        assert_eq!(transport.url("/api/chat"), "http://localhost:3000/api/chat");
        assert_eq!(transport.url("api/pantry"), "http://localhost:3000/api/pantry");
    }

    #[test]
    fn test_auth_debug_redacted() {
        let debug = format!("{:?}", AuthConfig::Bearer("hunter2".into()));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_error_for_status() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        let response = HttpResponse {
            status: 429,
            headers,
            body: Bytes::from_static(b"slow down"),
        };
        match response.error_for_status() {
            Err(ClientError::Status {
                status,
                body,
                retry_after,
            }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
                assert_eq!(retry_after, Some(12));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_retry_after_integer() {
        assert_eq!(parse_retry_after_value("30"), Some(30));
        assert_eq!(parse_retry_after_value("0"), Some(1));
    }

    #[test]
    fn test_parse_retry_after_fractional() {
        assert_eq!(parse_retry_after_value("2.5"), Some(3));
        assert_eq!(parse_retry_after_value("0.1"), Some(1));
    }

    #[test]
    fn test_parse_retry_after_invalid() {
        assert_eq!(parse_retry_after_value(""), None);
        assert_eq!(
            parse_retry_after_value("Thu, 01 Jan 2026 00:00:00 GMT"),
            None
        );
        assert_eq!(parse_retry_after_value("-1.5"), None);
        assert_eq!(parse_retry_after_value("NaN"), None);
        assert_eq!(parse_retry_after_value("  30  "), Some(30));
    }
}
