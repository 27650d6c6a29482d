//! Backend API client: JSON requests and the chat stream.

use super::backoff::BackoffPolicy;
use super::error::{ClientError, RetryableError, format_api_error};
use super::retry::{self, RetryOptions};
use super::transport::{ByteStream, HttpRequest, Method, Transport};
use super::types::ChatRequest;
use crate::stream::{SessionHandler, SessionOutcome, StreamSession};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CHAT_PATH: &str = "/api/chat";

/// Client for the kitchen assistant backend.
///
/// Every request goes through the retry executor. Buffered responses are
/// checked for status inside the retried operation, so each failed attempt's
/// body is consumed before the backoff sleep. Parsing happens once, after the
/// final attempt.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    policy: BackoffPolicy,
    chat_path: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("policy", &self.policy)
            .field("chat_path", &self.chat_path)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            policy: BackoffPolicy::default(),
            chat_path: DEFAULT_CHAT_PATH.to_string(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_chat_path(mut self, path: impl Into<String>) -> Self {
        self.chat_path = path.into();
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Retry options derived from the client's policy.
    pub fn default_options(&self) -> RetryOptions<ClientError> {
        RetryOptions::from_policy(&self.policy).with_on_retry(|attempt, err: &ClientError| {
            if let Some(secs) = err.retry_after() {
                tracing::debug!(attempt, retry_after = secs, "Server asked for a retry delay");
            }
        })
    }

    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, ClientError> {
        self.request(HttpRequest::new(Method::Get, path)).await
    }

    pub async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ClientError> {
        self.request(HttpRequest::new(Method::Post, path).with_body(to_json(body)?))
            .await
    }

    pub async fn put<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ClientError> {
        self.request(HttpRequest::new(Method::Put, path).with_body(to_json(body)?))
            .await
    }

    pub async fn delete<R: DeserializeOwned>(&self, path: &str) -> Result<R, ClientError> {
        self.request(HttpRequest::new(Method::Delete, path)).await
    }

    async fn request<R: DeserializeOwned>(&self, request: HttpRequest) -> Result<R, ClientError> {
        self.send_with(request, &self.default_options(), &CancellationToken::new())
            .await
    }

    /// Send a request with explicit retry options and cancellation.
    ///
    /// Pass [`RetryOptions::none`] for operations that must not be repeated.
    /// An empty response body parses as JSON `null`.
    pub async fn send_with<R: DeserializeOwned>(
        &self,
        request: HttpRequest,
        options: &RetryOptions<ClientError>,
        cancel: &CancellationToken,
    ) -> Result<R, ClientError> {
        let transport = &self.transport;
        let request = &request;
        let response = retry::execute(&self.policy, options, cancel, || async move {
            transport.send(request).await?.error_for_status()
        })
        .await?;

        let body: &[u8] = if response.body.is_empty() {
            b"null"
        } else {
            &response.body[..]
        };
        serde_json::from_slice(body).map_err(|e| {
            ClientError::Decode(format!(
                "{e}\nBody: {}",
                String::from_utf8_lossy(&response.body)
            ))
        })
    }

    /// Open a streaming response; the handshake is retried like any request.
    pub async fn open_stream(
        &self,
        request: HttpRequest,
        options: &RetryOptions<ClientError>,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, ClientError> {
        let transport = &self.transport;
        let request = &request;
        retry::execute(&self.policy, options, cancel, || transport.open_stream(request))
            .await
    }

    /// Run one chat turn.
    ///
    /// Handshake failures end the session as failed and reach the handler's
    /// error callback; cancellation at any point is silent.
    pub async fn chat<H: SessionHandler>(
        &self,
        request: &ChatRequest,
        handler: H,
        cancel: &CancellationToken,
    ) -> SessionOutcome {
        let mut session = StreamSession::new(handler, cancel.clone());

        let body = match to_json(request) {
            Ok(body) => body,
            Err(e) => {
                session.fail(e.to_string());
                return session.into_outcome();
            }
        };
        let http = HttpRequest::new(Method::Post, &self.chat_path).with_body(body);

        tracing::debug!(path = %self.chat_path, history = request.history.len(), "Starting chat turn");

        match self.open_stream(http, &self.default_options(), cancel).await {
            Ok(stream) => session.run(stream).await,
            Err(e) if e.is_cancelled() => {
                session.cancel();
                session.into_outcome()
            }
            Err(e) => {
                session.fail(format_api_error(&e.to_string()));
                session.into_outcome()
            }
        }
    }
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value, ClientError> {
    serde_json::to_value(body).map_err(|e| ClientError::InvalidRequest(e.to_string()))
}
