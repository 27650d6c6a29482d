//! Resilient HTTP client for the kitchen assistant backend.
//!
//! # Example
//!
//! ```ignore
//! use sous::client::{ApiClient, ReqwestTransport};
//!
//! let client = ApiClient::new(Arc::new(ReqwestTransport::new("http://localhost:3000", None)));
//! let recipes: serde_json::Value = client.get("/api/recipes").await?;
//! ```

mod api;
mod backoff;
mod error;
mod retry;
mod transport;
mod types;

#[cfg(test)]
mod tests;

pub use api::{ApiClient, DEFAULT_CHAT_PATH};
pub use backoff::{BackoffPolicy, MAX_JITTER_MS, is_retryable, retry_reason};
pub use error::{ClientError, RetryableError, format_api_error};
pub use retry::{RetryHook, RetryOptions, RetryPredicate, execute};
pub use transport::{
    AuthConfig, ByteStream, HttpRequest, HttpResponse, Method, ReqwestTransport, Transport,
};
pub use types::{ChatMessage, ChatRequest, Role};
