//! Client error types.

use thiserror::Error;

/// Errors the resilient executor knows how to classify.
///
/// Implementors keep their own type through retries: the executor never wraps
/// the error it hands back.
pub trait RetryableError: std::error::Error {
    /// HTTP status carried by the error, if any.
    fn status(&self) -> Option<u16>;

    /// Whether this error represents caller-requested cancellation.
    fn is_cancelled(&self) -> bool;

    /// Construct the cancellation value for this error type.
    fn cancelled() -> Self;
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        retry_after: Option<u64>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    Decode(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Cancelled")]
    Cancelled,
}

impl RetryableError for ClientError {
    fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    fn cancelled() -> Self {
        Self::Cancelled
    }
}

impl ClientError {
    /// Server-requested delay from `Retry-After`, in seconds.
    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Format an API error for display, extracting message from JSON if present.
///
/// Handles common patterns:
/// - `"HTTP 404: {"error": {"message": "..."}}"` → extracts message
/// - `"HTTP 422: {"message": "..."}"` → extracts message
/// - Plain text errors → returns as-is
#[must_use]
pub fn format_api_error(error: &str) -> String {
    if let Some(json_start) = error.find('{') {
        let json_str = &error[json_start..];

        if let Ok(json) = serde_json::from_str::<serde_json::Value>(json_str)
            && let Some(msg) = extract_error_message(&json)
        {
            let prefix = error[..json_start].trim();
            if prefix.is_empty() {
                return msg;
            }
            return format!("{prefix} {msg}");
        }
    }

    error.to_string()
}

/// Extract user-friendly message from JSON error response.
fn extract_error_message(json: &serde_json::Value) -> Option<String> {
    // {"error": {"message": "...", "code": "..."}}
    // {"error": "..."}
    // {"message": "..."}
    if let Some(error_obj) = json.get("error") {
        if let Some(msg) = error_obj.get("message").and_then(|v| v.as_str()) {
            if let Some(code) = error_obj.get("code").and_then(|v| v.as_str()) {
                return Some(format!("{msg} (code: {code})"));
            }
            return Some(msg.to_string());
        }

        if let Some(msg) = error_obj.as_str() {
            return Some(msg.to_string());
        }
    }

    if let Some(msg) = json.get("message").and_then(|v| v.as_str()) {
        return Some(msg.to_string());
    }

    None
}
