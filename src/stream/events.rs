//! Typed payloads for the assistant's stream events.

use super::decoder::Frame;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_ERROR_MESSAGE: &str = "The assistant reported an error";

/// A frame whose payload matched the shape expected for its event name.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Transient status text, not part of the final content.
    Thinking { status: String },
    ToolStart {
        id: Option<String>,
        name: String,
        args: Value,
    },
    ToolEnd {
        id: String,
        result: Option<Value>,
        error: Option<Value>,
    },
    /// One content token.
    Stream { token: String },
    /// Full, non-incremental message.
    Message { content: String },
    Complete,
    Error { message: String },
}

#[derive(Deserialize)]
struct ThinkingPayload {
    status: String,
}

#[derive(Deserialize)]
struct ToolStartPayload {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Deserialize)]
struct ToolEndPayload {
    id: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct StreamPayload {
    token: String,
}

#[derive(Deserialize)]
struct MessagePayload {
    content: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
}

impl ServerEvent {
    /// Interpret a decoded frame.
    ///
    /// Returns `Ok(None)` for event names this client does not know.
    pub fn from_frame(frame: &Frame) -> Result<Option<Self>, serde_json::Error> {
        let data = frame.data.clone();
        let event = match frame.event.as_str() {
            "thinking" => {
                let p: ThinkingPayload = serde_json::from_value(data)?;
                Self::Thinking { status: p.status }
            }
            "tool_start" => {
                let p: ToolStartPayload = serde_json::from_value(data)?;
                Self::ToolStart {
                    id: p.id,
                    name: p.name,
                    args: p.args,
                }
            }
            "tool_end" => {
                let p: ToolEndPayload = serde_json::from_value(data)?;
                Self::ToolEnd {
                    id: p.id,
                    result: p.result,
                    error: p.error,
                }
            }
            "stream" => {
                let p: StreamPayload = serde_json::from_value(data)?;
                Self::Stream { token: p.token }
            }
            "message" => {
                let p: MessagePayload = serde_json::from_value(data)?;
                Self::Message { content: p.content }
            }
            "complete" => Self::Complete,
            "error" => {
                let p: ErrorPayload = serde_json::from_value(data)?;
                Self::Error {
                    message: p
                        .message
                        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Thinking { .. } => "thinking",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::Stream { .. } => "stream",
            Self::Message { .. } => "message",
            Self::Complete => "complete",
            Self::Error { .. } => "error",
        }
    }
}
