//! Callbacks the session controller drives for each frame.

use super::session::SessionOutput;
use super::tool_call::ToolCall;
use tokio::sync::mpsc;

/// Receives session updates in frame order.
///
/// All methods run synchronously inside the decoder loop and default to
/// no-ops. `on_complete` and `on_error` are mutually exclusive and each fires
/// at most once per session; neither fires on cancellation.
pub trait SessionHandler {
    /// Transient status text.
    fn on_thinking(&mut self, _status: &str) {}

    /// A tool call was created or reached its terminal status.
    fn on_tool_call(&mut self, _call: &ToolCall) {}

    /// A content token was appended to the output.
    fn on_token(&mut self, _token: &str) {}

    /// Full-message payload, informational only.
    fn on_message(&mut self, _content: &str) {}

    fn on_complete(&mut self, _output: &SessionOutput) {}

    fn on_error(&mut self, _message: &str) {}
}

/// Owned form of a handler callback.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Thinking(String),
    ToolCall(ToolCall),
    Token(String),
    Message(String),
    Complete(SessionOutput),
    Error(String),
}

/// Forwards every callback as a [`SessionEvent`] over a channel.
///
/// Useful when the consumer runs on another task. A closed receiver is not an
/// error; events are simply dropped.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelHandler {
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }

    /// Create a handler together with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl SessionHandler for ChannelHandler {
    fn on_thinking(&mut self, status: &str) {
        self.send(SessionEvent::Thinking(status.to_string()));
    }

    fn on_tool_call(&mut self, call: &ToolCall) {
        self.send(SessionEvent::ToolCall(call.clone()));
    }

    fn on_token(&mut self, token: &str) {
        self.send(SessionEvent::Token(token.to_string()));
    }

    fn on_message(&mut self, content: &str) {
        self.send(SessionEvent::Message(content.to_string()));
    }

    fn on_complete(&mut self, output: &SessionOutput) {
        self.send(SessionEvent::Complete(output.clone()));
    }

    fn on_error(&mut self, message: &str) {
        self.send(SessionEvent::Error(message.to_string()));
    }
}

impl<H: SessionHandler + ?Sized> SessionHandler for &mut H {
    fn on_thinking(&mut self, status: &str) {
        (**self).on_thinking(status);
    }

    fn on_tool_call(&mut self, call: &ToolCall) {
        (**self).on_tool_call(call);
    }

    fn on_token(&mut self, token: &str) {
        (**self).on_token(token);
    }

    fn on_message(&mut self, content: &str) {
        (**self).on_message(content);
    }

    fn on_complete(&mut self, output: &SessionOutput) {
        (**self).on_complete(output);
    }

    fn on_error(&mut self, message: &str) {
        (**self).on_error(message);
    }
}
