//! Stream session controller: drives the decoder for one assistant turn.

use super::decoder::{Frame, FrameDecoder};
use super::events::ServerEvent;
use super::handler::SessionHandler;
use super::tool_call::{ToolCall, ToolCallTracker};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reported when the server hangs up before `complete` or `error`.
pub const PREMATURE_CLOSE: &str = "Stream closed before the turn completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// What the UI shows for the turn. Frozen once the session is terminal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionOutput {
    pub content: String,
    /// Latest thinking status.
    pub thinking: Option<String>,
}

/// Final result of [`StreamSession::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub state: SessionState,
    pub output: SessionOutput,
    pub tool_calls: Vec<ToolCall>,
    pub error: Option<String>,
}

/// Which event type currently owns `SessionOutput::content`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentSource {
    None,
    Message,
    Stream,
}

/// One streaming turn.
///
/// The session is the only writer of its decoder, tool calls and output, and
/// invokes handler callbacks in frame order. Exactly one terminal transition
/// happens; anything after it is ignored.
pub struct StreamSession<H> {
    state: SessionState,
    decoder: FrameDecoder,
    tools: ToolCallTracker,
    output: SessionOutput,
    content_source: ContentSource,
    error: Option<String>,
    cancel: CancellationToken,
    handler: H,
}

impl<H: SessionHandler> StreamSession<H> {
    pub fn new(handler: H, cancel: CancellationToken) -> Self {
        Self {
            state: SessionState::Idle,
            decoder: FrameDecoder::new(),
            tools: ToolCallTracker::new(),
            output: SessionOutput::default(),
            content_source: ContentSource::None,
            error: None,
            cancel,
            handler,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn output(&self) -> &SessionOutput {
        &self.output
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tools.calls()
    }

    /// Drive `stream` until the turn completes, fails, or is cancelled.
    ///
    /// The stream is owned by the session and dropped on every exit path,
    /// including when the server keeps the connection open after `complete`.
    pub async fn run<S, E>(mut self, stream: S) -> SessionOutcome
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        self.activate();
        futures::pin_mut!(stream);

        while !self.state.is_terminal() {
            let cancel = self.cancel.clone();
            // Cancellation wins over a chunk that is already ready.
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.cancel();
                    break;
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    self.feed(&chunk);
                }
                Some(Err(e)) => self.fail(format!("Connection lost: {e}")),
                // The server hung up without a terminal event.
                None => {
                    if self.decoder.has_pending() {
                        debug!("Discarding unterminated line at end of stream");
                    }
                    self.fail(PREMATURE_CLOSE.to_string());
                }
            }
        }

        self.into_outcome()
    }

    /// Feed raw bytes and dispatch every frame they complete.
    ///
    /// Cancellation is checked before each frame.
    pub fn feed(&mut self, chunk: &[u8]) -> SessionState {
        if self.state.is_terminal() {
            return self.state;
        }
        self.activate();

        for frame in self.decoder.feed(chunk) {
            // A handler callback may have cancelled mid-chunk.
            if self.cancel.is_cancelled() {
                self.cancel();
            }
            if self.state.is_terminal() {
                debug!(event = %frame.event, "Ignoring frame after session ended");
                continue;
            }
            self.dispatch(frame);
        }

        self.state
    }

    pub fn into_outcome(self) -> SessionOutcome {
        SessionOutcome {
            state: self.state,
            output: self.output,
            tool_calls: self.tools.into_calls(),
            error: self.error,
        }
    }

    fn activate(&mut self) {
        if self.state == SessionState::Idle {
            debug!("Stream session active");
            self.state = SessionState::Active;
        }
    }

    /// Terminal failure. The error callback fires exactly once.
    pub(crate) fn fail(&mut self, message: String) {
        if self.state.is_terminal() {
            return;
        }
        warn!(error = %message, "Stream session failed");
        self.state = SessionState::Failed;
        self.handler.on_error(&message);
        self.error = Some(message);
    }

    /// Terminal cancellation. Silent towards the handler.
    pub(crate) fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        info!("Stream session cancelled");
        self.state = SessionState::Cancelled;
    }

    fn dispatch(&mut self, frame: Frame) {
        let event = match ServerEvent::from_frame(&frame) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(event = %frame.event, "Ignoring unknown event");
                return;
            }
            Err(e) => {
                warn!(event = %frame.event, error = %e, "Dropping frame with unexpected payload");
                return;
            }
        };

        match event {
            ServerEvent::Thinking { status } => {
                self.handler.on_thinking(&status);
                self.output.thinking = Some(status);
            }
            ServerEvent::ToolStart { id, name, args } => {
                if let Some(call) = self.tools.start(id, name, args) {
                    self.handler.on_tool_call(call);
                }
            }
            ServerEvent::ToolEnd { id, result, error } => {
                if let Some(call) = self.tools.finish(id, result, error) {
                    self.handler.on_tool_call(call);
                }
            }
            ServerEvent::Stream { token } => {
                // First token drops any message text applied earlier.
                if self.content_source == ContentSource::Message {
                    self.output.content.clear();
                }
                self.content_source = ContentSource::Stream;
                self.output.content.push_str(&token);
                self.handler.on_token(&token);
            }
            ServerEvent::Message { content } => {
                // Tokens own the content once any have arrived.
                if self.content_source == ContentSource::Stream {
                    debug!("Not applying message content over streamed tokens");
                } else {
                    self.output.content.clone_from(&content);
                    self.content_source = ContentSource::Message;
                }
                self.handler.on_message(&content);
            }
            ServerEvent::Complete => {
                info!(
                    chars = self.output.content.len(),
                    tool_calls = self.tools.calls().len(),
                    "Stream session completed"
                );
                self.state = SessionState::Completed;
                self.handler.on_complete(&self.output);
            }
            ServerEvent::Error { message } => self.fail(message),
        }
    }
}
