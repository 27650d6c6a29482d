//! Assistant event stream: frame decoding and per-turn session state.

mod decoder;
mod events;
mod handler;
mod session;
mod tool_call;


pub use decoder::{Frame, FrameDecoder};
pub use events::ServerEvent;
pub use handler::{ChannelHandler, SessionEvent, SessionHandler};
pub use session::{PREMATURE_CLOSE, SessionOutcome, SessionOutput, SessionState, StreamSession};
pub use tool_call::{ToolCall, ToolCallTracker, ToolStatus, UNKNOWN_TOOL_NAME};

use bytes::Bytes;
use futures::Stream;
use tokio_util::sync::CancellationToken;

/// Run one streaming turn over an already-open byte stream.
pub async fn run_session<S, E, H>(
    stream: S,
    handler: H,
    cancel: &CancellationToken,
) -> SessionOutcome
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
    H: SessionHandler,
{
    StreamSession::new(handler, cancel.clone()).run(stream).await
}
