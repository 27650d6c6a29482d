//! Incremental decoder for the assistant's event stream.
//!
//! The wire format is line oriented:
//!
//! ```text
//! event: <name>
//! data: <json>
//!
//! ```
//!
//! Chunks may split lines, and UTF-8 sequences, anywhere.

use tracing::{debug, warn};

/// One `(event, payload)` unit reconstructed from the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event: String,
    pub data: serde_json::Value,
}

/// Incremental frame decoder.
///
/// Holds at most one partial line and the undecoded tail of a split
/// multi-byte character between calls to [`feed`](Self::feed).
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes of an incomplete UTF-8 sequence from the previous chunk.
    utf8_tail: Vec<u8>,
    /// Decoded text after the last newline.
    buffer: String,
    /// Set by `event:` lines; survives blank and `data:` lines.
    event: Option<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.decode(chunk);

        let mut frames = Vec::new();
        let Some(last_newline) = self.buffer.rfind('\n') else {
            return frames;
        };

        // Keep the partial line after the last newline for the next chunk.
        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        for line in complete[..last_newline].split('\n') {
            if let Some(frame) = self.parse_line(line) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Event name that the next `data:` line will be paired with.
    pub fn current_event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// Check if there's a partial line or character waiting for more bytes.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || !self.utf8_tail.is_empty()
    }

    /// Clear all buffered state.
    pub fn reset(&mut self) {
        self.utf8_tail.clear();
        self.buffer.clear();
        self.event = None;
    }

    /// Append `chunk` to the text buffer, holding back an incomplete trailing
    /// sequence. Invalid bytes become U+FFFD.
    fn decode(&mut self, chunk: &[u8]) {
        let mut input = std::mem::take(&mut self.utf8_tail);
        input.extend_from_slice(chunk);

        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    self.buffer.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        // Invalid sequence: replace it and keep decoding.
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Truncated sequence at the end: wait for the rest.
                        None => {
                            self.utf8_tail = after.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn parse_line(&mut self, line: &str) -> Option<Frame> {
        if let Some(name) = line.strip_prefix("event: ") {
            self.event = Some(name.trim().to_string());
            return None;
        }

        // Blank separators, comments and unknown fields fall through here.
        let payload = line.strip_prefix("data: ")?;
        let Some(event) = self.event.clone() else {
            debug!("Ignoring data line without a preceding event name");
            return None;
        };

        match serde_json::from_str(payload) {
            Ok(data) => Some(Frame { event, data }),
            Err(e) => {
                warn!(event = %event, error = %e, "Dropping malformed frame payload: {payload}");
                None
            }
        }
    }
}
