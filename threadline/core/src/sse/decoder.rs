//! SSE Frame Decoder
//!
//! Line-oriented decoding of `text/event-stream` bodies into [`SseFrame`]s.
//!
//! # Frame Format
//!
//! ```text
//! id: 17
//! event: text_chunk
//! data: {"content":"Hello"}
//! <blank line>
//! ```
//!
//! Lines end in `\n` or `\r\n`. Lines starting with `:` are comments. Several
//! `data:` lines in one frame are joined with `\n` before JSON parsing.
//!
//! # Limits
//!
//! A frame larger than the configured maximum is rejected and the decoder
//! skips ahead to the next blank line before it resumes producing frames.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Default maximum frame size (1 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Boxed stream of decoded frames
pub type FrameStream = BoxStream<'static, SseFrame>;

/// One decoded event record
#[derive(Clone, Debug, PartialEq)]
pub struct SseFrame {
    /// Value of the `id:` field, if any
    pub id: Option<String>,
    /// Value of the `event:` field (the type tag), if any
    pub event: Option<String>,
    /// Parsed `data:` payload (`Null` when the frame carried no data)
    pub data: Value,
}

impl SseFrame {
    /// Build a frame directly (used by tests and scripted feeds)
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            id: None,
            event: Some(event.into()),
            data,
        }
    }

    /// Attach an event id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Errors produced while decoding a single frame
///
/// None of these abort a stream: the frame is dropped and decoding continues.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The `data:` payload is not valid JSON
    #[error("invalid JSON in data field: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A line contained invalid UTF-8
    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    /// The frame exceeded the size limit
    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge {
        /// Configured limit
        limit: usize,
    },

    /// The JSON payload does not match the shape expected for its event tag
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// Event tag
        kind: &'static str,
        /// Underlying deserialization error
        #[source]
        source: serde_json::Error,
    },
}

/// Fields collected for the frame currently being read
#[derive(Debug, Default)]
struct PendingFrame {
    id: Option<String>,
    event: Option<String>,
    data: Vec<String>,
    bytes: usize,
}

impl PendingFrame {
    fn is_empty(&self) -> bool {
        self.id.is_none() && self.event.is_none() && self.data.is_empty()
    }
}

/// Decoder state machine for streaming SSE parsing
///
/// Buffers incoming bytes and yields complete frames.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
    pending: PendingFrame,
    max_frame_bytes: usize,
    /// Skipping the rest of a rejected frame until the next blank line
    discarding: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    /// Create a decoder with the default frame size limit
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Create a decoder with a custom frame size limit
    #[must_use]
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
            pending: PendingFrame::default(),
            max_frame_bytes,
            discarding: false,
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        if self.read_pos == self.buffer.len() {
            self.buffer.clear();
            self.read_pos = 0;
        } else if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Number of unconsumed bytes in the buffer
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Try to decode the next frame
    ///
    /// Returns:
    /// - `Some(Ok(frame))` when a blank line completed a frame
    /// - `Some(Err(..))` when a frame was rejected (the caller logs and moves on)
    /// - `None` when more data is needed
    pub fn next_frame(&mut self) -> Option<Result<SseFrame, DecodeError>> {
        loop {
            let Some(offset) = self.buffer[self.read_pos..].iter().position(|&b| b == b'\n')
            else {
                return self.check_unterminated_line();
            };

            let start = self.read_pos;
            let mut end = start + offset;
            self.read_pos = end + 1;
            if end > start && self.buffer[end - 1] == b'\r' {
                end -= 1;
            }

            let Ok(line) = std::str::from_utf8(&self.buffer[start..end]).map(str::to_owned)
            else {
                if self.discarding {
                    continue;
                }
                self.pending = PendingFrame::default();
                self.discarding = true;
                return Some(Err(DecodeError::InvalidUtf8));
            };

            if line.is_empty() {
                if self.discarding {
                    self.discarding = false;
                    self.pending = PendingFrame::default();
                    continue;
                }
                if self.pending.is_empty() {
                    // Comment-only or keep-alive frame
                    self.pending = PendingFrame::default();
                    continue;
                }
                return Some(self.take_frame());
            }

            if self.discarding {
                continue;
            }

            self.pending.bytes += line.len();
            if self.pending.bytes > self.max_frame_bytes {
                return Some(Err(self.reject_frame()));
            }
            self.apply_line(&line);
        }
    }

    /// Flush whatever remains at end of stream
    ///
    /// A partial final line is treated as complete, and a frame missing its
    /// terminating blank line is emitted anyway.
    pub fn finish(&mut self) -> Vec<Result<SseFrame, DecodeError>> {
        if self.available() > 0 || !self.pending.is_empty() {
            self.buffer.extend_from_slice(b"\n\n");
        }

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        self.clear();
        frames
    }

    /// Clear all buffered state
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
        self.pending = PendingFrame::default();
        self.discarding = false;
    }

    /// Called when the buffer holds no complete line
    fn check_unterminated_line(&mut self) -> Option<Result<SseFrame, DecodeError>> {
        let available = self.available();
        if self.discarding {
            if available > self.max_frame_bytes {
                self.buffer.clear();
                self.read_pos = 0;
            }
            return None;
        }
        if self.pending.bytes + available > self.max_frame_bytes {
            self.buffer.clear();
            self.read_pos = 0;
            return Some(Err(self.reject_frame()));
        }
        None
    }

    fn reject_frame(&mut self) -> DecodeError {
        self.pending = PendingFrame::default();
        self.discarding = true;
        DecodeError::FrameTooLarge {
            limit: self.max_frame_bytes,
        }
    }

    fn apply_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "id" => self.pending.id = Some(value.to_string()),
            "event" => self.pending.event = Some(value.to_string()),
            "data" => self.pending.data.push(value.to_string()),
            "retry" => {}
            other => debug!(field = other, "ignoring unknown SSE field"),
        }
    }

    fn take_frame(&mut self) -> Result<SseFrame, DecodeError> {
        let pending = std::mem::take(&mut self.pending);
        let joined = pending.data.join("\n");
        let data = if joined.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&joined)?
        };

        Ok(SseFrame {
            id: pending.id,
            event: pending.event,
            data,
        })
    }
}

struct DecodeState<S> {
    source: S,
    decoder: SseDecoder,
    tail: VecDeque<SseFrame>,
    ended: bool,
}

/// Decode a chunked byte stream into a lazy stream of frames
///
/// Malformed frames are logged and dropped. A read error mid-stream is
/// treated as a soft end of stream: frames already produced stay valid and
/// the incomplete trailing frame is discarded. A clean end flushes the
/// trailing partial frame.
pub fn decode_stream<S, B, E>(source: S, max_frame_bytes: usize) -> FrameStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = DecodeState {
        source,
        decoder: SseDecoder::with_max_frame_bytes(max_frame_bytes),
        tail: VecDeque::new(),
        ended: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.tail.pop_front() {
                return Some((frame, state));
            }
            if state.ended {
                return None;
            }

            while let Some(result) = state.decoder.next_frame() {
                match result {
                    Ok(frame) => return Some((frame, state)),
                    Err(e) => warn!(error = %e, "dropping malformed SSE frame"),
                }
            }

            match state.source.next().await {
                Some(Ok(chunk)) => state.decoder.push(chunk.as_ref()),
                Some(Err(e)) => {
                    warn!(error = %e, "event stream interrupted, treating as end of stream");
                    state.ended = true;
                }
                None => {
                    state.ended = true;
                    for result in state.decoder.finish() {
                        match result {
                            Ok(frame) => state.tail.push_back(frame),
                            Err(e) => warn!(error = %e, "dropping malformed trailing SSE frame"),
                        }
                    }
                }
            }
        }
    })
    .boxed()
}
