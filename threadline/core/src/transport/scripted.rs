//! Scripted Transport
//!
//! An in-memory [`ChatTransport`] that plays back canned byte chunks. Each
//! `stream_chat` call consumes the next queued [`Script`]; replay feeds are
//! stored per thread and can be fetched any number of times.
//!
//! Used by the test suites and by the CLI's `decode` command, which replays a
//! captured `.sse` file through the same pipeline as a live thread.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

use super::traits::{ChatRequest, ChatTransport, TransportError};
use crate::sse::{decode_stream, FrameStream, SseFrame, DEFAULT_MAX_FRAME_BYTES};

/// One canned response
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Script {
    /// Deliver the chunks, then close cleanly
    Stream(Vec<Vec<u8>>),
    /// Deliver the chunks, then fail as a dropped connection would
    Interrupted(Vec<Vec<u8>>),
    /// Deliver the chunks, then stay open forever
    Pending(Vec<Vec<u8>>),
    /// Answer with a non-success status
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
    /// Fail before any response
    ConnectionFailed(String),
}

impl Script {
    /// A clean stream of the given frames, one chunk per frame
    #[must_use]
    pub fn frames(frames: &[SseFrame]) -> Self {
        Self::Stream(frames.iter().map(|f| encode_frame(f).into_bytes()).collect())
    }

    /// A clean stream of `text` cut into `chunk_size`-byte pieces
    #[must_use]
    pub fn chunked(text: &str, chunk_size: usize) -> Self {
        Self::Stream(
            text.as_bytes()
                .chunks(chunk_size.max(1))
                .map(<[u8]>::to_vec)
                .collect(),
        )
    }
}

/// Render a frame in wire format
#[must_use]
pub fn encode_frame(frame: &SseFrame) -> String {
    let mut out = String::new();
    if let Some(id) = &frame.id {
        out.push_str("id: ");
        out.push_str(id);
        out.push('\n');
    }
    if let Some(event) = &frame.event {
        out.push_str("event: ");
        out.push_str(event);
        out.push('\n');
    }
    out.push_str("data: ");
    out.push_str(&frame.data.to_string());
    out.push_str("\n\n");
    out
}

/// In-memory transport
pub struct ScriptedTransport {
    /// Responses for successive `stream_chat` calls
    chats: Mutex<VecDeque<Script>>,
    /// Replay feeds by thread id
    replays: Mutex<HashMap<String, Script>>,
    /// Every chat request received
    requests: Mutex<Vec<ChatRequest>>,
    /// Decoder frame limit
    max_frame_bytes: usize,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Create an empty transport
    #[must_use]
    pub fn new() -> Self {
        Self {
            chats: Mutex::new(VecDeque::new()),
            replays: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Queue the response for the next chat request
    #[must_use]
    pub fn with_chat(self, script: Script) -> Self {
        self.push_chat(script);
        self
    }

    /// Register the replay feed for a thread
    #[must_use]
    pub fn with_replay(self, thread_id: impl Into<String>, script: Script) -> Self {
        self.replays.lock().insert(thread_id.into(), script);
        self
    }

    /// Queue the response for a later chat request
    pub fn push_chat(&self, script: Script) {
        self.chats.lock().push_back(script);
    }

    /// Chat requests received so far
    #[must_use]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    fn play(&self, script: Script) -> Result<FrameStream, TransportError> {
        let source: BoxStream<'static, Result<Vec<u8>, String>> = match script {
            Script::Stream(chunks) => stream::iter(chunks.into_iter().map(Ok)).boxed(),
            Script::Interrupted(chunks) => stream::iter(chunks.into_iter().map(Ok))
                .chain(stream::once(async {
                    Err("connection reset by peer".to_string())
                }))
                .boxed(),
            Script::Pending(chunks) => stream::iter(chunks.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed(),
            Script::Status { status, body } => {
                return Err(TransportError::Status { status, body });
            }
            Script::ConnectionFailed(reason) => {
                return Err(TransportError::ConnectionFailed(reason));
            }
        };
        Ok(decode_stream(source, self.max_frame_bytes))
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<FrameStream, TransportError> {
        self.requests.lock().push(request.clone());
        let script = self.chats.lock().pop_front().ok_or_else(|| {
            TransportError::ConnectionFailed("no scripted response queued".to_string())
        })?;
        self.play(script)
    }

    async fn replay(&self, thread_id: &str) -> Result<Option<FrameStream>, TransportError> {
        let script = self.replays.lock().get(thread_id).cloned();
        match script {
            Some(Script::Status { status: 404, .. }) | None => Ok(None),
            Some(script) => self.play(script).map(Some),
        }
    }
}
