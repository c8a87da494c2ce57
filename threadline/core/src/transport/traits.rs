//! Chat Transport Traits
//!
//! The seam between the reconciliation engine and the chat service. The
//! coordinator and the replay reconciler only see decoded frame streams; how
//! the bytes arrive is up to the implementation.
//!
//! # Design Philosophy
//!
//! A transport answers two questions:
//! - send a turn and stream back its events
//! - fetch the persisted event feed of a thread (if there is one)
//!
//! Non-success statuses before any data are errors. Everything after the
//! stream starts (including a dropped connection) is the stream's business.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::ids::{ThreadId, WorkspaceId};
use crate::sse::FrameStream;
use crate::turn::Role;

/// One prior message sent as conversation history
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryMessage {
    /// Author
    pub role: Role,
    /// Message text
    pub content: String,
}

impl HistoryMessage {
    /// A user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Body of a chat stream request
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Target workspace
    pub workspace_id: WorkspaceId,
    /// Target thread (`__default__` creates one)
    pub thread_id: ThreadId,
    /// Prior history followed by the new user message
    pub messages: Vec<HistoryMessage>,
    /// Ask the agent to plan before acting
    pub plan_mode: bool,
    /// Structured side-channel context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<Value>,
}

/// Transport failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the service
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The service answered with a non-success status
    #[error("chat service returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (possibly truncated)
        body: String,
    },

    /// The configured base URL is unusable
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Chat service transport
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name for logs
    fn name(&self) -> &str;

    /// Send a turn and stream back its frames
    ///
    /// The returned stream ends on a clean close or a mid-stream
    /// interruption; neither is an error.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<FrameStream, TransportError>;

    /// Fetch the persisted event feed for a thread
    ///
    /// Returns `Ok(None)` when the thread has no history.
    async fn replay(&self, thread_id: &str) -> Result<Option<FrameStream>, TransportError>;
}
