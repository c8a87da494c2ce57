//! Chat Events
//!
//! Typed events carried by the chat and replay streams. Each decoded
//! [`SseFrame`] is classified into a [`ChatEvent`] by its type tag; frames
//! with unknown tags are ignored without failing the stream.
//!
//! # Design Philosophy
//!
//! Events split into two families. [`ContentEvent`]s produce transcript
//! content and flow through the segment assembler. [`ControlEvent`]s steer the
//! turn lifecycle (thread assignment, turn boundaries on replay, errors, end of
//! stream) and are handled by the coordinator or reconciler. Dispatch is a
//! `match`, so adding a variant forces every consumer to handle it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::sse::{DecodeError, SseFrame};

/// Recognized event type tags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `text_chunk`
    TextChunk,
    /// `reasoning_chunk`
    ReasoningChunk,
    /// `reasoning_complete`
    ReasoningComplete,
    /// `tool_call`
    ToolCall,
    /// `tool_call_result`
    ToolCallResult,
    /// `todo_update`
    TodoUpdate,
    /// `thread_meta`
    ThreadMeta,
    /// `user_message` (replay feeds only)
    UserMessage,
    /// `error`
    Error,
    /// `done`
    Done,
}

impl EventKind {
    /// Parse a wire tag
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "text_chunk" => Some(Self::TextChunk),
            "reasoning_chunk" => Some(Self::ReasoningChunk),
            "reasoning_complete" => Some(Self::ReasoningComplete),
            "tool_call" => Some(Self::ToolCall),
            "tool_call_result" => Some(Self::ToolCallResult),
            "todo_update" => Some(Self::TodoUpdate),
            "thread_meta" => Some(Self::ThreadMeta),
            "user_message" => Some(Self::UserMessage),
            "error" => Some(Self::Error),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    /// Wire tag
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextChunk => "text_chunk",
            Self::ReasoningChunk => "reasoning_chunk",
            Self::ReasoningComplete => "reasoning_complete",
            Self::ToolCall => "tool_call",
            Self::ToolCallResult => "tool_call_result",
            Self::TodoUpdate => "todo_update",
            Self::ThreadMeta => "thread_meta",
            Self::UserMessage => "user_message",
            Self::Error => "error",
            Self::Done => "done",
        }
    }

    /// Whether events of this kind produce transcript content
    #[must_use]
    pub fn is_content_bearing(&self) -> bool {
        matches!(
            self,
            Self::TextChunk
                | Self::ReasoningChunk
                | Self::ReasoningComplete
                | Self::ToolCall
                | Self::ToolCallResult
                | Self::TodoUpdate
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A piece of visible assistant text
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Text delta
    pub content: String,
}

/// A piece of reasoning text
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningChunk {
    /// Reasoning process identifier
    pub id: String,
    /// Reasoning text delta
    #[serde(default)]
    pub content: String,
}

/// End of a reasoning process
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningComplete {
    /// Reasoning process identifier
    pub id: String,
}

/// A tool invocation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool call identifier
    pub id: String,
    /// Tool name
    pub name: String,
    /// Arguments as sent by the model
    #[serde(default)]
    pub arguments: Value,
}

/// The result of a tool invocation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Tool call identifier
    pub id: String,
    /// Tool name, when the service repeats it
    #[serde(default)]
    pub name: Option<String>,
    /// Result payload
    #[serde(default)]
    pub result: Value,
    /// Whether the tool reported a failure
    #[serde(default)]
    pub is_error: bool,
}

/// Status of one task-list item
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    /// Not started
    #[default]
    Pending,
    /// Being worked on
    InProgress,
    /// Finished
    #[serde(alias = "done", alias = "complete")]
    Completed,
}

/// One task-list item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Item text
    pub content: String,
    /// Item status
    #[serde(default)]
    pub status: TodoStatus,
}

/// Full snapshot of a task list
///
/// Each update carries the complete current list. Explicit counts, when
/// present, take precedence over counts derived from the items.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoUpdate {
    /// Task list identifier
    pub id: String,
    /// Current items
    #[serde(default)]
    pub todos: Vec<TodoItem>,
    /// Total item count
    #[serde(default)]
    pub total: Option<u32>,
    /// Completed item count
    #[serde(default)]
    pub completed: Option<u32>,
    /// In-progress item count
    #[serde(default)]
    pub in_progress: Option<u32>,
    /// Pending item count
    #[serde(default)]
    pub pending: Option<u32>,
}

/// Thread metadata (carries the assigned thread id)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMeta {
    /// Thread identifier assigned by the service
    pub thread_id: String,
}

/// A persisted user message (opens a turn in a replay feed)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    /// Message text
    pub content: String,
    /// Stable turn identifier, when the service provides one
    #[serde(default)]
    pub turn_id: Option<String>,
}

/// An error reported by the service inside the stream
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Human-readable message
    #[serde(alias = "error")]
    pub message: String,
}

/// Events that produce transcript content
#[derive(Clone, Debug, PartialEq)]
pub enum ContentEvent {
    /// Visible text
    Text(TextChunk),
    /// Reasoning text
    Reasoning(ReasoningChunk),
    /// Reasoning finished
    ReasoningComplete(ReasoningComplete),
    /// Tool invoked
    ToolCall(ToolCall),
    /// Tool returned
    ToolCallResult(ToolCallResult),
    /// Task list snapshot
    TodoUpdate(TodoUpdate),
}

impl ContentEvent {
    /// The kind of this event
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Text(_) => EventKind::TextChunk,
            Self::Reasoning(_) => EventKind::ReasoningChunk,
            Self::ReasoningComplete(_) => EventKind::ReasoningComplete,
            Self::ToolCall(_) => EventKind::ToolCall,
            Self::ToolCallResult(_) => EventKind::ToolCallResult,
            Self::TodoUpdate(_) => EventKind::TodoUpdate,
        }
    }
}

/// Events that steer the turn lifecycle
#[derive(Clone, Debug, PartialEq)]
pub enum ControlEvent {
    /// Thread id assignment
    ThreadMeta(ThreadMeta),
    /// Start of a persisted turn (replay)
    UserMessage(UserMessage),
    /// Error reported by the service
    Error(ServerError),
    /// End of the response
    Done,
}

/// A classified stream event
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    /// Content for the current turn
    Content(ContentEvent),
    /// Lifecycle signal
    Control(ControlEvent),
}

impl ChatEvent {
    /// Classify a decoded frame
    ///
    /// The tag comes from the frame's `event:` field, falling back to a
    /// `"type"` member of the payload. Returns `Ok(None)` for frames without
    /// a recognized tag.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidPayload`] when the payload does not match
    /// the shape expected for its tag.
    pub fn from_frame(frame: &SseFrame) -> Result<Option<Self>, DecodeError> {
        let tag = frame
            .event
            .as_deref()
            .or_else(|| frame.data.get("type").and_then(Value::as_str));

        let Some(tag) = tag else {
            debug!("ignoring frame without event tag");
            return Ok(None);
        };

        let Some(kind) = EventKind::from_tag(tag) else {
            debug!(tag, "ignoring unrecognized event");
            return Ok(None);
        };

        Self::decode(kind, &frame.data).map(Some)
    }

    /// Decode a payload for a known kind
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidPayload`] on a shape mismatch.
    pub fn decode(kind: EventKind, data: &Value) -> Result<Self, DecodeError> {
        let event = match kind {
            EventKind::TextChunk => Self::Content(ContentEvent::Text(parse(kind, data)?)),
            EventKind::ReasoningChunk => {
                Self::Content(ContentEvent::Reasoning(parse(kind, data)?))
            }
            EventKind::ReasoningComplete => {
                Self::Content(ContentEvent::ReasoningComplete(parse(kind, data)?))
            }
            EventKind::ToolCall => Self::Content(ContentEvent::ToolCall(parse(kind, data)?)),
            EventKind::ToolCallResult => {
                Self::Content(ContentEvent::ToolCallResult(parse(kind, data)?))
            }
            EventKind::TodoUpdate => Self::Content(ContentEvent::TodoUpdate(parse(kind, data)?)),
            EventKind::ThreadMeta => Self::Control(ControlEvent::ThreadMeta(parse(kind, data)?)),
            EventKind::UserMessage => {
                Self::Control(ControlEvent::UserMessage(parse(kind, data)?))
            }
            EventKind::Error => Self::Control(ControlEvent::Error(parse(kind, data)?)),
            EventKind::Done => Self::Control(ControlEvent::Done),
        };
        Ok(event)
    }

    /// The kind of this event
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Content(content) => content.kind(),
            Self::Control(ControlEvent::ThreadMeta(_)) => EventKind::ThreadMeta,
            Self::Control(ControlEvent::UserMessage(_)) => EventKind::UserMessage,
            Self::Control(ControlEvent::Error(_)) => EventKind::Error,
            Self::Control(ControlEvent::Done) => EventKind::Done,
        }
    }
}

fn parse<T: DeserializeOwned>(kind: EventKind, data: &Value) -> Result<T, DecodeError> {
    T::deserialize(data).map_err(|source| DecodeError::InvalidPayload {
        kind: kind.as_str(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tags_round_trip() {
        for kind in [
            EventKind::TextChunk,
            EventKind::ReasoningChunk,
            EventKind::ReasoningComplete,
            EventKind::ToolCall,
            EventKind::ToolCallResult,
            EventKind::TodoUpdate,
            EventKind::ThreadMeta,
            EventKind::UserMessage,
            EventKind::Error,
            EventKind::Done,
        ] {
            assert_eq!(EventKind::from_tag(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_tag("heartbeat"), None);
    }

    #[test]
    fn test_classify_text_chunk() {
        let frame = SseFrame::new("text_chunk", json!({"content": "Hello "}));
        let event = ChatEvent::from_frame(&frame).unwrap().unwrap();
        assert_eq!(
            event,
            ChatEvent::Content(ContentEvent::Text(TextChunk {
                content: "Hello ".to_string()
            }))
        );
        assert!(event.kind().is_content_bearing());
    }

    #[test]
    fn test_tag_falls_back_to_payload_type() {
        let frame = SseFrame {
            id: None,
            event: None,
            data: json!({"type": "thread_meta", "thread_id": "t-9"}),
        };
        let event = ChatEvent::from_frame(&frame).unwrap().unwrap();
        assert_eq!(
            event,
            ChatEvent::Control(ControlEvent::ThreadMeta(ThreadMeta {
                thread_id: "t-9".to_string()
            }))
        );
    }

    #[test]
    fn test_unknown_tag_is_ignored() {
        let frame = SseFrame::new("heartbeat", json!({}));
        assert!(ChatEvent::from_frame(&frame).unwrap().is_none());
    }

    #[test]
    fn test_shape_mismatch_is_invalid_payload() {
        let frame = SseFrame::new("tool_call", json!({"name": "search"}));
        let err = ChatEvent::from_frame(&frame).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidPayload {
                kind: "tool_call",
                ..
            }
        ));
    }

    #[test]
    fn test_done_without_data() {
        let frame = SseFrame::new("done", Value::Null);
        let event = ChatEvent::from_frame(&frame).unwrap().unwrap();
        assert_eq!(event, ChatEvent::Control(ControlEvent::Done));
    }

    #[test]
    fn test_todo_status_aliases() {
        let update: TodoUpdate = serde_json::from_value(json!({
            "id": "t1",
            "todos": [
                {"content": "fetch quotes", "status": "done"},
                {"content": "summarize", "status": "in_progress"},
                {"content": "chart"}
            ]
        }))
        .unwrap();

        assert_eq!(update.todos[0].status, TodoStatus::Completed);
        assert_eq!(update.todos[1].status, TodoStatus::InProgress);
        assert_eq!(update.todos[2].status, TodoStatus::Pending);
        assert_eq!(update.total, None);
    }
}
