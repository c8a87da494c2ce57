//! Segments
//!
//! The ordered units of an assistant turn. Text segments carry their content;
//! reasoning, tool-call and task-list segments are markers that reference a
//! process record by key.
//!
//! # Render Order
//!
//! ```text
//! segments (any order)      sorted by position         rendered
//! ┌───────────────┐         ┌───────────────┐         ┌──────────────────┐
//! │ text   @3     │         │ text   @1     │         │ "Hello "         │
//! │ task   @4     │  sort   │ reason @2     │  walk   │ reasoning r1     │
//! │ text   @1     │ ──────▶ │ text   @3     │ ──────▶ │ "world"          │
//! │ reason @2     │         │ task   @4     │         │ task list t1     │
//! │ text   @5     │         │ text   @5     │         │ "!"              │
//! └───────────────┘         └───────────────┘         └──────────────────┘
//! ```
//!
//! Adjacent text segments merge into one block at render time only.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::ordering::Position;
use crate::process::{ReasoningProcess, TaskListProcess, ToolCallProcess, TurnProcesses};

/// Stable identity of a marker segment
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MarkerKey {
    /// A reasoning process
    Reasoning(String),
    /// A tool call
    ToolCall(String),
    /// A task list
    TaskList(String),
}

impl MarkerKey {
    /// Build the marker segment for this key
    #[must_use]
    pub fn into_segment(self, position: Position) -> Segment {
        match self {
            Self::Reasoning(reasoning_id) => Segment::Reasoning {
                reasoning_id,
                position,
            },
            Self::ToolCall(tool_call_id) => Segment::ToolCall {
                tool_call_id,
                position,
            },
            Self::TaskList(task_list_id) => Segment::TaskList {
                task_list_id,
                position,
            },
        }
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reasoning(id) => write!(f, "reasoning:{id}"),
            Self::ToolCall(id) => write!(f, "tool_call:{id}"),
            Self::TaskList(id) => write!(f, "task_list:{id}"),
        }
    }
}

/// One ordered unit of a turn
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    /// A text chunk
    Text {
        /// Chunk text
        content: String,
        /// Chronological rank
        position: Position,
    },
    /// Reference to a reasoning process
    Reasoning {
        /// Reasoning identifier
        reasoning_id: String,
        /// Chronological rank
        position: Position,
    },
    /// Reference to a tool call
    ToolCall {
        /// Tool call identifier
        tool_call_id: String,
        /// Chronological rank
        position: Position,
    },
    /// Reference to a task list
    TaskList {
        /// Task list identifier
        task_list_id: String,
        /// Chronological rank
        position: Position,
    },
}

impl Segment {
    /// Chronological rank
    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Self::Text { position, .. }
            | Self::Reasoning { position, .. }
            | Self::ToolCall { position, .. }
            | Self::TaskList { position, .. } => *position,
        }
    }

    /// Marker identity (`None` for text)
    #[must_use]
    pub fn marker_key(&self) -> Option<MarkerKey> {
        match self {
            Self::Text { .. } => None,
            Self::Reasoning { reasoning_id, .. } => Some(MarkerKey::Reasoning(reasoning_id.clone())),
            Self::ToolCall { tool_call_id, .. } => Some(MarkerKey::ToolCall(tool_call_id.clone())),
            Self::TaskList { task_list_id, .. } => Some(MarkerKey::TaskList(task_list_id.clone())),
        }
    }

    /// Whether this is a text segment
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }
}

/// Ordering defects detected at render time
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderingError {
    /// Two segments share a position
    #[error("duplicate segment position {position}")]
    DuplicatePosition {
        /// The colliding position
        position: Position,
    },

    /// A marker references a process record that does not exist
    #[error("marker {key} has no process record")]
    DanglingMarker {
        /// The marker key
        key: String,
    },
}

/// A display block produced by [`render_blocks`]
#[derive(Clone, Debug, PartialEq)]
pub enum RenderBlock<'a> {
    /// A run of adjacent text segments
    Text(String),
    /// A reasoning process
    Reasoning(&'a ReasoningProcess),
    /// A tool call
    ToolCall(&'a ToolCallProcess),
    /// A task list
    TaskList(&'a TaskListProcess),
}

/// Produce display blocks in chronological order
///
/// Sorts by position, merges each run of adjacent text segments into one
/// block, and resolves every marker against its process record.
///
/// # Errors
///
/// Returns [`OrderingError::DuplicatePosition`] if two segments share a
/// position and [`OrderingError::DanglingMarker`] if a marker's record is
/// missing.
pub fn render_blocks<'a>(
    segments: &'a [Segment],
    processes: &'a TurnProcesses,
) -> Result<Vec<RenderBlock<'a>>, OrderingError> {
    let mut sorted: Vec<&Segment> = segments.iter().collect();
    sorted.sort_by_key(|segment| segment.position());

    if let Some(pair) = sorted
        .windows(2)
        .find(|pair| pair[0].position() == pair[1].position())
    {
        return Err(OrderingError::DuplicatePosition {
            position: pair[0].position(),
        });
    }

    let mut blocks = Vec::new();
    let mut text_run: Option<String> = None;

    for segment in sorted {
        if let Segment::Text { content, .. } = segment {
            text_run.get_or_insert_with(String::new).push_str(content);
            continue;
        }

        if let Some(run) = text_run.take() {
            blocks.push(RenderBlock::Text(run));
        }

        let block = match segment {
            Segment::Reasoning { reasoning_id, .. } => processes
                .reasoning
                .get(reasoning_id)
                .map(RenderBlock::Reasoning),
            Segment::ToolCall { tool_call_id, .. } => processes
                .tool_calls
                .get(tool_call_id)
                .map(RenderBlock::ToolCall),
            Segment::TaskList { task_list_id, .. } => processes
                .task_lists
                .get(task_list_id)
                .map(RenderBlock::TaskList),
            Segment::Text { .. } => None,
        };

        match block {
            Some(block) => blocks.push(block),
            None => {
                return Err(OrderingError::DanglingMarker {
                    key: segment
                        .marker_key()
                        .map(|key| key.to_string())
                        .unwrap_or_default(),
                })
            }
        }
    }

    if let Some(run) = text_run {
        blocks.push(RenderBlock::Text(run));
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ReasoningUpdate;

    fn text(content: &str, position: Position) -> Segment {
        Segment::Text {
            content: content.to_string(),
            position,
        }
    }

    #[test]
    fn test_adjacent_text_coalesces_at_render_time() {
        let mut processes = TurnProcesses::default();
        processes
            .reasoning
            .apply("r1", ReasoningUpdate::Chunk("hmm".to_string()));

        let segments = vec![
            text("c", 4),
            text("a", 1),
            MarkerKey::Reasoning("r1".to_string()).into_segment(3),
            text("b", 2),
        ];

        let blocks = render_blocks(&segments, &processes).unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], RenderBlock::Text("ab".to_string()));
        assert!(matches!(blocks[1], RenderBlock::Reasoning(r) if r.content == "hmm"));
        assert_eq!(blocks[2], RenderBlock::Text("c".to_string()));
    }

    #[test]
    fn test_duplicate_position_is_an_error() {
        let processes = TurnProcesses::default();
        let segments = vec![text("a", 1), text("b", 1)];

        assert_eq!(
            render_blocks(&segments, &processes),
            Err(OrderingError::DuplicatePosition { position: 1 })
        );
    }

    #[test]
    fn test_dangling_marker_is_an_error() {
        let processes = TurnProcesses::default();
        let segments = vec![MarkerKey::ToolCall("c1".to_string()).into_segment(1)];

        assert_eq!(
            render_blocks(&segments, &processes),
            Err(OrderingError::DanglingMarker {
                key: "tool_call:c1".to_string()
            })
        );
    }

    #[test]
    fn test_segment_serializes_with_type_tag() {
        let json = serde_json::to_value(text("hi", 7)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "text", "content": "hi", "position": 7})
        );
    }
}
