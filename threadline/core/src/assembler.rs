//! Segment Assembler
//!
//! Turns content-bearing events into [`TurnUpdate`]s and applies them to a
//! turn's segment list and process tables.
//!
//! # Two Phases
//!
//! ```text
//!   event ──▶ plan(&mut ledger) ──▶ TurnUpdate ──▶ queue ──▶ apply(segments, processes)
//!             │                     (plain data:                │
//!             │ position allocated   position, key,             │ never reads the
//!             │ marker key claimed   process change)            │ ledger
//!             │ event id recorded                               │
//! ```
//!
//! [`plan`] runs synchronously as each event is classified. Everything that
//! depends on arrival order (the position, first-claim of a marker key, event
//! redelivery) is decided there. [`apply`] may run much later, in a batch, and
//! only copies the captured values into place. Applying a batch late gives the
//! same segment order as applying each update immediately.

use tracing::{debug, warn};

use crate::events::ContentEvent;
use crate::ordering::OrderingLedger;
use crate::process::{ReasoningUpdate, TaskListSnapshot, ToolCallUpdate, TurnProcesses};
use crate::segments::{MarkerKey, Segment};

/// Change to one of a turn's process tables
#[derive(Clone, Debug, PartialEq)]
pub enum ProcessChange {
    /// Reasoning table
    Reasoning {
        /// Reasoning identifier
        id: String,
        /// The change
        update: ReasoningUpdate,
    },
    /// Tool-call table
    ToolCall {
        /// Tool call identifier
        id: String,
        /// The change
        update: ToolCallUpdate,
    },
    /// Task-list table
    TaskList {
        /// Task list identifier
        id: String,
        /// Replacement snapshot
        snapshot: TaskListSnapshot,
    },
}

/// A deferred change to a turn, fully computed at observation time
#[derive(Clone, Debug, PartialEq)]
pub struct TurnUpdate {
    /// Segment to append (first occurrence of a key, or any text chunk)
    pub segment: Option<Segment>,
    /// Process record change
    pub process: Option<ProcessChange>,
}

impl TurnUpdate {
    /// Whether applying this update appends a segment
    #[must_use]
    pub fn appends_segment(&self) -> bool {
        self.segment.is_some()
    }
}

/// Classify a content event against the turn's ledger
///
/// Returns `None` when the event has no effect: a redelivery of an already
/// observed `event_id`, or an empty text chunk.
pub fn plan(
    ledger: &mut OrderingLedger,
    event_id: Option<&str>,
    event: ContentEvent,
) -> Option<TurnUpdate> {
    if let Some(event_id) = event_id {
        if !ledger.observe_event(event_id) {
            debug!(event_id, "dropping redelivered event");
            return None;
        }
    }

    let (key, process) = match event {
        ContentEvent::Text(chunk) => {
            if chunk.content.is_empty() {
                return None;
            }
            let position = ledger.next_position();
            return Some(TurnUpdate {
                segment: Some(Segment::Text {
                    content: chunk.content,
                    position,
                }),
                process: None,
            });
        }
        ContentEvent::Reasoning(chunk) => (
            MarkerKey::Reasoning(chunk.id.clone()),
            ProcessChange::Reasoning {
                id: chunk.id,
                update: ReasoningUpdate::Chunk(chunk.content),
            },
        ),
        ContentEvent::ReasoningComplete(done) => (
            MarkerKey::Reasoning(done.id.clone()),
            ProcessChange::Reasoning {
                id: done.id,
                update: ReasoningUpdate::Complete,
            },
        ),
        ContentEvent::ToolCall(call) => (
            MarkerKey::ToolCall(call.id.clone()),
            ProcessChange::ToolCall {
                id: call.id,
                update: ToolCallUpdate::Invoked {
                    name: call.name,
                    arguments: call.arguments,
                },
            },
        ),
        ContentEvent::ToolCallResult(result) => (
            MarkerKey::ToolCall(result.id.clone()),
            ProcessChange::ToolCall {
                id: result.id,
                update: ToolCallUpdate::Resulted {
                    name: result.name,
                    result: result.result,
                    is_error: result.is_error,
                },
            },
        ),
        ContentEvent::TodoUpdate(update) => (
            MarkerKey::TaskList(update.id.clone()),
            ProcessChange::TaskList {
                id: update.id.clone(),
                snapshot: TaskListSnapshot::from(update),
            },
        ),
    };

    let segment = if ledger.claim_marker(&key) {
        let position = ledger.next_position();
        Some(key.into_segment(position))
    } else {
        None
    };

    Some(TurnUpdate {
        segment,
        process: Some(process),
    })
}

/// Apply a planned update
///
/// Marker segments are checked again here: a marker whose key is already in
/// `segments` is not appended a second time.
pub fn apply(segments: &mut Vec<Segment>, processes: &mut TurnProcesses, update: TurnUpdate) {
    if let Some(segment) = update.segment {
        let duplicate = segment
            .marker_key()
            .is_some_and(|key| segments.iter().any(|s| s.marker_key().as_ref() == Some(&key)));
        if duplicate {
            debug!(position = segment.position(), "marker already present");
        } else {
            segments.push(segment);
        }
    }

    match update.process {
        Some(ProcessChange::Reasoning { id, update }) => {
            processes.reasoning.apply(&id, update);
        }
        Some(ProcessChange::ToolCall { id, update }) => {
            if matches!(update, ToolCallUpdate::Resulted { .. }) && !processes.tool_calls.contains(&id)
            {
                warn!(tool_call_id = %id, "tool result without a prior call");
            }
            processes.tool_calls.apply(&id, update);
        }
        Some(ProcessChange::TaskList { id, snapshot }) => {
            processes.task_lists.apply(&id, snapshot);
        }
        None => {}
    }
}
