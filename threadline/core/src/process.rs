//! Process Trackers
//!
//! Keyed tables holding the accumulating state of long-lived sub-activities
//! inside one assistant turn: reasoning, tool calls and task lists.
//!
//! # Design Philosophy
//!
//! All three tables share one [`ProcessTracker`]; what differs is the merge
//! rule, supplied by each record type through [`ProcessRecord`]:
//!
//! - reasoning appends text until a completion signal
//! - tool calls attach a result to the invocation
//! - task lists are replaced wholesale (each update is a full snapshot)
//!
//! Records are never removed while the turn lives.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::events::{TodoItem, TodoStatus, TodoUpdate};

/// A record type that can live in a [`ProcessTracker`]
pub trait ProcessRecord {
    /// Incoming change for a record
    type Update;

    /// Build a record from the first update seen for `id`
    fn create(id: &str, update: Self::Update) -> Self;

    /// Fold a later update into the record
    fn merge(&mut self, update: Self::Update);
}

/// A keyed table of process records
#[derive(Clone, Debug, Serialize)]
#[serde(transparent)]
pub struct ProcessTracker<R> {
    records: HashMap<String, R>,
}

impl<R> Default for ProcessTracker<R> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
        }
    }
}

impl<R: ProcessRecord> ProcessTracker<R> {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or merge the record for `id`
    pub fn apply(&mut self, id: &str, update: R::Update) -> &R {
        match self.records.entry(id.to_string()) {
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                record.merge(update);
                record
            }
            Entry::Vacant(entry) => entry.insert(R::create(id, update)),
        }
    }

    /// Look up a record
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.get(id)
    }

    /// Whether a record exists for `id`
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the tracker is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over all records (unordered)
    pub fn iter(&self) -> impl Iterator<Item = (&str, &R)> {
        self.records.iter().map(|(id, record)| (id.as_str(), record))
    }
}

// ============================================================================
// Reasoning
// ============================================================================

/// Change to a reasoning process
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReasoningUpdate {
    /// More reasoning text
    Chunk(String),
    /// The reasoning finished
    Complete,
}

/// Accumulated reasoning text
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReasoningProcess {
    /// Reasoning identifier
    pub id: String,
    /// Concatenated text
    pub content: String,
    /// Still receiving text
    pub in_progress: bool,
    /// Completion signal received
    pub complete: bool,
}

impl ProcessRecord for ReasoningProcess {
    type Update = ReasoningUpdate;

    fn create(id: &str, update: ReasoningUpdate) -> Self {
        let mut record = Self {
            id: id.to_string(),
            content: String::new(),
            in_progress: true,
            complete: false,
        };
        record.merge(update);
        record
    }

    fn merge(&mut self, update: ReasoningUpdate) {
        match update {
            ReasoningUpdate::Chunk(text) => self.content.push_str(&text),
            ReasoningUpdate::Complete => {
                self.in_progress = false;
                self.complete = true;
            }
        }
    }
}

// ============================================================================
// Tool calls
// ============================================================================

/// Change to a tool call
#[derive(Clone, Debug, PartialEq)]
pub enum ToolCallUpdate {
    /// The model invoked the tool
    Invoked {
        /// Tool name
        name: String,
        /// Tool arguments
        arguments: Value,
    },
    /// The tool returned
    Resulted {
        /// Tool name, if repeated by the result
        name: Option<String>,
        /// Result payload
        result: Value,
        /// Whether the tool failed
        is_error: bool,
    },
}

/// One tool invocation and its result
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolCallProcess {
    /// Tool call identifier
    pub id: String,
    /// Tool name (empty if only an unnamed result was seen)
    pub name: String,
    /// Latest arguments
    pub arguments: Value,
    /// Result, once received
    pub result: Option<Value>,
    /// Whether the tool failed
    pub is_error: bool,
    /// Waiting for a result
    pub in_progress: bool,
    /// Result received
    pub complete: bool,
}

impl ProcessRecord for ToolCallProcess {
    type Update = ToolCallUpdate;

    fn create(id: &str, update: ToolCallUpdate) -> Self {
        let mut record = Self {
            id: id.to_string(),
            name: String::new(),
            arguments: Value::Null,
            result: None,
            is_error: false,
            in_progress: true,
            complete: false,
        };
        record.merge(update);
        record
    }

    fn merge(&mut self, update: ToolCallUpdate) {
        match update {
            ToolCallUpdate::Invoked { name, arguments } => {
                self.name = name;
                self.arguments = arguments;
                // A redelivered invocation must not reopen a finished call
                self.in_progress = !self.complete;
            }
            ToolCallUpdate::Resulted {
                name,
                result,
                is_error,
            } => {
                if self.name.is_empty() {
                    if let Some(name) = name {
                        self.name = name;
                    }
                }
                self.result = Some(result);
                self.is_error = is_error;
                self.in_progress = false;
                self.complete = true;
            }
        }
    }
}

// ============================================================================
// Task lists
// ============================================================================

/// Item counts by status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    /// All items
    pub total: u32,
    /// Completed items
    pub completed: u32,
    /// In-progress items
    pub in_progress: u32,
    /// Pending items
    pub pending: u32,
}

impl TaskCounts {
    /// Count items by status
    #[must_use]
    pub fn from_items(items: &[TodoItem]) -> Self {
        let mut counts = Self::default();
        for item in items {
            counts.total += 1;
            match item.status {
                TodoStatus::Completed => counts.completed += 1,
                TodoStatus::InProgress => counts.in_progress += 1,
                TodoStatus::Pending => counts.pending += 1,
            }
        }
        counts
    }

    /// Whether every item is completed
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }
}

/// Latest snapshot of a task list
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskListSnapshot {
    /// Items in display order
    pub items: Vec<TodoItem>,
    /// Counts by status
    pub counts: TaskCounts,
}

impl From<TodoUpdate> for TaskListSnapshot {
    fn from(update: TodoUpdate) -> Self {
        let derived = TaskCounts::from_items(&update.todos);
        let counts = TaskCounts {
            total: update.total.unwrap_or(derived.total),
            completed: update.completed.unwrap_or(derived.completed),
            in_progress: update.in_progress.unwrap_or(derived.in_progress),
            pending: update.pending.unwrap_or(derived.pending),
        };
        Self {
            items: update.todos,
            counts,
        }
    }
}

/// A task list (last write wins)
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskListProcess {
    /// Task list identifier
    pub id: String,
    /// Current snapshot
    pub snapshot: TaskListSnapshot,
    /// Number of snapshots received
    pub revision: u32,
}

impl ProcessRecord for TaskListProcess {
    type Update = TaskListSnapshot;

    fn create(id: &str, snapshot: TaskListSnapshot) -> Self {
        Self {
            id: id.to_string(),
            snapshot,
            revision: 1,
        }
    }

    fn merge(&mut self, snapshot: TaskListSnapshot) {
        self.snapshot = snapshot;
        self.revision += 1;
    }
}

// ============================================================================
// Per-turn tables
// ============================================================================

/// The three process tables of one turn
#[derive(Clone, Debug, Default, Serialize)]
pub struct TurnProcesses {
    /// Reasoning processes
    pub reasoning: ProcessTracker<ReasoningProcess>,
    /// Tool calls
    pub tool_calls: ProcessTracker<ToolCallProcess>,
    /// Task lists
    pub task_lists: ProcessTracker<TaskListProcess>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reasoning_appends_then_completes() {
        let mut tracker = ProcessTracker::<ReasoningProcess>::new();
        tracker.apply("r1", ReasoningUpdate::Chunk("think".to_string()));
        tracker.apply("r1", ReasoningUpdate::Chunk("ing".to_string()));

        let record = tracker.get("r1").unwrap();
        assert_eq!(record.content, "thinking");
        assert!(record.in_progress);
        assert!(!record.complete);

        tracker.apply("r1", ReasoningUpdate::Complete);
        let record = tracker.get("r1").unwrap();
        assert!(!record.in_progress);
        assert!(record.complete);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_tool_call_attaches_result() {
        let mut tracker = ProcessTracker::<ToolCallProcess>::new();
        tracker.apply(
            "c1",
            ToolCallUpdate::Invoked {
                name: "get_quote".to_string(),
                arguments: json!({"symbol": "AAPL"}),
            },
        );
        assert!(tracker.get("c1").unwrap().in_progress);

        tracker.apply(
            "c1",
            ToolCallUpdate::Resulted {
                name: None,
                result: json!({"price": 190.1}),
                is_error: false,
            },
        );

        let record = tracker.get("c1").unwrap();
        assert_eq!(record.name, "get_quote");
        assert_eq!(record.result, Some(json!({"price": 190.1})));
        assert!(record.complete);
        assert!(!record.in_progress);
    }

    #[test]
    fn test_orphan_tool_result_creates_record() {
        let mut tracker = ProcessTracker::<ToolCallProcess>::new();
        let record = tracker.apply(
            "c9",
            ToolCallUpdate::Resulted {
                name: Some("search".to_string()),
                result: json!("found"),
                is_error: false,
            },
        );

        assert_eq!(record.name, "search");
        assert!(record.complete);
        assert_eq!(record.arguments, Value::Null);
    }

    #[test]
    fn test_redelivered_invocation_keeps_call_complete() {
        let mut tracker = ProcessTracker::<ToolCallProcess>::new();
        let invoked = ToolCallUpdate::Invoked {
            name: "search".to_string(),
            arguments: json!({"q": "rust"}),
        };
        tracker.apply("c1", invoked.clone());
        tracker.apply(
            "c1",
            ToolCallUpdate::Resulted {
                name: None,
                result: json!([]),
                is_error: false,
            },
        );
        tracker.apply("c1", invoked);

        let record = tracker.get("c1").unwrap();
        assert!(record.complete);
        assert!(!record.in_progress);
    }

    #[test]
    fn test_task_list_is_replaced_wholesale() {
        let mut tracker = ProcessTracker::<TaskListProcess>::new();
        let first = TodoUpdate {
            id: "t1".to_string(),
            todos: vec![
                TodoItem {
                    content: "a".to_string(),
                    status: TodoStatus::InProgress,
                },
                TodoItem {
                    content: "b".to_string(),
                    status: TodoStatus::Pending,
                },
            ],
            total: None,
            completed: None,
            in_progress: None,
            pending: None,
        };
        tracker.apply("t1", first.into());

        let second = TodoUpdate {
            id: "t1".to_string(),
            todos: vec![TodoItem {
                content: "a".to_string(),
                status: TodoStatus::Completed,
            }],
            total: None,
            completed: None,
            in_progress: None,
            pending: None,
        };
        tracker.apply("t1", second.into());

        let record = tracker.get("t1").unwrap();
        assert_eq!(record.snapshot.items.len(), 1);
        assert_eq!(record.snapshot.counts.completed, 1);
        assert_eq!(record.snapshot.counts.total, 1);
        assert_eq!(record.revision, 2);
        assert!(record.snapshot.counts.is_finished());
    }

    #[test]
    fn test_explicit_counts_override_derived() {
        let update = TodoUpdate {
            id: "t1".to_string(),
            todos: Vec::new(),
            total: Some(2),
            completed: Some(1),
            in_progress: None,
            pending: None,
        };
        let snapshot = TaskListSnapshot::from(update);
        assert_eq!(snapshot.counts.total, 2);
        assert_eq!(snapshot.counts.completed, 1);
        assert_eq!(snapshot.counts.pending, 0);
        assert!(!snapshot.counts.is_finished());
    }
}
