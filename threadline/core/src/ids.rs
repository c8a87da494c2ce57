//! Identifiers
//!
//! Thread, turn and workspace identifiers. A thread identifier may be the
//! "new thread" sentinel until the chat service assigns a real one.

use serde::{Deserialize, Serialize};

/// Wire value the chat service understands as "create a new thread"
pub const NEW_THREAD_SENTINEL: &str = "__default__";

/// Thread identifier
///
/// `New` serializes as [`NEW_THREAD_SENTINEL`]; the coordinator swaps it for
/// the assigned id once a `thread_meta` event arrives.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ThreadId {
    /// No thread exists yet
    #[default]
    New,
    /// A thread assigned by the chat service
    Assigned(String),
}

impl ThreadId {
    /// Sentinel for a thread that has not been created yet
    #[must_use]
    pub fn new_thread() -> Self {
        Self::New
    }

    /// A thread id assigned by the service
    pub fn assigned(id: impl Into<String>) -> Self {
        Self::from(id.into())
    }

    /// Whether this is still the "new thread" sentinel
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, Self::New)
    }

    /// Wire representation
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => NEW_THREAD_SENTINEL,
            Self::Assigned(id) => id,
        }
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        if value.is_empty() || value == NEW_THREAD_SENTINEL {
            Self::New
        } else {
            Self::Assigned(value)
        }
    }
}

impl From<ThreadId> for String {
    fn from(value: ThreadId) -> Self {
        match value {
            ThreadId::New => NEW_THREAD_SENTINEL.to_string(),
            ThreadId::Assigned(id) => id,
        }
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Turn (user message + assistant response) identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl TurnId {
    /// Create a turn ID from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique turn ID
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("turn_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Get the string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workspace identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceId(pub String);

impl WorkspaceId {
    /// Create a workspace ID from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
