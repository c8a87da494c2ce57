//! Turns
//!
//! A turn pairs one user message with the assistant's response. The response
//! owns its segment list and process tables; the turn owns the ordering
//! ledger that assigns positions to them.
//!
//! # State Machine
//!
//! ```text
//!   Idle ──▶ Sending ──▶ Streaming ──▶ Complete
//!     │         │            │
//!     └─────────┴────────────┴──────▶ Error
//! ```
//!
//! Replayed turns go `Idle ──▶ Streaming ──▶ Complete` and carry the
//! historical flag.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::assembler::{self, TurnUpdate};
use crate::events::ContentEvent;
use crate::ids::TurnId;
use crate::ordering::{OrderingLedger, Position};
use crate::process::TurnProcesses;
use crate::segments::{render_blocks, OrderingError, RenderBlock, Segment};

/// Author of a transcript entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human
    User,
    /// The agent
    Assistant,
}

impl Role {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a turn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Created, nothing sent
    #[default]
    Idle,
    /// Request sent, no event yet
    Sending,
    /// Receiving events
    Streaming,
    /// Finished normally
    Complete,
    /// Finished with an error (including cancellation)
    Error,
}

impl TurnStatus {
    /// Check if a transition is valid
    #[must_use]
    pub fn can_transition_to(&self, next: TurnStatus) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Sending | Self::Streaming | Self::Error)
                | (Self::Sending, Self::Streaming | Self::Complete | Self::Error)
                | (Self::Streaming, Self::Complete | Self::Error)
        )
    }

    /// Request sent and not yet finished
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }

    /// Finished, successfully or not
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl std::fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Streaming => "streaming",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Errors from turn lifecycle operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    /// The requested status change is not allowed
    #[error("invalid turn transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: TurnStatus,
        /// Requested status
        to: TurnStatus,
    },
}

/// The user half of a turn
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserEntry {
    /// Message text
    pub content: String,
    /// When the message was created locally
    pub created_at: DateTime<Utc>,
}

/// The assistant half of a turn
#[derive(Clone, Debug, Default, Serialize)]
pub struct AssistantResponse {
    /// Segments in application order (render order is by position)
    pub segments: Vec<Segment>,
    /// Process tables
    pub processes: TurnProcesses,
    /// Still receiving events
    pub streaming: bool,
    /// Reconstructed from history
    pub historical: bool,
    /// Error message, when the turn failed
    pub error: Option<String>,
}

impl AssistantResponse {
    /// Concatenated text segments in position order
    #[must_use]
    pub fn text(&self) -> String {
        let mut texts: Vec<(Position, &str)> = self
            .segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Text { content, position } => Some((*position, content.as_str())),
                _ => None,
            })
            .collect();
        texts.sort_by_key(|(position, _)| *position);
        texts.into_iter().map(|(_, content)| content).collect()
    }

    /// Whether nothing has been applied yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// One user message and its response
#[derive(Clone, Debug, Serialize)]
pub struct Turn {
    /// Stable identifier
    pub id: TurnId,
    /// User message
    pub user: UserEntry,
    /// Assistant response
    pub response: AssistantResponse,
    status: TurnStatus,
    #[serde(skip)]
    ledger: OrderingLedger,
}

impl Turn {
    /// Create an idle turn for a user message
    pub fn new(id: TurnId, content: impl Into<String>) -> Self {
        Self {
            id,
            user: UserEntry {
                content: content.into(),
                created_at: Utc::now(),
            },
            response: AssistantResponse::default(),
            status: TurnStatus::Idle,
            ledger: OrderingLedger::new(),
        }
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> TurnStatus {
        self.status
    }

    /// Last position handed out for this turn
    #[must_use]
    pub fn position_counter(&self) -> Position {
        self.ledger.counter()
    }

    fn transition(&mut self, next: TurnStatus) -> Result<(), TurnError> {
        if !self.status.can_transition_to(next) {
            return Err(TurnError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Request sent; the response placeholder starts streaming
    ///
    /// # Errors
    ///
    /// Returns [`TurnError::InvalidTransition`] unless the turn is idle.
    pub fn begin_sending(&mut self) -> Result<(), TurnError> {
        self.transition(TurnStatus::Sending)?;
        self.response.streaming = true;
        Ok(())
    }

    /// First event received
    ///
    /// A no-op when already streaming.
    ///
    /// # Errors
    ///
    /// Returns [`TurnError::InvalidTransition`] from idle or a terminal state.
    pub fn begin_streaming(&mut self) -> Result<(), TurnError> {
        if self.status == TurnStatus::Streaming {
            return Ok(());
        }
        if self.status == TurnStatus::Idle {
            return Err(TurnError::InvalidTransition {
                from: self.status,
                to: TurnStatus::Streaming,
            });
        }
        self.transition(TurnStatus::Streaming)
    }

    /// Start reconstructing this turn from a history feed
    ///
    /// # Errors
    ///
    /// Returns [`TurnError::InvalidTransition`] unless the turn is idle.
    pub fn begin_replay(&mut self) -> Result<(), TurnError> {
        self.transition(TurnStatus::Streaming)?;
        self.response.streaming = true;
        self.response.historical = true;
        Ok(())
    }

    /// Finish normally
    ///
    /// # Errors
    ///
    /// Returns [`TurnError::InvalidTransition`] unless the turn is in flight.
    pub fn complete(&mut self) -> Result<(), TurnError> {
        self.transition(TurnStatus::Complete)?;
        self.response.streaming = false;
        Ok(())
    }

    /// Finish with an error, keeping whatever was applied
    ///
    /// # Errors
    ///
    /// Returns [`TurnError::InvalidTransition`] if the turn already finished.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TurnError> {
        self.transition(TurnStatus::Error)?;
        self.response.streaming = false;
        self.response.error = Some(message.into());
        Ok(())
    }

    /// Mark a reconstructed turn finished
    ///
    /// Turns that already finished (an earlier replay, or an error event in
    /// the feed) keep their status.
    pub fn finalize_historical(&mut self) {
        if self.status.is_in_flight() {
            self.status = TurnStatus::Complete;
        }
        self.response.streaming = false;
        self.response.historical = true;
    }

    /// Classify a content event (see [`assembler::plan`])
    pub fn plan(&mut self, event_id: Option<&str>, event: ContentEvent) -> Option<TurnUpdate> {
        assembler::plan(&mut self.ledger, event_id, event)
    }

    /// Apply a planned update (see [`assembler::apply`])
    pub fn apply(&mut self, update: TurnUpdate) {
        assembler::apply(
            &mut self.response.segments,
            &mut self.response.processes,
            update,
        );
    }

    /// Display blocks for the response
    ///
    /// # Errors
    ///
    /// Propagates [`OrderingError`] from [`render_blocks`].
    pub fn render(&self) -> Result<Vec<RenderBlock<'_>>, OrderingError> {
        render_blocks(&self.response.segments, &self.response.processes)
    }
}
