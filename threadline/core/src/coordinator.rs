//! Turn Coordinator
//!
//! Drives one conversation thread: pairs each user message with the
//! assistant's response, streams the response through the assembler and
//! publishes the transcript as it changes.
//!
//! # Architecture
//!
//! ```text
//!  send_message ──▶ Turn (Sending) ──▶ transport.stream_chat
//!                                             │
//!                                    frames ◀─┘
//!                                        │
//!               ┌────────────────────────┼────────────────────────┐
//!               ▼                        ▼                        ▼
//!        ContentEvent              thread_meta               error / done
//!     turn.plan() (sync)       adopt id, publish           flush, finish turn
//!               │
//!               ▼
//!          UpdateBatch ── full / end of stream ──▶ turn.apply() ──▶ TurnUpdated
//! ```
//!
//! `send_message` takes `&mut self`, so a coordinator drives at most one
//! turn at a time. Use an [`AbortHandle`] to cancel from elsewhere.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::assembler::TurnUpdate;
use crate::config::ThreadlineConfig;
use crate::events::{ChatEvent, ControlEvent};
use crate::ids::{ThreadId, TurnId, WorkspaceId};
use crate::replay::{ReplayReconciler, ReplaySummary};
use crate::session::SessionState;
use crate::transcript::{Transcript, TranscriptUpdate};
use crate::transport::{ChatRequest, ChatTransport, HistoryMessage, TransportError};
use crate::turn::{Turn, TurnError, TurnStatus};

/// Error message recorded on a cancelled turn
pub const CANCELLED_MESSAGE: &str = "cancelled";

/// Message sent for the guided onboarding turn
pub const ONBOARDING_MESSAGE: &str = "Help me get started.";

// ============================================================================
// Configuration
// ============================================================================

/// Coordinator settings
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Workspace that owns the thread
    pub workspace_id: WorkspaceId,
    /// Queued updates applied per flush
    pub apply_batch_size: usize,
    /// Default plan-mode flag
    pub plan_mode: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workspace_id: WorkspaceId::new("default"),
            apply_batch_size: 8,
            plan_mode: false,
        }
    }
}

impl From<&ThreadlineConfig> for CoordinatorConfig {
    fn from(config: &ThreadlineConfig) -> Self {
        Self {
            workspace_id: WorkspaceId::new(config.workspace_id.clone()),
            apply_batch_size: config.apply_batch_size,
            plan_mode: config.plan_mode,
        }
    }
}

/// Per-message options
#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    /// Override the configured plan-mode flag
    pub plan_mode: Option<bool>,
    /// Structured side-channel context
    pub additional_context: Option<Value>,
}

/// How a turn ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The turn
    pub turn_id: TurnId,
    /// Final status
    pub status: TurnStatus,
    /// Error message, if the turn failed
    pub error: Option<String>,
}

impl TurnOutcome {
    fn of(turn: &Turn) -> Self {
        Self {
            turn_id: turn.id.clone(),
            status: turn.status(),
            error: turn.response.error.clone(),
        }
    }

    /// Whether the turn finished normally
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == TurnStatus::Complete
    }
}

/// Errors from coordinator operations
///
/// Transport and server failures during a turn are not errors here; they end
/// the turn with its error flag set.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Nothing to send
    #[error("message is empty")]
    EmptyMessage,

    /// A turn lifecycle rule was broken
    #[error(transparent)]
    Turn(#[from] TurnError),

    /// History could not be fetched
    #[error("history replay failed: {0}")]
    Replay(#[from] TransportError),
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cancels the turn a coordinator is currently driving
///
/// A request made while no turn runs cancels the next one. The flag clears
/// when a turn ends.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Request cancellation
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation has been requested for the current turn
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|aborted| *aborted).await.is_err() {
        futures::future::pending::<()>().await;
    }
}

/// Ends a turn for observers when `send_message` is dropped mid-turn
///
/// Also clears the abort flag once the turn is over, however it ended.
struct TurnGuard {
    turn_id: Option<TurnId>,
    updates: mpsc::Sender<TranscriptUpdate>,
    abort: Arc<watch::Sender<bool>>,
}

impl TurnGuard {
    fn disarm(mut self) {
        self.turn_id = None;
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.abort.send_replace(false);
        let Some(turn_id) = self.turn_id.take() else {
            return;
        };
        warn!(turn_id = %turn_id, "turn dropped before it finished");
        let update = TranscriptUpdate::TurnFailed {
            turn_id,
            message: CANCELLED_MESSAGE.to_string(),
        };
        if let Err(e) = self.updates.try_send(update) {
            debug!(error = %e, "could not report dropped turn");
        }
    }
}

// ============================================================================
// Update batching
// ============================================================================

/// Planned updates waiting to be applied
#[derive(Debug)]
pub struct UpdateBatch {
    pending: Vec<TurnUpdate>,
    capacity: usize,
}

impl UpdateBatch {
    /// Create a batch that fills at `capacity` updates (at least 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Queue an update; returns `true` when the batch is full
    pub fn push(&mut self, update: TurnUpdate) -> bool {
        self.pending.push(update);
        self.pending.len() >= self.capacity
    }

    /// Number of queued updates
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply every queued update to `turn`, in queue order
    pub fn flush_into(&mut self, turn: &mut Turn) -> usize {
        let count = self.pending.len();
        for update in self.pending.drain(..) {
            turn.apply(update);
        }
        count
    }

    /// Drop every queued update
    pub fn discard(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Drives the turns of one thread
pub struct TurnCoordinator<T: ChatTransport> {
    transport: Arc<T>,
    config: CoordinatorConfig,
    transcript: Transcript,
    updates: mpsc::Sender<TranscriptUpdate>,
    abort: Arc<watch::Sender<bool>>,
}

impl<T: ChatTransport> TurnCoordinator<T> {
    /// Create a coordinator for a new thread
    pub fn new(
        transport: Arc<T>,
        config: CoordinatorConfig,
        updates: mpsc::Sender<TranscriptUpdate>,
    ) -> Self {
        let (abort, _) = watch::channel(false);
        Self {
            transport,
            config,
            transcript: Transcript::new(ThreadId::New),
            updates,
            abort: Arc::new(abort),
        }
    }

    /// Open an existing thread instead of a new one
    #[must_use]
    pub fn with_thread(mut self, thread_id: ThreadId) -> Self {
        self.transcript.set_thread_id(thread_id);
        self
    }

    /// Current transcript
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Current thread identity
    #[must_use]
    pub fn thread_id(&self) -> &ThreadId {
        self.transcript.thread_id()
    }

    /// Handle for cancelling the in-flight turn
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: Arc::clone(&self.abort),
        }
    }

    /// Send a user message and stream the response to completion
    ///
    /// The returned outcome reports how the turn ended; a transport failure,
    /// a server `error` event or cancellation all end the turn with its
    /// error flag set rather than returning `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::EmptyMessage`] for blank input.
    pub async fn send_message(
        &mut self,
        content: impl Into<String>,
        options: SendOptions,
    ) -> Result<TurnOutcome, CoordinatorError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(CoordinatorError::EmptyMessage);
        }

        let mut messages = self.transcript.history();
        messages.push(HistoryMessage::user(content.clone()));

        let mut turn = Turn::new(TurnId::generate(), content);
        turn.begin_sending()?;
        let guard = TurnGuard {
            turn_id: Some(turn.id.clone()),
            updates: self.updates.clone(),
            abort: Arc::clone(&self.abort),
        };
        self.publish(TranscriptUpdate::TurnStarted(Box::new(turn.clone())))
            .await;

        let request = ChatRequest {
            workspace_id: self.config.workspace_id.clone(),
            thread_id: self.transcript.thread_id().clone(),
            messages,
            plan_mode: options.plan_mode.unwrap_or(self.config.plan_mode),
            additional_context: options.additional_context,
        };

        let driven = self.drive(&mut turn, &request).await;
        guard.disarm();
        if let Err(ref e) = driven {
            if turn.status().is_in_flight() {
                turn.fail(e.to_string())?;
            }
        }

        let outcome = TurnOutcome::of(&turn);
        self.transcript.push(turn);
        driven.map(|()| outcome)
    }

    /// Run the one-time onboarding turn for a fresh thread
    ///
    /// Returns `Ok(None)` if this session already checked onboarding or the
    /// thread already has turns.
    ///
    /// # Errors
    ///
    /// Same as [`TurnCoordinator::send_message`].
    pub async fn start_onboarding(
        &mut self,
        session: &SessionState,
        context: Value,
    ) -> Result<Option<TurnOutcome>, CoordinatorError> {
        if !session.claim_onboarding_check() {
            return Ok(None);
        }
        if !self.transcript.is_empty() {
            debug!("thread has turns, skipping onboarding");
            return Ok(None);
        }

        let options = SendOptions {
            plan_mode: Some(false),
            additional_context: Some(context),
        };
        self.send_message(ONBOARDING_MESSAGE, options)
            .await
            .map(Some)
    }

    /// Replay the thread's persisted history into the transcript
    ///
    /// A new thread has no history and is not fetched.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Replay`] if the feed cannot be fetched
    /// (a missing feed is not an error).
    pub async fn load_history(&mut self) -> Result<ReplaySummary, CoordinatorError> {
        let ThreadId::Assigned(thread_id) = self.transcript.thread_id().clone() else {
            return Ok(ReplaySummary::not_found());
        };

        let summary =
            ReplayReconciler::replay(self.transport.as_ref(), &thread_id, &mut self.transcript)
                .await?;

        self.publish(TranscriptUpdate::ReplayLoaded {
            thread_id,
            turns: self.transcript.len(),
        })
        .await;
        Ok(summary)
    }

    async fn drive(&mut self, turn: &mut Turn, request: &ChatRequest) -> Result<(), CoordinatorError> {
        let mut abort_rx = self.abort.subscribe();

        let connected = tokio::select! {
            biased;
            () = cancelled(&mut abort_rx) => None,
            result = self.transport.stream_chat(request) => Some(result),
        };

        let mut frames = match connected {
            Some(Ok(frames)) => frames,
            Some(Err(e)) => {
                warn!(
                    transport = self.transport.name(),
                    turn_id = %turn.id,
                    error = %e,
                    "chat request failed"
                );
                return self.fail(turn, e.to_string()).await;
            }
            None => return self.fail(turn, CANCELLED_MESSAGE).await,
        };

        let mut batch = UpdateBatch::new(self.config.apply_batch_size);

        loop {
            let frame = tokio::select! {
                biased;
                () = cancelled(&mut abort_rx) => {
                    let dropped = batch.discard();
                    info!(turn_id = %turn.id, dropped, "turn cancelled");
                    return self.fail(turn, CANCELLED_MESSAGE).await;
                }
                frame = frames.next() => frame,
            };

            let Some(frame) = frame else {
                break;
            };

            let event = match ChatEvent::from_frame(&frame) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    warn!(turn_id = %turn.id, error = %e, "dropping malformed event");
                    continue;
                }
            };

            turn.begin_streaming()?;

            match event {
                ChatEvent::Content(content) => {
                    if let Some(update) = turn.plan(frame.id.as_deref(), content) {
                        if batch.push(update) {
                            self.flush(turn, &mut batch).await;
                        }
                    }
                }
                ChatEvent::Control(ControlEvent::ThreadMeta(meta)) => {
                    self.adopt_thread(meta.thread_id).await;
                }
                ChatEvent::Control(ControlEvent::UserMessage(_)) => {
                    debug!(turn_id = %turn.id, "ignoring user_message in live stream");
                }
                ChatEvent::Control(ControlEvent::Error(error)) => {
                    self.flush(turn, &mut batch).await;
                    warn!(turn_id = %turn.id, message = %error.message, "server reported an error");
                    return self.fail(turn, error.message).await;
                }
                ChatEvent::Control(ControlEvent::Done) => break,
            }
        }

        self.flush(turn, &mut batch).await;
        turn.complete()?;
        debug!(
            turn_id = %turn.id,
            segments = turn.response.segments.len(),
            positions = turn.position_counter(),
            "turn complete"
        );
        self.publish(TranscriptUpdate::TurnFinished {
            turn_id: turn.id.clone(),
            status: turn.status(),
        })
        .await;
        Ok(())
    }

    async fn flush(&self, turn: &mut Turn, batch: &mut UpdateBatch) {
        if batch.is_empty() {
            return;
        }
        batch.flush_into(turn);
        self.publish(TranscriptUpdate::TurnUpdated(Box::new(turn.clone())))
            .await;
    }

    async fn fail(&self, turn: &mut Turn, message: impl Into<String>) -> Result<(), CoordinatorError> {
        let message = message.into();
        turn.fail(message.clone())?;
        self.publish(TranscriptUpdate::TurnFailed {
            turn_id: turn.id.clone(),
            message,
        })
        .await;
        Ok(())
    }

    async fn adopt_thread(&mut self, assigned: String) {
        let assigned = ThreadId::from(assigned);
        let ThreadId::Assigned(ref id) = assigned else {
            debug!("ignoring thread_meta without a real thread id");
            return;
        };

        match self.transcript.thread_id().clone() {
            ThreadId::New => {
                info!(thread_id = %id, "adopting assigned thread");
                let thread_id = id.clone();
                self.transcript.set_thread_id(assigned);
                self.publish(TranscriptUpdate::ThreadAssigned { thread_id })
                    .await;
            }
            ThreadId::Assigned(current) if current == *id => {}
            ThreadId::Assigned(current) => {
                warn!(current = %current, assigned = %id, "ignoring conflicting thread assignment");
            }
        }
    }

    async fn publish(&self, update: TranscriptUpdate) {
        if self.updates.send(update).await.is_err() {
            debug!("transcript receiver dropped");
        }
    }
}
