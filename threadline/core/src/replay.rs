//! Replay Reconciler
//!
//! Rebuilds turns from a thread's persisted event feed. The feed uses the
//! live wire format; each `user_message` event opens a turn and the content
//! events after it belong to that turn.
//!
//! # Idempotency
//!
//! Replaying the same feed into the same transcript again changes nothing:
//!
//! - turns are matched by `turn_id` (or `replay-{n}`, the n-th user message
//!   of the feed, when the service omits it)
//! - a turn sent live in this transcript has a local id; when the feed's id
//!   is unknown, the n-th transcript turn is matched if its user text is the
//!   same, and a live turn matched that way is rebuilt from the feed
//! - content events are matched by frame `id` (or `#{n}`, their ordinal
//!   within the turn, when the feed omits ids)
//! - marker keys are claimed once per turn
//!
//! A thread without history is not an error; the transcript stays empty.

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::events::{ChatEvent, ControlEvent};
use crate::ids::{ThreadId, TurnId};
use crate::sse::FrameStream;
use crate::transcript::Transcript;
use crate::transport::{ChatTransport, TransportError};
use crate::turn::Turn;

/// What a replay did to the transcript
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// The service had a feed for the thread
    pub found: bool,
    /// Turns added to the transcript
    pub turns_created: usize,
    /// Live turns replaced by their persisted form
    pub turns_rebuilt: usize,
    /// Turns opened by the feed (new or already present)
    pub turns_touched: usize,
    /// Updates applied
    pub updates_applied: usize,
    /// Content events dropped as already seen
    pub duplicates_dropped: usize,
    /// Content events that arrived before any `user_message`
    pub orphaned_events: usize,
}

impl ReplaySummary {
    /// The thread has no history
    #[must_use]
    pub fn not_found() -> Self {
        Self::default()
    }
}

/// Position within the feed
#[derive(Debug, Default)]
struct Cursor {
    current: Option<TurnId>,
    user_messages: usize,
    ordinal: usize,
    touched: Vec<TurnId>,
}

impl Cursor {
    fn open(&mut self, turn_id: TurnId) {
        if !self.touched.contains(&turn_id) {
            self.touched.push(turn_id.clone());
        }
        self.current = Some(turn_id);
        self.ordinal = 0;
    }

    fn next_ordinal(&mut self) -> usize {
        let ordinal = self.ordinal;
        self.ordinal += 1;
        ordinal
    }
}

/// Replays persisted feeds into a transcript
#[derive(Debug, Default)]
pub struct ReplayReconciler {
    cursor: Cursor,
    summary: ReplaySummary,
}

impl ReplayReconciler {
    /// Fetch and apply a thread's history
    ///
    /// # Errors
    ///
    /// Returns the transport's error for anything but "not found".
    pub async fn replay<T>(
        transport: &T,
        thread_id: &str,
        transcript: &mut Transcript,
    ) -> Result<ReplaySummary, TransportError>
    where
        T: ChatTransport + ?Sized,
    {
        match transport.replay(thread_id).await? {
            Some(frames) => Ok(Self::default().run(frames, transcript).await),
            None => {
                debug!(thread_id, "no history to replay");
                Ok(ReplaySummary::not_found())
            }
        }
    }

    /// Apply an already-open feed
    pub async fn reconcile(frames: FrameStream, transcript: &mut Transcript) -> ReplaySummary {
        Self::default().run(frames, transcript).await
    }

    async fn run(mut self, mut frames: FrameStream, transcript: &mut Transcript) -> ReplaySummary {
        self.summary.found = true;

        while let Some(frame) = frames.next().await {
            let event = match ChatEvent::from_frame(&frame) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "dropping malformed replay frame");
                    continue;
                }
            };

            match event {
                ChatEvent::Control(ControlEvent::UserMessage(message)) => {
                    let index = self.cursor.user_messages;
                    self.cursor.user_messages += 1;
                    let turn_id = message
                        .turn_id
                        .map_or_else(|| TurnId::new(format!("replay-{index}")), TurnId::new);
                    let turn_id = self.resolve(transcript, turn_id, index, message.content);
                    self.cursor.open(turn_id);
                }
                ChatEvent::Content(content) => {
                    let Some(turn_id) = self.cursor.current.clone() else {
                        warn!(kind = %content.kind(), "replay content before any user message");
                        self.summary.orphaned_events += 1;
                        continue;
                    };
                    let ordinal = self.cursor.next_ordinal();
                    let event_id = frame.id.clone().unwrap_or_else(|| format!("#{ordinal}"));

                    let Some(turn) = transcript.turn_mut(&turn_id) else {
                        continue;
                    };
                    match turn.plan(Some(&event_id), content) {
                        Some(update) => {
                            turn.apply(update);
                            self.summary.updates_applied += 1;
                        }
                        None => self.summary.duplicates_dropped += 1,
                    }
                }
                ChatEvent::Control(ControlEvent::ThreadMeta(meta)) => {
                    if transcript.thread_id().is_new() {
                        transcript.set_thread_id(ThreadId::assigned(meta.thread_id));
                    }
                }
                ChatEvent::Control(ControlEvent::Error(error)) => {
                    let turn = self
                        .cursor
                        .current
                        .as_ref()
                        .and_then(|id| transcript.turn_mut(id));
                    match turn {
                        Some(turn) if turn.status().is_in_flight() => {
                            if let Err(e) = turn.fail(error.message) {
                                warn!(error = %e, "could not mark replayed turn failed");
                            }
                        }
                        _ => debug!(message = %error.message, "replay error outside an open turn"),
                    }
                }
                ChatEvent::Control(ControlEvent::Done) => {
                    debug!("end of persisted turn");
                }
            }
        }

        for turn_id in &self.cursor.touched {
            if let Some(turn) = transcript.turn_mut(turn_id) {
                turn.finalize_historical();
            }
        }
        self.summary.turns_touched = self.cursor.touched.len();

        info!(
            turns = self.summary.turns_touched,
            created = self.summary.turns_created,
            rebuilt = self.summary.turns_rebuilt,
            applied = self.summary.updates_applied,
            duplicates = self.summary.duplicates_dropped,
            "replay reconciled"
        );
        self.summary
    }

    /// Transcript turn for the `index`-th user message of the feed
    fn resolve(
        &mut self,
        transcript: &mut Transcript,
        turn_id: TurnId,
        index: usize,
        content: String,
    ) -> TurnId {
        if transcript.turn(&turn_id).is_some() {
            return turn_id;
        }

        let matched = transcript
            .turns()
            .get(index)
            .filter(|turn| turn.user.content == content)
            .map(|turn| (turn.id.clone(), turn.user.created_at, turn.response.historical));

        match matched {
            Some((local_id, _, true)) => local_id,
            Some((local_id, created_at, false)) => {
                let mut rebuilt = Self::open_turn(local_id.clone(), content);
                rebuilt.user.created_at = created_at;
                if let Some(live) = transcript.turn_mut(&local_id) {
                    *live = rebuilt;
                }
                debug!(turn_id = %local_id, feed_id = %turn_id, "rebuilding live turn from history");
                self.summary.turns_rebuilt += 1;
                local_id
            }
            None => {
                transcript.push(Self::open_turn(turn_id.clone(), content));
                self.summary.turns_created += 1;
                turn_id
            }
        }
    }

    fn open_turn(turn_id: TurnId, content: String) -> Turn {
        let mut turn = Turn::new(turn_id, content);
        if let Err(e) = turn.begin_replay() {
            warn!(turn_id = %turn.id, error = %e, "could not open replayed turn");
        }
        turn
    }
}
