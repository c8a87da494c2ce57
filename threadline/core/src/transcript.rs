//! Transcript
//!
//! The published view of a thread: its identity and its turns in order.
//! This is the only structure the rendering layer reads.

use serde::Serialize;

use crate::ids::{ThreadId, TurnId};
use crate::transport::HistoryMessage;
use crate::turn::{AssistantResponse, Role, Turn, TurnStatus, UserEntry};

/// A role-tagged view of one half of a turn
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum TranscriptEntry<'a> {
    /// The user's message
    User {
        /// Owning turn
        turn_id: &'a TurnId,
        /// Message
        entry: &'a UserEntry,
    },
    /// The assistant's response
    Assistant {
        /// Owning turn
        turn_id: &'a TurnId,
        /// Turn status
        status: TurnStatus,
        /// Response
        response: &'a AssistantResponse,
    },
}

impl TranscriptEntry<'_> {
    /// Author of the entry
    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
        }
    }
}

/// Messages published while a turn or replay is in progress
#[derive(Clone, Debug)]
pub enum TranscriptUpdate {
    /// A turn was created (user entry plus empty placeholder)
    TurnStarted(Box<Turn>),
    /// A batch of updates was applied to a turn
    TurnUpdated(Box<Turn>),
    /// The service assigned a thread id to a new thread
    ThreadAssigned {
        /// The adopted thread id
        thread_id: String,
    },
    /// A turn finished normally
    TurnFinished {
        /// The turn
        turn_id: TurnId,
        /// Final status
        status: TurnStatus,
    },
    /// A turn finished with an error
    TurnFailed {
        /// The turn
        turn_id: TurnId,
        /// Error message
        message: String,
    },
    /// A history replay finished
    ReplayLoaded {
        /// The replayed thread
        thread_id: String,
        /// Number of turns in the transcript afterwards
        turns: usize,
    },
}

/// Ordered turns of one thread
#[derive(Clone, Debug, Default, Serialize)]
pub struct Transcript {
    thread_id: ThreadId,
    turns: Vec<Turn>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            turns: Vec::new(),
        }
    }

    /// Thread identity
    #[must_use]
    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    /// Replace the thread identity
    pub fn set_thread_id(&mut self, thread_id: ThreadId) {
        self.thread_id = thread_id;
    }

    /// Turns in order
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether there are no turns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Look up a turn
    #[must_use]
    pub fn turn(&self, id: &TurnId) -> Option<&Turn> {
        self.turns.iter().find(|turn| &turn.id == id)
    }

    /// Look up a turn mutably
    pub fn turn_mut(&mut self, id: &TurnId) -> Option<&mut Turn> {
        self.turns.iter_mut().find(|turn| &turn.id == id)
    }

    /// Append a turn
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Last turn, if any
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Role-tagged entries, user before assistant within each turn
    #[must_use]
    pub fn entries(&self) -> Vec<TranscriptEntry<'_>> {
        self.turns
            .iter()
            .flat_map(|turn| {
                [
                    TranscriptEntry::User {
                        turn_id: &turn.id,
                        entry: &turn.user,
                    },
                    TranscriptEntry::Assistant {
                        turn_id: &turn.id,
                        status: turn.status(),
                        response: &turn.response,
                    },
                ]
            })
            .collect()
    }

    /// Conversation history for the next request
    ///
    /// Includes completed turns only; a failed turn's partial response is
    /// not sent back.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryMessage> {
        self.turns
            .iter()
            .filter(|turn| turn.status() == TurnStatus::Complete)
            .flat_map(|turn| {
                [
                    HistoryMessage::user(turn.user.content.clone()),
                    HistoryMessage::assistant(turn.response.text()),
                ]
            })
            .collect()
    }

    /// Remove every turn (the thread identity is kept)
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ContentEvent, TextChunk};

    fn finished_turn(id: &str, user: &str, reply: &str) -> Turn {
        let mut turn = Turn::new(TurnId::new(id), user);
        turn.begin_sending().unwrap();
        let update = turn
            .plan(
                None,
                ContentEvent::Text(TextChunk {
                    content: reply.to_string(),
                }),
            )
            .unwrap();
        turn.apply(update);
        turn.complete().unwrap();
        turn
    }

    #[test]
    fn test_entries_alternate_roles() {
        let mut transcript = Transcript::new(ThreadId::assigned("t-1"));
        transcript.push(finished_turn("a", "hi", "hello"));
        transcript.push(finished_turn("b", "how?", "like so"));

        let roles: Vec<Role> = transcript.entries().iter().map(TranscriptEntry::role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }

    #[test]
    fn test_history_skips_failed_turns() {
        let mut transcript = Transcript::default();
        transcript.push(finished_turn("a", "hi", "hello"));

        let mut failed = Turn::new(TurnId::new("b"), "again");
        failed.begin_sending().unwrap();
        failed.fail("boom").unwrap();
        transcript.push(failed);

        let history = transcript.history();
        assert_eq!(
            history,
            vec![HistoryMessage::user("hi"), HistoryMessage::assistant("hello")]
        );
    }

    #[test]
    fn test_lookup_by_turn_id() {
        let mut transcript = Transcript::default();
        transcript.push(finished_turn("a", "hi", "hello"));
        assert!(transcript.turn(&TurnId::new("a")).is_some());
        assert!(transcript.turn_mut(&TurnId::new("zzz")).is_none());
        assert_eq!(transcript.len(), 1);
    }
}
