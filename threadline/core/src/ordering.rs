//! Ordering Allocator
//!
//! Every segment in a turn gets a position the moment its event is observed.
//! Positions are handed out by an [`OrderingLedger`], which also holds the
//! synchronous de-duplication guards for the turn.
//!
//! # Capture Before Defer
//!
//! The ledger is mutated while an event is being classified, never while a
//! queued update is being applied. [`OrderingLedger::next_position`] writes
//! the new counter value back before returning it, so the caller captures a
//! plain integer that stays correct no matter how late the update carrying
//! it is applied. Queued updates never read the ledger.

use std::collections::HashSet;

use crate::segments::MarkerKey;

/// A segment's chronological rank within its turn (1-based)
pub type Position = u64;

/// Per-turn counter and de-duplication state
#[derive(Clone, Debug, Default)]
pub struct OrderingLedger {
    counter: Position,
    markers: HashSet<MarkerKey>,
    seen_events: HashSet<String>,
}

impl OrderingLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next position
    ///
    /// The counter is advanced before the value is returned.
    pub fn next_position(&mut self) -> Position {
        let position = self.counter + 1;
        self.counter = position;
        position
    }

    /// The last position handed out (0 if none)
    #[must_use]
    pub fn counter(&self) -> Position {
        self.counter
    }

    /// Claim a marker key
    ///
    /// Returns `true` the first time a key is seen, `false` afterwards.
    pub fn claim_marker(&mut self, key: &MarkerKey) -> bool {
        if self.markers.contains(key) {
            return false;
        }
        self.markers.insert(key.clone());
        true
    }

    /// Whether a marker key has already been claimed
    #[must_use]
    pub fn has_marker(&self, key: &MarkerKey) -> bool {
        self.markers.contains(key)
    }

    /// Record an event identity
    ///
    /// Returns `true` the first time an identity is seen, `false` for a
    /// redelivery.
    pub fn observe_event(&mut self, event_id: &str) -> bool {
        self.seen_events.insert(event_id.to_string())
    }

    /// Number of distinct event identities recorded
    #[must_use]
    pub fn observed_events(&self) -> usize {
        self.seen_events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_start_at_one_and_never_repeat() {
        let mut ledger = OrderingLedger::new();
        assert_eq!(ledger.counter(), 0);

        let positions: Vec<Position> = (0..5).map(|_| ledger.next_position()).collect();
        assert_eq!(positions, vec![1, 2, 3, 4, 5]);
        assert_eq!(ledger.counter(), 5);
    }

    #[test]
    fn test_captured_position_is_independent_of_later_allocations() {
        let mut ledger = OrderingLedger::new();
        let captured = ledger.next_position();
        for _ in 0..10 {
            ledger.next_position();
        }
        assert_eq!(captured, 1);
        assert_eq!(ledger.counter(), 11);
    }

    #[test]
    fn test_marker_claimed_once() {
        let mut ledger = OrderingLedger::new();
        let key = MarkerKey::Reasoning("r1".to_string());

        assert!(!ledger.has_marker(&key));
        assert!(ledger.claim_marker(&key));
        assert!(!ledger.claim_marker(&key));
        assert!(ledger.has_marker(&key));
        assert!(ledger.claim_marker(&MarkerKey::ToolCall("r1".to_string())));
    }

    #[test]
    fn test_event_redelivery_detected() {
        let mut ledger = OrderingLedger::new();
        assert!(ledger.observe_event("42"));
        assert!(!ledger.observe_event("42"));
        assert!(ledger.observe_event("43"));
        assert_eq!(ledger.observed_events(), 2);
    }
}
