//! Session State
//!
//! Process-wide state that outlives any single coordinator. Today that is the
//! one-time onboarding check: the first coordinator to claim it runs the
//! guided onboarding turn, later ones (including ones rebuilt after the view
//! is torn down) skip it until the session is reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Shared session flags
///
/// Cheap to clone; clones share the same flags.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    onboarding_checked: Arc<AtomicBool>,
}

impl SessionState {
    /// Start a fresh session
    #[must_use]
    pub fn init() -> Self {
        Self::default()
    }

    /// Claim the onboarding check
    ///
    /// Returns `true` exactly once per session.
    pub fn claim_onboarding_check(&self) -> bool {
        let claimed = !self.onboarding_checked.swap(true, Ordering::AcqRel);
        if !claimed {
            debug!("onboarding already checked this session");
        }
        claimed
    }

    /// Whether the onboarding check has been claimed
    #[must_use]
    pub fn onboarding_checked(&self) -> bool {
        self.onboarding_checked.load(Ordering::Acquire)
    }

    /// Forget everything (full session restart only)
    pub fn reset(&self) {
        self.onboarding_checked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onboarding_claimed_once_across_clones() {
        let session = SessionState::init();
        let remounted = session.clone();

        assert!(!session.onboarding_checked());
        assert!(session.claim_onboarding_check());
        assert!(!remounted.claim_onboarding_check());
        assert!(remounted.onboarding_checked());
    }

    #[test]
    fn test_reset_allows_a_new_claim() {
        let session = SessionState::init();
        assert!(session.claim_onboarding_check());
        session.reset();
        assert!(session.claim_onboarding_check());
    }
}
