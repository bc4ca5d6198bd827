//! Arbitration Coordinator
//!
//! Tracks the set of in-flight connection attempts for one launch and decides
//! the winner. The first attempt whose handshake reaches the arbitration point
//! is kept; every other tracked attempt is destroyed with the reserved
//! concurrent-session stop code. The winner check-and-set is atomic with the
//! tracked-set mutation so the policy holds under any scheduler.

use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;

use super::attempt::ConnectionAttempt;
use super::state::StopCode;

struct Tracked {
    attempts: Vec<Arc<ConnectionAttempt>>,
    winner: Option<usize>,
}

/// Launch-scoped registry of live attempts
pub struct Arbiter {
    tracked: Mutex<Tracked>,
}

impl Arbiter {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tracked: Mutex::new(Tracked {
                attempts: Vec::new(),
                winner: None,
            }),
        }
    }

    /// Track a newly started attempt
    pub fn register(&self, attempt: Arc<ConnectionAttempt>) {
        self.tracked.lock().attempts.push(attempt);
    }

    /// First-caller-wins arbitration. Returns whether `candidate` is the
    /// winner; losers are destroyed with `StopCode::CONCURRENT_SESSION` before
    /// this returns, leaving exactly the winner tracked.
    pub fn arbitrate(&self, candidate: &Arc<ConnectionAttempt>) -> bool {
        let losers = {
            let mut tracked = self.tracked.lock();

            if let Some(winner) = tracked.winner {
                return winner == candidate.id();
            }
            if !candidate.is_alive()
                || !tracked.attempts.iter().any(|a| a.id() == candidate.id())
            {
                debug!("attempt {} arbitrated after leaving the set", candidate.id());
                return false;
            }

            tracked.winner = Some(candidate.id());
            let losers: Vec<_> = tracked
                .attempts
                .iter()
                .filter(|a| a.id() != candidate.id())
                .cloned()
                .collect();
            tracked.attempts.retain(|a| a.id() == candidate.id());
            losers
        };

        candidate.mark_winner();
        info!(
            "attempt {} ({}) won arbitration, destroying {} other(s)",
            candidate.id(),
            candidate.session_id(),
            losers.len()
        );
        for loser in losers {
            loser.destroy(StopCode::CONCURRENT_SESSION);
        }
        true
    }

    /// Remove an attempt from tracking, reporting whether it was present and
    /// whether the set is now empty. Both facts come from one lock
    /// acquisition, so "last attempt gone" is decided race-free.
    pub fn remove_and_check(&self, attempt_id: usize) -> (bool, bool) {
        let mut tracked = self.tracked.lock();
        let before = tracked.attempts.len();
        tracked.attempts.retain(|a| a.id() != attempt_id);
        let removed = tracked.attempts.len() != before;
        (removed, tracked.attempts.is_empty())
    }

    /// The winning attempt's ID, once declared
    pub fn winner(&self) -> Option<usize> {
        self.tracked.lock().winner
    }

    /// Whether an attempt is still tracked
    pub fn contains(&self, attempt_id: usize) -> bool {
        self.tracked
            .lock()
            .attempts
            .iter()
            .any(|a| a.id() == attempt_id)
    }

    /// Number of tracked attempts
    pub fn len(&self) -> usize {
        self.tracked.lock().attempts.len()
    }

    /// Whether no attempts remain
    pub fn is_empty(&self) -> bool {
        self.tracked.lock().attempts.is_empty()
    }

    /// Snapshot of the tracked attempts, for teardown
    pub fn live_attempts(&self) -> Vec<Arc<ConnectionAttempt>> {
        self.tracked.lock().attempts.clone()
    }
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new()
    }
}
