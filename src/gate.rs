//! Submission gate.
//!
//! Decoding fires on every frame, so one physical code produces a burst of
//! identical tokens. The gate lets exactly one through, holds while the
//! validation call is in flight, then stays closed for a cooldown measured
//! from completion.
//!
//! Times are passed in explicitly; the gate never reads the clock itself.

use std::time::{Duration, Instant};

/// Design value for the post-completion cooldown.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    Open,
    InFlight { since: Instant },
    CoolingDown { until: Instant },
}

#[derive(Debug)]
pub struct SubmissionGate {
    state: GateState,
    cooldown: Duration,
    accepted: u64,
    dropped: u64,
}

impl SubmissionGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: GateState::Open,
            cooldown,
            accepted: 0,
            dropped: 0,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// True when a submission at `now` would be accepted.
    pub fn is_open(&self, now: Instant) -> bool {
        match self.state {
            GateState::Open => true,
            GateState::InFlight { .. } => false,
            GateState::CoolingDown { until } => now >= until,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, GateState::InFlight { .. })
    }

    /// Claim the gate for a new submission.
    ///
    /// Returns `false` (and counts a drop) while in flight or cooling down.
    pub fn try_begin(&mut self, now: Instant) -> bool {
        if !self.is_open(now) {
            self.dropped += 1;
            return false;
        }
        self.state = GateState::InFlight { since: now };
        self.accepted += 1;
        true
    }

    /// Record completion of the in-flight call, whatever its outcome.
    ///
    /// Completing a gate that is not in flight is ignored.
    pub fn complete(&mut self, now: Instant) {
        if self.is_in_flight() {
            self.state = GateState::CoolingDown {
                until: now + self.cooldown,
            };
        }
    }

    /// Submissions let through so far.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Submissions dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for SubmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}
