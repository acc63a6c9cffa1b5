//! Optional deadline-based liveness detection.
//!
//! A session is considered dead when the server has sent nothing for
//! `missed_intervals` heartbeat intervals. Timestamps are milliseconds
//! relative to any fixed origin chosen by the caller.

use std::time::Duration;

/// How long a server may stay silent before it is declared dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessDeadline {
    pub interval: Duration,
    pub missed_intervals: u32,
}

impl LivenessDeadline {
    pub fn new(interval: Duration, missed_intervals: u32) -> Self {
        Self {
            interval,
            missed_intervals,
        }
    }

    /// Total silence allowed, saturating at `Duration::MAX`.
    pub fn window(&self) -> Duration {
        self.interval
            .checked_mul(self.missed_intervals)
            .unwrap_or(Duration::MAX)
    }

    fn window_ms(&self) -> u64 {
        u64::try_from(self.window().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Tracks the last time a server showed signs of life.
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    deadline: LivenessDeadline,
    last_activity_ms: u64,
}

impl LivenessTracker {
    /// Start tracking; the session counts as active at `now_ms`.
    pub fn new(deadline: LivenessDeadline, now_ms: u64) -> Self {
        Self {
            deadline,
            last_activity_ms: now_ms,
        }
    }

    pub fn deadline(&self) -> LivenessDeadline {
        self.deadline
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms
    }

    /// Record inbound activity. Out-of-order timestamps are ignored.
    pub fn record_activity(&mut self, now_ms: u64) {
        if now_ms > self.last_activity_ms {
            self.last_activity_ms = now_ms;
        }
    }

    /// Whether the server has been silent for the whole window.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        let window_ms = self.deadline.window_ms();
        now_ms.saturating_sub(self.last_activity_ms) >= window_ms
    }

    /// Time left before expiry (zero once expired).
    pub fn remaining(&self, now_ms: u64) -> Duration {
        let window_ms = self.deadline.window_ms();
        let elapsed = now_ms.saturating_sub(self.last_activity_ms);
        Duration::from_millis(window_ms.saturating_sub(elapsed))
    }
}
