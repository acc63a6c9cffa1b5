//! Per-session heartbeat state machine.
//!
//! Decides which membership events a session emits, independent of any
//! transport. The supervisor task feeds it heartbeat outcomes and forwards
//! the returned events to the GFD:
//! 1. First successful heartbeat → `Join` (exactly once), state `Announcing`
//! 2. Join delivered → `SteadyState`
//! 3. First failure after `Join` → `Leave` (exactly once)
//! 4. Failure before any success → session ends silently
//!
//! Once `Terminated`, every input is ignored.

use crate::protocol::{MembershipEvent, ServerId};

/// Lifecycle of a supervised session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    /// Session created, no heartbeat has succeeded yet
    Idle,
    /// First heartbeat succeeded, `Join` handed out but not yet delivered
    Announcing,
    /// Join delivered, heartbeats flowing
    SteadyState,
    /// Supervisor has stopped
    Terminated,
}

/// Why a session terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// Heartbeat write failed
    HeartbeatFailed,
    /// No inbound activity within the liveness deadline
    DeadlineExpired,
    /// Reporting to the GFD failed
    ReportFailed,
}

/// Heartbeat bookkeeping for one server session.
#[derive(Debug, Clone)]
pub struct HeartbeatSession {
    server_id: ServerId,
    state: HeartbeatState,
    has_announced_join: bool,
    heartbeats_sent: u64,
    cause: Option<TerminationCause>,
}

impl HeartbeatSession {
    pub fn new(server_id: ServerId) -> Self {
        Self {
            server_id,
            state: HeartbeatState::Idle,
            has_announced_join: false,
            heartbeats_sent: 0,
            cause: None,
        }
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    pub fn state(&self) -> HeartbeatState {
        self.state
    }

    pub fn has_announced_join(&self) -> bool {
        self.has_announced_join
    }

    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats_sent
    }

    pub fn is_terminated(&self) -> bool {
        self.state == HeartbeatState::Terminated
    }

    pub fn termination_cause(&self) -> Option<TerminationCause> {
        self.cause
    }

    /// Record a successful heartbeat write.
    ///
    /// Returns the `Join` event on the first success only.
    pub fn on_heartbeat_sent(&mut self) -> Option<MembershipEvent> {
        match self.state {
            HeartbeatState::Idle => {
                self.heartbeats_sent += 1;
                self.has_announced_join = true;
                self.state = HeartbeatState::Announcing;
                Some(MembershipEvent::join(self.server_id))
            }
            HeartbeatState::Announcing | HeartbeatState::SteadyState => {
                self.heartbeats_sent += 1;
                None
            }
            HeartbeatState::Terminated => None,
        }
    }

    /// Record a failed heartbeat write (the server is considered crashed).
    ///
    /// Returns `Leave` only if a `Join` was announced before.
    pub fn on_heartbeat_failed(&mut self) -> Option<MembershipEvent> {
        self.terminate(TerminationCause::HeartbeatFailed)
    }

    /// Record that the liveness deadline passed without inbound activity.
    pub fn on_deadline_expired(&mut self) -> Option<MembershipEvent> {
        self.terminate(TerminationCause::DeadlineExpired)
    }

    /// Record that the `Join` reached the GFD.
    pub fn on_join_reported(&mut self) {
        if self.state == HeartbeatState::Announcing {
            self.state = HeartbeatState::SteadyState;
        }
    }

    /// Record that an event could not be delivered to the GFD.
    ///
    /// The supervisor stops without emitting anything further.
    pub fn on_report_failed(&mut self) {
        if self.state != HeartbeatState::Terminated {
            self.state = HeartbeatState::Terminated;
            self.cause = Some(TerminationCause::ReportFailed);
        }
    }

    fn terminate(&mut self, cause: TerminationCause) -> Option<MembershipEvent> {
        match self.state {
            HeartbeatState::Idle => {
                self.state = HeartbeatState::Terminated;
                self.cause = Some(cause);
                None
            }
            HeartbeatState::Announcing | HeartbeatState::SteadyState => {
                self.state = HeartbeatState::Terminated;
                self.cause = Some(cause);
                Some(MembershipEvent::leave(self.server_id))
            }
            HeartbeatState::Terminated => None,
        }
    }
}
