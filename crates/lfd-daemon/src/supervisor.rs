//! Heartbeat supervisor.
//!
//! One per session. Writes `"LFD<id> heartbeat"` to the server every
//! interval, starting right after the handshake, and turns the outcome into
//! membership events via `HeartbeatSession`:
//! - first successful write → `<id>,add` to the GFD
//! - first failed write after that → `<id>,remove`, then stop
//!
//! With a liveness deadline configured, a server that stays silent for the
//! whole window is treated the same as a failed write.

use lfd_core::{
    heartbeat_payload, HeartbeatSession, LfdIdentity, LivenessDeadline, LivenessTracker,
    MembershipEvent,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::gfd::GfdHandle;
use crate::session::ServerSession;

/// Deadline tracking fed by the inbound reader's activity channel.
struct Liveness {
    tracker: LivenessTracker,
    activity: watch::Receiver<Instant>,
}

pub struct Supervisor {
    state: HeartbeatSession,
    peer_addr: SocketAddr,
    write: OwnedWriteHalf,
    payload: String,
    interval: Duration,
    gfd: GfdHandle,
    started: Instant,
    liveness: Option<Liveness>,
}

impl Supervisor {
    pub fn new(
        session: &ServerSession,
        write: OwnedWriteHalf,
        identity: &LfdIdentity,
        gfd: GfdHandle,
    ) -> Self {
        Self {
            state: HeartbeatSession::new(session.server_id),
            peer_addr: session.peer_addr,
            write,
            payload: heartbeat_payload(identity.id),
            interval: identity.heartbeat_interval,
            gfd,
            started: Instant::now(),
            liveness: None,
        }
    }

    /// Also declare the server dead after `deadline` without inbound activity.
    pub fn with_liveness(
        mut self,
        deadline: LivenessDeadline,
        activity: watch::Receiver<Instant>,
    ) -> Self {
        self.liveness = Some(Liveness {
            tracker: LivenessTracker::new(deadline, 0),
            activity,
        });
        self
    }

    fn elapsed_ms(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.started).as_millis() as u64
    }

    /// Fold any new reader activity into the tracker and check the deadline.
    fn deadline_expired(&mut self) -> bool {
        let now_ms = self.elapsed_ms(Instant::now());
        let last_seen = match &mut self.liveness {
            Some(liveness) => *liveness.activity.borrow_and_update(),
            None => return false,
        };
        let seen_ms = self.elapsed_ms(last_seen);

        match &mut self.liveness {
            Some(liveness) => {
                liveness.tracker.record_activity(seen_ms);
                liveness.tracker.is_expired(now_ms)
            }
            None => false,
        }
    }

    /// Send an event to the GFD. Returns false if the supervisor must stop.
    async fn report(&mut self, event: MembershipEvent) -> bool {
        match self.gfd.send(event).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Could not report '{}' for server {}: {}",
                    event,
                    self.state.server_id(),
                    e
                );
                self.state.on_report_failed();
                false
            }
        }
    }

    /// Heartbeat until the server or the GFD link fails.
    ///
    /// Returns the final session state.
    pub async fn run(mut self) -> HeartbeatSession {
        let server_id = self.state.server_id();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Supervising server {} ({}) every {:?}",
            server_id, self.peer_addr, self.interval
        );

        loop {
            ticker.tick().await;

            if self.deadline_expired() {
                warn!(
                    "Server {} silent past its liveness deadline, treating as crashed",
                    server_id
                );
                if let Some(leave) = self.state.on_deadline_expired() {
                    self.report(leave).await;
                }
                break;
            }

            match self.write.write_all(self.payload.as_bytes()).await {
                Ok(()) => {
                    debug!("Sent heartbeat to server {}", server_id);
                    if let Some(join) = self.state.on_heartbeat_sent() {
                        info!("Server {} is alive, announcing join", server_id);
                        if !self.report(join).await {
                            break;
                        }
                        self.state.on_join_reported();
                    }
                }
                Err(e) => {
                    warn!("Error sending heartbeat to server {}: {}", server_id, e);
                    match self.state.on_heartbeat_failed() {
                        Some(leave) => {
                            info!("Server {} has crashed!", server_id);
                            self.report(leave).await;
                        }
                        None => {
                            info!(
                                "Server {} went away before its first heartbeat",
                                server_id
                            );
                        }
                    }
                    break;
                }
            }
        }

        self.state
    }
}
