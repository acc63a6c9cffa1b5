//! Server sessions.
//!
//! A session starts once a server's handshake is read. Its connection is
//! split: the supervisor owns the write half, the inbound reader the read
//! half. The session ends when the supervisor stops, which aborts the
//! reader and closes the connection. The reader ending first leaves the
//! supervisor running so its next write can detect the crash.

use lfd_core::{HeartbeatSession, LfdIdentity, LivenessDeadline, ServerId};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::{watch, OwnedSemaphorePermit};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

use crate::gfd::GfdHandle;
use crate::reader::InboundReader;
use crate::supervisor::Supervisor;

/// Identity of one monitored server, as learned from its handshake.
///
/// The connection itself is not stored here: `spawn_session` hands its
/// write half to the supervisor and its read half to the inbound reader.
/// Whether a join was announced lives in the supervisor's `HeartbeatSession`.
#[derive(Debug, Clone)]
pub struct ServerSession {
    pub server_id: ServerId,
    pub peer_addr: SocketAddr,
}

impl ServerSession {
    pub fn new(server_id: ServerId, peer_addr: SocketAddr) -> Self {
        Self {
            server_id,
            peer_addr,
        }
    }
}

/// What every session needs from the detector.
#[derive(Clone)]
pub struct SessionContext {
    pub identity: LfdIdentity,
    pub gfd: GfdHandle,
    pub liveness: Option<LivenessDeadline>,
}

/// Start the supervisor and reader for a session.
///
/// The returned handle resolves to the final heartbeat state once the
/// session is over. `permit`, if any, is held for the session's lifetime.
pub fn spawn_session(
    session: ServerSession,
    stream: TcpStream,
    ctx: &SessionContext,
    permit: Option<OwnedSemaphorePermit>,
) -> JoinHandle<HeartbeatSession> {
    let (read, write) = stream.into_split();
    let (activity_tx, activity_rx) = watch::channel(Instant::now());

    let reader = tokio::spawn(InboundReader::new(session.server_id, read, activity_tx).run());

    let mut supervisor = Supervisor::new(&session, write, &ctx.identity, ctx.gfd.clone());
    if let Some(deadline) = ctx.liveness {
        supervisor = supervisor.with_liveness(deadline, activity_rx);
    }

    tokio::spawn(async move {
        let _permit = permit;
        let outcome = supervisor.run().await;
        reader.abort();
        info!(
            "Session for server {} closed after {} heartbeat(s)",
            session.server_id,
            outcome.heartbeats_sent()
        );
        outcome
    })
}
