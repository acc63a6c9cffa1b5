//! Dispatch loop.
//!
//! The detector's main control loop. It owns the registry listener and
//! the GFD link, reads each new server's handshake in turn and starts a
//! supervisor/reader pair for it.

use lfd_core::{HandshakePolicy, LfdError, LfdIdentity, LivenessDeadline};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::connection::{read_server_handshake, AcceptedConnection};
use crate::gfd::GfdLink;
use crate::listener::RegistryListener;
use crate::session::{spawn_session, SessionContext};

pub struct Dispatcher {
    listener: RegistryListener,
    gfd: GfdLink,
    ctx: SessionContext,
    policy: HandshakePolicy,
    admission: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    pub fn new(identity: LfdIdentity, gfd: GfdLink, listener: RegistryListener) -> Self {
        let ctx = SessionContext {
            identity,
            gfd: gfd.handle(),
            liveness: None,
        };
        Self {
            listener,
            gfd,
            ctx,
            policy: HandshakePolicy::default(),
            admission: None,
        }
    }

    pub fn with_handshake_policy(mut self, policy: HandshakePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_liveness(mut self, deadline: Option<LivenessDeadline>) -> Self {
        self.ctx.liveness = deadline;
        self
    }

    /// Cap the number of concurrently supervised servers.
    ///
    /// At capacity the loop waits for a session to end before starting the
    /// next one.
    pub fn with_max_sessions(mut self, max_sessions: Option<usize>) -> Self {
        self.admission = max_sessions.map(|n| Arc::new(Semaphore::new(n)));
        self
    }

    /// Run until a handshake fails under the strict policy.
    ///
    /// Returns `Ok(())` only if the accept loop stops on its own.
    pub async fn run(self) -> Result<(), LfdError> {
        let Dispatcher {
            listener,
            gfd: _gfd,
            ctx,
            policy,
            admission,
        } = self;

        let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();
        let accept_task = listener.spawn(accepted_tx);

        info!("Dispatch loop running (handshake policy: {})", policy);

        let result = loop {
            let Some(conn) = accepted_rx.recv().await else {
                warn!("Accept loop stopped, dispatch loop exiting");
                break Ok(());
            };

            if let Err(e) = Self::dispatch(conn, &ctx, admission.as_ref()).await {
                match policy {
                    HandshakePolicy::Strict => {
                        error!("Server handshake failed, halting: {}", e);
                        break Err(e);
                    }
                    HandshakePolicy::Isolated => {
                        warn!("Dropping server connection: {}", e);
                    }
                }
            }
        };

        accept_task.abort();
        result
    }

    /// Handshake one connection and start its session.
    async fn dispatch(
        conn: AcceptedConnection,
        ctx: &SessionContext,
        admission: Option<&Arc<Semaphore>>,
    ) -> Result<(), LfdError> {
        let addr = conn.addr;
        let (session, stream) = read_server_handshake(conn).await?;
        info!("Received ID from server: {} ({})", session.server_id, addr);

        let permit = match admission {
            Some(semaphore) => {
                if semaphore.available_permits() == 0 {
                    warn!(
                        "Session limit reached, server {} waits for a free slot",
                        session.server_id
                    );
                }
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| LfdError::Io("Session admission closed".to_string()))?;
                Some(permit)
            }
            None => None,
        };

        spawn_session(session, stream, ctx, permit);
        Ok(())
    }
}
