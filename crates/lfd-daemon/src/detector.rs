//! Process-level assembly: register with the GFD, open the listener,
//! then hand both to the dispatch loop.

use lfd_core::{LfdConfig, LfdError, LfdIdentity};
use std::net::SocketAddr;
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::gfd::GfdLink;
use crate::listener::RegistryListener;

pub struct LocalFaultDetector {
    identity: LfdIdentity,
    local_addr: SocketAddr,
    dispatcher: Dispatcher,
}

impl LocalFaultDetector {
    /// Register with the GFD, then bind the server listener.
    ///
    /// Registration comes first: if the GFD is unreachable or hands out a
    /// malformed ID, no listener is ever opened.
    pub async fn start(config: &LfdConfig) -> Result<Self, LfdError> {
        let (gfd, identity) =
            GfdLink::register(&config.gfd_addr(), config.heartbeat_interval()).await?;

        let listener = RegistryListener::bind(&config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        let dispatcher = Dispatcher::new(identity, gfd, listener)
            .with_handshake_policy(config.handshake_policy)
            .with_liveness(config.liveness_deadline())
            .with_max_sessions(config.max_sessions);

        info!(
            "LFD{} ready on {} (heartbeat every {:?})",
            identity.id, local_addr, identity.heartbeat_interval
        );

        Ok(Self {
            identity,
            local_addr,
            dispatcher,
        })
    }

    pub fn identity(&self) -> LfdIdentity {
        self.identity
    }

    /// Address servers should connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the dispatch loop.
    pub async fn run(self) -> Result<(), LfdError> {
        self.dispatcher.run().await
    }
}
