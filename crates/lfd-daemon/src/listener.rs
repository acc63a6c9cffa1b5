//! Server registry listener.
//!
//! Accepts connections from servers that want to be monitored and hands
//! them, unparsed, to the dispatch loop over an unbounded queue.

use lfd_core::LfdError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::connection::AcceptedConnection;

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct RegistryListener {
    listener: TcpListener,
}

impl RegistryListener {
    /// Bind the well-known endpoint servers connect to.
    pub async fn bind(listen_addr: &str) -> Result<Self, LfdError> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|e| LfdError::io(&format!("Failed to listen on {}", listen_addr), e))?;
        info!("Listening for servers on {}", listen_addr);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LfdError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop in the background.
    ///
    /// Accept errors are logged and the loop keeps going; it only ends once
    /// the receiving side of `accepted` is gone.
    pub fn spawn(self, accepted: mpsc::UnboundedSender<AcceptedConnection>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.accept_loop(accepted).await;
        })
    }

    async fn accept_loop(self, accepted: mpsc::UnboundedSender<AcceptedConnection>) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {}", addr);
                    if accepted.send(AcceptedConnection { stream, addr }).is_err() {
                        debug!("Dispatch loop gone, stopping accept loop");
                        break;
                    }
                }
                Err(e) => {
                    error!("Error accepting: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }
}
