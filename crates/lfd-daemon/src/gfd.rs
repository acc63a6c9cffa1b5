//! Link to the Global Fault Detector.
//!
//! Registration reads the ID the GFD assigns us. After that the link is
//! write-only: every supervisor reports membership events through a cloned
//! `GfdHandle`, and a single writer task owns the socket's write half so
//! events never interleave mid-write.

use lfd_core::{LfdError, LfdId, LfdIdentity, MembershipEvent};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::connection::read_message;

/// A membership event waiting to be written, with a slot for the result.
struct GfdCommand {
    event: MembershipEvent,
    reply: oneshot::Sender<Result<(), LfdError>>,
}

fn link_closed() -> LfdError {
    LfdError::Io("GFD link closed".to_string())
}

/// Cloneable sender for membership events.
#[derive(Clone)]
pub struct GfdHandle {
    tx: mpsc::UnboundedSender<GfdCommand>,
}

impl GfdHandle {
    /// Write an event to the GFD, waiting for the write to complete.
    ///
    /// Fails with `LfdError::Io` if the write fails or an earlier write
    /// already broke the link.
    pub async fn send(&self, event: MembershipEvent) -> Result<(), LfdError> {
        let (reply, result) = oneshot::channel();
        self.tx
            .send(GfdCommand { event, reply })
            .map_err(|_| link_closed())?;
        result.await.map_err(|_| link_closed())?
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The registered connection to the GFD.
pub struct GfdLink {
    handle: GfdHandle,
    /// Never polled; held so the socket stays fully open
    _read: OwnedReadHalf,
    writer_task: Option<JoinHandle<()>>,
}

impl GfdLink {
    /// Dial the GFD and wait for it to assign our ID.
    pub async fn register(
        addr: &str,
        heartbeat_interval: Duration,
    ) -> Result<(Self, LfdIdentity), LfdError> {
        info!("Connecting to GFD at {}", addr);

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| LfdError::Connection {
                addr: addr.to_string(),
                source,
            })?;

        let (mut read, write) = stream.into_split();
        let data = read_message(&mut read, "LFD ID from GFD").await?;
        let id = LfdId::from_registration(&data)?;

        info!("Received LFD ID: {}", id);

        let (tx, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(async move {
            Self::write_loop(write, rx).await;
        });

        let link = Self {
            handle: GfdHandle { tx },
            _read: read,
            writer_task: Some(writer_task),
        };
        let identity = LfdIdentity {
            id,
            heartbeat_interval,
        };

        Ok((link, identity))
    }

    /// Handle for reporting events from other tasks.
    pub fn handle(&self) -> GfdHandle {
        self.handle.clone()
    }

    /// Write loop: one event at a time, stop on the first failure.
    async fn write_loop(mut write: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<GfdCommand>) {
        while let Some(GfdCommand { event, reply }) = rx.recv().await {
            let result = write
                .write_all(&event.encode())
                .await
                .map_err(|e| LfdError::io("Failed to write to GFD", e));

            let failed = result.is_err();
            match &result {
                Ok(()) => debug!("Sent '{}' to GFD", event),
                Err(e) => error!("GFD has crashed! Could not send '{}': {}", event, e),
            }

            let _ = reply.send(result);
            if failed {
                break;
            }
        }
        // Dropping `rx` here fails every queued and future send with "GFD link closed"
    }
}

impl Drop for GfdLink {
    fn drop(&mut self) {
        if let Some(task) = self.writer_task.take() {
            task.abort();
        }
    }
}
