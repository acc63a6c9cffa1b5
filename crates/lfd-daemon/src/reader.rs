//! Server inbound reader.
//!
//! Drains whatever a monitored server sends back and logs it. Ending
//! (EOF or read error) is not a crash signal on its own; the supervisor
//! decides liveness. Each payload is published as activity for the
//! optional liveness deadline.

use lfd_core::{ServerId, MAX_MESSAGE_SIZE};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct InboundReader {
    server_id: ServerId,
    read: OwnedReadHalf,
    activity: watch::Sender<Instant>,
}

impl InboundReader {
    pub fn new(server_id: ServerId, read: OwnedReadHalf, activity: watch::Sender<Instant>) -> Self {
        Self {
            server_id,
            read,
            activity,
        }
    }

    /// Read until the connection ends. Returns the number of payloads seen.
    pub async fn run(mut self) -> u64 {
        let mut buf = vec![0u8; MAX_MESSAGE_SIZE];
        let mut received = 0u64;

        loop {
            match self.read.read(&mut buf).await {
                Ok(0) => {
                    debug!("Server {} closed its side of the connection", self.server_id);
                    break;
                }
                Ok(n) => {
                    received += 1;
                    self.activity.send_replace(Instant::now());
                    info!(
                        "Received {} from server {}",
                        String::from_utf8_lossy(&buf[..n]).trim_end(),
                        self.server_id
                    );
                }
                Err(e) => {
                    warn!("Error reading from server {}: {}", self.server_id, e);
                    break;
                }
            }
        }

        received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_reader_counts_payloads_and_records_activity() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut server = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let (read, _write) = stream.into_split();

        let start = Instant::now();
        let (activity_tx, mut activity_rx) = watch::channel(start);
        let reader = tokio::spawn(InboundReader::new(ServerId::new(1), read, activity_tx).run());

        server.write_all(b"pong").await.unwrap();
        timeout(Duration::from_secs(2), activity_rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(*activity_rx.borrow() >= start);

        drop(server);
        let received = timeout(Duration::from_secs(2), reader).await.unwrap().unwrap();
        assert_eq!(received, 1);
    }
}
