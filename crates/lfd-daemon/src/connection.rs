//! Raw TCP message helpers.
//!
//! Peers send unframed payloads; one `read` of up to `MAX_MESSAGE_SIZE`
//! bytes is taken as one logical message.

use lfd_core::{LfdError, ServerId, MAX_MESSAGE_SIZE};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::session::ServerSession;

/// A server connection fresh off the accept loop, handshake not yet read.
#[derive(Debug)]
pub struct AcceptedConnection {
    pub stream: TcpStream,
    pub addr: SocketAddr,
}

/// Read a single message.
///
/// A closed connection (zero-byte read) is reported as an I/O error since the
/// peer went away before saying anything.
pub async fn read_message<R>(reader: &mut R, what: &str) -> Result<Vec<u8>, LfdError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; MAX_MESSAGE_SIZE];
    let n = reader
        .read(&mut buf)
        .await
        .map_err(|e| LfdError::io(&format!("Failed to read {}", what), e))?;

    if n == 0 {
        return Err(LfdError::Io(format!(
            "Connection closed before {} was received",
            what
        )));
    }

    buf.truncate(n);
    Ok(buf)
}

/// Read the identity handshake from a newly accepted server connection.
pub async fn read_server_handshake(
    mut conn: AcceptedConnection,
) -> Result<(ServerSession, TcpStream), LfdError> {
    let data = read_message(&mut conn.stream, "server handshake").await?;
    let server_id = ServerId::from_handshake(&data)?;

    debug!("Handshake from {}: server ID {}", conn.addr, server_id);

    Ok((ServerSession::new(server_id, conn.addr), conn.stream))
}
