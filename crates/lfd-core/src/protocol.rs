//! Plain-text wire messages.
//!
//! Every message is a single unframed write; the receiver treats one read
//! (of at most `MAX_MESSAGE_SIZE` bytes) as one logical message:
//! - GFD → LFD registration reply: `"<lfdId>"`
//! - Server → LFD handshake: `"<serverId>"`
//! - LFD → server heartbeat: `"LFD<lfdId> heartbeat"`
//! - LFD → GFD membership event: `"<serverId>,add"` / `"<serverId>,remove"`

use crate::error::ProtocolError;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

/// Largest payload read as a single message (handshakes, registration).
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Parse a decimal ID, tolerating surrounding whitespace (e.g. a trailing newline).
fn parse_id(s: &str) -> Result<u64, ProtocolError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::Empty);
    }
    trimmed.parse::<u64>().map_err(|_| ProtocolError::InvalidId {
        payload: s.to_string(),
    })
}

/// Decode a raw payload into text.
pub fn payload_text(data: &[u8]) -> Result<&str, ProtocolError> {
    std::str::from_utf8(data).map_err(|_| ProtocolError::InvalidUtf8)
}

/// Numeric ID a monitored server announces in its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(u64);

impl ServerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Parse a server handshake payload.
    pub fn from_handshake(data: &[u8]) -> Result<Self, ProtocolError> {
        payload_text(data)?.parse()
    }
}

impl Display for ServerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ServerId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_id(s).map(Self)
    }
}

/// Numeric ID the GFD assigns to this detector at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LfdId(u64);

impl LfdId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Parse the GFD's registration reply.
    pub fn from_registration(data: &[u8]) -> Result<Self, ProtocolError> {
        payload_text(data)?.parse()
    }
}

impl Display for LfdId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LfdId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_id(s).map(Self)
    }
}

/// Identity of this detector for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LfdIdentity {
    /// Assigned by the GFD
    pub id: LfdId,
    /// Local start-up parameter
    pub heartbeat_interval: Duration,
}

/// Heartbeat payload sent to every monitored server.
pub fn heartbeat_payload(lfd_id: LfdId) -> String {
    format!("LFD{} heartbeat", lfd_id)
}

/// Kind of membership change reported to the GFD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Join,
    Leave,
}

impl EventKind {
    fn as_wire(&self) -> &'static str {
        match self {
            EventKind::Join => "add",
            EventKind::Leave => "remove",
        }
    }
}

/// A membership change for one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipEvent {
    pub server_id: ServerId,
    pub kind: EventKind,
}

impl MembershipEvent {
    pub fn join(server_id: ServerId) -> Self {
        Self {
            server_id,
            kind: EventKind::Join,
        }
    }

    pub fn leave(server_id: ServerId) -> Self {
        Self {
            server_id,
            kind: EventKind::Leave,
        }
    }

    /// Serialize to the GFD wire format.
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parse a GFD wire message.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let text = payload_text(data)?.trim();
        let invalid = || ProtocolError::InvalidEvent {
            payload: text.to_string(),
        };

        let (id, kind) = text.split_once(',').ok_or_else(invalid)?;
        let kind = match kind {
            "add" => EventKind::Join,
            "remove" => EventKind::Leave,
            _ => return Err(invalid()),
        };
        let server_id: ServerId = id.parse().map_err(|_| invalid())?;

        Ok(Self { server_id, kind })
    }
}

impl Display for MembershipEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.server_id, self.kind.as_wire())
    }
}
