//! lfd-core: Transport-free building blocks of the Local Fault Detector.
//!
//! This crate provides:
//! - Identifiers and plain-text wire messages exchanged with the GFD and servers
//! - The per-session heartbeat state machine (Join/Leave exactly once)
//! - An optional liveness deadline tracker
//! - Configuration types and the error taxonomy
//!
//! Nothing here touches a socket; `lfd-daemon` drives these types over TCP.

pub mod config;
pub mod error;
pub mod heartbeat;
pub mod liveness;
pub mod protocol;

pub use config::{HandshakePolicy, LfdConfig};
pub use error::{ConfigError, LfdError, ProtocolError};
pub use heartbeat::{HeartbeatSession, HeartbeatState, TerminationCause};
pub use liveness::{LivenessDeadline, LivenessTracker};
pub use protocol::{
    heartbeat_payload, EventKind, LfdId, LfdIdentity, MembershipEvent, ServerId, MAX_MESSAGE_SIZE,
};
