//! lfd-daemon library: Exposes the detector's components for testing.
//!
//! The binary (`lfd`) is a thin wrapper over `LocalFaultDetector`;
//! integration tests drive the same pieces against loopback sockets.

pub mod connection;
pub mod detector;
pub mod dispatch;
pub mod gfd;
pub mod listener;
pub mod reader;
pub mod session;
pub mod supervisor;

// Re-export key types for convenience
pub use connection::{read_message, read_server_handshake, AcceptedConnection};
pub use detector::LocalFaultDetector;
pub use dispatch::Dispatcher;
pub use gfd::{GfdHandle, GfdLink};
pub use listener::RegistryListener;
pub use session::{spawn_session, ServerSession, SessionContext};
