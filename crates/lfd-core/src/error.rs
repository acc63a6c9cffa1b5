//! Error taxonomy for the fault detector.
//!
//! Three failure classes matter at runtime:
//! - `Connection`: dialing the GFD failed
//! - `Io`: a read or write failed on an established connection
//! - `Protocol`: a peer sent a payload we could not parse

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LfdError {
    #[error("Connection to {addr} failed: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl LfdError {
    /// Wrap an I/O error with a short description of what was being done.
    pub fn io(context: &str, err: std::io::Error) -> Self {
        LfdError::Io(format!("{}: {}", context, err))
    }
}

impl From<std::io::Error> for LfdError {
    fn from(err: std::io::Error) -> Self {
        LfdError::Io(err.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid numeric ID: {payload:?}")]
    InvalidId { payload: String },

    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("Empty payload")]
    Empty,

    #[error("Invalid membership event: {payload:?}")]
    InvalidEvent { payload: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Heartbeat interval must be at least one second")]
    ZeroInterval,

    #[error("Heartbeat interval must be at most {max} seconds")]
    IntervalTooLarge { max: u64 },

    #[error("max_sessions must be greater than zero")]
    ZeroMaxSessions,

    #[error("liveness_missed_intervals must be greater than zero")]
    ZeroMissedIntervals,
}

pub type Result<T> = std::result::Result<T, LfdError>;
