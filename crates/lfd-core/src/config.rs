//! Detector configuration.
//!
//! Loaded from an optional JSON file; every field has a default so a
//! partial file (or none at all) is valid. Command-line flags are applied
//! on top by the binary.

use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::liveness::LivenessDeadline;

/// What to do when a server's handshake cannot be read or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandshakePolicy {
    /// A bad handshake halts the dispatch loop (and the process)
    #[default]
    Strict,
    /// A bad handshake drops only that connection
    Isolated,
}

impl Display for HandshakePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HandshakePolicy::Strict => write!(f, "strict"),
            HandshakePolicy::Isolated => write!(f, "isolated"),
        }
    }
}

impl FromStr for HandshakePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(HandshakePolicy::Strict),
            "isolated" => Ok(HandshakePolicy::Isolated),
            other => Err(format!(
                "unknown handshake policy '{}' (expected 'strict' or 'isolated')",
                other
            )),
        }
    }
}

/// Main configuration for the local fault detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LfdConfig {
    /// Seconds between heartbeats (default: 1)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Host running the GFD
    #[serde(default = "default_gfd_host")]
    pub gfd_host: String,

    /// Port the GFD listens on (default: 8000)
    #[serde(default = "default_gfd_port")]
    pub gfd_port: u16,

    /// Address servers connect to (default: 0.0.0.0:8081)
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub handshake_policy: HandshakePolicy,

    /// Declare a server dead after this many silent intervals (None = disabled)
    #[serde(default)]
    pub liveness_missed_intervals: Option<u32>,

    /// Cap on concurrently supervised servers (None = unbounded)
    #[serde(default)]
    pub max_sessions: Option<usize>,
}

/// Upper bound on the heartbeat interval (one day).
pub const MAX_HEARTBEAT_INTERVAL_SECS: u64 = 24 * 60 * 60;

fn default_heartbeat_interval() -> u64 {
    1
}

fn default_gfd_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gfd_port() -> u16 {
    8000
}

fn default_listen_addr() -> String {
    "0.0.0.0:8081".to_string()
}

impl Default for LfdConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            gfd_host: default_gfd_host(),
            gfd_port: default_gfd_port(),
            listen_addr: default_listen_addr(),
            handshake_policy: HandshakePolicy::default(),
            liveness_missed_intervals: None,
            max_sessions: None,
        }
    }
}

impl LfdConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: LfdConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Reject values the detector cannot run with.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.heartbeat_interval_secs > MAX_HEARTBEAT_INTERVAL_SECS {
            return Err(ConfigError::IntervalTooLarge {
                max: MAX_HEARTBEAT_INTERVAL_SECS,
            });
        }
        if self.max_sessions == Some(0) {
            return Err(ConfigError::ZeroMaxSessions);
        }
        if self.liveness_missed_intervals == Some(0) {
            return Err(ConfigError::ZeroMissedIntervals);
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// `host:port` of the GFD.
    pub fn gfd_addr(&self) -> String {
        format!("{}:{}", self.gfd_host, self.gfd_port)
    }

    pub fn liveness_deadline(&self) -> Option<LivenessDeadline> {
        self.liveness_missed_intervals
            .map(|k| LivenessDeadline::new(self.heartbeat_interval(), k))
    }
}
