//! lfd: Local fault detector.
//!
//! Registers with the Global Fault Detector, heartbeats every server that
//! connects, and reports joins and crashes to the GFD.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lfd_core::{HandshakePolicy, LfdConfig};
use lfd_daemon::LocalFaultDetector;

#[derive(Parser, Debug)]
#[command(name = "lfd")]
#[command(about = "Local fault detector for monitored servers")]
struct Args {
    /// Seconds between heartbeats
    heartbeat_interval: Option<u64>,

    /// Host running the global fault detector
    gfd_host: Option<String>,

    /// Port of the global fault detector
    #[arg(long)]
    gfd_port: Option<u16>,

    /// Address to listen on for server connections
    #[arg(short, long)]
    listen: Option<String>,

    /// JSON config file (flags override its values)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// What a malformed server handshake does: "strict" halts, "isolated" drops the connection
    #[arg(long)]
    handshake_policy: Option<HandshakePolicy>,

    /// Declare a server crashed after this many intervals without hearing from it
    #[arg(long)]
    liveness_missed: Option<u32>,

    /// Maximum number of servers supervised at once
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Args {
    /// Build the effective configuration: file (or defaults), then flags.
    fn into_config(self) -> Result<LfdConfig> {
        let mut config = match &self.config {
            Some(path) => LfdConfig::load(path)?,
            None => LfdConfig::default(),
        };

        if let Some(secs) = self.heartbeat_interval {
            config.heartbeat_interval_secs = secs;
        }
        if let Some(host) = self.gfd_host {
            config.gfd_host = host;
        }
        if let Some(port) = self.gfd_port {
            config.gfd_port = port;
        }
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(policy) = self.handshake_policy {
            config.handshake_policy = policy;
        }
        if self.liveness_missed.is_some() {
            config.liveness_missed_intervals = self.liveness_missed;
        }
        if self.max_sessions.is_some() {
            config.max_sessions = self.max_sessions;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,lfd=debug,lfd_daemon=debug,lfd_core=debug"
    } else {
        "info,lfd=info,lfd_daemon=info,lfd_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("---------- Local Fault Detector Started ----------");

    let config = args.into_config()?;
    info!("Heartbeat interval: {}s", config.heartbeat_interval_secs);
    info!("GFD address: {}", config.gfd_addr());

    let detector = LocalFaultDetector::start(&config)
        .await
        .context("Failed to start local fault detector")?;

    detector.run().await.context("Dispatch loop halted")?;

    info!("Shutting down");
    Ok(())
}
