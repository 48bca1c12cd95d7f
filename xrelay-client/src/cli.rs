//! Command-line flags for the xrelay client.

use std::time::Duration;

use clap::Parser;
use xrelay_core::Mode;

#[derive(Parser, Debug)]
#[command(name = "xrelay-client", about = "Connects to an xrelay server and exchanges MSG lines from stdin")]
pub struct Cli {
    /// Local address to bind the UDP carrier to. Ignored for --carrier https.
    #[arg(long, default_value = "0.0.0.0:0")]
    pub bind: String,

    /// Peer address. For --carrier udp this is `host:port`; for
    /// --carrier https this is a base URL such as `http://host:port`.
    #[arg(long)]
    pub peer: String,

    /// Carrier substrate to use.
    #[arg(long, value_parser = ["udp", "https"], default_value = "udp")]
    pub carrier: String,

    /// Application mode to negotiate.
    #[arg(long, value_parser = parse_mode, default_value = "default")]
    pub mode: Mode,

    /// Client identity sent in HELLO.
    #[arg(long, default_value = "xrelay-client")]
    pub id: String,

    /// Retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    pub timeout_ms: u64,

    /// Maximum retransmissions before giving up.
    #[arg(long, default_value_t = 5)]
    pub max_retries: u32,

    /// HTTPS carrier poll interval in milliseconds.
    #[arg(long, default_value_t = 100)]
    pub poll_interval_ms: u64,
}

impl Cli {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_mode(raw: &str) -> Result<Mode, String> {
    Mode::parse(raw).ok_or_else(|| format!("unknown mode '{raw}' (expected default, secure, obfs, or secure_obfs)"))
}
