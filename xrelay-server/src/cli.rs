//! Command-line flags for the xrelay server.

use std::time::Duration;

use clap::Parser;
use xrelay_core::Mode;

#[derive(Parser, Debug)]
#[command(name = "xrelay-server", about = "Accepts one xrelay client and echoes its MSG lines back as ACK_MSG")]
pub struct Cli {
    /// Address to bind. For --carrier udp this is the UDP socket address;
    /// for --carrier https this is the HTTP listener address.
    #[arg(long, default_value = "0.0.0.0:9000")]
    pub bind: String,

    /// Carrier substrate to serve.
    #[arg(long, value_parser = ["udp", "https"], default_value = "udp")]
    pub carrier: String,

    /// Application mode this server requires of connecting clients.
    #[arg(long, value_parser = parse_mode, default_value = "default")]
    pub mode: Mode,

    /// Server identity sent in HELLO.
    #[arg(long, default_value = "xrelay-server")]
    pub id: String,

    /// Retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    pub timeout_ms: u64,

    /// Maximum retransmissions before giving up.
    #[arg(long, default_value_t = 5)]
    pub max_retries: u32,

    /// HTTPS carrier per-client inbox/outbox bound.
    #[arg(long, default_value_t = 64)]
    pub queue_limit: usize,
}

impl Cli {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn parse_mode(raw: &str) -> Result<Mode, String> {
    Mode::parse(raw).ok_or_else(|| format!("unknown mode '{raw}' (expected default, secure, obfs, or secure_obfs)"))
}
