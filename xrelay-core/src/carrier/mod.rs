//! Carrier abstraction: a bidirectional, datagram-oriented transport of
//! opaque byte frames with a notion of peer address.
//!
//! Two concrete carriers share this contract ([`udp`] and [`https`]); the
//! Transport layer (`transport.rs`) is generic over [`Carrier`] so both
//! substrates drive the identical ARQ engine.

pub mod https;
pub mod udp;

use std::time::Duration;

use crate::error::Result;

/// Peer address as seen by a carrier. A UDP carrier addresses peers by
/// socket address; the HTTPS carrier addresses peers by the client
/// identifier carried in the `X-Client-Id` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PeerAddr {
    /// `(ip, port)` pair for the direct UDP carrier.
    Udp(std::net::SocketAddr),
    /// Stable client identifier for the HTTPS/OBFS carrier.
    Https(String),
}

/// Bidirectional opaque-frame transport. Implementations MUST NOT split or
/// merge frames: one `send` call is delivered as exactly one `recv` call on
/// the other side (or dropped entirely — the substrate is unreliable).
pub trait Carrier {
    /// Enqueues a frame for delivery to `peer`. May fail transiently with
    /// [`crate::error::Error::CarrierUnavailable`].
    async fn send(&mut self, frame: &[u8], peer: &PeerAddr) -> Result<()>;

    /// Blocks for at most `timeout` waiting for one previously sent frame.
    /// Returns [`crate::error::Error::Timeout`] if the deadline elapses
    /// with nothing received, or
    /// [`crate::error::Error::CarrierClosed`] if the carrier has been
    /// closed.
    async fn recv(&mut self, timeout: Duration) -> Result<(Vec<u8>, PeerAddr)>;

    /// Releases any resources held by the carrier.
    async fn close(&mut self) -> Result<()>;
}
