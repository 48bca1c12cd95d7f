//! Direct UDP carrier: one UDP socket, `send` is a single `sendto`, `recv`
//! is a single `recvfrom` bounded by timeout.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::carrier::{Carrier, PeerAddr};
use crate::error::{Error, Result};
use crate::frame::MAX_PAYLOAD_SIZE;

/// Raw UDP carrier.
pub struct UdpCarrier {
    socket: UdpSocket,
    closed: bool,
}

impl UdpCarrier {
    /// Binds a UDP socket at `local_addr`.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local_addr)
            .await
            .map_err(|_| Error::CarrierUnavailable)?;
        log::debug!("UDP carrier bound to {}", socket.local_addr().map_or(local_addr, |a| a));
        Ok(Self {
            socket,
            closed: false,
        })
    }

    /// The local address this carrier is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(|_| Error::CarrierUnavailable)
    }
}

impl Carrier for UdpCarrier {
    async fn send(&mut self, frame: &[u8], peer: &PeerAddr) -> Result<()> {
        if self.closed {
            return Err(Error::CarrierClosed);
        }
        let PeerAddr::Udp(addr) = peer else {
            return Err(Error::CarrierUnavailable);
        };

        self.socket
            .send_to(frame, addr)
            .await
            .map_err(|_| Error::CarrierUnavailable)?;
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<(Vec<u8>, PeerAddr)> {
        if self.closed {
            return Err(Error::CarrierClosed);
        }

        let mut buf = [0u8; MAX_PAYLOAD_SIZE + 64];
        match tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((n, from))) => Ok((buf[..n].to_vec(), PeerAddr::Udp(from))),
            Ok(Err(_)) => Err(Error::CarrierUnavailable),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
