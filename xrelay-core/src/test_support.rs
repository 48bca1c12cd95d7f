//! In-memory mock [`Carrier`] shared by `transport`'s and `session`'s unit
//! tests. Loss is simulated deterministically (by attempt count) rather than
//! with randomness, so every test is reproducible without real delays —
//! tests pair this with `#[tokio::test(start_paused = true)]`.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::carrier::{Carrier, PeerAddr};
use crate::error::{Error, Result};

pub(crate) struct MockCarrier {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    remote: PeerAddr,
    pub(crate) send_count: usize,
    pub(crate) drop_on_attempts: Vec<usize>,
    closed: bool,
}

impl MockCarrier {
    pub(crate) fn pair(peer_a: PeerAddr, peer_b: PeerAddr) -> (Self, Self) {
        let (tx_ab, rx_ab) = mpsc::unbounded_channel();
        let (tx_ba, rx_ba) = mpsc::unbounded_channel();
        (
            Self {
                tx: tx_ab,
                rx: rx_ba,
                remote: peer_b,
                send_count: 0,
                drop_on_attempts: Vec::new(),
                closed: false,
            },
            Self {
                tx: tx_ba,
                rx: rx_ab,
                remote: peer_a,
                send_count: 0,
                drop_on_attempts: Vec::new(),
                closed: false,
            },
        )
    }
}

impl Carrier for MockCarrier {
    async fn send(&mut self, frame: &[u8], _peer: &PeerAddr) -> Result<()> {
        if self.closed {
            return Err(Error::CarrierClosed);
        }
        self.send_count += 1;
        if self.drop_on_attempts.contains(&self.send_count) {
            return Ok(());
        }
        self.tx.send(frame.to_vec()).map_err(|_| Error::CarrierUnavailable)
    }

    async fn recv(&mut self, timeout: Duration) -> Result<(Vec<u8>, PeerAddr)> {
        if self.closed {
            return Err(Error::CarrierClosed);
        }
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(bytes)) => Ok((bytes, self.remote.clone())),
            Ok(None) => Err(Error::CarrierClosed),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

pub(crate) fn addr(tag: &str) -> PeerAddr {
    PeerAddr::Https(tag.to_string())
}
