//! Stop-and-Wait ARQ engine: one outstanding `DATA` frame per direction at a
//! time, acknowledged-or-retransmitted up to `Config::max_retries`, over any
//! [`Carrier`].
//!
//! A [`Transport`] owns exactly one peer for its whole lifetime: the
//! three-way handshake (`SYN` / `SYN|ACK` / `ACK`) pins the remote address on
//! first contact, and every frame from a different peer is ignored rather
//! than mixed into this connection's sequence space.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::carrier::{Carrier, PeerAddr};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameFlags};

/// Connection lifecycle state, mirroring the handshake/teardown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    SynSent,
    SynRcvd,
    Established,
    FinSent,
}

/// Frame-level counters. Exposed for diagnostics and tests; not part of the
/// wire protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub retransmissions: u64,
    pub acks_sent: u64,
    pub acks_received: u64,
    pub frames_dropped_corrupt: u64,
    pub frames_dropped_duplicate: u64,
    pub frames_dropped_out_of_window: u64,
    pub sends_failed: u64,
}

/// A single reliable, ordered, single-peer connection over a [`Carrier`].
pub struct Transport<C: Carrier> {
    carrier: C,
    peer: PeerAddr,
    config: Config,
    state: ConnectionState,
    stats: TransportStats,
    next_seq: u32,
    expected_remote_seq: u32,
    inbox: VecDeque<Vec<u8>>,
}

impl<C: Carrier> Transport<C> {
    /// Active open: sends `SYN`, retries up to `config.max_retries` times
    /// until a matching `SYN|ACK` arrives, then completes the handshake
    /// with a final `ACK`.
    pub async fn connect(mut carrier: C, peer: PeerAddr, config: Config) -> Result<Self> {
        let local_seq = config.initial_seq.resolve();
        let target_ack = local_seq.wrapping_add(1);
        let syn = Frame::syn(local_seq).encode();

        let mut attempt = 0u32;
        loop {
            carrier.send(&syn, &peer).await?;

            match carrier.recv(config.timeout).await {
                Ok((bytes, from)) if from == peer => {
                    if let Ok(frame) = Frame::decode(&bytes) {
                        if frame.flags.contains(FrameFlags::SYN | FrameFlags::ACK)
                            && frame.ack == target_ack
                        {
                            let remote_seq = frame.seq;
                            let ack = Frame::new(FrameFlags::ACK, 0, remote_seq.wrapping_add(1), Vec::new());
                            carrier.send(&ack.encode(), &peer).await?;
                            return Ok(Self {
                                carrier,
                                peer,
                                config,
                                state: ConnectionState::Established,
                                stats: TransportStats::default(),
                                next_seq: target_ack,
                                expected_remote_seq: remote_seq.wrapping_add(1),
                                inbox: VecDeque::new(),
                            });
                        }
                    }
                }
                Ok(_) => {}
                Err(Error::Timeout) => {}
                Err(e) => return Err(e),
            }

            attempt += 1;
            if attempt > config.max_retries {
                return Err(Error::TransportUnreliable);
            }
        }
    }

    /// Passive open: blocks indefinitely (in `config.timeout`-sized slices)
    /// until a `SYN` arrives, then retries `SYN|ACK` up to
    /// `config.max_retries` times until the final `ACK` arrives.
    pub async fn accept(mut carrier: C, config: Config) -> Result<Self> {
        let (peer, remote_seq) = loop {
            match carrier.recv(config.timeout).await {
                Ok((bytes, from)) => {
                    if let Ok(frame) = Frame::decode(&bytes) {
                        if frame.flags.contains(FrameFlags::SYN) && !frame.flags.contains(FrameFlags::ACK) {
                            break (from, frame.seq);
                        }
                    }
                }
                Err(Error::Timeout) => continue,
                Err(e) => return Err(e),
            }
        };

        let local_seq = config.initial_seq.resolve();
        let target_ack = local_seq.wrapping_add(1);
        let syn_ack = Frame::syn_ack(local_seq, remote_seq.wrapping_add(1)).encode();

        let mut attempt = 0u32;
        loop {
            carrier.send(&syn_ack, &peer).await?;

            match carrier.recv(config.timeout).await {
                Ok((bytes, from)) if from == peer => {
                    if let Ok(frame) = Frame::decode(&bytes) {
                        if frame.flags.contains(FrameFlags::ACK)
                            && !frame.flags.contains(FrameFlags::SYN)
                            && frame.ack == target_ack
                        {
                            return Ok(Self {
                                carrier,
                                peer,
                                config,
                                state: ConnectionState::Established,
                                stats: TransportStats::default(),
                                next_seq: target_ack,
                                expected_remote_seq: remote_seq.wrapping_add(1),
                                inbox: VecDeque::new(),
                            });
                        }
                    }
                }
                Ok(_) => {}
                Err(Error::Timeout) => {}
                Err(e) => return Err(e),
            }

            attempt += 1;
            if attempt > config.max_retries {
                return Err(Error::TransportUnreliable);
            }
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The configuration this endpoint was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The peer this endpoint is bound to.
    pub fn peer(&self) -> &PeerAddr {
        &self.peer
    }

    /// Frame-level counters accumulated so far.
    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    /// Sends one payload reliably: retransmits the same `DATA` frame up to
    /// `config.max_retries` times until the matching `ACK` arrives. While
    /// waiting, inbound `DATA` frames from the peer are acknowledged and
    /// buffered for a later [`Transport::recv`] rather than discarded —
    /// both directions share the same connection and may be in flight at
    /// once.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.state != ConnectionState::Established {
            return Err(Error::InvalidState);
        }
        if payload.len() > crate::frame::MAX_PAYLOAD_SIZE {
            return Err(Error::FrameInvalid);
        }

        let frame = Frame::data(self.next_seq, self.expected_remote_seq, payload.to_vec());
        let encoded = frame.encode();
        let target_ack = self.next_seq.wrapping_add(1);

        let mut attempt = 0u32;
        loop {
            self.carrier.send(&encoded, &self.peer).await?;
            self.stats.frames_sent += 1;
            if attempt > 0 {
                self.stats.retransmissions += 1;
            }

            let deadline = Instant::now() + self.config.timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }

                match self.carrier.recv(remaining).await {
                    Ok((bytes, from)) if from == self.peer => {
                        let Ok(incoming) = Frame::decode(&bytes) else {
                            self.stats.frames_dropped_corrupt += 1;
                            continue;
                        };

                        if incoming.flags.contains(FrameFlags::FIN) {
                            self.handle_peer_fin(incoming).await?;
                            return Err(Error::CarrierClosed);
                        }

                        if incoming.flags.contains(FrameFlags::ACK) && incoming.ack == target_ack {
                            self.stats.acks_received += 1;
                            self.next_seq = target_ack;
                            return Ok(());
                        }

                        if incoming.flags.contains(FrameFlags::DATA) {
                            self.handle_inbound_data(incoming).await?;
                        }
                    }
                    Ok(_) => {}
                    Err(Error::Timeout) => break,
                    Err(e) => return Err(e),
                }
            }

            attempt += 1;
            if attempt > self.config.max_retries {
                self.stats.sends_failed += 1;
                log::warn!(
                    "seq={} to {:?} unacknowledged after {} attempts, giving up",
                    frame.seq,
                    self.peer,
                    attempt
                );
                return Err(Error::TransportUnreliable);
            }
            log::debug!("retransmitting seq={} to {:?}, attempt {}", frame.seq, self.peer, attempt);
        }
    }

    /// Waits up to `timeout` for the next in-order payload from the peer.
    /// Returns [`Error::CarrierClosed`] once the peer's `FIN` has been
    /// processed.
    pub async fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        if self.state == ConnectionState::Closed {
            return Err(Error::CarrierClosed);
        }
        if let Some(payload) = self.inbox.pop_front() {
            return Ok(payload);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }

            match self.carrier.recv(remaining).await {
                Ok((bytes, from)) if from == self.peer => {
                    let Ok(frame) = Frame::decode(&bytes) else {
                        self.stats.frames_dropped_corrupt += 1;
                        continue;
                    };

                    if frame.flags.contains(FrameFlags::FIN) {
                        self.handle_peer_fin(frame).await?;
                        return Err(Error::CarrierClosed);
                    }

                    if frame.flags.contains(FrameFlags::DATA) {
                        self.handle_inbound_data(frame).await?;
                        if let Some(payload) = self.inbox.pop_front() {
                            return Ok(payload);
                        }
                        continue;
                    }
                    // Stray ACK/control frame with no outstanding send on
                    // our side to match it against; ignore and keep waiting.
                }
                Ok(_) => {}
                Err(Error::Timeout) => return Err(Error::Timeout),
                Err(e) => return Err(e),
            }
        }
    }

    /// Active close: sends `FIN`, retries up to `config.max_retries` times
    /// until the peer's `ACK` arrives, then releases the carrier.
    pub async fn close(mut self) -> Result<()> {
        if self.state != ConnectionState::Established {
            self.carrier.close().await?;
            return Ok(());
        }

        self.state = ConnectionState::FinSent;
        let fin = Frame::fin(self.next_seq).encode();
        let target_ack = self.next_seq.wrapping_add(1);

        let mut attempt = 0u32;
        let result = loop {
            if self.carrier.send(&fin, &self.peer).await.is_err() {
                break Err(Error::TransportUnreliable);
            }

            match self.carrier.recv(self.config.timeout).await {
                Ok((bytes, from)) if from == self.peer => {
                    if let Ok(frame) = Frame::decode(&bytes) {
                        if frame.flags.contains(FrameFlags::ACK) && frame.ack == target_ack {
                            break Ok(());
                        }
                    }
                }
                Ok(_) => {}
                Err(Error::Timeout) => {}
                Err(_) => break Err(Error::TransportUnreliable),
            }

            attempt += 1;
            if attempt > self.config.max_retries {
                break Err(Error::TransportUnreliable);
            }
        };

        self.state = ConnectionState::Closed;
        self.carrier.close().await?;
        result
    }

    async fn handle_inbound_data(&mut self, frame: Frame) -> Result<()> {
        self.stats.frames_received += 1;

        if frame.seq == self.expected_remote_seq {
            self.expected_remote_seq = self.expected_remote_seq.wrapping_add(1);
            self.inbox.push_back(frame.payload);
        } else if frame.seq == self.expected_remote_seq.wrapping_sub(1) {
            // Retransmission of the frame we already delivered and ACKed;
            // re-ACK it without a second delivery.
            self.stats.frames_dropped_duplicate += 1;
        } else {
            // Outside the single-slot window (a stray frame from another
            // connection attempt, or an injected/corrupt sequence number);
            // silently dropped, no ACK at all.
            self.stats.frames_dropped_out_of_window += 1;
            return Ok(());
        }

        let ack = Frame::ack(self.expected_remote_seq);
        self.carrier.send(&ack.encode(), &self.peer).await?;
        self.stats.acks_sent += 1;
        Ok(())
    }

    async fn handle_peer_fin(&mut self, frame: Frame) -> Result<()> {
        let ack = Frame::ack(frame.seq.wrapping_add(1));
        self.carrier.send(&ack.encode(), &self.peer).await?;
        self.state = ConnectionState::Closed;
        Ok(())
    }
}
