//! Frame definition and wire codec for the transport protocol.
//!
//! # Frame format
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Version    |     Flags     |          Sequence ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      ... Sequence             |       Acknowledgment ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      ... Acknowledgment       |  Payload Length |  Checksum  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  ... Checksum  |                   Payload ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! 14-byte header: `version`(1) `flags`(1) `seq`(4) `ack`(4)
//! `payload_length`(2) `checksum`(2), followed by `payload_length` bytes.

use crate::checksum::InternetChecksum;
use crate::error::{Error, Result};

/// Fixed protocol version this codec speaks.
pub const VERSION: u8 = 0x01;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 14;

/// Nominal maximum payload a carrier is expected to deliver intact.
pub const MAX_PAYLOAD_SIZE: usize = 1400;

/// Frame flag bits. Flags may be combined (e.g. `SYN | ACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// No flags set. Never valid on its own: a well-formed frame has at
    /// least one bit set.
    pub const NONE: Self = Self(0);
    /// Carries application payload.
    pub const DATA: Self = Self(0x01);
    /// Acknowledges a sequence number.
    pub const ACK: Self = Self(0x02);
    /// Connection setup.
    pub const SYN: Self = Self(0x04);
    /// Graceful teardown.
    pub const FIN: Self = Self(0x08);

    /// Builds flags from a raw byte.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw byte.
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// True if every bit in `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Combines two flag sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True if no bit is set.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for FrameFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// A decoded or to-be-encoded transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol version; always [`VERSION`] for frames this crate builds.
    pub version: u8,
    /// Flag bits (see [`FrameFlags`]).
    pub flags: FrameFlags,
    /// Sequence number of this frame (meaningful for `DATA`/`SYN`).
    pub seq: u32,
    /// Acknowledgment number (meaningful for `ACK`/`SYN|ACK`).
    pub ack: u32,
    /// Frame payload. Empty for control frames.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a frame with the given flags, sequence, and ack numbers.
    pub fn new(flags: FrameFlags, seq: u32, ack: u32, payload: Vec<u8>) -> Self {
        Self {
            version: VERSION,
            flags,
            seq,
            ack,
            payload,
        }
    }

    /// Builds a `DATA` frame.
    pub fn data(seq: u32, ack: u32, payload: Vec<u8>) -> Self {
        Self::new(FrameFlags::DATA, seq, ack, payload)
    }

    /// Builds a standalone `ACK` frame.
    pub fn ack(ack: u32) -> Self {
        Self::new(FrameFlags::ACK, 0, ack, Vec::new())
    }

    /// Builds a `SYN` frame (connection initiator).
    pub fn syn(seq: u32) -> Self {
        Self::new(FrameFlags::SYN, seq, 0, Vec::new())
    }

    /// Builds a `SYN|ACK` frame (connection responder).
    pub fn syn_ack(seq: u32, ack: u32) -> Self {
        Self::new(FrameFlags::SYN | FrameFlags::ACK, seq, ack, Vec::new())
    }

    /// Builds a `FIN` frame.
    pub fn fin(seq: u32) -> Self {
        Self::new(FrameFlags::FIN, seq, 0, Vec::new())
    }

    /// Total wire size of this frame once encoded.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encodes the frame to its wire representation, computing the
    /// checksum over the header (with the checksum field zeroed) and the
    /// payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.wire_size()];

        buf[0] = self.version;
        buf[1] = self.flags.bits();
        buf[2..6].copy_from_slice(&self.seq.to_be_bytes());
        buf[6..10].copy_from_slice(&self.ack.to_be_bytes());
        buf[10..12].copy_from_slice(&(self.payload.len() as u16).to_be_bytes());
        buf[12..14].copy_from_slice(&0u16.to_be_bytes());
        buf[HEADER_SIZE..].copy_from_slice(&self.payload);

        let checksum = InternetChecksum::compute_slices(&[&buf[0..12], &[0, 0], &self.payload]);
        buf[12..14].copy_from_slice(&checksum.to_be_bytes());

        buf
    }

    /// Decodes a frame from its wire representation, verifying version,
    /// flags, declared payload length, and checksum. Any failure is
    /// reported uniformly as [`Error::FrameInvalid`] — the Transport layer
    /// treats this the same as a dropped frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::FrameInvalid);
        }

        let version = bytes[0];
        if version != VERSION {
            return Err(Error::FrameInvalid);
        }

        let flags = FrameFlags::from_bits(bytes[1]);
        if flags.is_empty() {
            return Err(Error::FrameInvalid);
        }

        let seq = u32::from_be_bytes(bytes[2..6].try_into().unwrap());
        let ack = u32::from_be_bytes(bytes[6..10].try_into().unwrap());
        let payload_length = u16::from_be_bytes(bytes[10..12].try_into().unwrap()) as usize;
        let checksum = u16::from_be_bytes(bytes[12..14].try_into().unwrap());

        if payload_length != bytes.len() - HEADER_SIZE {
            return Err(Error::FrameInvalid);
        }

        let payload = &bytes[HEADER_SIZE..];
        let computed = InternetChecksum::compute_slices(&[&bytes[0..12], &[0, 0], payload]);
        if computed != checksum {
            return Err(Error::FrameInvalid);
        }

        Ok(Self {
            version,
            flags,
            seq,
            ack,
            payload: payload.to_vec(),
        })
    }
}
