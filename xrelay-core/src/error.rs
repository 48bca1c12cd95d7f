//! Error types shared across every layer of the stack.
//!
//! Transport-level failures (a dropped or corrupt frame, a lapsed timer) are
//! recovered internally and never reach this enum's callers directly; only
//! exhaustion or an explicit protocol violation is surfaced (see the
//! propagation policy in the crate's top-level docs).

use std::fmt;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the transport, carrier, crypto, and session layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Frame failed version/flags/length/checksum validation. Treated
    /// identically to a dropped frame by the Transport layer.
    FrameInvalid,

    /// No ACK arrived for the in-flight frame within the retransmit timeout.
    Timeout,

    /// Maximum retransmissions exceeded without a matching ACK.
    TransportUnreliable,

    /// The carrier substrate failed transiently (e.g. socket send error).
    CarrierUnavailable,

    /// The carrier has been closed and can no longer send or receive.
    CarrierClosed,

    /// Ciphertext did not unpad cleanly under PKCS#7.
    PaddingError,

    /// Ciphertext failed to decrypt or unpad (corruption or wrong key).
    DecryptError,

    /// An application message could not be decoded.
    MessageInvalid,

    /// Client and server requested different modes at `MODE_SELECT`.
    ModeMismatch,

    /// The caller-initiated shutdown flag was observed; any in-flight
    /// retransmission loop aborts without completing.
    Cancelled,

    /// Operation is not valid in the current connection/session state.
    InvalidState,
}

impl Error {
    /// Returns a human-readable description of the error.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Error::FrameInvalid => "invalid frame",
            Error::Timeout => "timeout waiting for acknowledgment",
            Error::TransportUnreliable => "retransmissions exhausted",
            Error::CarrierUnavailable => "carrier temporarily unavailable",
            Error::CarrierClosed => "carrier closed",
            Error::PaddingError => "PKCS#7 padding invalid",
            Error::DecryptError => "decryption failed",
            Error::MessageInvalid => "invalid application message",
            Error::ModeMismatch => "mode mismatch",
            Error::Cancelled => "operation cancelled",
            Error::InvalidState => "invalid state for this operation",
        }
    }

    /// The `ERROR` message code this error surfaces as at the application
    /// layer, per §7's propagation policy. Not every variant reaches the
    /// session layer (most are absorbed by Transport); those that do map
    /// onto one of the codes named in spec §7/§4.7.
    pub const fn app_code(&self) -> &'static str {
        match self {
            Error::ModeMismatch => "MODE_MISMATCH",
            Error::PaddingError | Error::DecryptError => "CRYPTO",
            _ => "PROTOCOL",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for Error {}
