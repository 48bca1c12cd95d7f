//! Runtime configuration for the transport, carrier, and session layers.
//!
//! Mirrors the "configuration recognized by the core" list in the spec:
//! retransmit timeout and retry count, initial sequence number policy, the
//! HTTPS carrier's poll interval and queue bound, and the negotiated mode.

use std::time::Duration;

/// Negotiated application mode. Determines both the carrier substrate and
/// whether AES-128-CBC encryption is applied to application payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Raw UDP carrier, no encryption.
    Default,
    /// Raw UDP carrier, AES-128-CBC encryption after key exchange.
    Secure,
    /// HTTPS-tunneled carrier, no encryption.
    Obfs,
    /// HTTPS-tunneled carrier, AES-128-CBC encryption after key exchange.
    SecureObfs,
}

impl Mode {
    /// The wire name used in `MODE_SELECT`/`MODE_SELECT` echo payloads.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Mode::Default => "default",
            Mode::Secure => "secure",
            Mode::Obfs => "obfs",
            Mode::SecureObfs => "secure_obfs",
        }
    }

    /// Parses a mode name as accepted on the wire. Unknown names are not a
    /// `Mode` (the caller turns that into a `ModeMismatch`/`MessageInvalid`
    /// as appropriate, the same way an unknown message `type` is handled).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Mode::Default),
            "secure" => Some(Mode::Secure),
            "obfs" => Some(Mode::Obfs),
            "secure_obfs" => Some(Mode::SecureObfs),
            _ => None,
        }
    }

    /// True for the two modes that require a key exchange before `READY`.
    pub const fn is_encrypted(&self) -> bool {
        matches!(self, Mode::Secure | Mode::SecureObfs)
    }

    /// True for the two modes that tunnel over HTTPS rather than raw UDP.
    pub const fn is_obfuscated(&self) -> bool {
        matches!(self, Mode::Obfs | Mode::SecureObfs)
    }
}

/// Initial sequence number policy for a Transport endpoint.
///
/// Both are valid per spec §9 open question 4; receivers must not assume
/// zero regardless of which policy the peer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialSeq {
    /// Deterministic zero, useful for reproducible tests.
    Zero,
    /// A random 32-bit value drawn fresh per connection attempt.
    Random,
}

impl InitialSeq {
    /// Resolves the policy to a concrete sequence number.
    pub fn resolve(&self) -> u32 {
        match self {
            InitialSeq::Zero => 0,
            InitialSeq::Random => rand::random(),
        }
    }
}

/// Aggregate configuration for a Transport endpoint and its carrier.
#[derive(Debug, Clone)]
pub struct Config {
    /// Retransmission timeout `T`. Default 2s.
    pub timeout: Duration,

    /// Maximum retransmissions `R` before `TransportUnreliable`. Default 5.
    pub max_retries: u32,

    /// Initial sequence number policy.
    pub initial_seq: InitialSeq,

    /// HTTPS carrier poll interval. Must be ≤ `timeout / 4`. Default 100ms.
    pub https_poll_interval: Duration,

    /// HTTPS carrier per-client inbox/outbox bound. Default 64.
    pub https_queue_limit: usize,

    /// Negotiated application mode.
    pub mode: Mode,
}

impl Config {
    /// Creates a configuration with spec-default values and `Mode::Default`.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            max_retries: 5,
            initial_seq: InitialSeq::Zero,
            https_poll_interval: Duration::from_millis(100),
            https_queue_limit: 64,
            mode: Mode::Default,
        }
    }

    /// Sets the retransmission timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum retransmission count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the initial sequence number policy.
    pub fn with_initial_seq(mut self, initial_seq: InitialSeq) -> Self {
        self.initial_seq = initial_seq;
        self
    }

    /// Sets the HTTPS carrier poll interval.
    pub fn with_https_poll_interval(mut self, interval: Duration) -> Self {
        self.https_poll_interval = interval;
        self
    }

    /// Sets the HTTPS carrier's per-client queue bound.
    pub fn with_https_queue_limit(mut self, limit: usize) -> Self {
        self.https_queue_limit = limit;
        self
    }

    /// Sets the negotiated mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// True if the HTTPS poll interval respects the `T/4` upper bound from
    /// spec §4.3/§6.
    pub fn https_poll_interval_valid(&self) -> bool {
        self.https_poll_interval <= self.timeout / 4
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_through_wire_names() {
        for m in [Mode::Default, Mode::Secure, Mode::Obfs, Mode::SecureObfs] {
            assert_eq!(Mode::parse(m.as_str()), Some(m));
        }
        assert_eq!(Mode::parse("bogus"), None);
    }

    #[test]
    fn default_poll_interval_respects_quarter_timeout_bound() {
        let config = Config::default();
        assert!(config.https_poll_interval_valid());
    }

    #[test]
    fn zero_initial_seq_is_deterministic() {
        assert_eq!(InitialSeq::Zero.resolve(), 0);
        assert_eq!(InitialSeq::Zero.resolve(), 0);
    }
}
