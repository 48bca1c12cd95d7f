//! Typed application messages carried as Transport payloads.
//!
//! Encoded as UTF-8 JSON: `{"type": "<TYPE>", "payload": {...}}`. Keys and
//! type names are case-sensitive. An unknown `type` string fails to decode;
//! the caller (see `session.rs`) turns that into an `ERROR` reply rather
//! than treating it as a different message shape.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A typed application message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Message {
    /// Client/server identity and protocol version exchange.
    #[serde(rename = "HELLO")]
    Hello {
        client_id: String,
        version: String,
    },

    /// Proposed (client) or echoed (server) application mode.
    #[serde(rename = "MODE_SELECT")]
    ModeSelect { mode: String },

    /// In-band AES-128 key delivery, base64-encoded, sent in cleartext.
    #[serde(rename = "KEY_EXCHANGE")]
    KeyExchange { key: String },

    /// User-level chat/data message.
    #[serde(rename = "MSG")]
    Msg { text: String, sender: String },

    /// Best-effort application-level acknowledgment of a `MSG`.
    #[serde(rename = "ACK_MSG")]
    AckMsg {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        msg_id: Option<String>,
    },

    /// Protocol-level error report.
    #[serde(rename = "ERROR")]
    Error { code: String, detail: String },

    /// Graceful session teardown request.
    #[serde(rename = "BYE")]
    Bye {},
}

impl Message {
    /// Convenience constructor for an `ERROR` message with the taxonomy
    /// codes from spec §7 (`MODE_MISMATCH`, `CRYPTO`, `PROTOCOL`).
    pub fn error(code: &str, detail: impl Into<String>) -> Self {
        Message::Error {
            code: code.to_string(),
            detail: detail.into(),
        }
    }

    /// Serializes the message to its UTF-8 JSON wire form.
    pub fn encode(&self) -> Vec<u8> {
        // A `Message` is always representable in JSON; the only failure
        // modes of `serde_json::to_vec` are I/O-backed writers, which this
        // in-memory `Vec` sink never hits.
        serde_json::to_vec(self).expect("Message always serializes")
    }

    /// Decodes a message from its UTF-8 JSON wire form. Any malformed JSON
    /// or unrecognized `type` is reported as [`Error::MessageInvalid`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|_| Error::MessageInvalid)
    }
}
