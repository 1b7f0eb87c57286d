//! WebSocket message and close-status types.

use crate::error::{Error, Result};
use crate::protocol::frame::MAX_CONTROL_FRAME_PAYLOAD;

/// WebSocket close status code.
///
/// The named variants are the codes this engine sends and understands;
/// everything else round-trips through [`CloseCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Going away (1001). Endpoint is shutting down or navigating away.
    GoingAway,
    /// Protocol error (1002). Peer violated the framing rules.
    ProtocolError,
    /// Payload not accepted (1003). Data type the endpoint cannot handle.
    PayloadNotAccepted,
    /// Frame too large (1004). Frame or message exceeded a size bound.
    FrameTooLarge,
    /// No status present (1005). Synthetic; never appears on the wire.
    NoStatus,
    /// Abnormal closure (1006). Synthetic; never appears on the wire.
    Abnormal,
    /// Invalid UTF-8 in a text message (1007).
    InvalidUtf8,
    /// Any other code, including the private-use ranges 3000-4999.
    Other(u16),
}

impl CloseCode {
    /// Create a `CloseCode` from its numeric value.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::PayloadNotAccepted,
            1004 => CloseCode::FrameTooLarge,
            1005 => CloseCode::NoStatus,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::InvalidUtf8,
            other => CloseCode::Other(other),
        }
    }

    /// Get the numeric value of this close code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::PayloadNotAccepted => 1003,
            CloseCode::FrameTooLarge => 1004,
            CloseCode::NoStatus => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidUtf8 => 1007,
            CloseCode::Other(code) => *code,
        }
    }

    /// Whether this code may be placed in an outbound close frame.
    ///
    /// Valid codes are the defined protocol codes 1000-1004 and 1007 plus
    /// the private-use ranges 3000-3999 and 4000-4999.
    #[must_use]
    pub const fn is_sendable(&self) -> bool {
        let code = self.as_u16();
        matches!(code, 1000..=1004 | 1007 | 3000..=4999)
    }

    /// Synthetic codes signal "no code present" (1005) and "abnormal
    /// closure" (1006) locally and must never appear on the wire.
    #[must_use]
    pub const fn is_synthetic(&self) -> bool {
        matches!(self.as_u16(), 1005 | 1006)
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Close status carried by a close frame: optional code, optional reason.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloseStatus {
    /// The close status code, if the payload carried one.
    pub code: Option<u16>,
    /// UTF-8 reason string, if present and decodable.
    pub reason: Option<String>,
}

impl CloseStatus {
    /// Parse the payload of a received close frame.
    ///
    /// An empty payload yields no code and no reason. A 1-byte payload is
    /// malformed but non-fatal and also yields neither. With 2 or more
    /// bytes the first two are the big-endian code; any remainder is
    /// attempted as a UTF-8 reason, and a decode failure degrades to no
    /// reason rather than an error.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Self {
        if payload.len() < 2 {
            return Self::default();
        }
        let code = u16::from_be_bytes([payload[0], payload[1]]);
        let reason = if payload.len() > 2 {
            std::str::from_utf8(&payload[2..]).ok().map(str::to_owned)
        } else {
            None
        };
        Self {
            code: Some(code),
            reason,
        }
    }

    /// Build the payload of an outbound close frame.
    ///
    /// # Errors
    ///
    /// - [`Error::ReasonWithoutCode`] if a reason is given without a code.
    /// - [`Error::InvalidCloseCode`] if the code is not sendable.
    /// - [`Error::ControlPayloadTooLarge`] if code plus reason exceed 125 bytes.
    ///
    /// These are caller contract violations, not peer-recoverable errors.
    pub fn to_payload(code: Option<u16>, reason: Option<&str>) -> Result<Vec<u8>> {
        let Some(code) = code else {
            if reason.is_some() {
                return Err(Error::ReasonWithoutCode);
            }
            return Ok(Vec::new());
        };

        if !CloseCode::from_u16(code).is_sendable() {
            return Err(Error::InvalidCloseCode(code));
        }

        let mut payload = code.to_be_bytes().to_vec();
        if let Some(reason) = reason {
            payload.extend_from_slice(reason.as_bytes());
        }
        if payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlPayloadTooLarge(payload.len()));
        }
        Ok(payload)
    }
}

/// A complete data message, reassembled from one or more frames.
///
/// Text payloads are UTF-8 by convention but are delivered as raw bytes;
/// this engine does not validate them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Message {
    /// A text message.
    Text(Vec<u8>),
    /// A binary message.
    Binary(Vec<u8>),
}

impl Message {
    /// Returns `true` if this is a binary message.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    /// Borrow the payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Text(data) | Message::Binary(data) => data,
        }
    }

    /// Take ownership of the payload bytes.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Message::Text(data) | Message::Binary(data) => data,
        }
    }
}
