//! Error types for the WebSocket protocol engine.
//!
//! Errors fall into three severity classes: handshake rejections (answered
//! with an HTTP error status), protocol violations during an open
//! connection (answered with a close frame), and fatal usage errors that
//! indicate a bug in the engine or its caller rather than bad peer input.

use thiserror::Error;

use crate::message::CloseCode;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while driving a WebSocket connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Request line did not have exactly three space-separated tokens.
    #[error("malformed HTTP request line: {0:?}")]
    MalformedRequestLine(String),

    /// HTTP method other than GET.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// HTTP version other than 1.1.
    #[error("unsupported HTTP version: {0}")]
    UnsupportedHttpVersion(String),

    /// A required handshake header was absent.
    #[error("missing HTTP header: {0}")]
    MissingHeader(&'static str),

    /// A handshake header was present but carried an unacceptable value.
    #[error("invalid value for HTTP header {header}: {reason}")]
    InvalidHeaderValue {
        /// Header the value belongs to.
        header: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// Sec-WebSocket-Version parsed but is below the supported range.
    #[error("unsupported WebSocket version {0} (need >= 8)")]
    UnsupportedWebSocketVersion(u32),

    /// Sec-WebSocket-Key was not a well-formed 16-byte base64 token.
    #[error("invalid Sec-WebSocket-Key encoding: {0:?}")]
    InvalidKeyEncoding(String),

    /// The connect-authorization callback declined the connection.
    #[error("handshake rejected by application: {code} {reason}")]
    HandshakeRejected {
        /// HTTP status code to answer with.
        code: u16,
        /// HTTP reason phrase to answer with.
        reason: String,
    },

    /// Buffered handshake data exceeded the configured maximum.
    #[error("handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes buffered so far.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Reserved bits set without a negotiated extension.
    #[error("reserved bits set (rsv={0}) without negotiated extension")]
    ReservedBitsSet(u8),

    /// Client-to-server frame arrived unmasked.
    #[error("unmasked client-to-server frame")]
    UnmaskedFrame,

    /// Control frame with FIN clear.
    #[error("fragmented control frame")]
    FragmentedControlFrame,

    /// Control frame payload above 125 bytes.
    #[error("control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Frame used an opcode reserved for future use.
    #[error("reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Continuation frame arrived with no message in progress.
    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,

    /// New data frame arrived while a fragmented message was in progress.
    #[error("expected continuation frame, got a new data frame")]
    ExpectedContinuation,

    /// Reassembled message exceeded the configured maximum.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Size the message would reach.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Frame payload exceeded the configured maximum.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Declared payload length.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A single message was split into too many fragments.
    #[error("too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Fragments seen so far.
        count: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Close code outside the set valid for sending.
    #[error("invalid close code for outbound close frame: {0}")]
    InvalidCloseCode(u16),

    /// Close reason supplied without a close code.
    #[error("close reason given without a close code")]
    ReasonWithoutCode,

    /// Outbound control frame payload exceeded the 125-byte limit.
    #[error("outbound control payload too large: {0} bytes (max: 125)")]
    ControlPayloadTooLarge(usize),

    /// Outbound payload length does not fit the 63-bit wire encoding.
    #[error("payload length {0} does not fit the frame length encoding")]
    PayloadTooLarge(u64),

    /// Operation invoked in a connection state that does not permit it.
    #[error("invalid connection state for {0}")]
    InvalidState(&'static str),
}

impl Error {
    /// Whether this error is a peer protocol violation, answered on the
    /// wire with a close frame rather than torn down as a local bug.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::ReservedBitsSet(_)
                | Error::UnmaskedFrame
                | Error::FragmentedControlFrame
                | Error::ControlFrameTooLarge(_)
                | Error::ReservedOpcode(_)
                | Error::UnexpectedContinuation
                | Error::ExpectedContinuation
                | Error::MessageTooLarge { .. }
                | Error::FrameTooLarge { .. }
                | Error::TooManyFragments { .. }
        )
    }

    /// Whether this error belongs to the handshake-rejection class.
    #[must_use]
    pub const fn is_handshake_failure(&self) -> bool {
        self.http_status().is_some()
    }

    /// Fatal errors originate locally (engine or caller bug) and abort the
    /// connection without any wire-level answer.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidCloseCode(_)
                | Error::ReasonWithoutCode
                | Error::ControlPayloadTooLarge(_)
                | Error::PayloadTooLarge(_)
                | Error::InvalidState(_)
        )
    }

    /// Close code to answer a protocol violation with.
    ///
    /// Size-limit overruns use the frame-too-large code; everything else in
    /// the violation class is a plain protocol error.
    #[must_use]
    pub const fn close_code(&self) -> Option<CloseCode> {
        match self {
            Error::MessageTooLarge { .. }
            | Error::FrameTooLarge { .. }
            | Error::TooManyFragments { .. } => Some(CloseCode::FrameTooLarge),
            _ => {
                if self.is_protocol_violation() {
                    Some(CloseCode::ProtocolError)
                } else {
                    None
                }
            }
        }
    }

    /// HTTP status code to answer a failed handshake with.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Error::MalformedRequestLine(_)
            | Error::UnsupportedMethod(_)
            | Error::UnsupportedHttpVersion(_)
            | Error::MissingHeader(_)
            | Error::InvalidHeaderValue { .. }
            | Error::UnsupportedWebSocketVersion(_)
            | Error::InvalidKeyEncoding(_)
            | Error::HandshakeTooLarge { .. } => Some(400),
            Error::HandshakeRejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}
