//! Connection lifecycle states.

/// WebSocket connection state.
///
/// A connection starts in `Connecting` (handshake in progress), moves to
/// `Open` when the upgrade response is emitted, optionally passes through
/// `Closing` while the close handshake is in flight, and ends `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Handshake in progress; only HTTP bytes are expected.
    #[default]
    Connecting,
    /// Handshake complete; frames flow in both directions.
    Open,
    /// A close frame has been sent; waiting for the peer's close.
    Closing,
    /// Connection is finished; no further processing happens.
    Closed,
}

impl ConnectionState {
    /// Whether data messages and pings/pongs may be sent.
    #[inline]
    #[must_use]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Whether a close frame may be sent (initiating or completing the
    /// close handshake).
    #[inline]
    #[must_use]
    pub const fn can_send_close(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Closing)
    }

    /// Whether inbound bytes are still meaningful in this state.
    #[inline]
    #[must_use]
    pub const fn can_receive(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Open => "Open",
            ConnectionState::Closing => "Closing",
            ConnectionState::Closed => "Closed",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        assert_eq!(ConnectionState::default(), ConnectionState::Connecting);
    }

    #[test]
    fn test_can_send() {
        assert!(!ConnectionState::Connecting.can_send());
        assert!(ConnectionState::Open.can_send());
        assert!(!ConnectionState::Closing.can_send());
        assert!(!ConnectionState::Closed.can_send());
    }

    #[test]
    fn test_can_send_close() {
        assert!(!ConnectionState::Connecting.can_send_close());
        assert!(ConnectionState::Open.can_send_close());
        assert!(ConnectionState::Closing.can_send_close());
        assert!(!ConnectionState::Closed.can_send_close());
    }

    #[test]
    fn test_can_receive() {
        assert!(ConnectionState::Connecting.can_receive());
        assert!(ConnectionState::Open.can_receive());
        assert!(ConnectionState::Closing.can_receive());
        assert!(!ConnectionState::Closed.can_receive());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Open.to_string(), "Open");
        assert_eq!(ConnectionState::Closing.to_string(), "Closing");
    }
}
