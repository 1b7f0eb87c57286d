//! Application callback interface.
//!
//! The engine drives a fixed capability set of callbacks; every one
//! defaults to a no-op so applications implement only what they need.

/// Upgrade-request details handed to [`Handler::on_connect`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectRequest<'a> {
    /// The Host header value.
    pub host: &'a str,
    /// The HTTP request target.
    pub target: &'a str,
    /// The peer origin, if the client sent one.
    pub origin: Option<&'a str>,
    /// Sub-protocols offered by the client, in arrival order.
    pub protocols: &'a [String],
}

/// Application-level refusal of an upgrade request.
///
/// Carries the HTTP status line to answer with before the transport is
/// closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// HTTP status code.
    pub code: u16,
    /// HTTP reason phrase.
    pub reason: String,
}

impl Rejection {
    /// Create a rejection with the given status line.
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Callbacks a connection delivers protocol events through.
///
/// Invocation order per connection: `on_connect` (during the handshake),
/// `on_open` (once the 101 response is queued), then any interleaving of
/// `on_message` / `on_ping` / `on_pong` in frame-arrival order, and
/// finally `on_close` when the peer's close frame arrives. The engine does
/// not answer pings by itself; replying with a pong is the application's
/// choice.
pub trait Handler {
    /// Authorize an upgrade request. Returning a [`Rejection`] answers
    /// with that HTTP status and closes the transport.
    fn on_connect(&mut self, _request: &ConnectRequest<'_>) -> Result<(), Rejection> {
        Ok(())
    }

    /// The handshake completed; messages may be sent from here on.
    fn on_open(&mut self) {}

    /// A complete (possibly reassembled) message arrived.
    fn on_message(&mut self, _payload: &[u8], _binary: bool) {}

    /// A ping frame arrived.
    fn on_ping(&mut self, _payload: &[u8]) {}

    /// A pong frame arrived.
    fn on_pong(&mut self, _payload: &[u8]) {}

    /// The peer's close frame arrived, with whatever status it carried.
    fn on_close(&mut self, _code: Option<u16>, _reason: Option<&str>) {}
}

/// A handler that leaves every callback at its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl Handler for NoopHandler {}
