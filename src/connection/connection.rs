//! The per-connection protocol engine.
//!
//! `Connection` is sans-IO: the transport feeds it inbound byte chunks
//! through [`Connection::receive_data`] and drains outbound bytes through
//! [`Connection::take_output`]. Nothing here blocks; incomplete input is
//! simply left buffered until the next chunk arrives. One connection is
//! owned by exactly one task at a time and carries no internal
//! synchronization.

use bytes::BytesMut;

use crate::config::Config;
use crate::connection::handler::{ConnectRequest, Handler};
use crate::connection::state::ConnectionState;
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseStatus};
use crate::protocol::handshake::{self, HandshakeRequest, HttpRequestHead};
use crate::protocol::{
    Frame, FrameDecoder, MAX_CONTROL_FRAME_PAYLOAD, MessageAssembler, OpCode,
};

/// Request metadata captured during a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// The Host header value.
    pub host: String,
    /// The HTTP request target.
    pub target: String,
    /// The peer origin, if sent.
    pub origin: Option<String>,
    /// Sub-protocols the client offered, in arrival order.
    pub offered_protocols: Vec<String>,
    /// The sub-protocol echoed in the 101 response, if any was offered.
    pub negotiated_protocol: Option<String>,
    /// The Sec-WebSocket-Version the client announced.
    pub websocket_version: u32,
}

/// Server-side WebSocket connection engine.
///
/// Lifecycle: created in `Connecting` when the transport accepts a
/// connection; the handshake runs on inbound bytes until it completes
/// (`Open`) or fails (`Closed`, with an HTTP error response queued); once
/// open, inbound bytes are decoded into frames and dispatched to the
/// [`Handler`]; the close handshake passes through `Closing` and ends in
/// `Closed`.
///
/// After any failure the queued output (HTTP error response or close
/// frame) must still be written to the transport before tearing it down;
/// [`Connection::should_close`] reports when teardown is expected.
#[derive(Debug)]
pub struct Connection<H: Handler> {
    handler: H,
    config: Config,
    state: ConnectionState,
    input: BytesMut,
    output: Vec<u8>,
    decoder: FrameDecoder,
    assembler: MessageAssembler,
    info: Option<ConnectionInfo>,
    /// Set after a protocol violation: the close frame is queued and all
    /// further inbound bytes are discarded.
    aborted: bool,
    should_close: bool,
}

impl<H: Handler> Connection<H> {
    /// Create a connection in the `Connecting` state with default
    /// configuration.
    #[must_use]
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, Config::new())
    }

    /// Create a connection with an explicit configuration.
    #[must_use]
    pub fn with_config(handler: H, config: Config) -> Self {
        Self {
            handler,
            state: ConnectionState::Connecting,
            input: BytesMut::new(),
            output: Vec::new(),
            decoder: FrameDecoder::new(config.clone()),
            assembler: MessageAssembler::new(config.clone()),
            config,
            info: None,
            aborted: false,
            should_close: false,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Handshake metadata, available once the connection is open.
    #[must_use]
    pub fn info(&self) -> Option<&ConnectionInfo> {
        self.info.as_ref()
    }

    /// Borrow the application handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutably borrow the application handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Whether outbound bytes are waiting for the transport.
    #[must_use]
    pub fn has_output(&self) -> bool {
        !self.output.is_empty()
    }

    /// Drain the bytes queued for the transport to write.
    #[must_use]
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Whether the engine expects the transport to be torn down once the
    /// queued output has been flushed.
    #[must_use]
    pub fn should_close(&self) -> bool {
        self.should_close
    }

    /// Ingest one inbound chunk from the transport.
    ///
    /// Chunks may split headers, frames and messages at arbitrary byte
    /// boundaries; whatever cannot be consumed yet stays buffered.
    ///
    /// # Errors
    ///
    /// - Handshake-class errors after the HTTP error response has been
    ///   queued; flush the output, then close the transport.
    /// - Protocol violations after the 1002/1004 close frame has been
    ///   queued; same flushing contract.
    /// - [`Error::InvalidState`] if called after the connection reached
    ///   `Closed` — the transport-close event should have superseded any
    ///   delivery, so this is a driver bug.
    pub fn receive_data(&mut self, data: &[u8]) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(Error::InvalidState("receive_data"));
        }
        if self.aborted {
            // Already answered a violation with a close frame; the rest of
            // the stream is unparseable noise.
            return Ok(());
        }

        #[cfg(feature = "logging")]
        log::trace!("received {} bytes in state {}", data.len(), self.state);

        self.input.extend_from_slice(data);

        if self.state == ConnectionState::Connecting {
            self.process_handshake()
        } else {
            self.process_frames()
        }
    }

    /// The transport reports the connection is gone. Buffered state is
    /// released; no callback is synthesized.
    pub fn connection_lost(&mut self) {
        #[cfg(feature = "logging")]
        log::debug!("connection lost in state {}", self.state);

        self.state = ConnectionState::Closed;
        self.input = BytesMut::new();
        self.output = Vec::new();
        self.decoder.reset();
        self.assembler.reset();
        self.should_close = false;
    }

    /// Queue a data message.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] unless the connection is `Open`.
    pub fn send_message(&mut self, payload: &[u8], binary: bool) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::InvalidState("send_message"));
        }
        let frame = if binary {
            Frame::binary(payload.to_vec())
        } else {
            Frame::text(payload.to_vec())
        };
        frame.encode(&mut self.output)
    }

    /// Queue a ping frame.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] unless `Open`;
    /// [`Error::ControlPayloadTooLarge`] above 125 payload bytes.
    pub fn send_ping(&mut self, payload: &[u8]) -> Result<()> {
        self.send_control(OpCode::Ping, payload, "send_ping")
    }

    /// Queue a pong frame.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] unless `Open`;
    /// [`Error::ControlPayloadTooLarge`] above 125 payload bytes.
    pub fn send_pong(&mut self, payload: &[u8]) -> Result<()> {
        self.send_control(OpCode::Pong, payload, "send_pong")
    }

    fn send_control(&mut self, opcode: OpCode, payload: &[u8], op: &'static str) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::InvalidState(op));
        }
        if payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlPayloadTooLarge(payload.len()));
        }
        Frame::new(true, opcode, payload.to_vec()).encode(&mut self.output)
    }

    /// Queue a close frame, initiating (or completing) the close
    /// handshake. When the connection was `Open` it moves to `Closing`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] unless `Open` or `Closing`;
    /// [`Error::InvalidCloseCode`], [`Error::ReasonWithoutCode`] or
    /// [`Error::ControlPayloadTooLarge`] for invalid arguments. All of
    /// these are caller bugs, not recoverable conditions.
    pub fn send_close(&mut self, code: Option<u16>, reason: Option<&str>) -> Result<()> {
        if !self.state.can_send_close() {
            return Err(Error::InvalidState("send_close"));
        }
        let payload = CloseStatus::to_payload(code, reason)?;
        Frame::close(payload).encode(&mut self.output)?;
        if self.state == ConnectionState::Open {
            self.state = ConnectionState::Closing;
        }
        Ok(())
    }

    /// Queue a raw frame without any state or argument checks.
    ///
    /// This deliberately allows frames that are invalid per se or invalid
    /// for the current protocol state; fuzzing drivers built on the engine
    /// use it, together with `claimed_len`, to probe remote receivers with
    /// truncated or padded streams. `claimed_len` overrides the payload
    /// length declared in the header; `None` declares the real length.
    ///
    /// # Errors
    ///
    /// [`Error::PayloadTooLarge`] if the length does not fit the wire
    /// encoding.
    pub fn send_frame(&mut self, frame: &Frame, claimed_len: Option<u64>) -> Result<()> {
        match claimed_len {
            Some(len) => frame.encode_with_claimed_len(&mut self.output, len),
            None => frame.encode(&mut self.output),
        }
    }

    fn process_handshake(&mut self) -> Result<()> {
        if let Err(err) = self
            .config
            .limits
            .check_handshake_size(self.input.len())
        {
            return Err(self.fail_handshake(err));
        }

        let Some(head_end) = handshake::find_head_end(&self.input) else {
            return Ok(());
        };

        // Everything past the terminator stays buffered for the frame
        // phase.
        let head = self.input.split_to(head_end);
        let head = &head[..head_end - 4];

        let request = match HttpRequestHead::parse(head)
            .and_then(|parsed| HandshakeRequest::from_head(&parsed))
        {
            Ok(request) => request,
            Err(err) => return Err(self.fail_handshake(err)),
        };

        let connect = ConnectRequest {
            host: &request.host,
            target: &request.target,
            origin: request.origin.as_deref(),
            protocols: &request.protocols,
        };
        if let Err(rejection) = self.handler.on_connect(&connect) {
            let err = Error::HandshakeRejected {
                code: rejection.code,
                reason: rejection.reason,
            };
            return Err(self.fail_handshake(err));
        }

        let negotiated = request.protocols.first().cloned();
        let accept = handshake::compute_accept_key(&request.key);
        self.output
            .extend_from_slice(&handshake::accept_response(&accept, negotiated.as_deref()));

        #[cfg(feature = "logging")]
        log::debug!(
            "handshake complete for {} {} (version {})",
            request.host,
            request.target,
            request.version
        );

        self.info = Some(ConnectionInfo {
            host: request.host,
            target: request.target,
            origin: request.origin,
            offered_protocols: request.protocols,
            negotiated_protocol: negotiated,
            websocket_version: request.version,
        });
        self.state = ConnectionState::Open;
        self.decoder.reset();
        self.handler.on_open();

        // The client may have pipelined frames behind the request head.
        if self.input.is_empty() {
            Ok(())
        } else {
            self.process_frames()
        }
    }

    /// Answer a failed handshake with an HTTP error response and finish
    /// the connection.
    fn fail_handshake(&mut self, err: Error) -> Error {
        #[cfg(feature = "logging")]
        log::debug!("handshake failed: {err}");

        if let Some(response) = handshake::error_response(&err) {
            self.output.extend_from_slice(&response);
        }
        self.state = ConnectionState::Closed;
        self.should_close = true;
        self.input = BytesMut::new();
        err
    }

    /// Drain the input buffer frame by frame until it is exhausted, holds
    /// only a partial frame, or the connection stops accepting input.
    fn process_frames(&mut self) -> Result<()> {
        loop {
            let frame = match self.decoder.decode(&mut self.input) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(err) => return self.protocol_violation(err),
            };

            #[cfg(feature = "logging")]
            log::trace!(
                "decoded {} frame, fin={}, {} payload bytes",
                frame.opcode,
                frame.fin,
                frame.payload.len()
            );

            if let Err(err) = self.handle_frame(frame) {
                return self.protocol_violation(err);
            }
            if self.state == ConnectionState::Closed {
                // Close handshake finished; trailing bytes are dropped.
                self.input = BytesMut::new();
                return Ok(());
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        match frame.opcode {
            OpCode::Continuation | OpCode::Text | OpCode::Binary => {
                if let Some(message) = self.assembler.push(frame)? {
                    self.handler
                        .on_message(message.payload(), message.is_binary());
                }
                Ok(())
            }
            OpCode::Ping => {
                // Replying with a pong is the application's decision.
                self.handler.on_ping(&frame.payload);
                Ok(())
            }
            OpCode::Pong => {
                self.handler.on_pong(&frame.payload);
                Ok(())
            }
            OpCode::Close => self.close_received(&frame.payload),
        }
    }

    fn close_received(&mut self, payload: &[u8]) -> Result<()> {
        let status = CloseStatus::from_payload(payload);

        #[cfg(feature = "logging")]
        log::debug!(
            "close received, code={:?}, reason={:?}",
            status.code,
            status.reason
        );

        self.handler
            .on_close(status.code, status.reason.as_deref());

        if self.state == ConnectionState::Open {
            // Complete the handshake: echo the peer's code when it is one
            // we are allowed to send, otherwise answer with no code.
            let echo = status
                .code
                .filter(|&code| CloseCode::from_u16(code).is_sendable());
            let payload = CloseStatus::to_payload(echo, None)?;
            Frame::close(payload).encode(&mut self.output)?;
        }
        self.state = ConnectionState::Closed;
        self.should_close = true;
        Ok(())
    }

    /// First protocol violation wins: queue a single close frame, stop
    /// decoding, and discard the rest of the stream.
    fn protocol_violation(&mut self, err: Error) -> Result<()> {
        if !err.is_protocol_violation() {
            return Err(err);
        }

        #[cfg(feature = "logging")]
        log::debug!("protocol violation: {err}");

        let code = err.close_code().map(|code| code.as_u16());
        let payload = CloseStatus::to_payload(code, None)?;
        Frame::close(payload).encode(&mut self.output)?;
        self.state = ConnectionState::Closing;
        self.aborted = true;
        self.should_close = true;
        self.input = BytesMut::new();
        self.decoder.reset();
        self.assembler.reset();
        Err(err)
    }
}
