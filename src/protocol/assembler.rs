//! Reassembly of fragmented messages (RFC 6455 section 5.4).

use bytes::BytesMut;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{Frame, OpCode};

/// Accumulates data-frame payloads until a terminating FIN frame completes
/// the message.
///
/// A fragmentation run opens with a text or binary frame and is continued
/// only by continuation frames; both directions of that rule are enforced
/// as protocol violations. Control frames never pass through here.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    opcode: Option<OpCode>,
    fragment_count: usize,
    config: Config,
}

impl MessageAssembler {
    /// Create an assembler with the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            buffer: BytesMut::new(),
            opcode: None,
            fragment_count: 0,
            config,
        }
    }

    /// Feed one decoded data frame.
    ///
    /// Returns `Ok(Some(message))` when the frame's FIN bit completes a
    /// message; the buffered run is cleared atomically at that point.
    ///
    /// # Errors
    ///
    /// - [`Error::UnexpectedContinuation`] for a continuation frame with no
    ///   message in progress.
    /// - [`Error::ExpectedContinuation`] for a text/binary frame while a
    ///   message is in progress.
    /// - [`Error::TooManyFragments`] / [`Error::MessageTooLarge`] when the
    ///   configured limits are exceeded.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        if frame.opcode == OpCode::Continuation {
            if self.opcode.is_none() {
                return Err(Error::UnexpectedContinuation);
            }
        } else {
            if self.opcode.is_some() {
                return Err(Error::ExpectedContinuation);
            }
            self.opcode = Some(frame.opcode);
        }

        self.config
            .limits
            .check_fragment_count(self.fragment_count + 1)?;
        self.config
            .limits
            .check_message_size(self.buffer.len() + frame.payload.len())?;

        self.buffer.extend_from_slice(&frame.payload);
        self.fragment_count += 1;

        if frame.fin {
            let payload = self.buffer.split().to_vec();
            let opcode = self.opcode.take().unwrap_or(OpCode::Binary);
            self.fragment_count = 0;
            let message = match opcode {
                OpCode::Binary => Message::Binary(payload),
                _ => Message::Text(payload),
            };
            Ok(Some(message))
        } else {
            Ok(None)
        }
    }

    /// Whether a fragmented message is currently in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Discard any in-progress run.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.opcode = None;
        self.fragment_count = 0;
    }
}
