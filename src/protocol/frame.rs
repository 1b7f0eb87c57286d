//! Frame decoding and encoding (RFC 6455 base framing).
//!
//! Decoding is incremental: data arrives in arbitrary-sized chunks, so the
//! decoder consumes the header and the payload in separate passes and keeps
//! a pending-frame descriptor in between. "Not enough buffered yet" is a
//! normal `Ok(None)` outcome that consumes nothing.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                 Masking key (client-to-server)                |
//! +---------------------------------------------------------------+
//! |                     Payload data                              |
//! +---------------------------------------------------------------+
//! ```

use bytes::{Buf, BytesMut};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask_fast;

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Largest payload length expressible on the wire (signed 63-bit).
const MAX_WIRE_PAYLOAD: u64 = i64::MAX as u64;

/// Parsed frame header, held while the payload is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final-fragment flag.
    pub fin: bool,
    /// The three reserved bits as a 3-bit value. Zero without extensions.
    pub rsv: u8,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key. Always present on the server side; client-to-server
    /// frames are required to be masked.
    pub mask: [u8; 4],
    /// Declared payload length in bytes.
    pub payload_len: usize,
}

/// One decoded (or to-be-encoded) WebSocket frame.
///
/// Inbound frames carry their payload already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final-fragment flag.
    pub fin: bool,
    /// Reserved bits, 0..=7. Zero unless an extension defines them.
    pub rsv: u8,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame with explicit flags.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv: 0,
            opcode,
            payload,
        }
    }

    /// Create a final text frame.
    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    /// Create a final binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Binary, data.into())
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    /// Create a close frame from an already-built close payload.
    #[must_use]
    pub fn close(payload: Vec<u8>) -> Self {
        Self::new(true, OpCode::Close, payload)
    }

    /// Serialize this frame for the server-to-client direction.
    ///
    /// Outgoing frames are never masked. The payload length picks the
    /// shortest wire encoding: inline up to 125, 16-bit up to 65535,
    /// 64-bit beyond.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] if the length does not fit the
    /// 63-bit wire encoding.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        self.encode_with_claimed_len(buf, self.payload.len() as u64)
    }

    /// Serialize with an explicit claimed payload length.
    ///
    /// The header declares `claimed_len` while the actual payload bytes are
    /// written unchanged. Streams built this way are intentionally
    /// malformed when the two disagree; the override exists to probe remote
    /// receivers with truncated or padded streams and has no place in the
    /// normal send path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] if `claimed_len` exceeds the
    /// 63-bit wire encoding.
    pub fn encode_with_claimed_len(&self, buf: &mut Vec<u8>, claimed_len: u64) -> Result<()> {
        let byte0 = (u8::from(self.fin) << 7) | ((self.rsv % 8) << 4) | (self.opcode.as_u8() % 128);
        buf.push(byte0);

        // Mask bit stays clear: servers never mask outgoing frames.
        if claimed_len <= 125 {
            buf.push(claimed_len as u8);
        } else if claimed_len <= u64::from(u16::MAX) {
            buf.push(126);
            buf.extend_from_slice(&(claimed_len as u16).to_be_bytes());
        } else if claimed_len <= MAX_WIRE_PAYLOAD {
            buf.push(127);
            buf.extend_from_slice(&claimed_len.to_be_bytes());
        } else {
            return Err(Error::PayloadTooLarge(claimed_len));
        }

        buf.extend_from_slice(&self.payload);
        Ok(())
    }
}

/// Incremental frame decoder for the server role.
///
/// Owns the pending-frame descriptor between the header pass and the
/// payload pass. All header-level protocol checks happen here; a returned
/// violation means the connection must stop decoding.
#[derive(Debug)]
pub struct FrameDecoder {
    pending: Option<FrameHeader>,
    config: Config,
}

impl FrameDecoder {
    /// Create a decoder with the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            pending: None,
            config,
        }
    }

    /// Whether a frame header has been consumed but its payload is still
    /// incomplete.
    #[must_use]
    pub fn has_pending_frame(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop any half-decoded frame state.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Attempt to decode one frame from `buf`.
    ///
    /// Returns `Ok(Some(frame))` and consumes the frame's bytes when a
    /// complete frame is buffered; `Ok(None)` without consuming anything
    /// when more data is needed. Call in a loop until it yields `None` to
    /// drain back-to-back frames from a single data event.
    ///
    /// # Errors
    ///
    /// Protocol violations: [`Error::ReservedBitsSet`],
    /// [`Error::UnmaskedFrame`], [`Error::FragmentedControlFrame`],
    /// [`Error::ControlFrameTooLarge`], [`Error::ReservedOpcode`],
    /// [`Error::FrameTooLarge`].
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        if self.pending.is_none() {
            match self.decode_header(buf)? {
                Some(header) => self.pending = Some(header),
                None => return Ok(None),
            }
        }

        // Payload pass; may run on a later data event than the header pass.
        let Some(header) = self.pending else {
            return Ok(None);
        };
        if buf.len() < header.payload_len {
            return Ok(None);
        }

        let mut payload = buf.split_to(header.payload_len).to_vec();
        apply_mask_fast(&mut payload, header.mask);
        self.pending = None;

        Ok(Some(Frame {
            fin: header.fin,
            rsv: header.rsv,
            opcode: header.opcode,
            payload,
        }))
    }

    /// Header pass: validate the first two bytes, then consume the full
    /// header (extended length and mask key) once it is buffered.
    fn decode_header(&self, buf: &mut BytesMut) -> Result<Option<FrameHeader>> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let byte0 = buf[0];
        let byte1 = buf[1];

        let fin = (byte0 & 0x80) != 0;
        let rsv = (byte0 & 0x70) >> 4;
        let opcode_raw = byte0 & 0x0F;
        let masked = (byte1 & 0x80) != 0;
        let len1 = byte1 & 0x7F;

        // MUST be 0 when no extension defining RSV semantics is negotiated.
        if rsv != 0 {
            return Err(Error::ReservedBitsSet(rsv));
        }

        // All client-to-server frames MUST be masked.
        if !masked {
            return Err(Error::UnmaskedFrame);
        }

        if opcode_raw > 7 {
            // Control frames MUST NOT be fragmented and MUST carry at most
            // 125 payload octets.
            if !fin {
                return Err(Error::FragmentedControlFrame);
            }
            if len1 as usize > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(len1 as usize));
            }
        }
        let opcode = OpCode::from_u8(opcode_raw)?;

        let ext_len = match len1 {
            126 => 2,
            127 => 8,
            _ => 0,
        };
        let header_len = 2 + ext_len + 4;
        if buf.len() < header_len {
            return Ok(None);
        }

        let payload_len = match len1 {
            126 => u64::from(u16::from_be_bytes([buf[2], buf[3]])),
            127 => u64::from_be_bytes([
                buf[2], buf[3], buf[4], buf[5], buf[6], buf[7], buf[8], buf[9],
            ]),
            _ => u64::from(len1),
        };
        if payload_len > self.config.limits.max_frame_size as u64 {
            return Err(Error::FrameTooLarge {
                size: payload_len.min(usize::MAX as u64) as usize,
                max: self.config.limits.max_frame_size,
            });
        }
        let payload_len = payload_len as usize;

        let mask_offset = 2 + ext_len;
        let mask = [
            buf[mask_offset],
            buf[mask_offset + 1],
            buf[mask_offset + 2],
            buf[mask_offset + 3],
        ];

        buf.advance(header_len);

        Ok(Some(FrameHeader {
            fin,
            rsv,
            opcode,
            mask,
            payload_len,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mask::apply_mask;

    fn decoder() -> FrameDecoder {
        FrameDecoder::new(Config::new())
    }

    /// Mask a payload and prepend header bytes the way a client would.
    fn client_frame(byte0: u8, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
        let mut data = vec![byte0];
        let len = payload.len();
        if len <= 125 {
            data.push(0x80 | len as u8);
        } else if len <= 65535 {
            data.push(0x80 | 126);
            data.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            data.push(0x80 | 127);
            data.extend_from_slice(&(len as u64).to_be_bytes());
        }
        data.extend_from_slice(&mask);
        let mut masked = payload.to_vec();
        apply_mask(&mut masked, mask);
        data.extend_from_slice(&masked);
        data
    }

    #[test]
    fn test_decode_masked_text_frame() {
        // FIN + text, masked "Hello", the RFC worked example bytes.
        let mut buf = BytesMut::from(
            &[
                0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
            ][..],
        );
        let frame = decoder().decode(&mut buf).unwrap().unwrap();
        assert!(frame.fin);
        assert_eq!(frame.rsv, 0);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload, b"Hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_needs_more_data_consumes_nothing() {
        let mut dec = decoder();

        let mut buf = BytesMut::from(&[0x81][..]);
        assert!(dec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 1);

        // Complete 2-byte prefix but header still short of the mask key.
        let mut buf = BytesMut::from(&[0x81, 0x85, 0x37, 0xfa][..]);
        assert!(dec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 4);
        assert!(!dec.has_pending_frame());
    }

    #[test]
    fn test_decode_header_then_payload_in_two_passes() {
        let mut dec = decoder();
        let data = client_frame(0x82, &[1, 2, 3, 4, 5], [9, 8, 7, 6]);

        // Header only.
        let mut buf = BytesMut::from(&data[..6]);
        assert!(dec.decode(&mut buf).unwrap().is_none());
        assert!(dec.has_pending_frame());
        assert!(buf.is_empty());

        // Partial payload.
        buf.extend_from_slice(&data[6..8]);
        assert!(dec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2);

        // Rest of the payload.
        buf.extend_from_slice(&data[8..]);
        let frame = dec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.opcode, OpCode::Binary);
        assert_eq!(frame.payload, vec![1, 2, 3, 4, 5]);
        assert!(!dec.has_pending_frame());
    }

    #[test]
    fn test_decode_extended_length_16bit() {
        let payload = vec![0xab; 200];
        let data = client_frame(0x82, &payload, [1, 2, 3, 4]);
        assert_eq!(data[1] & 0x7f, 126);

        let mut buf = BytesMut::from(&data[..]);
        let frame = decoder().decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn test_decode_extended_length_64bit() {
        let payload = vec![0xcd; 70000];
        let data = client_frame(0x82, &payload, [1, 2, 3, 4]);
        assert_eq!(data[1] & 0x7f, 127);

        let mut buf = BytesMut::from(&data[..]);
        let frame = decoder().decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.payload.len(), 70000);
    }

    #[test]
    fn test_decode_two_frames_one_buffer() {
        let mut data = client_frame(0x81, b"one", [1, 2, 3, 4]);
        data.extend_from_slice(&client_frame(0x81, b"two", [5, 6, 7, 8]));

        let mut dec = decoder();
        let mut buf = BytesMut::from(&data[..]);
        let first = dec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.payload, b"one");
        let second = dec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.payload, b"two");
        assert!(dec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_nonzero_rsv() {
        // FIN + RSV1 + text.
        let mut buf = BytesMut::from(&client_frame(0xc1, b"x", [1, 2, 3, 4])[..]);
        assert!(matches!(
            decoder().decode(&mut buf),
            Err(Error::ReservedBitsSet(4))
        ));
    }

    #[test]
    fn test_decode_rejects_unmasked_frame() {
        let mut buf = BytesMut::from(&[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f][..]);
        assert!(matches!(
            decoder().decode(&mut buf),
            Err(Error::UnmaskedFrame)
        ));
    }

    #[test]
    fn test_decode_rejects_fragmented_control_frame() {
        // Ping with FIN clear.
        let mut buf = BytesMut::from(&client_frame(0x09, b"hi", [1, 2, 3, 4])[..]);
        assert!(matches!(
            decoder().decode(&mut buf),
            Err(Error::FragmentedControlFrame)
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_control_frame() {
        // Ping with the 16-bit length marker; rejected from the length
        // field alone, regardless of how much payload is buffered.
        let mut buf = BytesMut::from(&[0x89, 0x80 | 126][..]);
        assert!(matches!(
            decoder().decode(&mut buf),
            Err(Error::ControlFrameTooLarge(126))
        ));
    }

    #[test]
    fn test_decode_rejects_reserved_opcodes() {
        for opcode in [0x3u8, 0x7, 0xB, 0xF] {
            let mut buf = BytesMut::from(&client_frame(0x80 | opcode, b"", [1, 2, 3, 4])[..]);
            assert!(
                matches!(decoder().decode(&mut buf), Err(Error::ReservedOpcode(b)) if b == opcode),
                "opcode {opcode:#x}"
            );
        }
    }

    #[test]
    fn test_decode_rejects_frame_above_limit() {
        let config = Config::new().with_limits(crate::config::Limits::new(1024, 64, 128, 8));
        let mut dec = FrameDecoder::new(config);
        let mut buf = BytesMut::from(&client_frame(0x82, &vec![0u8; 65], [1, 2, 3, 4])[..]);
        assert!(matches!(
            dec.decode(&mut buf),
            Err(Error::FrameTooLarge { size: 65, max: 64 })
        ));
    }

    #[test]
    fn test_encode_small_payload() {
        let mut buf = Vec::new();
        Frame::text(b"Hello".to_vec()).encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
    }

    #[test]
    fn test_encode_length_boundaries() {
        // 10 bytes: inline length.
        let mut buf = Vec::new();
        Frame::binary(vec![0u8; 10]).encode(&mut buf).unwrap();
        assert_eq!(buf[1], 10);
        assert_eq!(buf.len(), 2 + 10);

        // 200 bytes: marker 126 + 16-bit length.
        let mut buf = Vec::new();
        Frame::binary(vec![0u8; 200]).encode(&mut buf).unwrap();
        assert_eq!(buf[1], 126);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 200);
        assert_eq!(buf.len(), 4 + 200);

        // 70000 bytes: marker 127 + 64-bit length.
        let mut buf = Vec::new();
        Frame::binary(vec![0u8; 70000]).encode(&mut buf).unwrap();
        assert_eq!(buf[1], 127);
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&buf[2..10]);
        assert_eq!(u64::from_be_bytes(len_bytes), 70000);
        assert_eq!(buf.len(), 10 + 70000);
    }

    #[test]
    fn test_encode_never_sets_mask_bit() {
        let mut buf = Vec::new();
        Frame::binary(vec![0u8; 300]).encode(&mut buf).unwrap();
        assert_eq!(buf[1] & 0x80, 0);
    }

    #[test]
    fn test_encode_nonfinal_fragment() {
        let mut buf = Vec::new();
        Frame::new(false, OpCode::Text, b"He".to_vec())
            .encode(&mut buf)
            .unwrap();
        assert_eq!(buf[0], 0x01);
    }

    #[test]
    fn test_encode_claimed_length_override() {
        // Header claims 10 bytes while only 3 follow.
        let frame = Frame::binary(vec![1, 2, 3]);
        let mut buf = Vec::new();
        frame.encode_with_claimed_len(&mut buf, 10).unwrap();
        assert_eq!(buf[1], 10);
        assert_eq!(buf.len(), 2 + 3);
    }

    #[test]
    fn test_encode_rejects_unencodable_length() {
        let frame = Frame::binary(Vec::new());
        let mut buf = Vec::new();
        let result = frame.encode_with_claimed_len(&mut buf, u64::MAX);
        assert!(matches!(result, Err(Error::PayloadTooLarge(_))));
    }

    #[test]
    fn test_roundtrip_through_client_masking() {
        let original = Frame::text(b"WebSocket roundtrip".to_vec());
        let mut wire = Vec::new();
        original.encode(&mut wire).unwrap();

        // Re-frame as a client would: set the mask bit, splice in a key,
        // mask the payload.
        let mask = [0x12, 0x34, 0x56, 0x78];
        let mut masked = vec![wire[0], wire[1] | 0x80];
        masked.extend_from_slice(&mask);
        let mut payload = wire[2..].to_vec();
        apply_mask(&mut payload, mask);
        masked.extend_from_slice(&payload);

        let mut buf = BytesMut::from(&masked[..]);
        let decoded = decoder().decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.fin, original.fin);
        assert_eq!(decoded.opcode, original.opcode);
        assert_eq!(decoded.payload, original.payload);
    }

    #[test]
    fn test_reset_clears_pending() {
        let mut dec = decoder();
        let data = client_frame(0x82, &[1, 2, 3], [1, 2, 3, 4]);
        let mut buf = BytesMut::from(&data[..6]);
        assert!(dec.decode(&mut buf).unwrap().is_none());
        assert!(dec.has_pending_frame());
        dec.reset();
        assert!(!dec.has_pending_frame());
    }
}
