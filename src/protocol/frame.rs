//! WebSocket frame model as seen by extensions (RFC 6455 Section 5.2).
//!
//! Wire parsing and serialization belong to the transport layer; extensions
//! only look at the header bits and the application payload.

use bytes::Bytes;

use crate::protocol::OpCode;

/// A WebSocket frame as defined in RFC 6455.
///
/// ## Frame Structure
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode |M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)   |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// ```
///
/// The RSV bits are what extensions use to mark transformed frames;
/// permessage-deflate uses RSV1 on the first frame of a compressed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag. True if this is the last fragment of a message.
    pub fin: bool,
    /// Reserved bit 1. Must be 0 unless extension is negotiated.
    pub rsv1: bool,
    /// Reserved bit 2. Must be 0 unless extension is negotiated.
    pub rsv2: bool,
    /// Reserved bit 3. Must be 0 unless extension is negotiated.
    pub rsv3: bool,
    /// Frame opcode defining the interpretation of payload data.
    pub opcode: OpCode,
    payload: Bytes,
}

impl Frame {
    /// Create a new frame with all reserved bits cleared.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            payload: payload.into(),
        }
    }

    /// Create a text frame.
    #[must_use]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, data)
    }

    /// Create a binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, data)
    }

    /// Create a continuation frame.
    #[must_use]
    pub fn continuation(fin: bool, data: impl Into<Bytes>) -> Self {
        Self::new(fin, OpCode::Continuation, data)
    }

    /// Create a close frame with optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = if let Some(code) = code {
            let mut data = code.to_be_bytes().to_vec();
            data.extend_from_slice(reason.as_bytes());
            data
        } else {
            Vec::new()
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, data)
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, data)
    }

    /// Get the payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Replace the payload, keeping the header bits.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame_clears_rsv_bits() {
        let frame = Frame::new(false, OpCode::Binary, vec![1u8, 2, 3]);
        assert!(!frame.fin);
        assert!(!frame.rsv1 && !frame.rsv2 && !frame.rsv3);
        assert_eq!(frame.opcode, OpCode::Binary);
        assert_eq!(frame.payload(), &[1, 2, 3]);
    }

    #[test]
    fn test_close_frame_with_reason() {
        let frame = Frame::close(Some(1000), "bye");
        assert_eq!(frame.opcode, OpCode::Close);
        assert_eq!(&frame.payload()[..2], &[0x03, 0xe8]);
        assert_eq!(&frame.payload()[2..], b"bye");

        let empty = Frame::close(None, "ignored");
        assert!(empty.payload().is_empty());
    }

    #[test]
    fn test_with_payload_keeps_header_bits() {
        let mut frame = Frame::continuation(true, "abc");
        frame.rsv1 = true;

        let frame = frame.with_payload("xyz");
        assert!(frame.fin);
        assert!(frame.rsv1);
        assert_eq!(frame.opcode, OpCode::Continuation);
        assert_eq!(frame.payload(), b"xyz");
    }

    #[test]
    fn test_control_frame_constructors() {
        assert_eq!(Frame::ping("p").opcode, OpCode::Ping);
        assert_eq!(Frame::pong("p").opcode, OpCode::Pong);
        assert!(Frame::close(None, "").opcode.is_control());
    }
}
