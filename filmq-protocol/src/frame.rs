//! Binary frame format.
//!
//! Frame layout (4 bytes length prefix + body):
//!
//! ```text
//! +-------------+-----+-----------------+
//! |   length    | tag | payload         |
//! |   4 bytes   | 1 B | length-1 bytes  |
//! +-------------+-----+-----------------+
//! ```
//!
//! `length` is a big-endian `u32` counting the tag and the payload. A body is
//! never empty: the tag byte is always present, the payload may be zero-length.

use crate::error::ProtocolError;
use crate::MAX_FRAME_LEN;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the message type tag in bytes.
pub const TAG_SIZE: usize = 1;

/// A raw frame: type tag plus payload.
///
/// The tag is kept as a byte so that frames carrying types this build does not
/// know about can still be read off the wire and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type tag.
    pub tag: u8,
    /// Frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Creates a new frame.
    pub fn new(tag: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    /// Length of the body (tag + payload) as carried in the prefix.
    pub fn body_len(&self) -> Result<u32, ProtocolError> {
        let len = (TAG_SIZE + self.payload.len()) as u64;
        if len > MAX_FRAME_LEN as u64 {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_LEN,
            });
        }
        Ok(len as u32)
    }

    /// Encodes the length prefix.
    pub fn encode_length(&self) -> Result<[u8; LENGTH_PREFIX_SIZE], ProtocolError> {
        Ok(self.body_len()?.to_be_bytes())
    }

    /// Encodes the body (tag followed by payload).
    pub fn encode_body(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(TAG_SIZE + self.payload.len());
        buf.put_u8(self.tag);
        buf.put_slice(&self.payload);
        buf
    }

    /// Encodes the complete frame (prefix + body).
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let len = self.body_len()?;
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + len as usize);
        buf.put_u32(len);
        buf.put_u8(self.tag);
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Interprets a length prefix, validating it against the frame bounds.
    pub fn decode_length(prefix: [u8; LENGTH_PREFIX_SIZE]) -> Result<usize, ProtocolError> {
        let len = u32::from_be_bytes(prefix);
        if len == 0 {
            return Err(ProtocolError::EmptyFrame);
        }
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge {
                size: len as u64,
                max: MAX_FRAME_LEN,
            });
        }
        Ok(len as usize)
    }

    /// Decodes a frame body: the first byte is the tag, the rest is payload.
    pub fn decode_body(mut body: Bytes) -> Result<Self, ProtocolError> {
        if body.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        let tag = body.get_u8();
        Ok(Self { tag, payload: body })
    }

    /// Decodes a frame from a buffer holding prefixed frames.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on malformed input.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let prefix = [buf[0], buf[1], buf[2], buf[3]];
        let body_len = Self::decode_length(prefix)?;

        if buf.len() < LENGTH_PREFIX_SIZE + body_len {
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        let body = buf.split_to(body_len).freeze();
        Self::decode_body(body).map(Some)
    }
}
