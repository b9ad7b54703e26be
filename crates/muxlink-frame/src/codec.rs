use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: channel (2) + length (2) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Number of addressable channel identifiers.
pub const MAX_CHANNELS: usize = 1 << 16;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// The channel this frame belongs to.
    pub channel: u16,
    /// Payload length in bytes. Zero means "close channel".
    pub len: u16,
}

impl FrameHeader {
    pub fn new(channel: u16, len: u16) -> Self {
        Self { channel, len }
    }

    /// Header of a close frame for `channel`.
    pub fn close(channel: u16) -> Self {
        Self { channel, len: 0 }
    }

    pub fn is_close(&self) -> bool {
        self.len == 0
    }

    /// Wire layout:
    /// ```text
    /// ┌──────────────┬──────────────┐
    /// │ Channel      │ Length       │
    /// │ (2B BE)      │ (2B BE)      │
    /// └──────────────┴──────────────┘
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let [id_hi, id_lo] = self.channel.to_be_bytes();
        let [len_hi, len_lo] = self.len.to_be_bytes();
        [id_hi, id_lo, len_hi, len_lo]
    }

    pub fn decode(raw: [u8; HEADER_SIZE]) -> Self {
        Self {
            channel: u16::from_be_bytes([raw[0], raw[1]]),
            len: u16::from_be_bytes([raw[2], raw[3]]),
        }
    }
}

/// A framed payload with channel routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The channel this message belongs to.
    pub channel: u16,
    /// The message payload. Empty for close frames.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(channel: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    /// Create a close frame.
    pub fn close(channel: u16) -> Self {
        Self {
            channel,
            payload: Bytes::new(),
        }
    }

    pub fn is_close(&self) -> bool {
        self.payload.is_empty()
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format (unmasked).
pub fn encode_frame(channel: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u16(channel);
    dst.put_u16(payload.len() as u16);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer of unmasked bytes.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let header = FrameHeader::decode([src[0], src[1], src[2], src[3]]);
    let total = HEADER_SIZE + header.len as usize;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(header.len as usize).freeze();

    Ok(Some(Frame {
        channel: header.channel,
        payload,
    }))
}
