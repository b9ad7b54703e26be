use std::io::Read;

use bytes::{Bytes, BytesMut};
use muxlink_transport::ObfuscatedReader;
use tracing::trace;

use crate::codec::{Frame, FrameHeader, HEADER_SIZE};
use crate::error::Result;

/// Reads frames from the shared transport.
///
/// Header and payload are exposed separately so the caller can decide what to
/// do with a payload (deliver or discard) after inspecting the header. The
/// reader must always consume exactly `len` payload bytes after a header, or
/// the stream loses frame alignment.
pub struct FrameReader<R> {
    inner: ObfuscatedReader<R>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: ObfuscatedReader<R>) -> Self {
        Self { inner }
    }

    /// Read the next 4-byte header (blocking).
    pub fn read_header(&mut self) -> Result<FrameHeader> {
        let mut raw = [0u8; HEADER_SIZE];
        self.inner.read_full(&mut raw)?;
        let header = FrameHeader::decode(raw);
        trace!(channel = header.channel, len = header.len, "frame header");
        Ok(header)
    }

    /// Read exactly `len` payload bytes.
    pub fn read_payload(&mut self, len: u16) -> Result<Bytes> {
        let mut payload = BytesMut::zeroed(len as usize);
        self.inner.read_full(&mut payload)?;
        Ok(payload.freeze())
    }

    /// Consume and drop `len` payload bytes.
    pub fn discard_payload(&mut self, len: u16) -> Result<()> {
        self.inner.discard(len as usize)?;
        Ok(())
    }

    /// Read a complete frame (header + payload).
    pub fn read_frame(&mut self) -> Result<Frame> {
        let header = self.read_header()?;
        let payload = if header.is_close() {
            Bytes::new()
        } else {
            self.read_payload(header.len)?
        };
        Ok(Frame {
            channel: header.channel,
            payload,
        })
    }

    /// Borrow the transport half.
    pub fn get_ref(&self) -> &ObfuscatedReader<R> {
        &self.inner
    }

    /// Consume the reader and return the transport half.
    pub fn into_inner(self) -> ObfuscatedReader<R> {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;
    use muxlink_transport::XorMask;

    use super::*;
    use crate::codec::encode_frame;
    use crate::error::FrameError;

    fn masked_wire(frames: &[(u16, &[u8])], mask: XorMask) -> Vec<u8> {
        let mut wire = BytesMut::new();
        for (channel, payload) in frames {
            encode_frame(*channel, payload, &mut wire).unwrap();
        }
        let mut wire = wire.to_vec();
        mask.apply(&mut wire);
        wire
    }

    fn reader_over(wire: Vec<u8>, mask: XorMask) -> FrameReader<Cursor<Vec<u8>>> {
        FrameReader::new(ObfuscatedReader::new(Cursor::new(wire), mask))
    }

    #[test]
    fn read_single_frame() {
        let mask = XorMask::default();
        let mut reader = reader_over(masked_wire(&[(1, b"hello")], mask), mask);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.channel, 1);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn read_header_then_payload() {
        let mask = XorMask::default();
        let mut reader = reader_over(masked_wire(&[(9, b"split")], mask), mask);

        let header = reader.read_header().unwrap();
        assert_eq!(header, FrameHeader::new(9, 5));
        let payload = reader.read_payload(header.len).unwrap();
        assert_eq!(payload.as_ref(), b"split");
    }

    #[test]
    fn discard_keeps_alignment() {
        let mask = XorMask::default();
        let wire = masked_wire(&[(1, b"dropped payload"), (2, b"kept")], mask);
        let mut reader = reader_over(wire, mask);

        let header = reader.read_header().unwrap();
        reader.discard_payload(header.len).unwrap();

        let frame = reader.read_frame().unwrap();
        assert_eq!((frame.channel, frame.payload.as_ref()), (2, b"kept".as_ref()));
    }

    #[test]
    fn close_frame_reads_no_payload() {
        let mask = XorMask::default();
        let wire = masked_wire(&[(3, b""), (3, b"after")], mask);
        let mut reader = reader_over(wire, mask);

        assert!(reader.read_frame().unwrap().is_close());
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"after");
    }

    #[test]
    fn wrong_mask_garbles_header() {
        let wire = masked_wire(&[(1, b"x")], XorMask::new(0x64));
        let mut reader = reader_over(wire, XorMask::new(0x00));

        let header = reader.read_header().unwrap();
        assert_ne!(header, FrameHeader::new(1, 1));
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = reader_over(Vec::new(), XorMask::default());
        let err = reader.read_frame().unwrap_err();
        assert!(err.is_closed());
    }

    #[test]
    fn connection_closed_mid_payload() {
        let mask = XorMask::default();
        let mut wire = masked_wire(&[(2, b"truncated")], mask);
        wire.truncate(HEADER_SIZE + 3);
        let mut reader = reader_over(wire, mask);

        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Transport(_)));
        assert!(err.is_closed());
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_pipe() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mask = XorMask::default();
        let writer = crate::writer::FrameWriter::new(muxlink_transport::ObfuscatedWriter::new(
            left, mask,
        ));
        let mut reader = FrameReader::new(ObfuscatedReader::new(right, mask));

        writer.send(1, b"ping").unwrap();
        writer.send_close(1).unwrap();

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.channel, 1);
        assert_eq!(frame.payload.as_ref(), b"ping");
        assert_eq!(reader.read_frame().unwrap(), Frame::close(1));
    }
}
