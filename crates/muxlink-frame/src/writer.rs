use bytes::BytesMut;
use muxlink_transport::{ObfuscatedWriter, WriteGuard};
use tracing::trace;

use crate::codec::{encode_frame, Frame, FrameHeader, HEADER_SIZE, MAX_PAYLOAD};
use crate::error::{FrameError, Result};

/// Writes frames to the shared transport.
///
/// Cheap to clone. Each frame goes out through a single locked transport
/// write, so frames from concurrent senders never interleave.
#[derive(Clone, Debug)]
pub struct FrameWriter {
    inner: ObfuscatedWriter,
}

impl FrameWriter {
    pub fn new(inner: ObfuscatedWriter) -> Self {
        Self { inner }
    }

    /// Encode and send a payload on a channel.
    pub fn send(&self, channel: u16, payload: &[u8]) -> Result<()> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        encode_frame(channel, payload, &mut buf)?;
        trace!(channel, len = payload.len(), "send frame");
        self.inner.write_all(&mut buf)?;
        Ok(())
    }

    /// Send a frame whose payload already sits after a reserved header.
    ///
    /// `buf[..HEADER_SIZE]` is overwritten with the header for
    /// `buf[HEADER_SIZE..]`. The whole buffer is masked in place.
    pub fn send_prepared(&self, channel: u16, buf: &mut [u8]) -> Result<()> {
        self.lock().send_prepared(channel, buf)
    }

    /// Send the zero-length close frame for `channel`.
    pub fn send_close(&self, channel: u16) -> Result<()> {
        self.lock().send_close(channel)
    }

    /// Hold the transport lock so a check and the frames that depend on it
    /// are ordered against every other sender.
    pub fn lock(&self) -> FrameSink<'_> {
        FrameSink {
            inner: self.inner.lock(),
        }
    }

    /// Write a complete frame.
    pub fn write_frame(&self, frame: &Frame) -> Result<()> {
        self.send(frame.channel, frame.payload.as_ref())
    }
}

/// Exclusive access to the shared transport, from [`FrameWriter::lock`].
pub struct FrameSink<'a> {
    inner: WriteGuard<'a>,
}

impl FrameSink<'_> {
    /// See [`FrameWriter::send_prepared`].
    pub fn send_prepared(&mut self, channel: u16, buf: &mut [u8]) -> Result<()> {
        if buf.len() < HEADER_SIZE {
            return Err(FrameError::NoHeaderRoom { size: buf.len() });
        }
        let len = buf.len() - HEADER_SIZE;
        if len > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: MAX_PAYLOAD,
            });
        }
        buf[..HEADER_SIZE].copy_from_slice(&FrameHeader::new(channel, len as u16).encode());
        trace!(channel, len, "send frame");
        self.inner.write_all(buf)?;
        Ok(())
    }

    pub fn send_close(&mut self, channel: u16) -> Result<()> {
        let mut header = FrameHeader::close(channel).encode();
        trace!(channel, "send close");
        self.inner.write_all(&mut header)?;
        Ok(())
    }
}
