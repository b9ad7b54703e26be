use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use muxlink_frame::{decode_frame, encode_frame, Frame, FrameWriter};
use muxlink_transport::{ObfuscatedWriter, XorMask};

use crate::config::MuxConfig;
use crate::pool::ChannelPool;

/// Shared in-memory transport sink.
#[derive(Clone, Default)]
pub(crate) struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    /// Decode everything written so far with the default mask.
    pub(crate) fn frames(&self) -> Vec<Frame> {
        let mut wire = self.0.lock().unwrap().clone();
        XorMask::default().apply(&mut wire);
        let mut buf = BytesMut::from(wire.as_slice());
        let mut frames = Vec::new();
        while let Some(frame) = decode_frame(&mut buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    pub(crate) fn closes_for(&self, channel: u16) -> usize {
        self.frames()
            .iter()
            .filter(|frame| frame.channel == channel && frame.is_close())
            .count()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub(crate) fn capture_pool(capacity: usize) -> (Arc<ChannelPool>, Capture) {
    capture_pool_with(MuxConfig {
        max_channels: capacity,
        ..MuxConfig::default()
    })
}

pub(crate) fn capture_pool_with(config: MuxConfig) -> (Arc<ChannelPool>, Capture) {
    let capture = Capture::default();
    let writer = FrameWriter::new(ObfuscatedWriter::new(capture.clone(), config.xor_mask()));
    (ChannelPool::new(writer, &config), capture)
}

/// Encode and mask frames as the peer would put them on the wire.
pub(crate) fn wire_bytes(frames: &[Frame]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    for frame in frames {
        encode_frame(frame.channel, &frame.payload, &mut buf).unwrap();
    }
    let mut wire = buf.to_vec();
    XorMask::default().apply(&mut wire);
    wire
}

pub(crate) fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !done() {
        assert!(
            Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Read exactly `len` bytes, failing the test after two seconds.
pub(crate) fn wait_bytes(stream: &mut UnixStream, len: usize) -> Vec<u8> {
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).unwrap();
    buf
}
