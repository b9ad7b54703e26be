use std::collections::HashSet;
use std::io::Read;
use std::net::TcpStream;
use std::sync::Arc;

use bytes::Bytes;
use muxlink_frame::{FrameHeader, FrameReader};
use muxlink_transport::{tcp, LocalStream};
use tracing::{debug, error, info, trace, warn};

use crate::error::{MuxError, Result};
use crate::pool::{ChannelPool, ChannelRef};

/// Opens the local stream for a channel the peer started.
pub trait Dialer {
    type Stream: LocalStream;

    fn dial(&self) -> Result<Self::Stream>;

    /// Dial target for logs.
    fn describe(&self) -> String;
}

/// Dials a fixed TCP address.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    addr: String,
}

impl TcpDialer {
    /// `addr` may use the `:port` shorthand for loopback.
    pub fn new(addr: &str) -> Self {
        Self {
            addr: tcp::dial_addr(addr),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Dialer for TcpDialer {
    type Stream = TcpStream;

    fn dial(&self) -> Result<TcpStream> {
        tcp::connect(&self.addr).map_err(|source| MuxError::Dial {
            addr: self.addr.clone(),
            source,
        })
    }

    fn describe(&self) -> String {
        format!("tcp:{}", self.addr)
    }
}

/// Refuses every remote-originated channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDialer;

impl Dialer for NoDialer {
    type Stream = TcpStream;

    fn dial(&self) -> Result<TcpStream> {
        Err(MuxError::NoTarget)
    }

    fn describe(&self) -> String {
        "none".to_string()
    }
}

/// The single reader of the shared transport.
///
/// Routes each frame to its channel, opens channels the peer starts and
/// completes the close handshake. Only transport failures end the loop.
pub struct Dispatcher<R, D> {
    reader: FrameReader<R>,
    pool: Arc<ChannelPool>,
    dialer: D,
    /// Ids beyond our capacity that we closed without holding a slot. The
    /// peer's next close for one of them is its acknowledgement.
    unanswered: HashSet<u16>,
}

impl<R: Read, D: Dialer> Dispatcher<R, D> {
    pub fn new(reader: FrameReader<R>, pool: Arc<ChannelPool>, dialer: D) -> Self {
        Self {
            reader,
            pool,
            dialer,
            unanswered: HashSet::new(),
        }
    }

    /// Process frames until the transport fails and return that failure.
    pub fn run(mut self) -> MuxError {
        info!(dial_target = %self.dialer.describe(), "dispatch loop started");
        loop {
            if let Err(err) = self.step() {
                error!(
                    error = %err,
                    active = self.pool.active_count(),
                    "shared transport lost"
                );
                return err;
            }
        }
    }

    /// Read and handle exactly one frame.
    ///
    /// Any error returned is fatal for the transport.
    pub fn step(&mut self) -> Result<()> {
        let header = self.reader.read_header()?;
        let FrameHeader { channel: id, len } = header;
        self.pool.stats().record_frame_in(len as usize);

        match self.pool.lookup(id) {
            None if header.is_close() => self.close_inactive(id),
            None if self.unanswered.contains(&id) => {
                trace!(channel = id, len, "discarding payload for refused channel");
                self.reader.discard_payload(len)?;
                self.pool.stats().record_dropped_payload();
            }
            None => self.open_remote(id, len)?,
            Some(entry) if header.is_close() => self.close_remote(entry),
            Some(entry) if entry.accepts_payloads() => {
                let payload = self.reader.read_payload(len)?;
                self.forward(entry, payload);
            }
            Some(_) => {
                trace!(channel = id, len, "discarding payload for closing channel");
                self.reader.discard_payload(len)?;
                self.pool.stats().record_dropped_payload();
            }
        }
        Ok(())
    }

    fn close_inactive(&mut self, id: u16) {
        if self.unanswered.remove(&id) {
            debug!(channel = id, "refused channel acknowledged");
            return;
        }
        // The peer closed a channel that never carried data to this side.
        // Answer so its slot can be released.
        self.pool.stats().record_stray_close();
        debug!(channel = id, "close for inactive channel");
        self.send_close(id);
    }

    fn open_remote(&mut self, id: u16, len: u16) -> Result<()> {
        let capacity = self.pool.capacity();
        let opened = if usize::from(id) < capacity {
            self.dialer
                .dial()
                .and_then(|stream| self.pool.allocate_at(id, stream))
        } else {
            Err(MuxError::OutOfRange { id, capacity })
        };
        match opened {
            Ok(channel) => {
                debug!(
                    channel = id,
                    generation = channel.generation(),
                    "remote channel opened"
                );
                let payload = self.reader.read_payload(len)?;
                match self.pool.lookup(id) {
                    Some(entry) => self.forward(entry, payload),
                    None => self.pool.stats().record_dropped_payload(),
                }
            }
            Err(err) => {
                self.pool.stats().record_dial_failure();
                warn!(channel = id, error = %err, "cannot serve remote channel; closing");
                if usize::from(id) < capacity {
                    self.pool.reserve_closing(id);
                } else {
                    self.unanswered.insert(id);
                }
                self.reader.discard_payload(len)?;
                self.send_close(id);
            }
        }
        Ok(())
    }

    fn close_remote(&self, entry: ChannelRef) {
        let channel = entry.channel();
        drop(entry);
        self.pool.acknowledge_close(channel);
    }

    fn forward(&self, entry: ChannelRef, payload: Bytes) {
        let len = payload.len();
        if entry.deliver(payload) {
            trace!(channel = entry.id(), len, "queued payload");
        } else {
            self.pool.stats().record_dropped_payload();
            debug!(channel = entry.id(), len, "relay stopped; payload dropped");
        }
    }

    fn send_close(&self, id: u16) {
        match self.pool.writer().send_close(id) {
            Ok(()) => self.pool.stats().record_close_sent(),
            Err(err) => warn!(channel = id, error = %err, "failed to send close"),
        }
    }
}
