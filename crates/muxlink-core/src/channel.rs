//! Per-channel relay threads.
//!
//! Each active channel has an inbound relay (delivery queue → local stream)
//! and an outbound relay (local stream → shared transport). The two only
//! meet through the socket and generation-checked pool calls.
//! Data is only framed while the channel is current and no close frame has
//! been sent for it.

use std::io::{self, ErrorKind, Read, Write};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use muxlink_frame::{FrameError, HEADER_SIZE};
use muxlink_transport::LocalStream;
use tracing::{debug, trace, warn};

use crate::config::MuxConfig;
use crate::pool::{Channel, ChannelPool};

#[derive(Debug, Clone)]
pub(crate) struct RelaySettings {
    pub(crate) chunk_size: usize,
    pub(crate) idle_timeout: Duration,
    pub(crate) queue_depth: usize,
}

impl RelaySettings {
    pub(crate) fn from_config(config: &MuxConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            idle_timeout: config.idle_timeout(),
            queue_depth: config.queue_depth,
        }
    }
}

enum Stop {
    Eof,
    Idle,
    Read(io::Error),
    Withdrawn,
    Transport(FrameError),
}

/// Start both relays for `channel`. `inbound` and `outbound` are two handles
/// on the same local socket.
pub(crate) fn spawn_relays<S: LocalStream>(
    pool: Arc<ChannelPool>,
    channel: Channel,
    inbound: S,
    outbound: S,
    rx: Receiver<Bytes>,
) -> io::Result<()> {
    let id = channel.id();
    let inbound_pool = Arc::clone(&pool);
    thread::Builder::new()
        .name(format!("mux-in-{id}"))
        .spawn(move || inbound_relay(&inbound_pool, channel, inbound, rx))?;
    thread::Builder::new()
        .name(format!("mux-out-{id}"))
        .spawn(move || outbound_relay(&pool, channel, outbound))?;
    Ok(())
}

fn inbound_relay<S: LocalStream>(
    pool: &ChannelPool,
    channel: Channel,
    mut stream: S,
    rx: Receiver<Bytes>,
) {
    let id = channel.id();
    // Ends when the pool drops the sender on release.
    for payload in rx.iter() {
        if let Err(err) = stream.write_all(&payload) {
            warn!(channel = id, error = %err, "local write failed; closing channel");
            pool.announce_close(channel);
            break;
        }
        trace!(channel = id, len = payload.len(), "delivered to local stream");
    }
    if let Err(err) = stream.shutdown_both() {
        debug!(channel = id, error = %err, "local shutdown");
    }
    debug!(channel = id, "inbound relay stopped");
}

fn outbound_relay<S: LocalStream>(pool: &ChannelPool, channel: Channel, mut stream: S) {
    let id = channel.id();
    let settings = pool.relay_settings();
    if let Err(err) = stream.set_read_timeout(Some(settings.idle_timeout)) {
        warn!(channel = id, error = %err, "cannot set idle timeout");
    }
    let stats = Arc::clone(pool.stats());

    let mut buf = vec![0u8; HEADER_SIZE + settings.chunk_size];
    let stop = loop {
        let n = match stream.read(&mut buf[HEADER_SIZE..]) {
            Ok(0) => break Stop::Eof,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                break Stop::Idle
            }
            Err(err) => break Stop::Read(err),
        };
        match pool.send_payload(channel, &mut buf[..HEADER_SIZE + n]) {
            Ok(true) => stats.record_frame_out(n),
            Ok(false) => break Stop::Withdrawn,
            Err(err) => break Stop::Transport(err),
        }
    };

    match &stop {
        Stop::Eof => debug!(channel = id, "local stream closed"),
        Stop::Idle => debug!(
            channel = id,
            timeout_secs = settings.idle_timeout.as_secs(),
            "local stream idle"
        ),
        Stop::Read(err) => warn!(channel = id, error = %err, "local read failed"),
        Stop::Withdrawn => debug!(channel = id, "channel closing or released; dropping read"),
        Stop::Transport(err) => warn!(channel = id, error = %err, "transport write failed"),
    }
    if matches!(stop, Stop::Eof | Stop::Idle | Stop::Read(_)) {
        pool.announce_close(channel);
    }
    debug!(channel = id, "outbound relay stopped");
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    use bytes::Bytes;

    use crate::config::MuxConfig;
    use crate::testutil::{capture_pool, capture_pool_with, wait_until};

    #[test]
    fn local_eof_sends_one_close() {
        let (pool, capture) = capture_pool(4);
        let (local, peer) = UnixStream::pair().unwrap();
        let channel = pool.allocate(local).unwrap();

        drop(peer);
        wait_until(Duration::from_secs(2), || capture.closes_for(channel.id()) == 1);

        // Slot stays reserved until the peer acknowledges.
        assert_eq!(pool.active_count(), 1);
        assert!(pool.lookup(channel.id()).unwrap().is_closing());
        assert!(!pool.mark_closing(channel));

        assert!(pool.release(channel.id()));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(capture.closes_for(channel.id()), 1);
    }

    #[test]
    fn idle_timeout_sends_close() {
        let config = MuxConfig {
            max_channels: 4,
            idle_timeout_secs: 1,
            ..MuxConfig::default()
        };
        let (pool, capture) = capture_pool_with(config);
        let (local, _peer) = UnixStream::pair().unwrap();
        let channel = pool.allocate(local).unwrap();

        wait_until(Duration::from_secs(4), || capture.closes_for(channel.id()) == 1);
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn reads_are_chunked() {
        let config = MuxConfig {
            max_channels: 4,
            chunk_size: 3,
            ..MuxConfig::default()
        };
        let (pool, capture) = capture_pool_with(config);
        let (local, mut peer) = UnixStream::pair().unwrap();
        pool.allocate(local).unwrap();

        peer.write_all(b"abcdefgh").unwrap();
        let joined = || -> Vec<u8> {
            capture
                .frames()
                .iter()
                .flat_map(|frame| frame.payload.to_vec())
                .collect()
        };
        wait_until(Duration::from_secs(2), || joined().len() == 8);
        assert_eq!(joined(), b"abcdefgh");
        assert!(capture.frames().iter().all(|frame| frame.payload.len() <= 3));
    }

    #[test]
    fn failed_local_write_closes_once() {
        let (pool, capture) = capture_pool(4);
        let (local, peer) = UnixStream::pair().unwrap();
        let channel = pool.allocate(local).unwrap();
        drop(peer);

        let entry = pool.lookup(channel.id()).unwrap();
        // Either relay may notice first; the close frame goes out once.
        let _ = entry.deliver(Bytes::from_static(b"lost"));
        drop(entry);

        wait_until(Duration::from_secs(2), || capture.closes_for(channel.id()) == 1);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(capture.closes_for(channel.id()), 1);
    }

    #[test]
    fn release_wakes_blocked_reader() {
        let (pool, capture) = capture_pool(4);
        let (local, mut peer) = UnixStream::pair().unwrap();
        let channel = pool.allocate(local).unwrap();

        pool.release(channel.id());
        let mut buf = [0u8; 4];
        assert_eq!(peer.read(&mut buf).unwrap(), 0);

        // Released before any local close: nothing to announce.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(capture.closes_for(channel.id()), 0);
    }

    #[test]
    fn no_data_follows_acknowledged_close() {
        let (pool, capture) = capture_pool(4);
        let (local, mut peer) = UnixStream::pair().unwrap();
        let channel = pool.allocate(local).unwrap();

        peer.set_write_timeout(Some(Duration::from_secs(1))).unwrap();
        std::thread::spawn(move || {
            let chunk = [b'd'; 512];
            for _ in 0..2_000 {
                if peer.write_all(&chunk).is_err() {
                    break;
                }
            }
        });
        wait_until(Duration::from_secs(2), || capture.frames().len() >= 4);

        pool.acknowledge_close(channel);
        std::thread::sleep(Duration::from_millis(100));

        let frames = capture.frames();
        let close_at = frames
            .iter()
            .position(|frame| frame.is_close())
            .expect("acknowledgement should be on the wire");
        assert!(frames[..close_at].iter().all(|frame| frame.channel == channel.id()));
        assert_eq!(frames.len(), close_at + 1, "data framed after the close");
    }

    #[test]
    fn relay_stops_framing_after_its_close() {
        let (pool, capture) = capture_pool(4);
        let (local, mut peer) = UnixStream::pair().unwrap();
        let channel = pool.allocate(local).unwrap();

        // Another relay of this channel already sent the close.
        pool.announce_close(channel);
        peer.write_all(b"late").unwrap();
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(capture.frames(), vec![muxlink_frame::Frame::close(channel.id())]);
        assert_eq!(pool.active_count(), 1);
    }
}
