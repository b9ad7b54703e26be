use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use muxlink_frame::{FrameReader, FrameWriter};
use muxlink_transport::{obfuscate, tcp, LocalStream, ObfuscatedWriter};
use tracing::{info, warn};

use crate::config::MuxConfig;
use crate::dispatch::{Dialer, Dispatcher};
use crate::error::{MuxError, Result};
use crate::pool::{Channel, ChannelPool};
use crate::stats::StatsSnapshot;

/// One shared transport and the channel pool multiplexed over it.
///
/// Cheap to clone; clones share the pool. The read half of the transport is
/// handed out separately and belongs to exactly one [`Dispatcher`].
#[derive(Clone)]
pub struct Bundle {
    pool: Arc<ChannelPool>,
    config: MuxConfig,
}

impl Bundle {
    /// Build a bundle around the write half of a transport.
    pub fn new(writer: ObfuscatedWriter, config: MuxConfig) -> Result<Self> {
        config.validate()?;
        let pool = ChannelPool::new(FrameWriter::new(writer), &config);
        Ok(Self { pool, config })
    }

    /// Split a connected TCP transport into a bundle and its frame reader.
    pub fn over_tcp(
        transport: TcpStream,
        config: MuxConfig,
    ) -> Result<(Self, FrameReader<TcpStream>)> {
        let peer = transport.describe();
        let (reader, writer) = obfuscate(transport, config.xor_mask())?;
        let bundle = Self::new(writer, config)?;
        info!(
            %peer,
            mask = bundle.config.mask,
            capacity = bundle.config.max_channels,
            "shared transport established"
        );
        Ok((bundle, FrameReader::new(reader)))
    }

    /// Dispatcher for this bundle's pool.
    pub fn dispatcher<R: Read, D: Dialer>(
        &self,
        reader: FrameReader<R>,
        dialer: D,
    ) -> Dispatcher<R, D> {
        Dispatcher::new(reader, Arc::clone(&self.pool), dialer)
    }

    /// Multiplex a locally accepted stream under a fresh identifier.
    pub fn attach<S: LocalStream>(&self, stream: S) -> Result<Channel> {
        self.pool.allocate(stream)
    }

    /// Attach every connection accepted on `listener`.
    ///
    /// Connections that cannot be attached are closed. Returns only when
    /// accepting fails.
    pub fn serve_listener(&self, listener: &TcpListener) -> Result<()> {
        loop {
            let stream = tcp::accept(listener)?;
            match self.attach(stream) {
                Ok(_) | Err(MuxError::CapacityExhausted) => {}
                Err(err) => warn!(error = %err, "cannot attach local connection"),
            }
        }
    }

    pub fn pool(&self) -> &Arc<ChannelPool> {
        &self.pool
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.pool.snapshot()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::dispatch::{NoDialer, TcpDialer};
    use crate::testutil::wait_until;

    struct Link {
        server: Bundle,
        client: Bundle,
        consumer_addr: SocketAddr,
    }

    /// Echo every connection until EOF.
    fn echo_backend() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                thread::spawn(move || {
                    let mut reader = stream.try_clone().unwrap();
                    let _ = std::io::copy(&mut reader, &mut stream);
                });
            }
        });
        addr
    }

    /// Read two bytes, answer "bye" and hang up.
    fn farewell_backend() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 2];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(b"bye").unwrap();
        });
        addr
    }

    fn link(backend: SocketAddr, config: MuxConfig) -> Link {
        link_with(backend, config.clone(), config)
    }

    fn link_with(backend: SocketAddr, server_config: MuxConfig, client_config: MuxConfig) -> Link {
        let transport = TcpListener::bind("127.0.0.1:0").unwrap();
        let client_end = TcpStream::connect(transport.local_addr().unwrap()).unwrap();
        let (server_end, _) = transport.accept().unwrap();

        let (server, server_reader) = Bundle::over_tcp(server_end, server_config).unwrap();
        let (client, client_reader) = Bundle::over_tcp(client_end, client_config).unwrap();

        let dispatcher = server.dispatcher(server_reader, NoDialer);
        thread::spawn(move || dispatcher.run());
        let dispatcher =
            client.dispatcher(client_reader, TcpDialer::new(&backend.to_string()));
        thread::spawn(move || dispatcher.run());

        let consumers = TcpListener::bind("127.0.0.1:0").unwrap();
        let consumer_addr = consumers.local_addr().unwrap();
        let acceptor = server.clone();
        thread::spawn(move || acceptor.serve_listener(&consumers));

        Link {
            server,
            client,
            consumer_addr,
        }
    }

    fn consumer(link: &Link) -> TcpStream {
        let stream = TcpStream::connect(link.consumer_addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    fn wait_idle(link: &Link) {
        wait_until(Duration::from_secs(5), || {
            link.server.pool().active_count() == 0 && link.client.pool().active_count() == 0
        });
    }

    #[test]
    fn round_trip_through_echo() {
        let link = link(echo_backend(), MuxConfig::default());
        let mut stream = consumer(&link);

        stream.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        drop(stream);
        wait_idle(&link);
        let server = link.server.stats();
        assert_eq!(server.channels_opened, 1);
        assert_eq!(server.channels_released, 1);
        assert_eq!(link.client.stats().channels_released, 1);
    }

    #[test]
    fn concurrent_consumers_stay_separate() {
        let link = link(echo_backend(), MuxConfig::default());

        let handles: Vec<_> = (0..2u8)
            .map(|i| {
                let mut stream = consumer(&link);
                thread::spawn(move || {
                    let message = vec![b'a' + i; 64];
                    for _ in 0..10 {
                        stream.write_all(&message).unwrap();
                        let mut echoed = vec![0u8; message.len()];
                        stream.read_exact(&mut echoed).unwrap();
                        assert_eq!(echoed, message);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(link.server.stats().channels_opened, 2);
        wait_idle(&link);
    }

    #[test]
    fn backend_close_reaches_consumer() {
        let link = link(farewell_backend(), MuxConfig::default());
        let mut stream = consumer(&link);

        stream.write_all(b"hi").unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).unwrap();
        assert_eq!(reply, b"bye");

        wait_idle(&link);
    }

    #[test]
    fn large_transfer_keeps_order() {
        let config = MuxConfig {
            chunk_size: 1000,
            queue_depth: 2,
            ..MuxConfig::default()
        };
        let link = link(echo_backend(), config);
        let stream = consumer(&link);

        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let expected = data.clone();
        let mut writer = stream.try_clone().unwrap();
        let sender = thread::spawn(move || {
            writer.write_all(&data).unwrap();
        });

        let mut reader = stream;
        let mut echoed = vec![0u8; expected.len()];
        reader.read_exact(&mut echoed).unwrap();
        sender.join().unwrap();
        assert!(echoed == expected, "echoed stream differs from input");
    }

    #[test]
    fn exhausted_pool_refuses_consumer() {
        let config = MuxConfig {
            max_channels: 1,
            ..MuxConfig::default()
        };
        let link = link(echo_backend(), config);

        let mut first = consumer(&link);
        first.write_all(b"one").unwrap();
        let mut buf = [0u8; 3];
        first.read_exact(&mut buf).unwrap();

        let mut second = consumer(&link);
        let mut probe = [0u8; 1];
        let refused = match second.read(&mut probe) {
            Ok(n) => n == 0,
            Err(err) => err.kind() == std::io::ErrorKind::ConnectionReset,
        };
        assert!(refused);
        assert_eq!(link.server.pool().active_count(), 1);
    }

    #[test]
    fn smaller_peer_refuses_excess_channel_quietly() {
        let client_config = MuxConfig {
            max_channels: 1,
            ..MuxConfig::default()
        };
        let link = link_with(echo_backend(), MuxConfig::default(), client_config);

        let mut first = consumer(&link);
        wait_until(Duration::from_secs(5), || link.server.pool().active_count() == 1);
        let mut second = consumer(&link);
        wait_until(Duration::from_secs(5), || link.server.pool().active_count() == 2);

        second.write_all(b"x").unwrap();
        let mut buf = [0u8; 1];
        let refused = match second.read(&mut buf) {
            Ok(n) => n == 0,
            Err(err) => err.kind() == std::io::ErrorKind::ConnectionReset,
        };
        assert!(refused);
        wait_until(Duration::from_secs(5), || link.server.pool().active_count() == 1);

        thread::sleep(Duration::from_millis(300));
        let server = link.server.stats();
        let client = link.client.stats();
        assert_eq!(server.closes_sent, 1);
        assert_eq!(client.closes_sent, 1);
        assert_eq!(server.stray_closes + client.stray_closes, 0);

        first.write_all(b"still").unwrap();
        let mut echoed = [0u8; 5];
        first.read_exact(&mut echoed).unwrap();
        assert_eq!(&echoed, b"still");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let transport = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(transport.local_addr().unwrap()).unwrap();
        let config = MuxConfig {
            chunk_size: 0,
            ..MuxConfig::default()
        };
        assert!(matches!(
            Bundle::over_tcp(stream, config),
            Err(MuxError::Config(_))
        ));
    }
}
