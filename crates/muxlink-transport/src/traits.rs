use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// A connected local-side byte stream bound to one channel.
///
/// Local streams are the backend or consumer sockets that a channel relays
/// to and from. Each channel needs two handles on the same socket (one per
/// relay direction), so implementors must support cloning the handle.
pub trait LocalStream: Read + Write + Send + Sized + 'static {
    /// Create a second handle to the same underlying socket.
    fn try_clone_stream(&self) -> std::io::Result<Self>;

    /// Set the read timeout on the underlying socket.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;

    /// Shut down both directions of the underlying socket.
    ///
    /// Affects every handle to the socket, so a relay blocked in `read` on a
    /// clone wakes up with EOF.
    fn shutdown_both(&self) -> std::io::Result<()>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

impl LocalStream for TcpStream {
    fn try_clone_stream(&self) -> std::io::Result<Self> {
        self.try_clone()
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown_both(&self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Both)
    }

    fn describe(&self) -> String {
        match self.peer_addr() {
            Ok(addr) => format!("tcp:{addr}"),
            Err(_) => "tcp:<disconnected>".to_string(),
        }
    }
}

#[cfg(unix)]
impl LocalStream for std::os::unix::net::UnixStream {
    fn try_clone_stream(&self) -> std::io::Result<Self> {
        self.try_clone()
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, timeout)
    }

    fn shutdown_both(&self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Both)
    }

    fn describe(&self) -> String {
        "unix".to_string()
    }
}
