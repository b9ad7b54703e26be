//! TCP listen/accept/connect helpers for the bootstrap layer.
//!
//! Addresses may omit the host (`":8888"`). Listening then binds every
//! interface and dialing targets the loopback interface.

use std::net::{TcpListener, TcpStream};

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Bind a TCP listener on `addr`.
pub fn listen(addr: &str) -> Result<TcpListener> {
    let addr = listen_addr(addr);
    let listener = TcpListener::bind(&addr).map_err(|e| TransportError::Bind {
        addr: addr.clone(),
        source: e,
    })?;
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or(addr);
    info!(addr = %local, "listening");
    Ok(listener)
}

/// Accept the next connection (blocking).
pub fn accept(listener: &TcpListener) -> Result<TcpStream> {
    let (stream, peer) = listener.accept().map_err(TransportError::Accept)?;
    disable_nagle(&stream);
    debug!(%peer, "accepted connection");
    Ok(stream)
}

/// Dial `addr` (blocking, no timeout).
pub fn connect(addr: &str) -> Result<TcpStream> {
    let addr = dial_addr(addr);
    let stream = TcpStream::connect(&addr).map_err(|e| TransportError::Connect {
        addr: addr.clone(),
        source: e,
    })?;
    disable_nagle(&stream);
    debug!(%addr, "connected");
    Ok(stream)
}

fn disable_nagle(stream: &TcpStream) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(error = %err, "cannot set TCP_NODELAY");
    }
}

/// Expand a host-less address for listening.
pub fn listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

/// Expand a host-less address for dialing.
pub fn dial_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("127.0.0.1{addr}")
    } else {
        addr.to_string()
    }
}
