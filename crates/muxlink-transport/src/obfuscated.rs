use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::error::{Result, TransportError};
use crate::mask::XorMask;

/// Split a connected TCP stream into the two halves of an obfuscated transport.
///
/// The read half must have exactly one caller. The write half may be cloned
/// freely; clones share one lock.
pub fn obfuscate(
    stream: TcpStream,
    mask: XorMask,
) -> Result<(ObfuscatedReader<TcpStream>, ObfuscatedWriter)> {
    let read_half = stream.try_clone()?;
    Ok((
        ObfuscatedReader::new(read_half, mask),
        ObfuscatedWriter::new(stream, mask),
    ))
}

/// Read half of the shared transport.
///
/// Every read fills the caller's buffer completely and unmasks it in place.
pub struct ObfuscatedReader<R> {
    inner: R,
    mask: XorMask,
}

impl<R: Read> ObfuscatedReader<R> {
    pub fn new(inner: R, mask: XorMask) -> Self {
        Self { inner, mask }
    }

    /// Fill `buf` entirely, then unmask it.
    ///
    /// Returns [`TransportError::Closed`] if the peer closes before `buf` is full.
    pub fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        self.mask.apply(buf);
        Ok(())
    }

    /// Read and drop exactly `len` bytes.
    pub fn discard(&mut self, len: usize) -> Result<()> {
        let mut scratch = [0u8; 1024];
        let mut remaining = len;
        while remaining > 0 {
            let step = remaining.min(scratch.len());
            self.read_full(&mut scratch[..step])?;
            remaining -= step;
        }
        Ok(())
    }

    pub fn mask(&self) -> XorMask {
        self.mask
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

type SharedSink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Write half of the shared transport.
///
/// Cloning is cheap; all clones serialize through the same lock so a buffer
/// passed to [`write_all`](Self::write_all) reaches the wire contiguously.
#[derive(Clone)]
pub struct ObfuscatedWriter {
    sink: SharedSink,
    mask: XorMask,
}

impl ObfuscatedWriter {
    pub fn new<W: Write + Send + 'static>(inner: W, mask: XorMask) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(inner))),
            mask,
        }
    }

    /// Mask `buf` in place and write all of it under the transport lock.
    ///
    /// The caller's buffer holds masked bytes afterwards.
    pub fn write_all(&self, buf: &mut [u8]) -> Result<()> {
        self.lock().write_all(buf)
    }

    /// Hold the transport lock across several writes and checks.
    ///
    /// Nothing else reaches the wire until the guard is dropped.
    pub fn lock(&self) -> WriteGuard<'_> {
        WriteGuard {
            sink: self.sink.lock().unwrap_or_else(PoisonError::into_inner),
            mask: self.mask,
        }
    }

    pub fn mask(&self) -> XorMask {
        self.mask
    }
}

/// Exclusive access to the write half, from [`ObfuscatedWriter::lock`].
pub struct WriteGuard<'a> {
    sink: MutexGuard<'a, Box<dyn Write + Send>>,
    mask: XorMask,
}

impl WriteGuard<'_> {
    /// Mask `buf` in place and write all of it.
    pub fn write_all(&mut self, buf: &mut [u8]) -> Result<()> {
        self.mask.apply(buf);

        let mut offset = 0usize;
        while offset < buf.len() {
            match self.sink.write(&buf[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => {
                    if n < buf.len() - offset {
                        trace!(written = n, remaining = buf.len() - offset, "short transport write");
                    }
                    offset += n;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match self.sink.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

impl fmt::Debug for ObfuscatedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObfuscatedWriter")
            .field("mask", &self.mask)
            .finish_non_exhaustive()
    }
}

impl<R> fmt::Debug for ObfuscatedReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObfuscatedReader")
            .field("mask", &self.mask)
            .finish_non_exhaustive()
    }
}
