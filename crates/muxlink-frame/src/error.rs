use muxlink_transport::TransportError;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the 16-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A prepared buffer is too short to hold the frame header.
    #[error("buffer of {size} bytes has no room for the frame header")]
    NoHeaderRoom { size: usize },

    /// The shared transport failed while reading or writing a frame.
    #[error("frame transport error: {0}")]
    Transport(#[from] TransportError),
}

impl FrameError {
    /// True when the peer closed the shared transport.
    pub fn is_closed(&self) -> bool {
        matches!(self, FrameError::Transport(TransportError::Closed))
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
