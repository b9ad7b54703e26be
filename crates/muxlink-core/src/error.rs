use muxlink_frame::FrameError;
use muxlink_transport::TransportError;

/// Errors that can occur in the multiplexing engine.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// Transport-level error (socket setup or the shared link).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error on the shared link.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Every channel slot is in use.
    #[error("channel capacity exhausted")]
    CapacityExhausted,

    /// The requested channel slot is already active.
    #[error("channel {0} already active")]
    ChannelBusy(u16),

    /// The identifier lies beyond the pool capacity.
    #[error("channel {id} outside pool capacity {capacity}")]
    OutOfRange { id: u16, capacity: usize },

    /// The dial target for a remote-originated channel is unreachable.
    #[error("dial {addr} failed: {source}")]
    Dial {
        addr: String,
        #[source]
        source: TransportError,
    },

    /// The process has no dial target for remote-originated channels.
    #[error("no dial target configured")]
    NoTarget,

    /// An I/O error on a local-side stream.
    #[error("local stream error: {0}")]
    Local(std::io::Error),

    /// A relay thread could not be started.
    #[error("failed to spawn relay thread: {0}")]
    Spawn(std::io::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MuxError {
    /// True when the error ends the whole multiplexing session.
    pub fn is_transport_fatal(&self) -> bool {
        matches!(self, MuxError::Transport(_) | MuxError::Frame(_))
    }
}

pub type Result<T> = std::result::Result<T, MuxError>;
