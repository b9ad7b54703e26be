use std::time::Duration;

use muxlink_frame::{HEADER_SIZE, MAX_CHANNELS, MAX_PAYLOAD};
use muxlink_transport::{XorMask, DEFAULT_MASK};
use serde::{Deserialize, Serialize};

use crate::error::{MuxError, Result};

/// Default relay buffer: header plus chunk fits in 4 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4096 - HEADER_SIZE;

/// Idle read deadline on local streams.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 20 * 60;

/// Payloads buffered per channel before the dispatch loop blocks.
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Tunables for one shared transport.
///
/// Both peers must agree on `mask`. All other fields are local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MuxConfig {
    /// XOR byte applied to all traffic on the shared transport.
    pub mask: u8,
    /// Maximum bytes read from a local stream per frame.
    pub chunk_size: usize,
    /// Idle read deadline for local streams, in seconds.
    pub idle_timeout_secs: u64,
    /// Delivery queue depth per channel (0 = rendezvous).
    pub queue_depth: usize,
    /// Number of channel slots.
    pub max_channels: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            mask: DEFAULT_MASK,
            chunk_size: DEFAULT_CHUNK_SIZE,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_channels: MAX_CHANNELS,
        }
    }
}

impl MuxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_PAYLOAD {
            return Err(MuxError::Config(format!(
                "chunk_size must be within 1..={MAX_PAYLOAD} (got {})",
                self.chunk_size
            )));
        }
        if self.idle_timeout_secs == 0 {
            return Err(MuxError::Config(
                "idle_timeout_secs must be positive".to_string(),
            ));
        }
        if self.max_channels == 0 || self.max_channels > MAX_CHANNELS {
            return Err(MuxError::Config(format!(
                "max_channels must be within 1..={MAX_CHANNELS} (got {})",
                self.max_channels
            )));
        }
        Ok(())
    }

    pub fn xor_mask(&self) -> XorMask {
        XorMask::new(self.mask)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
