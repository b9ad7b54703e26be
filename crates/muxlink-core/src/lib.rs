//! Multiplexing engine for muxlink.
//!
//! Many logical channels share one obfuscated transport. This crate owns the
//! pieces between the frame layer and the bootstrap code:
//! - [`ChannelPool`]: the fixed-capacity slot arena with its free list
//! - channel relays: two threads per channel, local → remote and remote → local
//! - [`Dispatcher`]: the single reader of the shared transport
//! - [`Bundle`]: one shared transport with its pool, ready to run

pub mod bundle;
mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod pool;
pub mod stats;
#[cfg(all(test, unix))]
mod testutil;

pub use bundle::Bundle;
pub use config::MuxConfig;
pub use dispatch::{Dialer, Dispatcher, NoDialer, TcpDialer};
pub use error::{MuxError, Result};
pub use pool::{Channel, ChannelPool, ChannelRef};
pub use stats::{SessionStats, StatsSnapshot};
