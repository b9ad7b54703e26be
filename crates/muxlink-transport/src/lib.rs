//! Shared-transport plumbing for muxlink.
//!
//! Provides the lowest layer of the multiplexer:
//! - A byte-wise XOR obfuscation applied to every byte on the shared link
//! - Read/write halves of the shared transport (single reader, locked writers)
//! - The [`LocalStream`] abstraction for backend and consumer sockets
//! - TCP listen/accept/connect helpers used by the bootstrap layer
//!
//! The obfuscation is not a security boundary. It only keeps the traffic from
//! being trivially readable on the wire.

pub mod error;
pub mod mask;
pub mod obfuscated;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use mask::{XorMask, DEFAULT_MASK};
pub use obfuscated::{obfuscate, ObfuscatedReader, ObfuscatedWriter, WriteGuard};
pub use traits::LocalStream;
