//! Multiplex many TCP connections over one obfuscated link.
//!
//! # Crate Structure
//!
//! - [`transport`]: XOR-masked shared transport and TCP helpers
//! - [`frame`]: the 4-byte header framing on the shared transport
//! - [`mux`]: channel pool, relays, dispatch loop and [`mux::Bundle`]

/// Re-export transport types.
pub mod transport {
    pub use muxlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use muxlink_frame::*;
}

/// Re-export the multiplexing engine.
pub mod mux {
    pub use muxlink_core::*;
}
