//! Channel-addressed framing over the shared transport.
//!
//! Every frame is a 4-byte header followed by its payload:
//! - A 2-byte big-endian channel identifier
//! - A 2-byte big-endian payload length
//!
//! A zero length is the close signal for the channel and carries no payload.
//! There is no explicit open message; a channel opens the first time a
//! non-empty frame references it.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameHeader, HEADER_SIZE, MAX_CHANNELS, MAX_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::{FrameSink, FrameWriter};
