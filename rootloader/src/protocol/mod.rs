//! AVRootloader wire protocol.
//!
//! - [`crc`]: CRC-16/ARC used by every frame
//! - [`frame`]: frame builders
//! - [`status`]: status reply decoding
//! - [`handshake`]: keyed INIT exchange

pub mod crc;
pub mod frame;
pub mod handshake;
pub mod status;

pub use frame::{Command, CommitFrame, SendBuffer};
pub use handshake::{Handshake, HandshakeConfig, HandshakeReply};
