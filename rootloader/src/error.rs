//! Error types for rootloader.
//!
//! Each layer of the driver has its own error enum; [`Error`] aggregates them
//! so callers can use `?` across layers and still match on the precise cause.

use std::io;
use thiserror::Error;

use crate::protocol::frame::Command;
use crate::target::MemoryKind;

/// Result type for rootloader operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for rootloader operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Byte transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Session handshake failure.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// A frame could not be built.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Data received from the device failed validation.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Write request not supported for the memory.
    #[error(transparent)]
    Write(#[from] WriteError),

    /// Read request not supported for the memory.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// The device rejected a command.
    #[error("{command} rejected by device: {source}")]
    Rejected {
        /// Command whose status reply was not successful.
        command: Command,
        /// Decoded status code.
        #[source]
        source: StatusError,
    },

    /// Invalid session configuration or memory descriptor.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An operation needs an established session.
    #[error("Not connected to bootloader")]
    NotConnected,

    /// Device signature does not match the selected part.
    #[error("Signature mismatch: expected {expected:02X?}, device reports {actual:02X?}")]
    SignatureMismatch {
        /// Signature of the selected part.
        expected: [u8; 3],
        /// Signature reported during the handshake.
        actual: [u8; 3],
    },

    /// Firmware image could not be loaded.
    #[error("Invalid image: {0}")]
    Image(String),

    /// I/O error (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No data arrived within the allotted time.
    #[error("Timeout waiting for device")]
    Timeout,

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Port was closed.
    #[error("Port is closed")]
    Closed,
}

/// Handshake errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The trial budget was exhausted before the trigger was seen.
    #[error("Timeout while contacting bootloader after {trials} failed trials")]
    Timeout {
        /// Number of failed trials counted.
        trials: u32,
    },

    /// The reply ended with a byte outside the success class.
    #[error("Unexpected bootloader response {0:#04x}")]
    UnexpectedTerminator(u8),

    /// The bootloader reports a different protocol version.
    ///
    /// Only reported as a diagnostic, the session stays usable.
    #[error("Unexpected bootloader version {found} (expected {expected})")]
    VersionMismatch {
        /// Version this driver was written against.
        expected: u8,
        /// Version reported by the device.
        found: u8,
    },
}

/// Frame building errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// SENDBUF payload does not fit the 16-bit length field.
    #[error("Payload of {len} bytes does not fit a SENDBUF frame")]
    PayloadTooLarge {
        /// Length of the rejected payload.
        len: usize,
    },

    /// Address does not fit the 24-bit address field.
    #[error("Address {0:#x} does not fit in 24 bits")]
    AddressOutOfRange(u32),
}

/// Errors on data received from the device.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// A received block does not match its CRC trailer. Retry the whole read.
    #[error("CRC mismatch in block at {offset:#x}: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch {
        /// Offset of the block inside the region.
        offset: usize,
        /// CRC sent by the device.
        expected: u16,
        /// CRC computed over the received block.
        actual: u16,
    },
}

/// Unsupported or invalid write requests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// The memory cannot be written this way.
    #[error("{operation} is not supported for {kind} memory")]
    Unsupported {
        /// Memory targeted by the request.
        kind: MemoryKind,
        /// Rejected operation.
        operation: &'static str,
    },

    /// Data does not fit in the region.
    #[error("{len} bytes at {addr:#x} exceed {kind} memory of {size} bytes")]
    OutOfRange {
        /// Memory targeted by the request.
        kind: MemoryKind,
        /// Start address of the request.
        addr: usize,
        /// Length of the request.
        len: usize,
        /// Size of the region.
        size: usize,
    },
}

/// Unsupported or invalid read requests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// Flash cannot be read back before it was written in this session.
    #[error("Reading {0} memory is not supported by this bootloader - only verify works")]
    UnsupportedByDevice(MemoryKind),

    /// Request exceeds the region.
    #[error("{len} bytes at {addr:#x} exceed {kind} memory of {size} bytes")]
    OutOfRange {
        /// Memory targeted by the request.
        kind: MemoryKind,
        /// Start address of the request.
        addr: usize,
        /// Length of the request.
        len: usize,
        /// Size of the region.
        size: usize,
    },
}

/// Status codes other than success returned after a command.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StatusError {
    /// Device-side compare failed (0xC0).
    #[error("Verification error")]
    Verification,
    /// Command byte not recognized (0xC1).
    #[error("Unknown command error")]
    UnknownCommand,
    /// Frame CRC did not match (0xC2).
    #[error("CRC error")]
    Crc,
    /// Address outside the writable area (0xC3).
    #[error("Boundary error")]
    Boundary,
    /// Decryption failed (0xC4).
    #[error("Decryption error")]
    Decryption,
    /// Flash or EEPROM programming failed (0xC5).
    #[error("Programming error")]
    Programming,
    /// Protocol version not accepted (0xC6).
    #[error("Wrong version error")]
    WrongVersion,
    /// Any other byte.
    #[error("Unknown error, code {0:#04x}")]
    Unknown(u8),
}

/// Session configuration and descriptor validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Key is empty or longer than 255 bytes.
    #[error("Bootloader key must be 1 to 255 bytes, got {0}")]
    InvalidKey(usize),

    /// Trigger is empty or longer than 255 bytes.
    #[error("Trigger sequence must be 1 to 255 bytes, got {0}")]
    InvalidTrigger(usize),

    /// Memory region has a zero or non-dividing page size.
    #[error("Invalid {kind} region: size {size}, page size {page_size}")]
    InvalidRegion {
        /// Offending region.
        kind: MemoryKind,
        /// Region size.
        size: usize,
        /// Region page size.
        page_size: usize,
    },

    /// Unknown part name.
    #[error("Unknown part: {0}")]
    UnknownPart(String),
}
