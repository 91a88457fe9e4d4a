//! Single-byte status replies.
//!
//! The bootloader answers every command with one byte: `0x30` for success or
//! one of the `0xC0..=0xC6` error codes.

use crate::error::StatusError;

/// Success reply.
pub const SUCCESS: u8 = 0x30;

/// Verification error.
pub const ERR_VERIFY: u8 = 0xC0;
/// Unknown command.
pub const ERR_COMMAND: u8 = 0xC1;
/// CRC error.
pub const ERR_CRC: u8 = 0xC2;
/// Boundary error.
pub const ERR_BOUNDARY: u8 = 0xC3;
/// Decryption error.
pub const ERR_DECRYPT: u8 = 0xC4;
/// Programming error.
pub const ERR_PROGRAMMING: u8 = 0xC5;
/// Wrong protocol version.
pub const ERR_VERSION: u8 = 0xC6;

/// Decode a status byte.
pub fn interpret(byte: u8) -> Result<(), StatusError> {
    match byte {
        SUCCESS => Ok(()),
        ERR_VERIFY => Err(StatusError::Verification),
        ERR_COMMAND => Err(StatusError::UnknownCommand),
        ERR_CRC => Err(StatusError::Crc),
        ERR_BOUNDARY => Err(StatusError::Boundary),
        ERR_DECRYPT => Err(StatusError::Decryption),
        ERR_PROGRAMMING => Err(StatusError::Programming),
        ERR_VERSION => Err(StatusError::WrongVersion),
        other => Err(StatusError::Unknown(other)),
    }
}

impl StatusError {
    /// Raw status byte for this error.
    pub fn code(self) -> u8 {
        match self {
            Self::Verification => ERR_VERIFY,
            Self::UnknownCommand => ERR_COMMAND,
            Self::Crc => ERR_CRC,
            Self::Boundary => ERR_BOUNDARY,
            Self::Decryption => ERR_DECRYPT,
            Self::Programming => ERR_PROGRAMMING,
            Self::WrongVersion => ERR_VERSION,
            Self::Unknown(code) => code,
        }
    }
}
