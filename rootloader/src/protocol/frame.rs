//! AVRootloader command frames.
//!
//! Every frame ends with a CRC-16 trailer (low byte first) computed over the
//! bytes that precede it. Data transfers are split in two writes: a SENDBUF
//! header announcing the length, then the data followed by its own CRC.
//!
//! ```text
//! Commit frames (4 bytes):
//! +--------+-------+--------+
//! | Opcode | Param | CRC16  |
//! +--------+-------+--------+
//!
//! SENDBUF header (6 bytes), then data:
//! +------+------+----------+--------+     +-----------+--------+
//! | 0xFE | 0x00 | len (BE) | CRC16  | ... |   data    | CRC16  |
//! +------+------+----------+--------+     +-----------+--------+
//!
//! SET-ADDRESS (6 bytes):
//! +------+----------------+--------+
//! | 0xFF | address (BE24) | CRC16  |
//! +------+----------------+--------+
//!
//! INIT:
//! +-------------------+---------+--------+
//! | 9 x 0x00, 0x0D    |   key   | CRC16  |
//! +-------------------+---------+--------+
//! ```

use std::fmt;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::FrameError;
use crate::protocol::crc::{crc16, crc16_update};

/// Hello pattern that precedes the key in the INIT frame.
pub const HELLO: [u8; 10] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0D];

/// Length of a commit frame.
pub const COMMIT_FRAME_LEN: usize = 4;

/// Length of the SENDBUF header.
pub const SENDBUF_HEADER_LEN: usize = 6;

/// Length of the SET-ADDRESS frame.
pub const SET_ADDRESS_LEN: usize = 6;

/// Length of a CRC trailer.
pub const CRC_LEN: usize = 2;

/// Largest data length a SENDBUF header can announce.
pub const MAX_SENDBUF_DATA: usize = u16::MAX as usize;

/// Largest address the SET-ADDRESS frame can carry.
pub const MAX_ADDRESS: u32 = 0x00FF_FFFF;

/// Wire opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Program the transfer buffer into flash.
    WriteFlash = 0x01,
    /// Erase pages starting at the current address.
    ErasePages = 0x02,
    /// Compare the transfer buffer against flash.
    VerifyFlash = 0x03,
    /// Read one block of EEPROM.
    ReadEeprom = 0x04,
    /// Program the transfer buffer into EEPROM.
    WriteEeprom = 0x05,
    /// Fill the transfer buffer.
    SendBuffer = 0xFE,
    /// Move the device address pointer.
    SetAddress = 0xFF,
}

impl Command {
    /// Opcode byte.
    pub fn opcode(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WriteFlash => "WRITE FLASH",
            Self::ErasePages => "ERASE PAGES",
            Self::VerifyFlash => "VERIFY FLASH",
            Self::ReadEeprom => "READ EEPROM",
            Self::WriteEeprom => "WRITE EEPROM",
            Self::SendBuffer => "FILL BUFFER",
            Self::SetAddress => "SET ADDRESS",
        };
        f.write_str(name)
    }
}

/// Encode a CRC as its on-wire trailer.
pub fn crc_trailer(crc: u16) -> [u8; CRC_LEN] {
    let mut trailer = [0u8; CRC_LEN];
    LittleEndian::write_u16(&mut trailer, crc);
    trailer
}

/// Short fixed-length frame carrying one parameter byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitFrame {
    command: Command,
    param: u8,
}

impl CommitFrame {
    /// Create a commit frame.
    pub fn new(command: Command, param: u8) -> Self {
        Self { command, param }
    }

    /// WRITEFLASH commit.
    pub fn write_flash() -> Self {
        Self::new(Command::WriteFlash, 0x01)
    }

    /// VERIFYFLASH commit.
    pub fn verify_flash() -> Self {
        Self::new(Command::VerifyFlash, 0x01)
    }

    /// WRITEE commit.
    pub fn write_eeprom() -> Self {
        Self::new(Command::WriteEeprom, 0x01)
    }

    /// READEEPROM request.
    pub fn read_eeprom() -> Self {
        Self::new(Command::ReadEeprom, 0x00)
    }

    /// ERASEPAGES commit for `pages` pages.
    pub fn erase_pages(pages: u8) -> Self {
        Self::new(Command::ErasePages, pages)
    }

    /// Command carried by this frame.
    pub fn command(&self) -> Command {
        self.command
    }

    /// Parameter byte.
    pub fn param(&self) -> u8 {
        self.param
    }

    /// Serialize the frame.
    pub fn build(&self) -> [u8; COMMIT_FRAME_LEN] {
        let mut frame = [self.command.opcode(), self.param, 0, 0];
        let crc = crc16(&frame[..2]);
        LittleEndian::write_u16(&mut frame[2..], crc);
        frame
    }
}

/// Data transfer into the device transfer buffer.
#[derive(Debug, Clone, Copy)]
pub struct SendBuffer<'a> {
    data: &'a [u8],
}

impl<'a> SendBuffer<'a> {
    /// Wrap `data`, checking that its length fits the header.
    pub fn new(data: &'a [u8]) -> Result<Self, FrameError> {
        if data.len() > MAX_SENDBUF_DATA {
            return Err(FrameError::PayloadTooLarge { len: data.len() });
        }
        Ok(Self { data })
    }

    /// Header announcing the data length.
    #[allow(clippy::cast_possible_truncation)] // Checked in new()
    pub fn header(&self) -> [u8; SENDBUF_HEADER_LEN] {
        let mut header = [Command::SendBuffer.opcode(), 0x00, 0, 0, 0, 0];
        BigEndian::write_u16(&mut header[2..4], self.data.len() as u16);
        let crc = crc16(&header[..4]);
        LittleEndian::write_u16(&mut header[4..], crc);
        header
    }

    /// Data with its CRC trailer appended.
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.data.len() + CRC_LEN);
        payload.extend_from_slice(self.data);
        payload.extend_from_slice(&crc_trailer(crc16(self.data)));
        payload
    }
}

/// Build the SET-ADDRESS frame.
pub fn set_address(addr: u32) -> Result<[u8; SET_ADDRESS_LEN], FrameError> {
    if addr > MAX_ADDRESS {
        return Err(FrameError::AddressOutOfRange(addr));
    }
    let mut frame = [Command::SetAddress.opcode(), 0, 0, 0, 0, 0];
    BigEndian::write_u24(&mut frame[1..4], addr);
    let crc = crc16(&frame[..4]);
    LittleEndian::write_u16(&mut frame[4..], crc);
    Ok(frame)
}

/// Build the INIT frame for `key`.
pub fn init(key: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HELLO.len() + key.len() + CRC_LEN);
    frame.extend_from_slice(&HELLO);
    frame.extend_from_slice(key);
    let crc = crc16_update(crc16(&HELLO), key);
    frame.extend_from_slice(&crc_trailer(crc));
    frame
}
