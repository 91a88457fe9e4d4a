//! CRC-16 used by every AVRootloader frame.
//!
//! Reflected polynomial 0xA001 (bit-reversed 0x8005), initial value 0 and no
//! final XOR, also known as CRC-16/ARC. Trailers go on the wire low byte first.

/// Reflected polynomial.
pub const POLY: u16 = 0xA001;

/// Feed one byte into a running CRC.
pub fn crc16_step(crc: u16, byte: u8) -> u16 {
    let mut crc = crc ^ u16::from(byte);
    for _ in 0..8 {
        crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
    }
    crc
}

/// CRC over a whole byte slice, starting from zero.
pub fn crc16(data: &[u8]) -> u16 {
    crc16_update(0, data)
}

/// Continue a running CRC over more bytes.
pub fn crc16_update(crc: u16, data: &[u8]) -> u16 {
    data.iter().fold(crc, |crc, &byte| crc16_step(crc, byte))
}
