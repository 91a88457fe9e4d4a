//! Built-in part table.
//!
//! Descriptors for AVR parts commonly shipped with AVRootloader. The flash
//! and EEPROM figures follow the datasheets; write delays are the worst case
//! per-byte programming times.

use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;
use crate::target::{MemoryKind, MemoryRegion};

/// Flash programming time per byte.
const FLASH_WRITE_DELAY: Duration = Duration::from_micros(4500);

/// EEPROM programming time per byte.
const EEPROM_WRITE_DELAY: Duration = Duration::from_micros(3600);

/// A supported microcontroller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    /// Canonical lowercase name.
    pub name: &'static str,
    /// Display name.
    pub description: &'static str,
    /// Device signature.
    pub signature: [u8; 3],
    /// SRAM size in bytes.
    pub sram: usize,
    /// Flash size in bytes.
    pub flash_size: usize,
    /// Flash page size in bytes.
    pub flash_page: usize,
    /// EEPROM size in bytes.
    pub eeprom_size: usize,
    /// EEPROM page size in bytes.
    pub eeprom_page: usize,
}

/// Parts known to this crate.
pub const PARTS: &[Part] = &[
    Part {
        name: "atmega8",
        description: "ATmega8",
        signature: [0x1E, 0x93, 0x07],
        sram: 1024,
        flash_size: 8 * 1024,
        flash_page: 64,
        eeprom_size: 512,
        eeprom_page: 4,
    },
    Part {
        name: "atmega88",
        description: "ATmega88",
        signature: [0x1E, 0x93, 0x0A],
        sram: 1024,
        flash_size: 8 * 1024,
        flash_page: 64,
        eeprom_size: 512,
        eeprom_page: 4,
    },
    Part {
        name: "atmega168",
        description: "ATmega168",
        signature: [0x1E, 0x94, 0x06],
        sram: 1024,
        flash_size: 16 * 1024,
        flash_page: 128,
        eeprom_size: 512,
        eeprom_page: 4,
    },
    Part {
        name: "atmega32",
        description: "ATmega32",
        signature: [0x1E, 0x95, 0x02],
        sram: 2048,
        flash_size: 32 * 1024,
        flash_page: 128,
        eeprom_size: 1024,
        eeprom_page: 4,
    },
    Part {
        name: "atmega328p",
        description: "ATmega328P",
        signature: [0x1E, 0x95, 0x0F],
        sram: 2048,
        flash_size: 32 * 1024,
        flash_page: 128,
        eeprom_size: 1024,
        eeprom_page: 4,
    },
    Part {
        name: "atmega644p",
        description: "ATmega644P",
        signature: [0x1E, 0x96, 0x0A],
        sram: 4096,
        flash_size: 64 * 1024,
        flash_page: 256,
        eeprom_size: 2048,
        eeprom_page: 8,
    },
    Part {
        name: "atmega1284p",
        description: "ATmega1284P",
        signature: [0x1E, 0x97, 0x05],
        sram: 16 * 1024,
        flash_size: 128 * 1024,
        flash_page: 256,
        eeprom_size: 4096,
        eeprom_page: 8,
    },
    Part {
        name: "attiny85",
        description: "ATtiny85",
        signature: [0x1E, 0x93, 0x0B],
        sram: 512,
        flash_size: 8 * 1024,
        flash_page: 64,
        eeprom_size: 512,
        eeprom_page: 4,
    },
];

impl Part {
    /// Look up a part by name, ignoring case.
    pub fn from_name(name: &str) -> Result<&'static Self, ConfigError> {
        let lower = name.to_lowercase();
        PARTS
            .iter()
            .find(|p| p.name == lower)
            .ok_or_else(|| ConfigError::UnknownPart(name.to_string()))
    }

    /// Look up a part by its signature.
    pub fn from_signature(signature: [u8; 3]) -> Option<&'static Self> {
        PARTS.iter().find(|p| p.signature == signature)
    }

    /// Bytes the bootloader can buffer for one transfer of `page_size`.
    ///
    /// The bootloader keeps one page of SRAM for itself. Devices whose SRAM
    /// does not exceed a page still take one page.
    pub fn transfer_capacity(&self, page_size: usize) -> usize {
        if self.sram > page_size {
            self.sram - page_size
        } else {
            page_size
        }
    }

    /// Block size of one READEEPROM reply.
    pub fn eeprom_read_block(&self) -> usize {
        self.flash_page * 2
    }

    /// Flash region descriptor.
    pub fn flash(&self) -> MemoryRegion {
        MemoryRegion::new(MemoryKind::Flash, self.flash_size, self.flash_page)
            .with_write_delay(FLASH_WRITE_DELAY)
            .with_buffer_size(self.transfer_capacity(self.flash_page))
    }

    /// EEPROM region descriptor.
    pub fn eeprom(&self) -> MemoryRegion {
        MemoryRegion::new(MemoryKind::Eeprom, self.eeprom_size, self.eeprom_page)
            .with_write_delay(EEPROM_WRITE_DELAY)
            .with_buffer_size(self.transfer_capacity(self.eeprom_page))
    }

    /// Region descriptor for `kind`.
    pub fn region(&self, kind: MemoryKind) -> MemoryRegion {
        match kind {
            MemoryKind::Flash => self.flash(),
            MemoryKind::Eeprom => self.eeprom(),
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description)
    }
}
