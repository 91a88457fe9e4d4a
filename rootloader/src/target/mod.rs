//! Target memory descriptions.
//!
//! The protocol engine does not know any particular device. Everything it
//! needs about the target comes in through a [`MemoryRegion`]: the kind of
//! memory, its size, page size, base offset, write timing and the capacity
//! of the device's transfer buffer. [`part`] ships descriptors for common
//! parts.

pub mod part;

use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

pub use part::Part;

/// Memory addressed by a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MemoryKind {
    /// Program flash. Write-only from the host's point of view.
    Flash,
    /// Data EEPROM. Readable and writable.
    Eeprom,
}

impl MemoryKind {
    /// Get the memory kind from its name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "flash" | "program" => Some(Self::Flash),
            "eeprom" | "data" => Some(Self::Eeprom),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flash => write!(f, "flash"),
            Self::Eeprom => write!(f, "eeprom"),
        }
    }
}

/// Read-only description of one target memory.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryRegion {
    /// Memory kind.
    pub kind: MemoryKind,
    /// Total size in bytes.
    pub size: usize,
    /// Page size in bytes.
    pub page_size: usize,
    /// Base address of the region.
    pub offset: u32,
    /// Worst case programming time per byte.
    pub max_write_delay: Duration,
    /// Bytes the device can buffer in one transfer.
    pub buffer_size: usize,
}

impl MemoryRegion {
    /// Create a region with no write delay and a one page buffer.
    pub fn new(kind: MemoryKind, size: usize, page_size: usize) -> Self {
        Self {
            kind,
            size,
            page_size,
            offset: 0,
            max_write_delay: Duration::ZERO,
            buffer_size: page_size,
        }
    }

    /// Set the base offset.
    #[must_use]
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Set the per-byte write delay hint.
    #[must_use]
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.max_write_delay = delay;
        self
    }

    /// Set the device transfer buffer capacity.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Check that the page size is non-zero and divides the region size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.size == 0 || self.size % self.page_size != 0 {
            return Err(ConfigError::InvalidRegion {
                kind: self.kind,
                size: self.size,
                page_size: self.page_size,
            });
        }
        Ok(())
    }

    /// Whether the device buffer holds more than one page.
    pub fn large_buffer(&self) -> bool {
        self.buffer_size > self.page_size
    }

    /// Number of pages in the region.
    pub fn pages(&self) -> usize {
        self.size / self.page_size.max(1)
    }

    /// Address the device expects for a byte offset into this region.
    ///
    /// Flash is addressed in 16-bit words, EEPROM in bytes.
    pub fn device_address(&self, byte_offset: usize) -> u32 {
        let addr = self.offset as usize + byte_offset;
        let addr = match self.kind {
            MemoryKind::Flash => addr >> 1,
            MemoryKind::Eeprom => addr,
        };
        u32::try_from(addr).unwrap_or(u32::MAX)
    }
}
