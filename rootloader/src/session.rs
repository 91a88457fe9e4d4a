//! Session configuration and negotiated session state.

use std::fmt;
use std::time::Duration;

use crate::error::{ConfigError, HandshakeError};
use crate::protocol::handshake::{DEFAULT_KEY, DEFAULT_TRIGGER, HandshakeConfig, HandshakeReply};

/// Longest key or trigger the protocol accepts.
const MAX_SECRET_LEN: usize = 255;

/// Host-side configuration of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// Shared key sent in the INIT frame.
    pub key: String,
    /// Sequence announcing the bootloader reply.
    pub trigger: String,
    /// Request single-block transfers. Not implemented by the device side,
    /// the paged path is used regardless.
    pub block_mode: bool,
    /// Handshake timing.
    pub handshake: HandshakeConfig,
    /// Minimum time to wait for a status reply.
    pub reply_timeout: Duration,
    /// Reply timeout for EEPROM reads and flash verify passes.
    pub eeprom_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            trigger: DEFAULT_TRIGGER.to_string(),
            block_mode: false,
            handshake: HandshakeConfig::default(),
            reply_timeout: Duration::from_secs(1),
            eeprom_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    /// Set the bootloader key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Set the trigger sequence.
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = trigger.into();
        self
    }

    /// Request block mode.
    #[must_use]
    pub fn with_block_mode(mut self, block_mode: bool) -> Self {
        self.block_mode = block_mode;
        self
    }

    /// Set the handshake timing.
    #[must_use]
    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Set the minimum reply timeout.
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Set the EEPROM and verify reply timeout.
    #[must_use]
    pub fn with_eeprom_timeout(mut self, timeout: Duration) -> Self {
        self.eeprom_timeout = timeout;
        self
    }

    /// Check key and trigger lengths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key.is_empty() || self.key.len() > MAX_SECRET_LEN {
            return Err(ConfigError::InvalidKey(self.key.len()));
        }
        if self.trigger.is_empty() || self.trigger.len() > MAX_SECRET_LEN {
            return Err(ConfigError::InvalidTrigger(self.trigger.len()));
        }
        Ok(())
    }
}

/// Feature nibble reported by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Features(u8);

impl Features {
    /// Data is encrypted.
    pub const CRYPT: Self = Self(0x01);
    /// Flash writes must be encrypted.
    pub const CRYPT_FLASH: Self = Self(0x02);
    /// EEPROM writes must be encrypted.
    pub const CRYPT_EEPROM: Self = Self(0x04);
    /// Application versioning is enabled.
    pub const VERSIONING: Self = Self(0x08);

    /// Decode the low nibble of `bits`.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0F)
    }

    /// Raw nibble.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether all flags in `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Names of the flags that are set.
    pub fn names(self) -> Vec<&'static str> {
        [
            (Self::CRYPT, "crypt"),
            (Self::CRYPT_FLASH, "crypt-flash"),
            (Self::CRYPT_EEPROM, "crypt-eeprom"),
            (Self::VERSIONING, "versioning"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect()
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(", "))
        }
    }
}

/// State negotiated with one bootloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Protocol version.
    pub version: u8,
    /// Feature flags.
    pub features: Features,
    /// Flash pages reserved for the bootloader.
    pub boot_pages: u8,
    /// Device signature.
    pub signature: [u8; 3],
    /// Device buffer holds more than one flash page.
    pub large_buffer: bool,
    /// Page the address cursor was last set to, for read and verify.
    pub current_page: Option<usize>,
    /// Wait time for the next status reply.
    pub reply_timeout: Duration,
    /// Set when the device speaks another protocol version.
    pub version_mismatch: Option<HandshakeError>,
}

impl Session {
    /// Build a session from the handshake reply.
    pub fn new(reply: &HandshakeReply, large_buffer: bool, reply_timeout: Duration) -> Self {
        Self {
            version: reply.version,
            features: Features::from_bits(reply.features),
            boot_pages: reply.boot_pages,
            signature: reply.signature,
            large_buffer,
            current_page: None,
            reply_timeout,
            version_mismatch: reply.version_mismatch(),
        }
    }

    /// Size of the bootloader area in bytes.
    pub fn boot_size(&self, flash_page: usize) -> usize {
        usize::from(self.boot_pages) * flash_page
    }
}
