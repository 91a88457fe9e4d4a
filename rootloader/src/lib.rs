//! # rootloader
//!
//! A host-side driver for the AVRootloader serial bootloader.
//!
//! This crate provides the protocol engine used to program AVR
//! microcontrollers running AVRootloader over a serial link:
//!
//! - Keyed handshake that resynchronizes on a noisy line
//! - CRC-16 protected command frames
//! - Paged flash and EEPROM writes, device-side flash verify
//! - EEPROM reads with per-block CRC checks
//! - Built-in part table and raw/Intel HEX image loading
//!
//! Flash cannot be read back through this bootloader. Flash reads are served
//! from a copy of the image written in the current session.
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `serde`: Serialization support for configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use rootloader::{Flasher, Part, SessionConfig, image};
//! use rootloader::port::SerialConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let part = Part::from_name("atmega328p")?;
//!     let flash = part.flash();
//!     let firmware = image::load("firmware.hex", flash.size)?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let serial = SerialConfig::new("/dev/ttyUSB0", 115200);
//!         let mut flasher = Flasher::open(&serial, SessionConfig::default(), flash.clone())?;
//!         flasher.connect()?;
//!         flasher.check_signature(part.signature)?;
//!
//!         flasher.write_region(&flash, &firmware, |done, total| {
//!             println!("Flashing: {done}/{total}");
//!         })?;
//!         flasher.verify_region(&flash, None, |_, _| {})?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod flasher;
pub mod image;
pub mod port;
pub mod protocol;
pub mod session;
pub mod target;
pub mod transfer;

// Re-exports for convenience
// Native-specific re-exports
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    error::{
        ConfigError, Error, FrameError, HandshakeError, ReadError, Result, StatusError,
        TransferError, TransportError, WriteError,
    },
    flasher::Flasher,
    image::ImageFormat,
    port::{PortEnumerator, PortInfo, SerialConfig, Transport},
    protocol::{Command, HandshakeConfig},
    session::{Features, Session, SessionConfig},
    target::{MemoryKind, MemoryRegion, Part},
};
