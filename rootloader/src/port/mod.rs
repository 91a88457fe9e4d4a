//! Byte transport abstraction.
//!
//! The protocol engine never touches a serial port directly. It talks to a
//! [`Transport`], which only has to move bytes and report whether input is
//! pending:
//!
//! ```text
//! +------------------+
//! |     Flasher      |   handshake, paged transfers
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! | Transport trait  |   send / receive / probe / drain
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |    NativePort    |   serialport crate
//! +------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use rootloader::port::Transport;
//!
//! fn ping<T: Transport>(port: &mut T) -> Result<Vec<u8>, rootloader::TransportError> {
//!     port.send(b"\x00\x0d")?;
//!     if port.probe(Duration::from_millis(50))? {
//!         return port.receive(1, Duration::from_millis(100));
//!     }
//!     Ok(Vec::new())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use crate::error::{Result, TransportError};

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Default read timeout.
    pub timeout: Duration,
    /// Data bits (typically 8).
    pub data_bits: DataBits,
    /// Parity (typically None).
    pub parity: Parity,
    /// Stop bits (typically One).
    pub stop_bits: StopBits,
    /// Flow control (typically None).
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115200,
            timeout: Duration::from_millis(1000),
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Number of data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// 1 stop bit.
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// Hardware flow control (RTS/CTS).
    Hardware,
    /// Software flow control (XON/XOFF).
    Software,
}

/// Serial port information.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// Half-duplex byte transport used by the protocol engine.
///
/// Every blocking call takes an explicit timeout; running out of time is
/// reported as [`TransportError::Timeout`].
pub trait Transport {
    /// Write all bytes.
    fn send(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError>;

    /// Read exactly `len` bytes, waiting at most `timeout`.
    fn receive(
        &mut self,
        len: usize,
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, TransportError>;

    /// Wait up to `timeout` for input. Returns `true` if bytes are available.
    fn probe(&mut self, timeout: Duration) -> std::result::Result<bool, TransportError>;

    /// Discard any pending input.
    fn drain(&mut self) -> std::result::Result<(), TransportError>;

    /// Human readable name of the underlying port.
    fn name(&self) -> &str {
        "transport"
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError> {
        (**self).send(bytes)
    }

    fn receive(
        &mut self,
        len: usize,
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        (**self).receive(len, timeout)
    }

    fn probe(&mut self, timeout: Duration) -> std::result::Result<bool, TransportError> {
        (**self).probe(timeout)
    }

    fn drain(&mut self) -> std::result::Result<(), TransportError> {
        (**self).drain()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Trait for listing available serial ports.
///
/// This is separated from `Transport` because it's a static operation that
/// doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;

    /// Find ports matching the given VID/PID.
    fn find_by_vid_pid(vid: u16, pid: u16) -> Result<Vec<PortInfo>> {
        let ports = Self::list_ports()?;
        Ok(ports
            .into_iter()
            .filter(|p| p.vid == Some(vid) && p.pid == Some(pid))
            .collect())
    }
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
