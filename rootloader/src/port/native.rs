//! Native serial port transport using the `serialport` crate.
//!
//! This module provides the transport for native platforms
//! (Linux, macOS, Windows, FreeBSD, etc.).

use {
    crate::{
        error::{Error, Result, TransportError},
        port::{
            DataBits, FlowControl, Parity, PortEnumerator, PortInfo, SerialConfig, StopBits,
            Transport,
        },
    },
    log::trace,
    serialport::ClearBuffer,
    std::{
        io::{Read, Write},
        thread,
        time::{Duration, Instant},
    },
};

/// Poll interval while waiting for input.
const PROBE_INTERVAL: Duration = Duration::from_millis(1);

/// Input must stay quiet this long before a drain is considered complete.
const DRAIN_QUIET: Duration = Duration::from_millis(250);

/// Native serial port transport.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    timeout: Duration,
    baud_rate: u32,
}

impl NativePort {
    /// Open a serial port with the given configuration.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .flow_control(config.flow_control.into())
            .open()
            .map_err(TransportError::from)?;

        Ok(Self {
            port: Some(port),
            name: config.port_name.clone(),
            timeout: config.timeout,
            baud_rate: config.baud_rate,
        })
    }

    /// Open a serial port with default settings.
    pub fn open_simple(port_name: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig::new(port_name, baud_rate);
        Self::open(&config)
    }

    /// Current baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Close the port and release resources.
    pub fn close(&mut self) {
        self.port.take();
    }

    fn port_mut(&mut self) -> std::result::Result<&mut Box<dyn serialport::SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }

    fn set_timeout(&mut self, timeout: Duration) -> std::result::Result<(), TransportError> {
        if timeout != self.timeout {
            self.port_mut()?.set_timeout(timeout)?;
            self.timeout = timeout;
        }
        Ok(())
    }
}

impl Transport for NativePort {
    fn send(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError> {
        trace!("=> {bytes:02X?}");
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn receive(
        &mut self,
        len: usize,
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        self.set_timeout(timeout)?;
        let mut buf = vec![0u8; len];
        match self.port_mut()?.read_exact(&mut buf) {
            Ok(()) => {
                trace!("<= {buf:02X?}");
                Ok(buf)
            },
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(TransportError::Timeout),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn probe(&mut self, timeout: Duration) -> std::result::Result<bool, TransportError> {
        let start = Instant::now();
        let port = self.port_mut()?;
        loop {
            if port.bytes_to_read()? > 0 {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            thread::sleep(PROBE_INTERVAL);
        }
    }

    fn drain(&mut self) -> std::result::Result<(), TransportError> {
        self.port_mut()?.clear(ClearBuffer::Input)?;

        // A running device may keep talking for a moment.
        let mut discarded = 0usize;
        while self.probe(DRAIN_QUIET)? {
            let port = self.port_mut()?;
            let pending = usize::try_from(port.bytes_to_read()?).unwrap_or(usize::MAX);
            let mut buf = vec![0u8; pending.max(1)];
            discarded += port.read(&mut buf)?;
        }
        if discarded > 0 {
            trace!("Drained {discarded} stale bytes");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Native port enumerator.
pub struct NativePortEnumerator;

impl PortEnumerator for NativePortEnumerator {
    fn list_ports() -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(|e| Error::Transport(e.into()))?;

        Ok(ports
            .into_iter()
            .map(|p| {
                let (vid, pid, manufacturer, product, serial_number) = match &p.port_type {
                    serialport::SerialPortType::UsbPort(info) => (
                        Some(info.vid),
                        Some(info.pid),
                        info.manufacturer.clone(),
                        info.product.clone(),
                        info.serial_number.clone(),
                    ),
                    _ => (None, None, None, None, None),
                };

                PortInfo {
                    name: p.port_name,
                    vid,
                    pid,
                    manufacturer,
                    product,
                    serial_number,
                }
            })
            .collect())
    }
}

// Type conversions from our types to serialport types

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => Self::Seven,
            DataBits::Eight => Self::Eight,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => Self::One,
            StopBits::Two => Self::Two,
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => Self::None,
            FlowControl::Hardware => Self::Hardware,
            FlowControl::Software => Self::Software,
        }
    }
}
