//! AVRootloader flasher.
//!
//! [`Flasher`] owns the transport and all session state: the negotiated
//! [`Session`], the flash shadow buffer and the EEPROM cache. Every transfer
//! follows the same request/reply pattern:
//!
//! ```text
//! SET ADDRESS  ->  status
//! FILL BUFFER  ->  status  \
//! commit       ->  status  /  once per chunk
//! ```
//!
//! Flash cannot be read back. A verify pass resends the image with
//! VERIFYFLASH commits and the device compares, reads are served from the
//! copy of the last image written in this session.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rootloader::{Flasher, MemoryKind, Part, SessionConfig};
//! use rootloader::port::{NativePort, SerialConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let part = Part::from_name("atmega328p")?;
//!     let port = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 115200))?;
//!     let mut flasher = Flasher::new(port, SessionConfig::default(), part.flash())?;
//!
//!     flasher.connect()?;
//!     flasher.check_signature(part.signature)?;
//!
//!     let image = std::fs::read("firmware.bin")?;
//!     flasher.write_region(&part.flash(), &image, |done, total| {
//!         println!("{done}/{total}");
//!     })?;
//!     flasher.verify_region(&part.region(MemoryKind::Flash), None, |_, _| {})?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, trace, warn};

use crate::error::{Error, ReadError, Result, TransferError, WriteError};
use crate::port::Transport;
use crate::protocol::crc::crc16;
use crate::protocol::frame::{self, CRC_LEN, Command, CommitFrame, SendBuffer};
use crate::protocol::handshake::Handshake;
use crate::protocol::status;
use crate::session::{Session, SessionConfig};
use crate::target::{MemoryKind, MemoryRegion};
use crate::transfer::{self, Chunks, FILL};

/// AVRootloader client.
///
/// Generic over the transport `T`, so the protocol engine can run on a real
/// serial port or on a scripted transport in tests.
pub struct Flasher<T: Transport> {
    port: T,
    config: SessionConfig,
    flash: MemoryRegion,
    session: Option<Session>,
    shadow: Option<Vec<u8>>,
    eeprom_cache: Option<Vec<u8>>,
}

impl<T: Transport> Flasher<T> {
    /// Create a flasher.
    ///
    /// `flash` describes the program memory of the target. Its page size sets
    /// the EEPROM read block and its buffer size the large-buffer capability.
    pub fn new(port: T, config: SessionConfig, flash: MemoryRegion) -> Result<Self> {
        config.validate()?;
        flash.validate()?;
        Ok(Self {
            port,
            config,
            flash,
            session: None,
            shadow: None,
            eeprom_cache: None,
        })
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &T {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut T {
        &mut self.port
    }

    /// Consume the flasher and return the underlying port.
    pub fn into_port(self) -> T {
        self.port
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Negotiated session, if connected.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Contact the bootloader and open a session.
    ///
    /// Stale input is discarded first. Any previous session state, including
    /// the flash shadow and the EEPROM cache, is dropped.
    pub fn connect(&mut self) -> Result<&Session> {
        info!("Contacting bootloader on {}...", self.port.name());
        self.session = None;
        self.shadow = None;
        self.eeprom_cache = None;

        self.port.drain()?;
        let handshake = Handshake::new(
            self.config.key.as_bytes(),
            self.config.trigger.as_bytes(),
            &self.config.handshake,
        );
        let reply = handshake.run(&mut self.port)?;

        let session = Session::new(&reply, self.flash.large_buffer(), self.config.reply_timeout);
        info!(
            "Bootloader v{} found: signature {:02X?}, {} boot pages, features {}",
            session.version, session.signature, session.boot_pages, session.features
        );
        if self.config.block_mode {
            warn!("Block mode requested, using paged transfers");
        }
        Ok(self.session.insert(session))
    }

    /// Device signature.
    pub fn signature(&self) -> Result<[u8; 3]> {
        self.session
            .as_ref()
            .map(|s| s.signature)
            .ok_or(Error::NotConnected)
    }

    /// Fail unless the device reports `expected`.
    pub fn check_signature(&self, expected: [u8; 3]) -> Result<()> {
        let actual = self.signature()?;
        if actual != expected {
            return Err(Error::SignatureMismatch { expected, actual });
        }
        Ok(())
    }

    /// Move the device address pointer to `addr`.
    ///
    /// The address is sent as is: flash takes word addresses, EEPROM byte
    /// addresses.
    pub fn set_address(&mut self, addr: u32) -> Result<()> {
        let timeout = self.active()?.reply_timeout;
        let frame = frame::set_address(addr)?;
        debug!("Set address {addr:#08x}");
        self.port.send(&frame)?;
        self.expect_status(Command::SetAddress, timeout)
    }

    /// Write `data` to the start of `region`.
    ///
    /// The last chunk is padded with 0xFF. A flash write is followed by an
    /// erase of the pages between the image and the bootloader, and the image
    /// is kept as the shadow for later reads and verify passes.
    pub fn write_region<F>(&mut self, region: &MemoryRegion, data: &[u8], mut progress: F) -> Result<()>
    where
        F: FnMut(u64, u64),
    {
        self.active()?;
        region.validate()?;
        if data.len() > region.size {
            return Err(WriteError::OutOfRange {
                kind: region.kind,
                addr: 0,
                len: data.len(),
                size: region.size,
            }
            .into());
        }

        match region.kind {
            MemoryKind::Flash => {
                info!("Writing {} bytes to flash", data.len());
                self.shadow = None;
                let floor = self.config.reply_timeout;
                let written =
                    self.paged_pass(region, data, CommitFrame::write_flash(), floor, &mut progress)?;
                self.shadow = Some(data.to_vec());

                let boot_pages = self.active()?.boot_pages;
                let pages = transfer::erase_page_count(region, boot_pages, written);
                debug!("Erasing {pages} pages behind the image");
                let timeout =
                    transfer::reply_timeout(region, usize::from(pages) * region.page_size, floor);
                self.commit(CommitFrame::erase_pages(pages), timeout)?;
            },
            MemoryKind::Eeprom => {
                info!("Writing {} bytes to EEPROM", data.len());
                self.eeprom_cache = None;
                let floor = self.config.reply_timeout;
                self.paged_pass(region, data, CommitFrame::write_eeprom(), floor, &mut progress)?;
            },
        }

        info!("Write complete");
        Ok(())
    }

    /// Have the device compare flash against `data`, or against the last
    /// image written when `data` is `None`.
    ///
    /// A mismatch is reported by the device as [`StatusError::Verification`].
    ///
    /// [`StatusError::Verification`]: crate::error::StatusError::Verification
    pub fn verify_region<F>(
        &mut self,
        region: &MemoryRegion,
        data: Option<&[u8]>,
        mut progress: F,
    ) -> Result<()>
    where
        F: FnMut(u64, u64),
    {
        self.active()?;
        region.validate()?;
        if region.kind != MemoryKind::Flash {
            return Err(WriteError::Unsupported {
                kind: region.kind,
                operation: "device-side verify",
            }
            .into());
        }

        let image = match data {
            Some(data) => data.to_vec(),
            None => self
                .shadow
                .clone()
                .ok_or(ReadError::UnsupportedByDevice(region.kind))?,
        };
        if image.len() > region.size {
            return Err(WriteError::OutOfRange {
                kind: region.kind,
                addr: 0,
                len: image.len(),
                size: region.size,
            }
            .into());
        }

        info!("Verifying {} bytes of flash", image.len());
        let floor = self.config.eeprom_timeout;
        self.paged_pass(region, &image, CommitFrame::verify_flash(), floor, &mut progress)?;
        info!("Verify complete");
        Ok(())
    }

    /// Read the whole of `region`.
    ///
    /// Flash comes from the shadow of the last write, padded with 0xFF.
    /// EEPROM is read from the device; the buffer is only returned if every
    /// block passed its CRC check.
    pub fn read_region<F>(&mut self, region: &MemoryRegion, mut progress: F) -> Result<Vec<u8>>
    where
        F: FnMut(u64, u64),
    {
        self.active()?;
        region.validate()?;
        let total = region.size as u64;
        match region.kind {
            MemoryKind::Flash => {
                let shadow = self
                    .shadow
                    .as_ref()
                    .ok_or(ReadError::UnsupportedByDevice(region.kind))?;
                let mut out = vec![FILL; region.size];
                let n = shadow.len().min(region.size);
                out[..n].copy_from_slice(&shadow[..n]);
                progress(total, total);
                Ok(out)
            },
            MemoryKind::Eeprom => {
                let out = self.read_eeprom(region, &mut progress)?;
                self.eeprom_cache = Some(out.clone());
                Ok(out)
            },
        }
    }

    /// Write one byte at `addr` in `region`.
    ///
    /// Only EEPROM supports this. The enclosing page is rewritten with the
    /// byte set and every other byte 0xFF.
    pub fn write_byte(&mut self, region: &MemoryRegion, addr: usize, value: u8) -> Result<()> {
        self.active()?;
        region.validate()?;
        if region.kind == MemoryKind::Flash {
            return Err(WriteError::Unsupported {
                kind: region.kind,
                operation: "single byte write",
            }
            .into());
        }
        if addr >= region.size {
            return Err(WriteError::OutOfRange {
                kind: region.kind,
                addr,
                len: 1,
                size: region.size,
            }
            .into());
        }

        self.eeprom_cache = None;
        let page = region.page_size;
        let mut buf = vec![FILL; page];
        buf[addr % page] = value;

        let timeout = transfer::reply_timeout(region, page, self.config.reply_timeout);
        self.position(region, addr / page * page)?;
        self.send_buffer(&buf, timeout)?;
        self.commit(CommitFrame::write_eeprom(), timeout)
    }

    /// Read one byte at `addr` in `region`.
    ///
    /// EEPROM is read in full on first access and cached until the next
    /// EEPROM write.
    pub fn read_byte(&mut self, region: &MemoryRegion, addr: usize) -> Result<u8> {
        self.active()?;
        region.validate()?;
        if addr >= region.size {
            return Err(ReadError::OutOfRange {
                kind: region.kind,
                addr,
                len: 1,
                size: region.size,
            }
            .into());
        }

        match region.kind {
            MemoryKind::Flash => {
                let shadow = self
                    .shadow
                    .as_ref()
                    .ok_or(ReadError::UnsupportedByDevice(region.kind))?;
                Ok(shadow.get(addr).copied().unwrap_or(FILL))
            },
            MemoryKind::Eeprom => {
                if self.eeprom_cache.is_none() {
                    let data = self.read_eeprom(region, &mut |_, _| {})?;
                    self.eeprom_cache = Some(data);
                }
                Ok(self
                    .eeprom_cache
                    .as_ref()
                    .and_then(|cache| cache.get(addr).copied())
                    .unwrap_or(FILL))
            },
        }
    }

    fn active(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(Error::NotConnected)
    }

    fn active_mut(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or(Error::NotConnected)
    }

    /// Point the device at `offset` bytes into `region`.
    fn position(&mut self, region: &MemoryRegion, offset: usize) -> Result<()> {
        self.set_address(region.device_address(offset))?;
        self.active_mut()?.current_page = Some(offset / region.page_size.max(1));
        Ok(())
    }

    /// Send all chunks of `data` with `commit` after each one.
    ///
    /// Returns the number of bytes sent, padding included.
    fn paged_pass<F>(
        &mut self,
        region: &MemoryRegion,
        data: &[u8],
        commit: CommitFrame,
        floor: Duration,
        progress: &mut F,
    ) -> Result<usize>
    where
        F: FnMut(u64, u64),
    {
        let chunk = transfer::chunk_size(region, data.len());
        let timeout = transfer::reply_timeout(region, chunk, floor);
        self.active_mut()?.reply_timeout = timeout;
        debug!(
            "{} pass: {} bytes in chunks of {chunk}, reply timeout {timeout:?}",
            commit.command(),
            data.len()
        );

        let result = self.send_chunks(region, data, chunk, commit, timeout, progress);
        let idle = self.config.reply_timeout;
        self.active_mut()?.reply_timeout = idle;
        result
    }

    fn send_chunks<F>(
        &mut self,
        region: &MemoryRegion,
        data: &[u8],
        chunk: usize,
        commit: CommitFrame,
        timeout: Duration,
        progress: &mut F,
    ) -> Result<usize>
    where
        F: FnMut(u64, u64),
    {
        self.position(region, 0)?;

        let total = data.len() as u64;
        let mut sent = 0;
        for chunk in Chunks::bounded(data, chunk, region.size) {
            trace!("Chunk at {:#x}, {} bytes", chunk.offset, chunk.bytes.len());
            self.send_buffer(&chunk.bytes, timeout)?;
            self.commit(commit, timeout)?;
            sent = chunk.end();
            progress((sent as u64).min(total), total);
        }
        Ok(sent)
    }

    fn read_eeprom<F>(&mut self, region: &MemoryRegion, progress: &mut F) -> Result<Vec<u8>>
    where
        F: FnMut(u64, u64),
    {
        let block = self.flash.page_size * 2;
        let timeout = self.config.eeprom_timeout;
        let total = region.size as u64;
        debug!("Reading {} bytes of EEPROM in blocks of {block}", region.size);

        self.position(region, 0)?;

        let request = CommitFrame::read_eeprom().build();
        let mut out = Vec::with_capacity(region.size + block);
        while out.len() < region.size {
            self.port.send(&request)?;
            let data = self.port.receive(block, timeout)?;
            let trailer = self.port.receive(CRC_LEN, timeout)?;

            let expected = LittleEndian::read_u16(&trailer);
            let actual = crc16(&data);
            if expected != actual {
                return Err(TransferError::CrcMismatch {
                    offset: out.len(),
                    expected,
                    actual,
                }
                .into());
            }
            self.expect_status(Command::ReadEeprom, timeout)?;

            out.extend_from_slice(&data);
            progress((out.len() as u64).min(total), total);
        }

        out.truncate(region.size);
        Ok(out)
    }

    fn send_buffer(&mut self, data: &[u8], timeout: Duration) -> Result<()> {
        let frame = SendBuffer::new(data)?;
        self.port.send(&frame.header())?;
        self.port.send(&frame.payload())?;
        self.expect_status(Command::SendBuffer, timeout)
    }

    fn commit(&mut self, frame: CommitFrame, timeout: Duration) -> Result<()> {
        trace!("{} ({:#04x})", frame.command(), frame.param());
        self.port.send(&frame.build())?;
        self.expect_status(frame.command(), timeout)
    }

    fn expect_status(&mut self, command: Command, timeout: Duration) -> Result<()> {
        let reply = self.port.receive(1, timeout)?;
        status::interpret(reply[0]).map_err(|source| Error::Rejected { command, source })
    }
}

// Native-specific convenience functions
#[cfg(feature = "native")]
mod native_impl {
    use super::{Flasher, MemoryRegion, Result, SessionConfig};
    use crate::port::{NativePort, SerialConfig};

    impl Flasher<NativePort> {
        /// Open a serial port and create a flasher on it.
        pub fn open(
            serial: &SerialConfig,
            config: SessionConfig,
            flash: MemoryRegion,
        ) -> Result<Self> {
            let port = NativePort::open(serial)?;
            Self::new(port, config, flash)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, StatusError};
    use crate::port::mock::MockTransport;
    use crate::protocol::handshake::{DEFAULT_TRIGGER, HandshakeConfig};

    /// Signature 1E 95 0F, version 5, 1 boot page, features 0.
    const INFO: [u8; 5] = [0x95, 0x0F, 0x05, 0x01, 0x30];

    fn flash_region() -> MemoryRegion {
        MemoryRegion::new(MemoryKind::Flash, 512, 64).with_buffer_size(256)
    }

    fn eeprom_region() -> MemoryRegion {
        MemoryRegion::new(MemoryKind::Eeprom, 256, 4).with_buffer_size(256)
    }

    fn config() -> SessionConfig {
        SessionConfig::default().with_handshake(
            HandshakeConfig::default()
                .with_probe_timeout(Duration::ZERO)
                .with_resend_delay(Duration::ZERO),
        )
    }

    /// A connected flasher with its handshake traffic cleared.
    fn connected() -> Flasher<MockTransport> {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut mock = MockTransport::new();
        mock.queue(DEFAULT_TRIGGER.as_bytes());
        mock.queue(&INFO);
        let mut flasher = Flasher::new(mock, config(), flash_region()).unwrap();
        flasher.connect().unwrap();
        flasher.port_mut().writes.clear();
        flasher
    }

    fn eeprom_block(data: &[u8]) -> Vec<u8> {
        let mut block = data.to_vec();
        block.extend_from_slice(&frame::crc_trailer(crc16(data)));
        block.push(status::SUCCESS);
        block
    }

    #[test]
    fn test_new_validates_config() {
        let err = Flasher::new(MockTransport::new(), config().with_key(""), flash_region());
        assert!(matches!(err, Err(Error::Config(ConfigError::InvalidKey(0)))));

        let bad_region = MemoryRegion::new(MemoryKind::Flash, 512, 0);
        let err = Flasher::new(MockTransport::new(), config(), bad_region);
        assert!(matches!(err, Err(Error::Config(ConfigError::InvalidRegion { .. }))));
    }

    #[test]
    fn test_connect() {
        let flasher = connected();
        let session = flasher.session().unwrap();
        assert_eq!(session.signature, [0x1E, 0x95, 0x0F]);
        assert_eq!(session.version, 5);
        assert_eq!(session.boot_pages, 1);
        assert!(session.large_buffer);
        assert!(session.version_mismatch.is_none());
        assert_eq!(flasher.port().drains, 1);
    }

    #[test]
    fn test_operations_need_session() {
        let mut flasher = Flasher::new(MockTransport::new(), config(), flash_region()).unwrap();
        assert!(matches!(flasher.signature(), Err(Error::NotConnected)));
        assert!(matches!(flasher.set_address(0), Err(Error::NotConnected)));
        assert!(matches!(
            flasher.write_region(&flash_region(), &[0; 4], |_, _| {}),
            Err(Error::NotConnected)
        ));
        assert!(flasher.port().writes.is_empty());
    }

    #[test]
    fn test_check_signature() {
        let flasher = connected();
        assert!(flasher.check_signature([0x1E, 0x95, 0x0F]).is_ok());
        assert!(matches!(
            flasher.check_signature([0x1E, 0x93, 0x07]),
            Err(Error::SignatureMismatch {
                expected: [0x1E, 0x93, 0x07],
                actual: [0x1E, 0x95, 0x0F]
            })
        ));
    }

    #[test]
    fn test_set_address_frame_and_range() {
        let mut flasher = connected();
        flasher.port_mut().queue_ok(1);
        flasher.set_address(0x40).unwrap();
        assert_eq!(flasher.port().writes, vec![vec![0xFF, 0x00, 0x00, 0x40, 0x31, 0xE4]]);

        assert!(matches!(
            flasher.set_address(0x0100_0000),
            Err(Error::Frame(_))
        ));
    }

    #[test]
    fn test_flash_write_end_to_end() {
        let mut flasher = connected();
        let image: Vec<u8> = (0..500u32).map(|i| (i % 256) as u8).collect();
        // SET ADDRESS, 2 x (FILL BUFFER + WRITE FLASH), ERASE PAGES.
        flasher.port_mut().queue_ok(6);

        let mut calls = Vec::new();
        flasher
            .write_region(&flash_region(), &image, |done, total| calls.push((done, total)))
            .unwrap();
        assert_eq!(calls, vec![(256, 500), (500, 500)]);

        let writes = &flasher.port().writes;
        assert_eq!(writes.len(), 8);
        assert_eq!(writes[0], frame::set_address(0).unwrap().to_vec());

        assert_eq!(&writes[1][..4], &[0xFE, 0x00, 0x01, 0x00]);
        assert_eq!(writes[2].len(), 256 + 2);
        assert_eq!(&writes[2][..256], &image[..256]);
        assert_eq!(writes[3], CommitFrame::write_flash().build().to_vec());

        assert_eq!(&writes[5][..244], &image[256..]);
        assert_eq!(&writes[5][244..256], &[0xFF; 12]);
        assert_eq!(&writes[5][256..], &frame::crc_trailer(crc16(&writes[5][..256])));
        assert_eq!(writes[6], CommitFrame::write_flash().build().to_vec());

        // (512 - 512 - 1 * 64) / 64 saturates to zero.
        assert_eq!(writes[7], CommitFrame::erase_pages(0).build().to_vec());
        assert_eq!(flasher.port().pending(), 0);
    }

    #[test]
    fn test_flash_write_erases_rest_of_application() {
        let mut flasher = connected();
        let region = MemoryRegion::new(MemoryKind::Flash, 1024, 64).with_buffer_size(256);
        flasher.port_mut().queue_ok(4);
        flasher.write_region(&region, &[0x12; 100], |_, _| {}).unwrap();

        // One chunk of two pages; (1024 - 128 - 64) / 64 = 13.
        let writes = &flasher.port().writes;
        assert_eq!(writes[2].len(), 128 + 2);
        assert_eq!(
            writes.last().unwrap(),
            &CommitFrame::erase_pages(13).build().to_vec()
        );
    }

    #[test]
    fn test_flash_shadow_round_trip() {
        for len in [0usize, 1, 64, 300, 512] {
            let mut flasher = connected();
            let image: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let chunks = Chunks::new(&image, transfer::chunk_size(&flash_region(), len)).len();
            flasher.port_mut().queue_ok(1 + 2 * chunks + 1);
            flasher.write_region(&flash_region(), &image, |_, _| {}).unwrap();
            flasher.port_mut().writes.clear();

            let read = flasher.read_region(&flash_region(), |_, _| {}).unwrap();
            assert_eq!(read.len(), 512);
            assert_eq!(&read[..len], &image[..]);
            assert!(read[len..].iter().all(|&b| b == 0xFF));
            if len > 0 {
                assert_eq!(flasher.read_byte(&flash_region(), len - 1).unwrap(), image[len - 1]);
            }
            // Served from the shadow, nothing goes to the device.
            assert!(flasher.port().writes.is_empty());
        }
    }

    #[test]
    fn test_flash_read_without_write_is_unsupported() {
        let mut flasher = connected();
        assert!(matches!(
            flasher.read_region(&flash_region(), |_, _| {}),
            Err(Error::Read(ReadError::UnsupportedByDevice(MemoryKind::Flash)))
        ));
        assert!(matches!(
            flasher.read_byte(&flash_region(), 0),
            Err(Error::Read(ReadError::UnsupportedByDevice(MemoryKind::Flash)))
        ));
    }

    #[test]
    fn test_write_too_large() {
        let mut flasher = connected();
        assert!(matches!(
            flasher.write_region(&flash_region(), &[0; 513], |_, _| {}),
            Err(Error::Write(WriteError::OutOfRange { len: 513, size: 512, .. }))
        ));
    }

    #[test]
    fn test_verify_resends_shadow() {
        let mut flasher = connected();
        flasher.port_mut().queue_ok(1 + 2 + 1);
        flasher.write_region(&flash_region(), &[0x55; 200], |_, _| {}).unwrap();
        flasher.port_mut().writes.clear();

        flasher.port_mut().queue_ok(1 + 2);
        flasher.verify_region(&flash_region(), None, |_, _| {}).unwrap();
        let writes = &flasher.port().writes;
        assert_eq!(writes.len(), 4);
        assert_eq!(writes[0], frame::set_address(0).unwrap().to_vec());
        assert_eq!(&writes[2][..200], &[0x55; 200]);
        assert_eq!(writes[3], CommitFrame::verify_flash().build().to_vec());
    }

    #[test]
    fn test_verify_mismatch_reported_by_device() {
        let mut flasher = connected();
        flasher.port_mut().queue(&[status::SUCCESS, status::SUCCESS, status::ERR_VERIFY]);
        let err = flasher
            .verify_region(&flash_region(), Some(&[0x00; 64]), |_, _| {})
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Rejected {
                command: Command::VerifyFlash,
                source: StatusError::Verification
            }
        ));
    }

    #[test]
    fn test_verify_without_image_is_unsupported() {
        let mut flasher = connected();
        assert!(matches!(
            flasher.verify_region(&flash_region(), None, |_, _| {}),
            Err(Error::Read(ReadError::UnsupportedByDevice(MemoryKind::Flash)))
        ));
    }

    #[test]
    fn test_eeprom_write_uses_byte_addresses() {
        let mut flasher = connected();
        let region = eeprom_region().with_offset(0x10);
        flasher.port_mut().queue_ok(3);
        flasher.write_region(&region, &[1, 2, 3], |_, _| {}).unwrap();

        let writes = &flasher.port().writes;
        assert_eq!(writes[0], frame::set_address(0x10).unwrap().to_vec());
        assert_eq!(writes[2], vec![1, 2, 3, 0xFF, 0xE0, 0x8C]);
        assert_eq!(writes[3], CommitFrame::write_eeprom().build().to_vec());
        // No erase after EEPROM writes.
        assert_eq!(writes.len(), 4);
    }

    #[test]
    fn test_eeprom_read() {
        let mut flasher = connected();
        let first: Vec<u8> = (0..128u8).collect();
        let second: Vec<u8> = (128..=255u8).collect();
        flasher.port_mut().queue_ok(1);
        flasher.port_mut().queue(&eeprom_block(&first));
        flasher.port_mut().queue(&eeprom_block(&second));

        let mut calls = Vec::new();
        let data = flasher
            .read_region(&eeprom_region(), |done, total| calls.push((done, total)))
            .unwrap();
        assert_eq!(data.len(), 256);
        assert_eq!(&data[..128], &first[..]);
        assert_eq!(&data[128..], &second[..]);
        assert_eq!(calls, vec![(128, 256), (256, 256)]);

        let writes = &flasher.port().writes;
        assert_eq!(writes[0], frame::set_address(0).unwrap().to_vec());
        assert_eq!(writes[1], CommitFrame::read_eeprom().build().to_vec());
        assert_eq!(writes.len(), 3);
    }

    #[test]
    fn test_eeprom_read_truncates_to_region() {
        let mut flasher = connected();
        let region = MemoryRegion::new(MemoryKind::Eeprom, 64, 4);
        flasher.port_mut().queue_ok(1);
        flasher.port_mut().queue(&eeprom_block(&[0xA5; 128]));

        let data = flasher.read_region(&region, |_, _| {}).unwrap();
        assert_eq!(data, vec![0xA5; 64]);
    }

    #[test]
    fn test_eeprom_read_crc_mismatch() {
        let mut flasher = connected();
        let mut block = eeprom_block(&[0x11; 128]);
        block[3] ^= 0xFF;
        flasher.port_mut().queue_ok(1);
        flasher.port_mut().queue(&block);

        let err = flasher.read_region(&eeprom_region(), |_, _| {}).unwrap_err();
        assert!(matches!(
            err,
            Error::Transfer(TransferError::CrcMismatch { offset: 0, .. })
        ));
        assert!(flasher.eeprom_cache.is_none());
    }

    #[test]
    fn test_eeprom_read_byte_is_cached() {
        let mut flasher = connected();
        let data: Vec<u8> = (0..=255u8).collect();
        flasher.port_mut().queue_ok(1);
        flasher.port_mut().queue(&eeprom_block(&data[..128]));
        flasher.port_mut().queue(&eeprom_block(&data[128..]));

        assert_eq!(flasher.read_byte(&eeprom_region(), 200).unwrap(), 200);
        let sent = flasher.port().writes.len();
        assert_eq!(flasher.read_byte(&eeprom_region(), 7).unwrap(), 7);
        assert_eq!(flasher.port().writes.len(), sent);
    }

    #[test]
    fn test_eeprom_write_byte() {
        let mut flasher = connected();
        flasher.eeprom_cache = Some(vec![0; 256]);
        flasher.port_mut().queue_ok(3);
        flasher.write_byte(&eeprom_region(), 6, 0x42).unwrap();

        let writes = &flasher.port().writes;
        assert_eq!(writes[0], frame::set_address(4).unwrap().to_vec());
        assert_eq!(&writes[1][..4], &[0xFE, 0x00, 0x00, 0x04]);
        assert_eq!(&writes[2][..4], &[0xFF, 0xFF, 0x42, 0xFF]);
        assert_eq!(writes[3], CommitFrame::write_eeprom().build().to_vec());
        assert!(flasher.eeprom_cache.is_none());
        assert_eq!(flasher.session().unwrap().current_page, Some(1));
    }

    #[test]
    fn test_flash_write_byte_unsupported() {
        let mut flasher = connected();
        assert!(matches!(
            flasher.write_byte(&flash_region(), 0, 0),
            Err(Error::Write(WriteError::Unsupported {
                kind: MemoryKind::Flash,
                ..
            }))
        ));
        assert!(flasher.port().writes.is_empty());
    }

    #[test]
    fn test_status_error_names_command() {
        let mut flasher = connected();
        flasher.port_mut().queue(&[status::SUCCESS, status::ERR_CRC]);
        let err = flasher
            .write_region(&flash_region(), &[0; 64], |_, _| {})
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Rejected {
                command: Command::SendBuffer,
                source: StatusError::Crc
            }
        ));
        assert_eq!(err.to_string(), "FILL BUFFER rejected by device: CRC error");
    }

    #[test]
    fn test_missing_status_times_out() {
        let mut flasher = connected();
        let err = flasher.set_address(0).unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(crate::error::TransportError::Timeout)
        ));
    }

    #[test]
    fn test_zero_page_region_is_rejected() {
        let mut flasher = connected();
        let bad = MemoryRegion::new(MemoryKind::Eeprom, 256, 0);

        assert!(matches!(
            flasher.write_byte(&bad, 5, 0x42),
            Err(Error::Config(ConfigError::InvalidRegion { page_size: 0, .. }))
        ));
        assert!(matches!(
            flasher.read_byte(&bad, 5),
            Err(Error::Config(ConfigError::InvalidRegion { .. }))
        ));
        assert!(matches!(
            flasher.write_region(&bad, &[1, 2, 3], |_, _| {}),
            Err(Error::Config(ConfigError::InvalidRegion { .. }))
        ));
        assert!(matches!(
            flasher.read_region(&bad, |_, _| {}),
            Err(Error::Config(ConfigError::InvalidRegion { .. }))
        ));
        assert!(flasher.port().writes.is_empty());
    }

    #[test]
    fn test_eeprom_read_crc_mismatch_in_later_block() {
        let mut flasher = connected();
        let mut bad = eeprom_block(&[0x22; 128]);
        bad[10] ^= 0x01;
        flasher.port_mut().queue_ok(1);
        flasher.port_mut().queue(&eeprom_block(&[0x11; 128]));
        flasher.port_mut().queue(&bad);

        let mut calls = Vec::new();
        let err = flasher
            .read_region(&eeprom_region(), |done, total| calls.push((done, total)))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Transfer(TransferError::CrcMismatch { offset: 128, .. })
        ));
        assert_eq!(calls, vec![(128, 256)]);
        assert!(flasher.eeprom_cache.is_none());
    }

    #[test]
    fn test_failed_pass_restores_reply_timeout() {
        let mut flasher = connected();
        let region = flash_region().with_write_delay(Duration::from_millis(10));
        flasher.port_mut().queue(&[status::SUCCESS, status::ERR_CRC]);

        assert!(flasher.write_region(&region, &[0; 256], |_, _| {}).is_err());
        assert_eq!(
            flasher.session().unwrap().reply_timeout,
            flasher.config().reply_timeout
        );
    }

    #[test]
    fn test_connect_with_other_version_keeps_diagnostic() {
        let mut mock = MockTransport::new();
        mock.queue(DEFAULT_TRIGGER.as_bytes());
        mock.queue(&[0x95, 0x0F, 0x04, 0x01, 0x30]);
        let mut flasher = Flasher::new(mock, config(), flash_region()).unwrap();

        let session = flasher.connect().unwrap();
        assert_eq!(session.version, 4);
        assert!(matches!(
            session.version_mismatch,
            Some(crate::error::HandshakeError::VersionMismatch { .. })
        ));
    }
}
