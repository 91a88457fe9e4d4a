//! Session handshake.
//!
//! A device that was just reset, or is still running its application, may
//! echo any amount of garbage before the bootloader answers. The handshake
//! keeps sending the keyed INIT frame while it is not in sync, and scans the
//! reply stream for the trigger sequence:
//!
//! ```text
//! host:   INIT ........ INIT ............. INIT
//! device:  ?? ?? ?? ( c ) ?? ( c )   2 0 0 9   H R  s1 s2 ver pages 0x3F
//!                  ^ partial match, resync  ^ full trigger, collect info
//! ```
//!
//! Once the full trigger is seen, every following byte is collected until a
//! terminal byte (high nibble `0x3`) arrives after the four info bytes. The
//! info is then decoded from the tail of the reply.

use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::error::{HandshakeError, Result, TransportError};
use crate::port::Transport;
use crate::protocol::frame;

/// Trigger sequence announced by stock bootloader builds.
pub const DEFAULT_TRIGGER: &str = "(c) 2009 HR";

/// Key accepted by stock bootloader builds.
pub const DEFAULT_KEY: &str = "BOOTLOADER";

/// Largest reply collected, trigger included.
pub const MAX_REPLY_LEN: usize = 265;

/// Protocol version this driver speaks.
pub const EXPECTED_VERSION: u8 = 5;

/// First signature byte, common to all Atmel parts.
pub const SIGNATURE_PREFIX: u8 = 0x1E;

/// Info bytes that precede the terminal byte: two signature bytes, version,
/// boot pages.
const INFO_LEN: usize = 4;

/// Timing and retry budget of the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HandshakeConfig {
    /// How long to wait for input before counting a failed trial.
    pub probe_timeout: Duration,
    /// Pause before every INIT transmission.
    pub resend_delay: Duration,
    /// Failed trials tolerated before giving up.
    pub max_trials: u32,
    /// Timeout for reading a byte once input is pending.
    pub read_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(50),
            resend_delay: Duration::from_millis(20),
            max_trials: 100,
            read_timeout: Duration::from_millis(100),
        }
    }
}

impl HandshakeConfig {
    /// Set the probe timeout.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the delay before each INIT.
    #[must_use]
    pub fn with_resend_delay(mut self, delay: Duration) -> Self {
        self.resend_delay = delay;
        self
    }

    /// Set the failed trial budget.
    #[must_use]
    pub fn with_max_trials(mut self, trials: u32) -> Self {
        self.max_trials = trials;
        self
    }
}

/// Information decoded from the tail of the handshake reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeReply {
    /// Protocol version.
    pub version: u8,
    /// Feature nibble.
    pub features: u8,
    /// Flash pages reserved for the bootloader.
    pub boot_pages: u8,
    /// Device signature.
    pub signature: [u8; 3],
}

impl HandshakeReply {
    /// Decode the reply from the end of `response`.
    ///
    /// `response` must hold at least the info bytes and the terminal byte.
    pub fn parse(response: &[u8]) -> std::result::Result<Self, HandshakeError> {
        let Some(&terminal) = response.last() else {
            return Err(HandshakeError::UnexpectedTerminator(0));
        };
        if terminal & 0xF0 != 0x30 || response.len() < INFO_LEN + 1 {
            return Err(HandshakeError::UnexpectedTerminator(terminal));
        }

        let n = response.len();
        Ok(Self {
            version: response[n - 3],
            features: terminal & 0x0F,
            boot_pages: response[n - 2],
            signature: [SIGNATURE_PREFIX, response[n - 5], response[n - 4]],
        })
    }

    /// Version mismatch diagnostic, if any.
    pub fn version_mismatch(&self) -> Option<HandshakeError> {
        (self.version != EXPECTED_VERSION).then_some(HandshakeError::VersionMismatch {
            expected: EXPECTED_VERSION,
            found: self.version,
        })
    }
}

/// Keyed INIT exchange.
#[derive(Debug, Clone)]
pub struct Handshake<'a> {
    key: &'a [u8],
    trigger: &'a [u8],
    config: &'a HandshakeConfig,
}

impl<'a> Handshake<'a> {
    /// Prepare a handshake. `trigger` must not be empty.
    pub fn new(key: &'a [u8], trigger: &'a [u8], config: &'a HandshakeConfig) -> Self {
        Self {
            key,
            trigger,
            config,
        }
    }

    /// Run the exchange until the bootloader answers or the trial budget runs
    /// out.
    pub fn run<T: Transport + ?Sized>(&self, port: &mut T) -> Result<HandshakeReply> {
        let init = frame::init(self.key);
        let mut reply = Vec::with_capacity(MAX_REPLY_LEN);
        let mut matched = 0usize;
        let mut trials = 0u32;

        loop {
            if trials > self.config.max_trials {
                return Err(HandshakeError::Timeout { trials }.into());
            }
            if reply.len() >= MAX_REPLY_LEN {
                break;
            }

            if matched == 0 {
                thread::sleep(self.config.resend_delay);
                trace!("Sending INIT");
                port.send(&init)?;
            }

            if !port.probe(self.config.probe_timeout)? {
                trials += 1;
                continue;
            }

            let byte = match port.receive(1, self.config.read_timeout) {
                Ok(bytes) => bytes[0],
                Err(TransportError::Timeout) => {
                    trials += 1;
                    continue;
                },
                Err(e) => return Err(e.into()),
            };

            if matched < self.trigger.len() {
                if byte == self.trigger[matched] {
                    matched += 1;
                    reply.push(byte);
                    if matched == self.trigger.len() {
                        debug!("Trigger matched after {trials} failed trials");
                    }
                } else {
                    trials += 1;
                    reply.clear();
                    matched = usize::from(byte == self.trigger[0]);
                    if matched == 1 {
                        reply.push(byte);
                    }
                }
                continue;
            }

            reply.push(byte);
            let info_len = reply.len() - self.trigger.len();
            if info_len > INFO_LEN && byte & 0xF0 == 0x30 {
                break;
            }
        }

        trace!("Handshake reply: {reply:02X?}");
        let info = HandshakeReply::parse(&reply[self.trigger.len()..])?;
        if let Some(diag) = info.version_mismatch() {
            warn!("{diag}");
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::port::mock::MockTransport;

    const INFO: [u8; 5] = [0x95, 0x0F, 0x05, 0x02, 0x38];

    fn fast_config() -> HandshakeConfig {
        HandshakeConfig::default()
            .with_resend_delay(Duration::ZERO)
            .with_probe_timeout(Duration::ZERO)
    }

    fn run(mock: &mut MockTransport) -> Result<HandshakeReply> {
        let config = fast_config();
        Handshake::new(DEFAULT_KEY.as_bytes(), DEFAULT_TRIGGER.as_bytes(), &config).run(mock)
    }

    #[test]
    fn test_parse_reply_from_tail() {
        let reply = HandshakeReply::parse(&INFO).unwrap();
        assert_eq!(reply.signature, [0x1E, 0x95, 0x0F]);
        assert_eq!(reply.version, 5);
        assert_eq!(reply.boot_pages, 2);
        assert_eq!(reply.features, 0x08);
        assert!(reply.version_mismatch().is_none());
    }

    #[test]
    fn test_parse_reply_bad_terminator() {
        assert_eq!(
            HandshakeReply::parse(&[0x95, 0x0F, 0x05, 0x02, 0xC1]),
            Err(HandshakeError::UnexpectedTerminator(0xC1))
        );
    }

    #[test]
    fn test_version_mismatch_is_diagnostic() {
        let reply = HandshakeReply::parse(&[0x95, 0x0F, 0x06, 0x02, 0x30]).unwrap();
        assert_eq!(
            reply.version_mismatch(),
            Some(HandshakeError::VersionMismatch {
                expected: 5,
                found: 6
            })
        );
    }

    #[test]
    fn test_clean_reply() {
        let mut mock = MockTransport::new();
        mock.queue(DEFAULT_TRIGGER.as_bytes());
        mock.queue(&INFO);

        let reply = run(&mut mock).unwrap();
        assert_eq!(reply.signature, [0x1E, 0x95, 0x0F]);
        assert_eq!(mock.pending(), 0);
        // In sync from the first byte, so INIT went out exactly once.
        assert_eq!(mock.writes.len(), 1);
        assert_eq!(mock.writes[0], frame::init(b"BOOTLOADER"));
    }

    #[test]
    fn test_locks_on_after_noise() {
        let mut mock = MockTransport::new();
        mock.queue(&[0x00, 0xFF, 0x3F, 0x13, b'x']);
        mock.queue(DEFAULT_TRIGGER.as_bytes());
        mock.queue(&INFO);

        let reply = run(&mut mock).unwrap();
        assert_eq!(reply.boot_pages, 2);
        // One INIT per noise byte, then one more for the trigger start.
        assert_eq!(mock.writes.len(), 6);
    }

    #[test]
    fn test_partial_match_does_not_trigger() {
        let mut mock = MockTransport::new();
        // Partial trigger interrupted by a fresh start.
        mock.queue(b"(c) 20(c) 2009 HR");
        mock.queue(&INFO);

        let reply = run(&mut mock).unwrap();
        assert_eq!(reply.signature, [0x1E, 0x95, 0x0F]);
        assert_eq!(reply.version, 5);
    }

    #[test]
    fn test_info_bytes_in_terminal_class_are_collected() {
        let mut mock = MockTransport::new();
        mock.queue(DEFAULT_TRIGGER.as_bytes());
        // Signature and boot page bytes that look like terminals.
        mock.queue(&[0x31, 0x32, 0x05, 0x33, 0x30]);

        let reply = run(&mut mock).unwrap();
        assert_eq!(reply.signature, [0x1E, 0x31, 0x32]);
        assert_eq!(reply.boot_pages, 0x33);
        assert_eq!(reply.features, 0);
    }

    #[test]
    fn test_timeout_when_silent() {
        let mut mock = MockTransport::new();
        let err = run(&mut mock).unwrap_err();
        assert!(matches!(
            err,
            Error::Handshake(HandshakeError::Timeout { trials: 101 })
        ));
    }

    #[test]
    fn test_timeout_on_endless_noise() {
        let mut mock = MockTransport::new();
        mock.queue(&[0xAA; 200]);
        let err = run(&mut mock).unwrap_err();
        assert!(matches!(err, Error::Handshake(HandshakeError::Timeout { .. })));
    }

    #[test]
    fn test_unterminated_reply_is_rejected() {
        let mut mock = MockTransport::new();
        mock.queue(DEFAULT_TRIGGER.as_bytes());
        mock.queue(&[0xC6; MAX_REPLY_LEN]);

        let err = run(&mut mock).unwrap_err();
        assert!(matches!(
            err,
            Error::Handshake(HandshakeError::UnexpectedTerminator(0xC6))
        ));
    }
}
