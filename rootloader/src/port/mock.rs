//! Scripted transport for unit tests.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::TransportError;
use crate::port::Transport;

/// Replays queued device replies and records everything sent.
///
/// The protocol is strictly request/reply, so replies can be queued up front
/// in the order the device would produce them.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    replies: VecDeque<u8>,
    /// Every `send` call, in order.
    pub writes: Vec<Vec<u8>>,
    /// Number of `drain` calls.
    pub drains: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, bytes: &[u8]) {
        self.replies.extend(bytes.iter().copied());
    }

    /// Queue `count` success status bytes.
    pub fn queue_ok(&mut self, count: usize) {
        self.replies.extend(std::iter::repeat_n(0x30, count));
    }

    pub fn pending(&self) -> usize {
        self.replies.len()
    }
}

impl Transport for MockTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.writes.push(bytes.to_vec());
        Ok(())
    }

    fn receive(&mut self, len: usize, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if self.replies.len() < len {
            self.replies.clear();
            return Err(TransportError::Timeout);
        }
        Ok(self.replies.drain(..len).collect())
    }

    fn probe(&mut self, _timeout: Duration) -> Result<bool, TransportError> {
        Ok(!self.replies.is_empty())
    }

    fn drain(&mut self) -> Result<(), TransportError> {
        self.drains += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
