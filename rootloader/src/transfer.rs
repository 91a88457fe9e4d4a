//! Paged transfer planning.
//!
//! Splits an image into chunks the device can buffer and computes the
//! bookkeeping that goes with a pass: reply timeouts and the number of pages
//! to erase behind a flash image.
//!
//! ```text
//!  0        chunk        2*chunk         len    padded
//!  |-----------|-----------|--------------|######|
//!                                          0xFF fill
//! ```

use std::time::Duration;

use log::warn;

use crate::target::MemoryRegion;

/// Fill byte for padding and unread memory.
pub const FILL: u8 = 0xFF;

/// Chunk size for transferring `len` bytes into `region`.
///
/// The largest multiple of the page size that fits the device buffer, at
/// least one page, and never more pages than the image needs.
pub fn chunk_size(region: &MemoryRegion, len: usize) -> usize {
    let page = region.page_size.max(1);
    let by_capacity = (region.buffer_size / page).max(1) * page;
    let by_image = len.div_ceil(page).max(1) * page;
    by_capacity.min(by_image)
}

/// Length of `len` bytes after padding the last chunk.
pub fn padded_len(len: usize, chunk: usize) -> usize {
    len.div_ceil(chunk) * chunk
}

/// One padded chunk of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Offset of the chunk inside the image.
    pub offset: usize,
    /// Chunk bytes, padded with [`FILL`] to the chunk size.
    pub bytes: Vec<u8>,
}

impl Chunk {
    /// Offset just past this chunk.
    pub fn end(&self) -> usize {
        self.offset + self.bytes.len()
    }
}

/// Iterator over the padded chunks of an image.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    data: &'a [u8],
    size: usize,
    limit: usize,
    offset: usize,
}

impl<'a> Chunks<'a> {
    /// Split `data` into chunks of `size` bytes. `size` must not be zero.
    pub fn new(data: &'a [u8], size: usize) -> Self {
        Self::bounded(data, size, usize::MAX)
    }

    /// Like [`Chunks::new`], but padding stops at `limit`, the end of the
    /// destination region.
    pub fn bounded(data: &'a [u8], size: usize, limit: usize) -> Self {
        Self {
            data,
            size,
            limit: limit.max(data.len()),
            offset: 0,
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.offset >= self.data.len() || self.size == 0 {
            return None;
        }
        let end = (self.offset + self.size).min(self.data.len());
        let padded = self.size.min(self.limit - self.offset);
        let mut bytes = Vec::with_capacity(padded);
        bytes.extend_from_slice(&self.data[self.offset..end]);
        bytes.resize(padded, FILL);

        let chunk = Chunk {
            offset: self.offset,
            bytes,
        };
        self.offset += self.size;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.size == 0 {
            0
        } else {
            self.data.len().saturating_sub(self.offset).div_ceil(self.size)
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

/// Pages between the end of a flash image and the bootloader area.
///
/// `written` is the padded number of bytes sent. The result saturates at
/// zero and is clamped to what the ERASEPAGES parameter can carry.
pub fn erase_page_count(region: &MemoryRegion, boot_pages: u8, written: usize) -> u8 {
    let page = region.page_size.max(1);
    let free = region
        .size
        .saturating_sub(written)
        .saturating_sub(usize::from(boot_pages) * page);
    let pages = free / page;
    u8::try_from(pages).unwrap_or_else(|_| {
        warn!("{pages} pages left behind the image, erasing only the first 255");
        u8::MAX
    })
}

/// How long to wait for the status after committing `bytes` bytes.
pub fn reply_timeout(region: &MemoryRegion, bytes: usize, floor: Duration) -> Duration {
    let bytes = u32::try_from(bytes).unwrap_or(u32::MAX);
    region.max_write_delay.saturating_mul(bytes).max(floor)
}
