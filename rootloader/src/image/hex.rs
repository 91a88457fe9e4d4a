//! Intel HEX decoding.

use ihex::Record;

use crate::error::{Error, Result};
use crate::transfer::FILL;

/// Flatten Intel HEX records into a buffer starting at address 0.
///
/// Extended segment and linear address records are honored. Bytes not
/// covered by any record read as 0xFF. A record reaching past `max_size`
/// bytes is rejected before anything is allocated for it.
pub fn parse_intel_hex(text: &str, max_size: usize) -> Result<Vec<u8>> {
    let mut base = 0u32;
    let mut sections: Vec<(usize, Vec<u8>)> = Vec::new();

    for record in ihex::Reader::new(text) {
        let record = record.map_err(|e| Error::Image(format!("Intel HEX: {e}")))?;
        match record {
            Record::Data { offset, value } => {
                let addr = base as usize + usize::from(offset);
                let end = addr + value.len();
                if end > max_size {
                    return Err(Error::Image(format!(
                        "Intel HEX record at {addr:#X} ends at {end:#X}, memory holds {max_size}"
                    )));
                }
                sections.push((addr, value));
            },
            Record::ExtendedSegmentAddress(segment) => base = u32::from(segment) * 16,
            Record::ExtendedLinearAddress(upper) => base = u32::from(upper) << 16,
            Record::EndOfFile
            | Record::StartSegmentAddress { .. }
            | Record::StartLinearAddress(_) => {},
        }
    }

    let end = sections
        .iter()
        .map(|(addr, data)| addr + data.len())
        .max()
        .unwrap_or(0);
    let mut image = vec![FILL; end];
    for (addr, data) in sections {
        image[addr..addr + data.len()].copy_from_slice(&data);
    }
    Ok(image)
}
