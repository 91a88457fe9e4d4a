//! Firmware image loading.
//!
//! Images are flattened into a buffer that starts at address 0 of the
//! destination memory. Gaps are filled with 0xFF, the erased state of flash
//! and EEPROM.
//!
//! Supported formats:
//!
//! - raw binary (`.bin` and anything unrecognized)
//! - Intel HEX (`.hex`, `.ihex`, `.eep`, or any file that looks like one)

mod hex;

use std::fmt;
use std::path::Path;

use log::{debug, info};

use crate::error::{Error, Result};

pub use hex::parse_intel_hex;

/// File extensions treated as Intel HEX.
const HEX_EXTENSIONS: &[&str] = &["hex", "ihex", "ihx", "eep", "h86"];

/// On-disk image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ImageFormat {
    /// Bytes as they go to the device.
    Binary,
    /// Intel HEX records.
    IntelHex,
}

impl ImageFormat {
    /// Guess the format from the file extension, then from the content.
    pub fn guess(path: &Path, raw: &[u8]) -> Self {
        let ext = path
            .extension()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if HEX_EXTENSIONS.contains(&ext.as_str()) {
            return Self::IntelHex;
        }

        let looks_like_hex = raw.first() == Some(&b':')
            && raw
                .iter()
                .all(|&c| c.is_ascii_hexdigit() || matches!(c, b':' | b'\r' | b'\n'));
        if looks_like_hex {
            Self::IntelHex
        } else {
            Self::Binary
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::IntelHex => write!(f, "Intel HEX"),
        }
    }
}

/// Decode `raw` in `format`. Intel HEX records past `max_size` are rejected
/// while parsing.
pub fn decode(raw: &[u8], format: ImageFormat, max_size: usize) -> Result<Vec<u8>> {
    match format {
        ImageFormat::Binary => Ok(raw.to_vec()),
        ImageFormat::IntelHex => {
            let text = std::str::from_utf8(raw)
                .map_err(|e| Error::Image(format!("Intel HEX is not valid text: {e}")))?;
            parse_intel_hex(text, max_size)
        },
    }
}

/// Load an image file, guessing its format.
///
/// Fails if the flattened image does not fit in `max_size` bytes.
pub fn load<P: AsRef<Path>>(path: P, max_size: usize) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let raw = std::fs::read(path)?;
    let format = ImageFormat::guess(path, &raw);
    info!("Reading {} as {format}", path.display());

    let image = decode(&raw, format, max_size)?;
    debug!("Image spans {} bytes", image.len());
    if image.len() > max_size {
        return Err(Error::Image(format!(
            "{} is {} bytes, memory holds {max_size}",
            path.display(),
            image.len()
        )));
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_guess_by_extension() {
        assert_eq!(ImageFormat::guess(Path::new("a.HEX"), b"\x00"), ImageFormat::IntelHex);
        assert_eq!(ImageFormat::guess(Path::new("a.eep"), b""), ImageFormat::IntelHex);
        assert_eq!(ImageFormat::guess(Path::new("a.bin"), b"\x0c\x94"), ImageFormat::Binary);
    }

    #[test]
    fn test_guess_by_content() {
        let text = b":0400000001020304F2\r\n:00000001FF\r\n";
        assert_eq!(ImageFormat::guess(Path::new("image"), text), ImageFormat::IntelHex);
        assert_eq!(ImageFormat::guess(Path::new("image"), b":zz"), ImageFormat::Binary);
        assert_eq!(ImageFormat::guess(Path::new("image"), b""), ImageFormat::Binary);
    }

    #[test]
    fn test_load_binary() {
        let mut file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        assert_eq!(load(file.path(), 16).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_load_hex() {
        let mut file = tempfile::Builder::new().suffix(".hex").tempfile().unwrap();
        file.write_all(b":0400000001020304F2\n:00000001FF\n").unwrap();
        assert_eq!(load(file.path(), 16).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_load_rejects_oversized() {
        let mut file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        file.write_all(&[0; 17]).unwrap();
        assert!(matches!(load(file.path(), 16), Err(Error::Image(_))));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            load("/nonexistent/rootloader.bin", 16),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_load_hex_with_high_address_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".hex").tempfile().unwrap();
        file.write_all(b":02000004FFFFFC\n:0100000042BD\n:00000001FF\n")
            .unwrap();
        assert!(matches!(load(file.path(), 1024), Err(Error::Image(_))));
    }
}
