//! Firmware metadata block.
//!
//! The updater stages a new app image in external flash and only copies it
//! into place when a metadata block with the right magic, a plausible size,
//! and a matching CRC32 sits next to it. This module builds that block for a
//! flattened image.

use serde::Serialize;
use thiserror::Error;

pub const METADATA_MAGIC: u32 = 0xBEEF_CAFE;
/// Largest app image the updater accepts: the app slot spans 0x40000..0xED000.
pub const DEFAULT_APP_MAX_SIZE: u32 = 0x000E_D000 - 0x0004_0000;
pub const METADATA_SIZE: usize = 36;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("image of {size} bytes exceeds u32 size field")]
    TooLarge { size: usize },

    #[error("metadata block must be 36 bytes, got {0}")]
    InvalidLength(usize),

    #[error("bad metadata magic {0:#010X}")]
    BadMagic(u32),

    #[error("unknown firmware type {0}")]
    UnknownKind(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FirmwareKind {
    App,
    Updater,
}

impl FirmwareKind {
    pub fn code(self) -> u32 {
        match self {
            Self::App => 6587,
            Self::Updater => 3427,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            6587 => Some(Self::App),
            3427 => Some(Self::Updater),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirmwareMetadata {
    pub kind: FirmwareKind,
    pub magic: u32,
    pub version: u32,
    pub size: u32,
    pub crc32: u32,
    pub reserved: [u32; 4],
}

impl FirmwareMetadata {
    pub fn for_image(kind: FirmwareKind, version: u32, image: &[u8]) -> Result<Self, MetadataError> {
        let size = u32::try_from(image.len())
            .map_err(|_| MetadataError::TooLarge { size: image.len() })?;
        Ok(Self {
            kind,
            magic: METADATA_MAGIC,
            version,
            size,
            crc32: crc32_iso_hdlc(image),
            reserved: [0; 4],
        })
    }

    /// True when the image fits the slot the updater copies into.
    pub fn fits(&self, max_size: u32) -> bool {
        self.size <= max_size
    }

    /// True when `image` has this block's size and CRC.
    pub fn matches(&self, image: &[u8]) -> bool {
        image.len() == self.size as usize && crc32_iso_hdlc(image) == self.crc32
    }

    /// Little-endian layout as read by the updater.
    pub fn to_bytes(&self) -> [u8; METADATA_SIZE] {
        let words = [
            self.kind.code(),
            self.magic,
            self.version,
            self.size,
            self.crc32,
            self.reserved[0],
            self.reserved[1],
            self.reserved[2],
            self.reserved[3],
        ];
        let mut out = [0u8; METADATA_SIZE];
        for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetadataError> {
        if bytes.len() != METADATA_SIZE {
            return Err(MetadataError::InvalidLength(bytes.len()));
        }
        let mut words = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]));
        let mut next = || words.next().unwrap_or_default();

        let kind_code = next();
        let kind = FirmwareKind::from_code(kind_code).ok_or(MetadataError::UnknownKind(kind_code))?;
        let magic = next();
        if magic != METADATA_MAGIC {
            return Err(MetadataError::BadMagic(magic));
        }
        Ok(Self {
            kind,
            magic,
            version: next(),
            size: next(),
            crc32: next(),
            reserved: [next(), next(), next(), next()],
        })
    }
}

/// CRC-32 IEEE (ISO-HDLC), the reflected 0xEDB88320 table the updater uses.
fn crc32_iso_hdlc(data: &[u8]) -> u32 {
    const CRC: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
    CRC.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32_iso_hdlc(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_for_image() {
        let meta = FirmwareMetadata::for_image(FirmwareKind::App, 1, b"123456789").unwrap();
        assert_eq!(meta.magic, METADATA_MAGIC);
        assert_eq!(meta.size, 9);
        assert_eq!(meta.crc32, 0xCBF4_3926);
        assert!(meta.matches(b"123456789"));
        assert!(!meta.matches(b"123456780"));
        assert!(meta.fits(DEFAULT_APP_MAX_SIZE));
        assert!(!meta.fits(8));
    }

    #[test]
    fn test_byte_layout() {
        let meta = FirmwareMetadata::for_image(FirmwareKind::App, 0x0102, &[0xFF; 4]).unwrap();
        let bytes = meta.to_bytes();
        assert_eq!(&bytes[0..4], &6587u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &[0xFE, 0xCA, 0xEF, 0xBE]);
        assert_eq!(&bytes[8..12], &[0x02, 0x01, 0x00, 0x00]);
        assert_eq!(&bytes[12..16], &[0x04, 0x00, 0x00, 0x00]);
        assert_eq!(&bytes[20..], &[0u8; 16]);
        assert_eq!(FirmwareMetadata::from_bytes(&bytes).unwrap(), meta);
    }

    #[test]
    fn test_from_bytes_rejects_bad_blocks() {
        let meta = FirmwareMetadata::for_image(FirmwareKind::Updater, 1, &[0x00]).unwrap();
        let mut bytes = meta.to_bytes();
        assert_eq!(
            FirmwareMetadata::from_bytes(&bytes[..35]),
            Err(MetadataError::InvalidLength(35))
        );
        bytes[4] = 0x00;
        assert!(matches!(
            FirmwareMetadata::from_bytes(&bytes),
            Err(MetadataError::BadMagic(_))
        ));
        bytes[0] = 0x01;
        assert!(matches!(
            FirmwareMetadata::from_bytes(&bytes),
            Err(MetadataError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_default_max_size() {
        assert_eq!(DEFAULT_APP_MAX_SIZE, 0xAD000);
    }
}
