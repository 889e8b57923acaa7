use std::fmt;

use thiserror::Error;

/// The fixed-width field of a record that failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    ByteCount,
    Address,
    RecordType,
    Payload,
    Checksum,
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ByteCount => "byte count",
            Self::Address => "address",
            Self::RecordType => "record type",
            Self::Payload => "payload",
            Self::Checksum => "checksum",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed record at line {line} ({field}): {message}")]
    MalformedRecord {
        line: usize,
        field: RecordField,
        message: String,
    },

    #[error("checksum mismatch at line {line}: expected {expected:02X}, got {actual:02X}")]
    ChecksumMismatch {
        line: usize,
        expected: u8,
        actual: u8,
    },

    #[error("unsupported record type at line {line}: {record_type:02X}")]
    UnsupportedRecordType { line: usize, record_type: u8 },

    #[error("address overflow at line {line}: {base:#X} + {offset:#X} + {len} exceeds u32")]
    AddressOverflow {
        line: usize,
        base: u32,
        offset: u16,
        len: usize,
    },
}

impl ParseError {
    /// Line number the error points at.
    pub fn line(&self) -> usize {
        match self {
            Self::MalformedRecord { line, .. }
            | Self::ChecksumMismatch { line, .. }
            | Self::UnsupportedRecordType { line, .. }
            | Self::AddressOverflow { line, .. } => *line,
        }
    }
}
