use super::{ParseError, RecordField};

const START_CODE: u8 = b':';
const BYTE_COUNT_OFFSET: usize = 1;
const ADDRESS_OFFSET: usize = 3;
const RECORD_TYPE_OFFSET: usize = 7;
const PAYLOAD_OFFSET: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Data,
    EndOfFile,
    ExtendedSegmentAddress,
    StartSegmentAddress,
    ExtendedLinearAddress,
    StartLinearAddress,
}

impl RecordType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Data),
            0x01 => Some(Self::EndOfFile),
            0x02 => Some(Self::ExtendedSegmentAddress),
            0x03 => Some(Self::StartSegmentAddress),
            0x04 => Some(Self::ExtendedLinearAddress),
            0x05 => Some(Self::StartLinearAddress),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Data => 0x00,
            Self::EndOfFile => 0x01,
            Self::ExtendedSegmentAddress => 0x02,
            Self::StartSegmentAddress => 0x03,
            Self::ExtendedLinearAddress => 0x04,
            Self::StartLinearAddress => 0x05,
        }
    }
}

/// One decoded Intel-HEX line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    pub byte_count: u8,
    pub address: u16,
    pub record_type: RecordType,
    pub payload: Vec<u8>,
    /// Trailing checksum byte, if the line carried one.
    pub checksum: Option<u8>,
}

impl HexRecord {
    /// Two's complement of the byte sum over count, address, type and payload.
    pub fn expected_checksum(&self) -> u8 {
        let [hi, lo] = self.address.to_be_bytes();
        let sum = [self.byte_count, hi, lo, self.record_type.code()]
            .iter()
            .chain(self.payload.iter())
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        (!sum).wrapping_add(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Compare each record's trailing checksum against its contents.
    pub verify_checksums: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            verify_checksums: true,
        }
    }
}

/// Decode one line. Lines that do not start with ':' are noise and yield `None`.
pub fn parse_record(
    line: &str,
    line_num: usize,
    options: &ParseOptions,
) -> Result<Option<HexRecord>, ParseError> {
    let raw = line.trim_end().as_bytes();
    if raw.first() != Some(&START_CODE) {
        return Ok(None);
    }

    let byte_count = hex_byte(raw, BYTE_COUNT_OFFSET, RecordField::ByteCount, line_num)?;
    let address = u16::from_be_bytes([
        hex_byte(raw, ADDRESS_OFFSET, RecordField::Address, line_num)?,
        hex_byte(raw, ADDRESS_OFFSET + 2, RecordField::Address, line_num)?,
    ]);
    let type_code = hex_byte(raw, RECORD_TYPE_OFFSET, RecordField::RecordType, line_num)?;
    let record_type =
        RecordType::from_code(type_code).ok_or(ParseError::UnsupportedRecordType {
            line: line_num,
            record_type: type_code,
        })?;

    let payload = (0..byte_count as usize)
        .map(|i| hex_byte(raw, PAYLOAD_OFFSET + i * 2, RecordField::Payload, line_num))
        .collect::<Result<Vec<u8>, ParseError>>()?;

    let checksum_offset = PAYLOAD_OFFSET + payload.len() * 2;
    let checksum = if raw.len() >= checksum_offset + 2 {
        Some(hex_byte(raw, checksum_offset, RecordField::Checksum, line_num)?)
    } else {
        None
    };

    let record = HexRecord {
        byte_count,
        address,
        record_type,
        payload,
        checksum,
    };

    if options.verify_checksums {
        verify_checksum(&record, raw.len(), checksum_offset, line_num)?;
    }

    Ok(Some(record))
}

fn verify_checksum(
    record: &HexRecord,
    line_len: usize,
    checksum_offset: usize,
    line_num: usize,
) -> Result<(), ParseError> {
    let Some(actual) = record.checksum else {
        return Err(malformed(line_num, RecordField::Checksum, "missing checksum"));
    };
    if line_len != checksum_offset + 2 {
        return Err(malformed(
            line_num,
            RecordField::Checksum,
            format!(
                "{} trailing characters after checksum",
                line_len - checksum_offset - 2
            ),
        ));
    }
    let expected = record.expected_checksum();
    if actual != expected {
        return Err(ParseError::ChecksumMismatch {
            line: line_num,
            expected,
            actual,
        });
    }
    Ok(())
}

fn hex_byte(
    raw: &[u8],
    offset: usize,
    field: RecordField,
    line_num: usize,
) -> Result<u8, ParseError> {
    let Some(pair) = raw.get(offset..offset + 2) else {
        return Err(malformed(
            line_num,
            field,
            format!("line too short: need {} characters, have {}", offset + 2, raw.len()),
        ));
    };
    let high = hex_digit(pair[0], offset, field, line_num)?;
    let low = hex_digit(pair[1], offset + 1, field, line_num)?;
    Ok((high << 4) | low)
}

fn hex_digit(b: u8, column: usize, field: RecordField, line_num: usize) -> Result<u8, ParseError> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        _ => Err(malformed(
            line_num,
            field,
            format!("invalid hex digit {:?} at column {}", b as char, column + 1),
        )),
    }
}

fn malformed(line: usize, field: RecordField, message: impl Into<String>) -> ParseError {
    ParseError::MalformedRecord {
        line,
        field,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LENIENT: ParseOptions = ParseOptions {
        verify_checksums: false,
    };

    #[test]
    fn test_parse_data_record() {
        let rec = parse_record(
            ":10010000214601360121470136007EFE09D2190140",
            1,
            &ParseOptions::default(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(rec.byte_count, 0x10);
        assert_eq!(rec.address, 0x0100);
        assert_eq!(rec.record_type, RecordType::Data);
        assert_eq!(rec.payload.len(), 16);
        assert_eq!(rec.payload[0], 0x21);
        assert_eq!(rec.checksum, Some(0x40));
    }

    #[test]
    fn test_parse_eof_and_extended_linear() {
        let eof = parse_record(":00000001FF", 1, &ParseOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(eof.record_type, RecordType::EndOfFile);
        assert!(eof.payload.is_empty());

        let ela = parse_record(":020000040004F6", 1, &ParseOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(ela.record_type, RecordType::ExtendedLinearAddress);
        assert_eq!(ela.payload, vec![0x00, 0x04]);
    }

    #[test]
    fn test_non_marker_lines_are_ignored() {
        for line in ["", "   ", "# comment", "\r", " :00000001FF"] {
            assert_eq!(parse_record(line, 1, &ParseOptions::default()), Ok(None));
        }
    }

    #[test]
    fn test_crlf_is_tolerated() {
        let rec = parse_record(":00000001FF\r\n", 1, &ParseOptions::default()).unwrap();
        assert!(rec.is_some());
    }

    #[test]
    fn test_lowercase_hex() {
        let rec = parse_record(":0100000aab4a", 1, &ParseOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(rec.address, 0x000A);
        assert_eq!(rec.payload, vec![0xAB]);
    }

    #[test]
    fn test_corrupted_checksum_rejected_when_verifying() {
        let err = parse_record(
            ":10010000214601360121470136007EFE09D2190141",
            7,
            &ParseOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ParseError::ChecksumMismatch {
                line: 7,
                expected: 0x40,
                actual: 0x41
            }
        );
    }

    #[test]
    fn test_corrupted_checksum_accepted_when_lenient() {
        let rec = parse_record(":10010000214601360121470136007EFE09D2190141", 7, &LENIENT)
            .unwrap()
            .unwrap();
        assert_eq!(rec.checksum, Some(0x41));
        assert_eq!(rec.expected_checksum(), 0x40);
    }

    #[test]
    fn test_missing_checksum() {
        assert!(matches!(
            parse_record(":0100000011", 3, &ParseOptions::default()),
            Err(ParseError::MalformedRecord {
                line: 3,
                field: RecordField::Checksum,
                ..
            })
        ));
        let rec = parse_record(":0100000011", 3, &LENIENT).unwrap().unwrap();
        assert_eq!(rec.checksum, None);
    }

    #[test]
    fn test_short_payload_is_malformed() {
        let err = parse_record(":10010000214601", 4, &LENIENT).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MalformedRecord {
                line: 4,
                field: RecordField::Payload,
                ..
            }
        ));
    }

    #[test]
    fn test_bad_hex_digit_names_field() {
        let err = parse_record(":02XX000011221A", 9, &LENIENT).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MalformedRecord {
                line: 9,
                field: RecordField::Address,
                ..
            }
        ));
        assert!(err.to_string().contains("line 9"));
        assert!(err.to_string().contains("address"));
    }

    #[test]
    fn test_truncated_header() {
        let err = parse_record(":0", 2, &LENIENT).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MalformedRecord {
                field: RecordField::ByteCount,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_record_type() {
        let err = parse_record(":00000006FA", 5, &ParseOptions::default()).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnsupportedRecordType {
                line: 5,
                record_type: 0x06
            }
        );
    }

    #[test]
    fn test_trailing_garbage_rejected_when_verifying() {
        assert!(parse_record(":00000001FFAA", 1, &ParseOptions::default()).is_err());
        assert!(parse_record(":00000001FFAA", 1, &LENIENT).unwrap().is_some());
    }
}
