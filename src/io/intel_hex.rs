use super::{ParseError, ParseOptions, RecordType, parse_record};
use crate::MemoryImage;

const RECORD_DATA: u8 = 0x00;
const RECORD_EOF: u8 = 0x01;
const RECORD_EXTENDED_LINEAR: u8 = 0x04;

#[derive(Debug, Clone)]
pub struct IntelHexWriteOptions {
    pub bytes_per_line: u8,
    /// Terminate records with CRLF instead of LF.
    pub crlf: bool,
}

impl Default for IntelHexWriteOptions {
    fn default() -> Self {
        Self {
            bytes_per_line: 16,
            crlf: false,
        }
    }
}

/// Parse Intel-HEX text into a memory image.
///
/// Lines that do not start with ':' are skipped. Parsing stops at the first
/// End-of-File record; anything after it is ignored. The first malformed
/// record aborts the whole parse.
pub fn parse_intel_hex(input: &[u8], options: &ParseOptions) -> Result<MemoryImage, ParseError> {
    let text = String::from_utf8_lossy(input);
    let mut image = MemoryImage::new();

    for (index, line) in text.lines().enumerate() {
        let line_num = index + 1;
        let Some(record) = parse_record(line, line_num, options)? else {
            continue;
        };
        if record.record_type == RecordType::EndOfFile {
            break;
        }
        image.apply(&record, line_num)?;
    }

    Ok(image)
}

/// Write the image as Intel-HEX using extended linear addressing.
pub fn write_intel_hex(image: &MemoryImage, options: &IntelHexWriteOptions) -> Vec<u8> {
    let mut output = Vec::new();
    let bytes_per_line = if options.bytes_per_line == 0 {
        16
    } else {
        options.bytes_per_line
    } as usize;
    let newline: &[u8] = if options.crlf { b"\r\n" } else { b"\n" };

    // Addresses below 64K need no extended record until one has been emitted.
    let mut current_upper: u16 = 0;

    for segment in image.segments() {
        let mut addr = segment.start_address;
        let mut data_offset = 0;

        while data_offset < segment.len() {
            let upper = (addr >> 16) as u16;
            if upper != current_upper {
                current_upper = upper;
                write_record(
                    &mut output,
                    RECORD_EXTENDED_LINEAR,
                    0,
                    &upper.to_be_bytes(),
                    newline,
                );
            }

            let offset_addr = (addr & 0xFFFF) as u16;
            let remaining_in_bank = 0x10000 - offset_addr as usize;
            let remaining_data = segment.len() - data_offset;
            let chunk_len = bytes_per_line.min(remaining_in_bank).min(remaining_data);

            let chunk = &segment.data[data_offset..data_offset + chunk_len];
            write_record(&mut output, RECORD_DATA, offset_addr, chunk, newline);

            data_offset += chunk_len;
            addr = addr.wrapping_add(chunk_len as u32);
        }
    }

    write_record(&mut output, RECORD_EOF, 0, &[], newline);
    output
}

fn write_record(output: &mut Vec<u8>, record_type: u8, address: u16, data: &[u8], newline: &[u8]) {
    let byte_count = data.len() as u8;
    let addr_bytes = address.to_be_bytes();

    let mut checksum: u8 = 0;
    checksum = checksum.wrapping_add(byte_count);
    checksum = checksum.wrapping_add(addr_bytes[0]);
    checksum = checksum.wrapping_add(addr_bytes[1]);
    checksum = checksum.wrapping_add(record_type);
    for &b in data {
        checksum = checksum.wrapping_add(b);
    }
    checksum = (!checksum).wrapping_add(1);

    output.push(b':');
    write_hex_byte(output, byte_count);
    write_hex_byte(output, addr_bytes[0]);
    write_hex_byte(output, addr_bytes[1]);
    write_hex_byte(output, record_type);
    for &b in data {
        write_hex_byte(output, b);
    }
    write_hex_byte(output, checksum);
    output.extend_from_slice(newline);
}

fn write_hex_byte(output: &mut Vec<u8>, byte: u8) {
    const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";
    output.push(HEX_CHARS[(byte >> 4) as usize]);
    output.push(HEX_CHARS[(byte & 0x0F) as usize]);
}
