mod binary;
mod error;
mod intel_hex;
mod record;

pub use binary::{BinaryWriteOptions, FlatBinary, parse_binary, write_binary};
pub use error::{ParseError, RecordField};
pub use intel_hex::{IntelHexWriteOptions, parse_intel_hex, write_intel_hex};
pub use record::{HexRecord, ParseOptions, RecordType, parse_record};
