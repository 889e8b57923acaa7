pub mod config;
pub mod error;
pub mod image;
pub mod io;
pub mod merge;
pub mod metadata;
pub mod range;
pub mod report;
pub mod segment;
pub mod vector;

pub use config::{ConfigError, MergeConfig};
pub use error::Error;
pub use image::MemoryImage;
pub use io::{
    BinaryWriteOptions, FlatBinary, HexRecord, IntelHexWriteOptions, ParseError, ParseOptions,
    RecordField, RecordType, parse_binary, parse_intel_hex, parse_record, write_binary,
    write_intel_hex,
};
pub use merge::{
    ExternalToolRunner, ImageMerger, ImageSource, OutputLayout, ProcessRunner, ToolError,
    analyze_image, load_image,
};
pub use metadata::{FirmwareKind, FirmwareMetadata, MetadataError};
pub use range::{RangeError, Region, any_contains, merge_regions, parse_number, total_size};
pub use report::{
    AnalysisReport, AppSlotReport, ArtifactReport, CombinedReport, HexDump, ImageOutcome,
    ImageReport, MergeReport, Producer,
};
pub use segment::Segment;
pub use vector::{SramWindow, VectorTable, VectorTableReport, validate_table_bytes, validate_vector_table};
