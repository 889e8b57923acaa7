//! Vector table sanity checks.
//!
//! A Cortex-M image starts with its vector table: word 0 is the initial stack
//! pointer, word 1 the reset handler address. After merging the updater and
//! the app into one address space, both tables must still point somewhere
//! sensible. Every check here is advisory: results are reported, never raised.

use serde::Serialize;

use crate::{MemoryImage, RangeError, Region, any_contains};

/// Inclusive SRAM address window a valid initial stack pointer must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SramWindow {
    pub start: u32,
    pub end: u32,
}

impl SramWindow {
    pub fn new(start: u32, end: u32) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::StartExceedsEnd { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr <= self.end
    }
}

impl Default for SramWindow {
    /// nRF52840: 256K of RAM at 0x2000_0000. The top is inclusive so an
    /// initial SP of exactly end-of-RAM is accepted.
    fn default() -> Self {
        Self {
            start: 0x2000_0000,
            end: 0x2004_0000,
        }
    }
}

impl From<Region> for SramWindow {
    fn from(region: Region) -> Self {
        Self {
            start: region.start(),
            end: region.end(),
        }
    }
}

/// The first two words of a vector table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VectorTable {
    pub initial_stack_pointer: u32,
    pub reset_vector: u32,
}

impl VectorTable {
    pub const SIZE: usize = 8;

    /// Best-effort read of the table at `base`. Missing bytes read as 0x00;
    /// the second value is how many of the 8 bytes were missing.
    pub fn read(image: &MemoryImage, base: u32) -> (Self, usize) {
        Self::from_bytes(&image.read_bytes(base, Self::SIZE))
    }

    /// Decode from possibly-absent bytes. Positions past the end of `bytes`
    /// count as missing too.
    pub fn from_bytes(bytes: &[Option<u8>]) -> (Self, usize) {
        let mut raw = [0u8; Self::SIZE];
        let mut missing = Self::SIZE;
        for (slot, byte) in raw.iter_mut().zip(bytes) {
            if let Some(byte) = *byte {
                *slot = byte;
                missing -= 1;
            }
        }

        let table = Self {
            initial_stack_pointer: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            reset_vector: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        };
        (table, missing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VectorTableReport {
    pub label: String,
    pub base_address: u32,
    pub initial_stack_pointer: u32,
    pub reset_vector: u32,
    pub stack_pointer_valid: bool,
    pub reset_vector_in_range: bool,
    /// Bytes of the 8-byte table that were absent from the image.
    pub missing_bytes: usize,
}

impl VectorTableReport {
    pub fn is_valid(&self) -> bool {
        self.stack_pointer_valid && self.reset_vector_in_range
    }

    pub fn is_complete(&self) -> bool {
        self.missing_bytes == 0
    }
}

/// Check the vector table at `base` against the SRAM window and the merged
/// regions. Any missing table byte forces both validity flags to false.
pub fn validate_vector_table(
    label: &str,
    image: &MemoryImage,
    base: u32,
    regions: &[Region],
    sram: &SramWindow,
) -> VectorTableReport {
    let bytes = image.read_bytes(base, VectorTable::SIZE);
    validate_table_bytes(label, base, &bytes, regions, sram)
}

/// Same checks as [`validate_vector_table`], on table bytes already pulled
/// out of some other storage such as a flat binary.
pub fn validate_table_bytes(
    label: &str,
    base: u32,
    bytes: &[Option<u8>],
    regions: &[Region],
    sram: &SramWindow,
) -> VectorTableReport {
    let (table, missing_bytes) = VectorTable::from_bytes(bytes);
    let complete = missing_bytes == 0;

    VectorTableReport {
        label: label.to_string(),
        base_address: base,
        initial_stack_pointer: table.initial_stack_pointer,
        reset_vector: table.reset_vector,
        stack_pointer_valid: complete && sram.contains(table.initial_stack_pointer),
        reset_vector_in_range: complete && any_contains(regions, table.reset_vector),
        missing_bytes,
    }
}
