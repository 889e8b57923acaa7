use std::collections::BTreeMap;

use crate::io::{HexRecord, ParseError, RecordField, RecordType};
use crate::{RangeError, Region, Segment, merge_regions};

/// Sparse byte-addressed firmware image.
///
/// Built by replaying Intel-HEX records top to bottom with [`MemoryImage::apply`].
/// Every Data record writes its payload into the byte map (later writes win)
/// and appends its span to `observed_ranges` in file order, before any merging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryImage {
    bytes: BTreeMap<u32, u8>,
    observed_ranges: Vec<Region>,
    current_base: u32,
}

impl MemoryImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay one decoded record. `line` is only used for error reporting.
    pub fn apply(&mut self, record: &HexRecord, line: usize) -> Result<(), ParseError> {
        match record.record_type {
            RecordType::Data => {
                let overflow = || ParseError::AddressOverflow {
                    line,
                    base: self.current_base,
                    offset: record.address,
                    len: record.payload.len(),
                };
                let start = self
                    .current_base
                    .checked_add(u32::from(record.address))
                    .ok_or_else(overflow)?;
                if !record.payload.is_empty() {
                    start
                        .checked_add(record.payload.len() as u32 - 1)
                        .ok_or_else(overflow)?;
                }
                self.write_bytes(start, &record.payload);
            }
            RecordType::ExtendedLinearAddress => {
                let &[high, low, ..] = record.payload.as_slice() else {
                    return Err(ParseError::MalformedRecord {
                        line,
                        field: RecordField::Payload,
                        message: "extended linear address needs 2 data bytes".to_string(),
                    });
                };
                self.current_base = u32::from(u16::from_be_bytes([high, low])) << 16;
            }
            RecordType::EndOfFile
            | RecordType::ExtendedSegmentAddress
            | RecordType::StartSegmentAddress
            | RecordType::StartLinearAddress => {}
        }
        Ok(())
    }

    /// Write `data` at `addr` and record the span. Bytes past u32::MAX are dropped.
    pub(crate) fn write_bytes(&mut self, addr: u32, data: &[u8]) {
        let mut last = None;
        for (offset, &byte) in data.iter().enumerate() {
            let Some(a) = addr.checked_add(offset as u32) else {
                break;
            };
            self.bytes.insert(a, byte);
            last = Some(a);
        }
        if let Some(region) = last.and_then(|end| Region::from_start_end(addr, end).ok()) {
            self.observed_ranges.push(region);
        }
    }

    pub fn current_base(&self) -> u32 {
        self.current_base
    }

    /// Spans of every Data record in file order, unmerged.
    pub fn observed_ranges(&self) -> &[Region] {
        &self.observed_ranges
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of distinct addresses holding data.
    pub fn byte_count(&self) -> usize {
        self.bytes.len()
    }

    pub fn min_address(&self) -> Option<u32> {
        self.bytes.keys().next().copied()
    }

    pub fn max_address(&self) -> Option<u32> {
        self.bytes.keys().next_back().copied()
    }

    /// Observed ranges reduced to sorted, non-overlapping, non-adjacent regions.
    pub fn merged_regions(&self) -> Result<Vec<Region>, RangeError> {
        merge_regions(&self.observed_ranges)
    }

    // --- Address-based access ---

    /// Read a single byte at address. Returns None if nothing was written there.
    pub fn read_byte(&self, addr: u32) -> Option<u8> {
        self.bytes.get(&addr).copied()
    }

    /// Read bytes from address range. Returns None for gaps.
    pub fn read_bytes(&self, addr: u32, len: usize) -> Vec<Option<u8>> {
        (0..len)
            .map(|i| {
                let a = addr.checked_add(i as u32)?;
                self.read_byte(a)
            })
            .collect()
    }

    /// Read bytes from address range. Returns None if any address in range is not covered.
    pub fn read_bytes_contiguous(&self, addr: u32, len: usize) -> Option<Vec<u8>> {
        self.read_bytes(addr, len).into_iter().collect()
    }

    /// Bytes from `start` to `end` inclusive with gaps replaced by `fill`.
    pub fn flatten(&self, start: u32, end: u32, fill: u8) -> Vec<u8> {
        if start > end {
            return Vec::new();
        }
        let mut out = vec![fill; (end - start) as usize + 1];
        for (&addr, &byte) in self.bytes.range(start..=end) {
            out[(addr - start) as usize] = byte;
        }
        out
    }

    /// Contiguous runs of data, sorted by address.
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments: Vec<Segment> = Vec::new();
        for (&addr, &byte) in &self.bytes {
            match segments.last_mut() {
                Some(current) if current.is_contiguous_with(addr) => current.data.push(byte),
                _ => segments.push(Segment::new(addr, vec![byte])),
            }
        }
        segments
    }

    /// Union of both images. `other` wins where both hold a byte; observed
    /// ranges are concatenated self-first.
    pub fn combined_with(&self, other: &MemoryImage) -> MemoryImage {
        let mut bytes = self.bytes.clone();
        bytes.extend(other.bytes.iter().map(|(&a, &b)| (a, b)));

        let mut observed_ranges = self.observed_ranges.clone();
        observed_ranges.extend_from_slice(&other.observed_ranges);

        MemoryImage {
            bytes,
            observed_ranges,
            current_base: 0,
        }
    }

    /// Addresses written by both images, as merged regions.
    ///
    /// Observed ranges cover exactly the written bytes, so intersecting the
    /// two sorted region lists is exact.
    pub fn overlapping_regions(&self, other: &MemoryImage) -> Vec<Region> {
        let (Ok(ours), Ok(theirs)) = (self.merged_regions(), other.merged_regions()) else {
            return Vec::new();
        };

        let mut shared = Vec::new();
        let (mut i, mut j) = (0, 0);
        while let (Some(a), Some(b)) = (ours.get(i), theirs.get(j)) {
            if let Some(common) = a.intersection(b) {
                shared.push(common);
            }
            if a.end() <= b.end() {
                i += 1;
            } else {
                j += 1;
            }
        }
        shared
    }

    /// True when both images hold identical bytes at identical addresses.
    pub fn same_bytes_as(&self, other: &MemoryImage) -> bool {
        self.bytes == other.bytes
    }
}
