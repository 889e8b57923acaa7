use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("invalid range format: {0}")]
    InvalidFormat(String),

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("range start ({start:#X}) exceeds end ({end:#X})")]
    StartExceedsEnd { start: u32, end: u32 },

    #[error("zero length range at {start:#X}")]
    ZeroLength { start: u32 },

    #[error("no address ranges to merge (image is empty)")]
    EmptyImage,
}

/// An inclusive memory address interval known to hold firmware data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Region {
    start: u32,
    end: u32, // inclusive
}

impl Region {
    /// Create region from start address and length.
    pub fn from_start_length(start: u32, length: u32) -> Result<Self, RangeError> {
        if length == 0 {
            return Err(RangeError::ZeroLength { start });
        }
        let end = start
            .checked_add(length - 1)
            .ok_or_else(|| RangeError::InvalidFormat("address overflow".to_string()))?;
        Ok(Self { start, end })
    }

    /// Create region from start and end addresses (inclusive).
    pub fn from_start_end(start: u32, end: u32) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::StartExceedsEnd { start, end });
        }
        Ok(Self { start, end })
    }


    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    /// Number of bytes covered. u64 so the full 4GiB space is representable.
    pub fn len(&self) -> u64 {
        u64::from(self.end - self.start) + 1
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr <= self.end
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// True when `other` starts right after this region ends.
    pub fn is_adjacent_to(&self, other: &Region) -> bool {
        self.end.checked_add(1) == Some(other.start)
    }

    /// Return the intersection of two regions, if they overlap.
    pub fn intersection(&self, other: &Region) -> Option<Region> {
        if !self.overlaps(other) {
            return None;
        }
        Some(Region {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }
}

/// Reduce inclusive intervals to the minimal sorted set of regions covering
/// exactly the same addresses. Overlapping and adjacent inputs coalesce.
pub fn merge_regions(ranges: &[Region]) -> Result<Vec<Region>, RangeError> {
    let mut sorted = ranges.to_vec();
    sorted.sort_unstable();

    let mut iter = sorted.into_iter();
    let mut current = iter.next().ok_or(RangeError::EmptyImage)?;
    let mut merged = Vec::new();

    for region in iter {
        if current.overlaps(&region) || current.is_adjacent_to(&region) {
            current.end = current.end.max(region.end);
        } else {
            merged.push(current);
            current = region;
        }
    }
    merged.push(current);

    Ok(merged)
}

/// Sum of region lengths in bytes.
pub fn total_size(regions: &[Region]) -> u64 {
    regions.iter().map(Region::len).sum()
}

/// True when at least one region contains `addr`.
pub fn any_contains(regions: &[Region], addr: u32) -> bool {
    regions.iter().any(|r| r.contains(addr))
}

/// Parse a number from decimal, hex (0x or trailing h), or binary (0b).
pub fn parse_number(s: &str) -> Result<u32, RangeError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(RangeError::InvalidNumber("empty string".to_string()));
    }

    let (radix, digits) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
    {
        (16, hex)
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        (2, bin)
    } else if let Some(hex) = s.strip_suffix('h').or_else(|| s.strip_suffix('H')) {
        (16, hex)
    } else {
        (10, s)
    };

    u32::from_str_radix(digits, radix).map_err(|e| RangeError::InvalidNumber(format!("{s}: {e}")))
}

impl FromStr for Region {
    type Err = RangeError;

    /// Parse region from string.
    /// Formats:
    /// - "start,length" (e.g., "0x20000000,0x40000")
    /// - "start-end" (e.g., "0x20000000-0x20040000")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((start_str, len_str)) = s.split_once(',') {
            let start = parse_number(start_str)?;
            let length = parse_number(len_str)?;
            Region::from_start_length(start, length)
        } else if let Some((start_str, end_str)) = s.split_once('-') {
            let start = parse_number(start_str)?;
            let end = parse_number(end_str)?;
            Region::from_start_end(start, end)
        } else {
            Err(RangeError::InvalidFormat(format!(
                "expected 'start,length' or 'start-end', got '{s}'"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: u32, end: u32) -> Region {
        Region::from_start_end(start, end).unwrap()
    }

    #[test]
    fn test_from_start_length() {
        let region = Region::from_start_length(0x27000, 0x100).unwrap();
        assert_eq!(region.start(), 0x27000);
        assert_eq!(region.end(), 0x270FF);
        assert_eq!(region.len(), 0x100);
    }

    #[test]
    fn test_start_exceeds_end_error() {
        assert!(matches!(
            Region::from_start_end(0x2000, 0x1000),
            Err(RangeError::StartExceedsEnd { .. })
        ));
    }

    #[test]
    fn test_full_address_space_length() {
        assert_eq!(r(0, u32::MAX).len(), 1 << 32);
    }

    #[test]
    fn test_contains_and_adjacency() {
        let a = r(0x1000, 0x1FFF);
        assert!(a.contains(0x1000));
        assert!(a.contains(0x1FFF));
        assert!(!a.contains(0x2000));
        assert!(a.is_adjacent_to(&r(0x2000, 0x2FFF)));
        assert!(!a.is_adjacent_to(&r(0x2001, 0x2FFF)));
        assert!(!r(0, u32::MAX).is_adjacent_to(&r(0, 0)));
    }

    #[test]
    fn test_intersection() {
        let i = r(0x1000, 0x1FFF).intersection(&r(0x1800, 0x2800)).unwrap();
        assert_eq!(i, r(0x1800, 0x1FFF));
        assert!(r(0x1000, 0x1FFF).intersection(&r(0x2000, 0x3000)).is_none());
    }

    #[test]
    fn test_merge_basic_scenario() {
        let input = [
            r(0x27000, 0x270FF),
            r(0x27100, 0x271FF),
            r(0x40000, 0x400FF),
        ];
        let merged = merge_regions(&input).unwrap();
        assert_eq!(merged, vec![r(0x27000, 0x271FF), r(0x40000, 0x400FF)]);
        assert_eq!(total_size(&merged), 768);
    }

    #[test]
    fn test_merge_unsorted_and_overlapping() {
        let input = [r(0x300, 0x3FF), r(0x100, 0x1FF), r(0x150, 0x250), r(0x120, 0x130)];
        let merged = merge_regions(&input).unwrap();
        assert_eq!(merged, vec![r(0x100, 0x250), r(0x300, 0x3FF)]);
    }

    #[test]
    fn test_merge_keeps_one_byte_gap() {
        let merged = merge_regions(&[r(0x100, 0x1FF), r(0x201, 0x2FF)]).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_contained_region() {
        let merged = merge_regions(&[r(0x100, 0x4FF), r(0x200, 0x2FF)]).unwrap();
        assert_eq!(merged, vec![r(0x100, 0x4FF)]);
    }

    #[test]
    fn test_merge_at_top_of_address_space() {
        let merged = merge_regions(&[r(0xFFFF_FF00, u32::MAX), r(0xFFFF_FFF0, u32::MAX)]).unwrap();
        assert_eq!(merged, vec![r(0xFFFF_FF00, u32::MAX)]);
    }

    #[test]
    fn test_merge_empty_is_empty_image() {
        assert_eq!(merge_regions(&[]), Err(RangeError::EmptyImage));
    }

    #[test]
    fn test_merge_idempotent() {
        let input = [
            r(0x10, 0x1F),
            r(0x40, 0x4F),
            r(0x20, 0x2F),
            r(0x80, 0x80),
            r(0x45, 0x60),
        ];
        let once = merge_regions(&input).unwrap();
        let twice = merge_regions(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_preserves_union() {
        // Deterministic pseudo-random intervals over a small address space.
        let mut seed: u32 = 0x1234_5678;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        for _ in 0..50 {
            let count = (next() % 12 + 1) as usize;
            let input: Vec<Region> = (0..count)
                .map(|_| {
                    let start = next() % 512;
                    let len = next() % 32;
                    r(start, start + len)
                })
                .collect();

            let merged = merge_regions(&input).unwrap();

            for addr in 0..600u32 {
                assert_eq!(any_contains(&input, addr), any_contains(&merged, addr));
            }
            for pair in merged.windows(2) {
                assert!(pair[1].start() > pair[0].end() + 1);
            }
        }
    }

    #[test]
    fn test_parse_region_formats() {
        let a: Region = "0x20000000-0x20040000".parse().unwrap();
        assert_eq!(a, r(0x2000_0000, 0x2004_0000));
        let b: Region = "0x27000,0x100".parse().unwrap();
        assert_eq!(b, r(0x27000, 0x270FF));
        let c: Region = "27000h-270FFh".parse().unwrap();
        assert_eq!(c, r(0x27000, 0x270FF));
    }

    #[test]
    fn test_parse_region_errors() {
        assert!("".parse::<Region>().is_err());
        assert!("0x1000-".parse::<Region>().is_err());
        assert!("0x1000,0".parse::<Region>().is_err());
        assert!("0x100000000,1".parse::<Region>().is_err());
    }

    #[test]
    fn test_parse_number_radixes() {
        assert_eq!(parse_number("4096"), Ok(4096));
        assert_eq!(parse_number("0x40000"), Ok(0x40000));
        assert_eq!(parse_number("0b101"), Ok(5));
        assert_eq!(parse_number("52h"), Ok(0x52));
        assert!(parse_number("0xZZ").is_err());
    }
}
