//! Structured merge/analysis results.
//!
//! These types are the return values of the library API. The `Display`
//! impls are a plain-text rendering for humans; JSON comes from `serde`.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::{FirmwareMetadata, MemoryImage, Region, VectorTableReport};

/// Per-image result: regions of the image's own data plus its vector table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReport {
    pub label: String,
    pub base_address: u32,
    pub regions: Vec<Region>,
    pub total_size_bytes: u64,
    pub vector_table: VectorTableReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_slot: Option<AppSlotReport>,
}

/// Metadata block for the app image and whether it fits the updater's slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppSlotReport {
    /// Lowest to highest app address, inclusive.
    pub span_bytes: u64,
    pub max_size: u32,
    pub fits_app_slot: bool,
    /// Only built for images that fit the slot.
    pub metadata: Option<FirmwareMetadata>,
}

/// An image either yielded data or was empty. Empty is an expected outcome,
/// not an error; its vector table is still reported (all zero, invalid).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ImageOutcome {
    Analyzed(ImageReport),
    Empty {
        label: String,
        vector_table: VectorTableReport,
    },
}

impl ImageOutcome {
    pub fn label(&self) -> &str {
        match self {
            Self::Analyzed(report) => &report.label,
            Self::Empty { label, .. } => label,
        }
    }

    pub fn vector_table(&self) -> &VectorTableReport {
        match self {
            Self::Analyzed(report) => &report.vector_table,
            Self::Empty { vector_table, .. } => vector_table,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty { .. })
    }

    pub fn report(&self) -> Option<&ImageReport> {
        match self {
            Self::Analyzed(report) => Some(report),
            Self::Empty { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombinedReport {
    pub regions: Vec<Region>,
    pub total_size_bytes: u64,
    /// Addresses both images write. Expected to be empty.
    pub overlaps: Vec<Region>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Producer {
    /// The external merge tool wrote the artifacts.
    Tool,
    /// No merge tool was configured; the core wrote them.
    Core,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
    pub hex_path: PathBuf,
    /// None when the combined image spans more than the configured binary limit.
    pub bin_path: Option<PathBuf>,
    pub produced_by: Producer,
    /// Whether the tool's HEX output holds exactly the combined image's bytes.
    /// None when the core wrote the output itself.
    pub tool_output_matches: Option<bool>,
    /// Vector tables re-read from the flat binary.
    pub binary_vector_tables: Vec<VectorTableReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub updater: ImageOutcome,
    pub app: ImageOutcome,
    pub combined: CombinedReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ArtifactReport>,
}

impl MergeReport {
    /// Every vector table check, including the binary cross-check.
    pub fn vector_tables(&self) -> impl Iterator<Item = &VectorTableReport> {
        [self.updater.vector_table(), self.app.vector_table()]
            .into_iter()
            .chain(
                self.artifacts
                    .iter()
                    .flat_map(|a| a.binary_vector_tables.iter()),
            )
    }

    /// Number of advisory findings a human should look at.
    pub fn warning_count(&self) -> usize {
        let vectors = self.vector_tables().filter(|v| !v.is_valid()).count();
        let empty = [&self.updater, &self.app]
            .iter()
            .filter(|o| o.is_empty())
            .count();
        let overlaps = usize::from(!self.combined.overlaps.is_empty());
        let tool = self
            .artifacts
            .as_ref()
            .is_some_and(|a| a.tool_output_matches == Some(false));
        let no_bin = self
            .artifacts
            .as_ref()
            .is_some_and(|a| a.bin_path.is_none());
        let slot = self
            .app
            .report()
            .and_then(|r| r.app_slot.as_ref())
            .is_some_and(|s| !s.fits_app_slot);
        vectors + empty + overlaps + usize::from(tool) + usize::from(no_bin) + usize::from(slot)
    }
}

/// Single-file analysis of an already-merged image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    pub regions: Vec<Region>,
    pub total_size_bytes: u64,
    pub vector_tables: Vec<VectorTableReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump: Option<HexDump>,
}

/// A window of bytes around an address; None marks addresses with no data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HexDump {
    pub start: u32,
    pub bytes: Vec<Option<u8>>,
}

impl HexDump {
    /// `before` bytes ahead of `center` through `after` bytes from it.
    pub fn around(image: &MemoryImage, center: u32, before: u32, after: u32) -> Self {
        let start = center.saturating_sub(before);
        let end = center.saturating_add(after);
        Self {
            start,
            bytes: image.read_bytes(start, (end - start) as usize),
        }
    }
}

// --- Text rendering ---

fn write_regions(f: &mut fmt::Formatter<'_>, regions: &[Region], total: u64) -> fmt::Result {
    writeln!(f, "  Memory regions:")?;
    for region in regions {
        writeln!(
            f,
            "    0x{:08X} - 0x{:08X} ({} bytes)",
            region.start(),
            region.end(),
            region.len()
        )?;
    }
    writeln!(f, "  Total size: {total} bytes")
}

impl fmt::Display for VectorTableReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  {} vector table @ 0x{:08X}:",
            self.label, self.base_address
        )?;
        writeln!(f, "    Initial SP:    0x{:08X}", self.initial_stack_pointer)?;
        writeln!(f, "    Reset vector:  0x{:08X}", self.reset_vector)?;
        if !self.is_complete() {
            writeln!(
                f,
                "    WARNING: {} of 8 table bytes missing",
                self.missing_bytes
            )?;
        }
        if self.stack_pointer_valid {
            writeln!(f, "    OK: SP within SRAM")?;
        } else {
            writeln!(f, "    WARNING: SP outside expected RAM range")?;
        }
        if self.reset_vector_in_range {
            writeln!(f, "    OK: reset vector points inside firmware")
        } else {
            writeln!(f, "    WARNING: reset vector outside firmware range")
        }
    }
}

impl fmt::Display for ImageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analyzed(report) => {
                writeln!(f, "{} (base 0x{:08X}):", report.label, report.base_address)?;
                write_regions(f, &report.regions, report.total_size_bytes)?;
                if let Some(ref slot) = report.app_slot {
                    if let Some(ref meta) = slot.metadata {
                        writeln!(
                            f,
                            "  Metadata: size {} bytes, CRC32 0x{:08X}, version {}",
                            meta.size, meta.crc32, meta.version
                        )?;
                    }
                    if !slot.fits_app_slot {
                        writeln!(
                            f,
                            "  WARNING: image spans {} bytes, app slot holds {}",
                            slot.span_bytes, slot.max_size
                        )?;
                    }
                }
                write!(f, "{}", report.vector_table)
            }
            Self::Empty {
                label,
                vector_table,
            } => {
                writeln!(f, "{label}:")?;
                writeln!(f, "  WARNING: no data records found")?;
                write!(f, "{vector_table}")
            }
        }
    }
}

impl fmt::Display for HexDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.bytes.iter().enumerate() {
            let addr = self.start.wrapping_add(i as u32);
            match byte {
                Some(b) => writeln!(f, "  0x{addr:08X}: 0x{b:02X}")?,
                None => writeln!(f, "  0x{addr:08X}: --")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.updater)?;
        writeln!(f)?;
        write!(f, "{}", self.app)?;
        writeln!(f)?;
        writeln!(f, "Combined:")?;
        write_regions(f, &self.combined.regions, self.combined.total_size_bytes)?;
        for overlap in &self.combined.overlaps {
            writeln!(
                f,
                "  WARNING: images overlap at 0x{:08X} - 0x{:08X}",
                overlap.start(),
                overlap.end()
            )?;
        }

        if let Some(ref artifacts) = self.artifacts {
            writeln!(f)?;
            writeln!(f, "Artifacts:")?;
            writeln!(f, "  HEX: {}", artifacts.hex_path.display())?;
            match artifacts.bin_path {
                Some(ref path) => writeln!(f, "  BIN: {}", path.display())?,
                None => writeln!(f, "  WARNING: image span too large, BIN not written")?,
            }
            match artifacts.tool_output_matches {
                Some(true) => writeln!(f, "  OK: merge tool output matches combined image")?,
                Some(false) => {
                    writeln!(f, "  WARNING: merge tool output differs from combined image")?
                }
                None => {}
            }
            if let Some(ref path) = artifacts.metadata_path {
                writeln!(f, "  Metadata: {}", path.display())?;
            }
            if let Some(ref path) = artifacts.package_path {
                writeln!(f, "  Package: {}", path.display())?;
            }
            for table in &artifacts.binary_vector_tables {
                write!(f, "{table}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_regions(f, &self.regions, self.total_size_bytes)?;
        if let Some(ref dump) = self.dump {
            writeln!(f, "  Hex dump from 0x{:08X}:", dump.start)?;
            write!(f, "{dump}")?;
        }
        for table in &self.vector_tables {
            write!(f, "{table}")?;
        }
        Ok(())
    }
}
