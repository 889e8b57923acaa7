use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::runner::{
    ExternalToolRunner, ProcessRunner, ToolError, convert_args, merge_args, package_args,
};
use crate::io::{
    BinaryWriteOptions, IntelHexWriteOptions, ParseOptions, parse_intel_hex, write_binary,
    write_intel_hex,
};
use crate::metadata::{FirmwareKind, FirmwareMetadata};
use crate::range::total_size;
use crate::report::{
    AnalysisReport, AppSlotReport, ArtifactReport, CombinedReport, ImageOutcome, ImageReport,
    MergeReport, Producer,
};
use crate::vector::{
    SramWindow, VectorTable, VectorTableReport, validate_table_bytes, validate_vector_table,
};
use crate::{Error, MergeConfig, MemoryImage, RangeError, Region};

pub const UPDATER_LABEL: &str = "Updater";
pub const APP_LABEL: &str = "App";

/// One input image: where it lives and where its vector table sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub label: String,
    pub path: PathBuf,
    pub base_address: u32,
}

impl ImageSource {
    pub fn new(label: impl Into<String>, path: impl Into<PathBuf>, base_address: u32) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
            base_address,
        }
    }
}

/// Artifact file names inside the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    dir: PathBuf,
}

impl OutputLayout {
    const STEM: &'static str = "firmware";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn hex(&self) -> PathBuf {
        self.dir.join(format!("{}.hex", Self::STEM))
    }

    pub fn bin(&self) -> PathBuf {
        self.dir.join(format!("{}.bin", Self::STEM))
    }

    pub fn package(&self) -> PathBuf {
        self.dir.join(format!("{}.zip", Self::STEM))
    }

    pub fn metadata(&self) -> PathBuf {
        self.dir.join("app_metadata.bin")
    }
}

/// Read and parse an Intel HEX file. Errors name the file.
pub fn load_image(path: &Path, options: &ParseOptions) -> Result<MemoryImage, Error> {
    if !path.exists() {
        return Err(Error::SourceUnavailable {
            path: path.to_path_buf(),
        });
    }
    let data = std::fs::read(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_intel_hex(&data, options).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Regions, size, and vector tables of an already-merged image.
///
/// Tables are checked against the image's own regions. An empty image yields
/// no regions and all-missing tables.
pub fn analyze_image(
    image: &MemoryImage,
    tables: &[(&str, u32)],
    sram: &SramWindow,
) -> AnalysisReport {
    let regions = image.merged_regions().unwrap_or_default();
    let vector_tables = tables
        .iter()
        .map(|&(label, base)| validate_vector_table(label, image, base, &regions, sram))
        .inspect(log_vector_table)
        .collect();
    AnalysisReport {
        total_size_bytes: total_size(&regions),
        regions,
        vector_tables,
        dump: None,
    }
}

fn log_vector_table(report: &VectorTableReport) {
    if !report.is_complete() {
        warn!(
            label = %report.label,
            base = format_args!("{:#010X}", report.base_address),
            missing = report.missing_bytes,
            "vector table incomplete"
        );
        return;
    }
    if !report.stack_pointer_valid {
        warn!(
            label = %report.label,
            sp = format_args!("{:#010X}", report.initial_stack_pointer),
            "initial stack pointer outside SRAM"
        );
    }
    if !report.reset_vector_in_range {
        warn!(
            label = %report.label,
            reset = format_args!("{:#010X}", report.reset_vector),
            "reset vector outside firmware regions"
        );
    }
}

struct PairAnalysis {
    combined: MemoryImage,
    report: MergeReport,
}

/// Combines an updater and an app image, validates both vector tables, and
/// produces the flashable artifacts.
pub struct ImageMerger<R = ProcessRunner> {
    config: MergeConfig,
    runner: R,
}

impl ImageMerger<ProcessRunner> {
    pub fn with_process_runner(config: MergeConfig) -> Self {
        Self::new(config, ProcessRunner)
    }
}

impl<R: ExternalToolRunner> ImageMerger<R> {
    pub fn new(config: MergeConfig, runner: R) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn updater_source(&self, path: impl Into<PathBuf>) -> ImageSource {
        ImageSource::new(UPDATER_LABEL, path, self.config.updater_base)
    }

    pub fn app_source(&self, path: impl Into<PathBuf>) -> ImageSource {
        ImageSource::new(APP_LABEL, path, self.config.app_base)
    }

    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            verify_checksums: self.config.verify_checksums,
        }
    }

    /// Parse and validate both images without producing any files.
    pub fn analyze(&self, updater: &ImageSource, app: &ImageSource) -> Result<MergeReport, Error> {
        Ok(self.analyze_pair(updater, app)?.report)
    }

    /// Full pipeline: analyze, write the combined HEX and BIN into
    /// `output_dir`, cross-check them, and package when a tool is configured.
    pub fn run(
        &self,
        updater: &ImageSource,
        app: &ImageSource,
        output_dir: &Path,
    ) -> Result<MergeReport, Error> {
        let PairAnalysis {
            combined,
            mut report,
        } = self.analyze_pair(updater, app)?;

        let metadata = report
            .app
            .report()
            .and_then(|r| r.app_slot.as_ref())
            .and_then(|slot| slot.metadata.clone());
        let artifacts = self.produce_artifacts(
            updater,
            app,
            &combined,
            &report.combined.regions,
            metadata.as_ref(),
            output_dir,
        )?;
        report.artifacts = Some(artifacts);

        info!(warnings = report.warning_count(), "merge complete");
        Ok(report)
    }

    fn analyze_pair(
        &self,
        updater: &ImageSource,
        app: &ImageSource,
    ) -> Result<PairAnalysis, Error> {
        // Both sources must exist before either is parsed.
        for source in [updater, app] {
            if !source.path.exists() {
                return Err(Error::SourceUnavailable {
                    path: source.path.clone(),
                });
            }
        }

        let options = self.parse_options();
        info!(path = %updater.path.display(), "parsing updater image");
        let updater_image = load_image(&updater.path, &options)?;
        info!(path = %app.path.display(), "parsing app image");
        let app_image = load_image(&app.path, &options)?;

        let combined = updater_image.combined_with(&app_image);
        let combined_regions = combined.merged_regions().unwrap_or_default();
        let overlaps = updater_image.overlapping_regions(&app_image);
        if !overlaps.is_empty() {
            warn!(
                regions = overlaps.len(),
                "updater and app images overlap, app bytes take precedence"
            );
        }
        debug!(regions = combined_regions.len(), "combined image built");

        let app_slot = self.app_slot(&app_image)?;
        let report = MergeReport {
            updater: self.outcome(updater, &updater_image, &combined, &combined_regions, None)?,
            app: self.outcome(app, &app_image, &combined, &combined_regions, app_slot)?,
            combined: CombinedReport {
                total_size_bytes: total_size(&combined_regions),
                regions: combined_regions,
                overlaps,
            },
            artifacts: None,
        };

        Ok(PairAnalysis { combined, report })
    }

    fn outcome(
        &self,
        source: &ImageSource,
        image: &MemoryImage,
        combined: &MemoryImage,
        combined_regions: &[Region],
        app_slot: Option<AppSlotReport>,
    ) -> Result<ImageOutcome, Error> {
        let vector_table = validate_vector_table(
            &source.label,
            combined,
            source.base_address,
            combined_regions,
            &self.config.sram,
        );
        log_vector_table(&vector_table);

        match image.merged_regions() {
            Ok(regions) => Ok(ImageOutcome::Analyzed(ImageReport {
                label: source.label.clone(),
                base_address: source.base_address,
                total_size_bytes: total_size(&regions),
                regions,
                vector_table,
                app_slot,
            })),
            Err(RangeError::EmptyImage) => {
                warn!(label = %source.label, "image contains no data records");
                Ok(ImageOutcome::Empty {
                    label: source.label.clone(),
                    vector_table,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn app_slot(&self, image: &MemoryImage) -> Result<Option<AppSlotReport>, Error> {
        let (Some(start), Some(end)) = (image.min_address(), image.max_address()) else {
            return Ok(None);
        };
        let max_size = self.config.app_max_size;
        let span_bytes = u64::from(end - start) + 1;

        // Never flatten a span that could not be flashed anyway.
        let metadata = if span_bytes <= u64::from(max_size) {
            let flat = image.flatten(start, end, self.config.gap_fill);
            Some(FirmwareMetadata::for_image(
                FirmwareKind::App,
                self.config.application_version,
                &flat,
            )?)
        } else {
            None
        };
        let fits_app_slot = metadata.as_ref().is_some_and(|meta| meta.fits(max_size));
        if !fits_app_slot {
            warn!(span_bytes, max_size, "app image does not fit the app slot");
        }

        Ok(Some(AppSlotReport {
            span_bytes,
            max_size,
            fits_app_slot,
            metadata,
        }))
    }

    fn invoke(&self, program: &Path, args: Vec<OsString>) -> Result<(), ToolError> {
        debug!(program = %program.display(), ?args, "running external tool");
        self.runner.run(program, &args)
    }

    fn produce_artifacts(
        &self,
        updater: &ImageSource,
        app: &ImageSource,
        combined: &MemoryImage,
        combined_regions: &[Region],
        metadata: Option<&FirmwareMetadata>,
        output_dir: &Path,
    ) -> Result<ArtifactReport, Error> {
        std::fs::create_dir_all(output_dir).map_err(|source| Error::Write {
            path: output_dir.to_path_buf(),
            source,
        })?;
        let layout = OutputLayout::new(output_dir);
        let hex_path = layout.hex();
        let bin_path = layout.bin();

        let (produced_by, tool_output_matches, bin_written) = match self.config.merge_tool_path {
            Some(ref tool) => {
                info!(tool = %tool.display(), "merging with external tool");
                self.invoke(tool, merge_args(&updater.path, &app.path, &hex_path))?;
                self.invoke(tool, convert_args(&hex_path, &bin_path))?;
                let matches = self.certify_tool_output(&hex_path, combined)?;
                (Producer::Tool, Some(matches), true)
            }
            None => {
                info!(dir = %output_dir.display(), "writing combined image");
                let written = self.write_outputs(combined, &hex_path, &bin_path)?;
                (Producer::Core, None, written)
            }
        };

        let (bin_path, binary_vector_tables) = if bin_written {
            let bin_base = combined.min_address().unwrap_or(0);
            let tables =
                self.check_binary(&bin_path, bin_base, combined_regions, [updater, app])?;
            (Some(bin_path), tables)
        } else {
            (None, Vec::new())
        };

        let metadata_path = match metadata {
            Some(meta) => {
                let path = layout.metadata();
                write_file(&path, &meta.to_bytes())?;
                Some(path)
            }
            None => None,
        };

        let package_path = match (&self.config.packaging_tool_path, &bin_path) {
            (Some(tool), Some(bin)) => {
                let zip = layout.package();
                info!(tool = %tool.display(), "building DFU package");
                self.invoke(
                    tool,
                    package_args(
                        bin,
                        self.config.device_type,
                        self.config.application_version,
                        &zip,
                    ),
                )?;
                Some(zip)
            }
            (Some(_), None) => {
                warn!("no binary to package, skipping DFU package");
                None
            }
            (None, _) => None,
        };

        Ok(ArtifactReport {
            hex_path,
            bin_path,
            produced_by,
            tool_output_matches,
            binary_vector_tables,
            metadata_path,
            package_path,
        })
    }

    /// Write the HEX and, unless the image spans more than `bin_max_span`,
    /// the flat BIN. Returns whether the BIN was written.
    fn write_outputs(
        &self,
        combined: &MemoryImage,
        hex: &Path,
        bin: &Path,
    ) -> Result<bool, Error> {
        write_file(hex, &write_intel_hex(combined, &IntelHexWriteOptions::default()))?;

        let span_bytes = match (combined.min_address(), combined.max_address()) {
            (Some(start), Some(end)) => u64::from(end - start) + 1,
            _ => 0,
        };
        let max_span = self.config.bin_max_span;
        if span_bytes > u64::from(max_span) {
            warn!(span_bytes, max_span, "combined image span too large, binary not written");
            return Ok(false);
        }

        let flat = write_binary(
            combined,
            &BinaryWriteOptions {
                fill_byte: self.config.gap_fill,
            },
        );
        let data = flat.map(|f| f.data).unwrap_or_default();
        write_file(bin, &data)?;
        Ok(true)
    }

    /// Re-parse the tool's HEX output and compare it with the core's image.
    fn certify_tool_output(&self, hex: &Path, combined: &MemoryImage) -> Result<bool, Error> {
        let produced = load_image(hex, &self.parse_options())?;
        let matches = produced.same_bytes_as(combined);
        if matches {
            debug!("merge tool output matches combined image");
        } else {
            warn!(path = %hex.display(), "merge tool output differs from combined image");
        }
        Ok(matches)
    }

    /// Vector tables as they appear in the flat binary, which starts at
    /// `bin_base`. Only the table bytes are read from the file.
    fn check_binary(
        &self,
        bin: &Path,
        bin_base: u32,
        combined_regions: &[Region],
        sources: [&ImageSource; 2],
    ) -> Result<Vec<VectorTableReport>, Error> {
        let read_error = |source: std::io::Error| Error::Read {
            path: bin.to_path_buf(),
            source,
        };
        let mut file = File::open(bin).map_err(read_error)?;

        let mut reports = Vec::with_capacity(sources.len());
        for source in sources {
            let window = match source.base_address.checked_sub(bin_base) {
                Some(offset) => read_window(&mut file, u64::from(offset), VectorTable::SIZE)
                    .map_err(read_error)?,
                None => Vec::new(),
            };
            let bytes: Vec<Option<u8>> = window.into_iter().map(Some).collect();
            let report = validate_table_bytes(
                &format!("{} (bin)", source.label),
                source.base_address,
                &bytes,
                combined_regions,
                &self.config.sram,
            );
            log_vector_table(&report);
            reports.push(report);
        }
        Ok(reports)
    }
}

/// Up to `len` bytes at `offset`. Short when the file ends first.
fn read_window(file: &mut File, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
    let mut window = Vec::with_capacity(len);
    file.seek(SeekFrom::Start(offset))?;
    file.by_ref().take(len as u64).read_to_end(&mut window)?;
    Ok(window)
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), Error> {
    std::fs::write(path, data).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn table(sp: u32, reset: u32) -> Vec<u8> {
        let mut bytes = sp.to_le_bytes().to_vec();
        bytes.extend_from_slice(&reset.to_le_bytes());
        bytes
    }

    fn image(base: u32, len: usize, sp: u32, reset: u32) -> MemoryImage {
        let mut image = MemoryImage::new();
        let mut data = table(sp, reset);
        data.resize(len, 0xA5);
        image.write_bytes(base, &data);
        image
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("fwmerge_merger_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[derive(Default)]
    struct NoTools {
        calls: RefCell<usize>,
    }

    impl ExternalToolRunner for NoTools {
        fn run(&self, _program: &Path, _args: &[OsString]) -> Result<(), ToolError> {
            *self.calls.borrow_mut() += 1;
            Ok(())
        }
    }

    #[test]
    fn test_analyze_image_single_file() {
        let mut merged = image(0x27000, 0x100, 0x2000_8000, 0x27001);
        merged.write_bytes(0x40000, &table(0x2004_0000, 0x40101));
        merged.write_bytes(0x40008, &[0u8; 0x1F8]);

        let report = analyze_image(
            &merged,
            &[(UPDATER_LABEL, 0x27000), (APP_LABEL, 0x40000)],
            &SramWindow::default(),
        );
        assert_eq!(report.regions.len(), 2);
        assert_eq!(report.total_size_bytes, 0x300);
        assert!(report.vector_tables.iter().all(|t| t.is_valid()));
        // Reset vector 0x27101 lies past the 0x100-byte updater region.
        let small = image(0x27000, 0x100, 0x2000_8000, 0x27101);
        let report = analyze_image(&small, &[(UPDATER_LABEL, 0x27000)], &SramWindow::default());
        assert!(!report.vector_tables[0].reset_vector_in_range);
    }

    #[test]
    fn test_analyze_empty_image() {
        let report = analyze_image(&MemoryImage::new(), &[(APP_LABEL, 0x40000)], &SramWindow::default());
        assert!(report.regions.is_empty());
        assert_eq!(report.total_size_bytes, 0);
        assert_eq!(report.vector_tables[0].missing_bytes, 8);
    }

    #[test]
    fn test_app_slot_metadata() {
        let merger = ImageMerger::new(MergeConfig::default(), NoTools::default());
        let mut app = MemoryImage::new();
        app.write_bytes(0x40000, &[0x01, 0x02]);
        app.write_bytes(0x40004, &[0x03]);

        let slot = merger.app_slot(&app).unwrap().unwrap();
        assert_eq!(slot.span_bytes, 5);
        assert!(slot.fits_app_slot);
        let meta = slot.metadata.unwrap();
        assert_eq!(meta.size, 5);
        assert!(meta.matches(&[0x01, 0x02, 0xFF, 0xFF, 0x03]));

        assert_eq!(merger.app_slot(&MemoryImage::new()).unwrap(), None);
    }

    #[test]
    fn test_app_slot_too_large() {
        let config = MergeConfig {
            app_max_size: 4,
            ..Default::default()
        };
        let merger = ImageMerger::new(config, NoTools::default());
        let app = image(0x40000, 8, 0x2004_0000, 0x40001);
        let slot = merger.app_slot(&app).unwrap().unwrap();
        assert!(!slot.fits_app_slot);
        assert_eq!(slot.metadata, None);
    }

    #[test]
    fn test_missing_source_is_reported_before_parsing() {
        let runner = NoTools::default();
        let merger = ImageMerger::new(MergeConfig::default(), &runner);
        let updater = merger.updater_source("/nonexistent/updater.hex");
        let app = merger.app_source("/nonexistent/app.hex");
        let err = merger.analyze(&updater, &app).unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { ref path } if path == Path::new("/nonexistent/updater.hex")));
        assert_eq!(*runner.calls.borrow(), 0);
    }

    #[test]
    fn test_sparse_image_skips_binary() {
        let dir = scratch("sparse");
        let hex = dir.join("firmware.hex");
        let bin = dir.join("firmware.bin");
        let config = MergeConfig {
            bin_max_span: 0x1000,
            ..Default::default()
        };
        let merger = ImageMerger::new(config, NoTools::default());

        // UICR word far above flash.
        let mut sparse = image(0x27000, 0x100, 0x2000_8000, 0x27001);
        sparse.write_bytes(0x1000_1014, &[0xFF; 4]);
        assert!(!merger.write_outputs(&sparse, &hex, &bin).unwrap());
        assert!(hex.exists());
        assert!(!bin.exists());

        let dense = image(0x27000, 0x100, 0x2000_8000, 0x27001);
        assert!(merger.write_outputs(&dense, &hex, &bin).unwrap());
        assert_eq!(std::fs::read(&bin).unwrap().len(), 0x100);
    }

    #[test]
    fn test_check_binary_reads_table_windows() {
        let dir = scratch("check_binary");
        let bin = dir.join("firmware.bin");
        // Starts at 0x27000 and ends four bytes into the app table.
        let mut data = table(0x2000_8000, 0x27001);
        data.resize(0x19004, 0xFF);
        data[0x19000..].copy_from_slice(&0x2004_0000u32.to_le_bytes());
        std::fs::write(&bin, &data).unwrap();

        let merger = ImageMerger::new(MergeConfig::default(), NoTools::default());
        let regions = [Region::from_start_end(0x27000, 0x40003).unwrap()];
        let updater = merger.updater_source("updater.hex");
        let app = merger.app_source("app.hex");

        let reports = merger
            .check_binary(&bin, 0x27000, &regions, [&updater, &app])
            .unwrap();
        assert_eq!(reports[0].label, "Updater (bin)");
        assert!(reports[0].is_valid());
        assert_eq!(reports[1].missing_bytes, 4);
        assert_eq!(reports[1].initial_stack_pointer, 0x2004_0000);
        assert!(!reports[1].stack_pointer_valid);

        // A table below the start of the binary is entirely missing.
        let low = ImageSource::new("Low", "low.hex", 0x1000);
        let reports = merger
            .check_binary(&bin, 0x27000, &regions, [&low, &updater])
            .unwrap();
        assert_eq!(reports[0].missing_bytes, 8);
        assert!(reports[1].is_valid());
    }

    #[test]
    fn test_output_layout() {
        let layout = OutputLayout::new("out");
        assert_eq!(layout.hex(), Path::new("out/firmware.hex"));
        assert_eq!(layout.bin(), Path::new("out/firmware.bin"));
        assert_eq!(layout.package(), Path::new("out/firmware.zip"));
    }
}
