use std::path::Path;

use fwmerge::merge::{APP_LABEL, UPDATER_LABEL};
use fwmerge::{HexDump, ImageMerger, MergeConfig, ParseOptions, analyze_image, load_image};
use serde::Serialize;
use tracing::info;

use super::error::{CliError, ExecuteOutput};
use super::types::{Args, ParseArgError};

/// Bytes shown on each side of a `/DUMP` address.
const DUMP_WINDOW: u32 = 16;

impl Args {
    /// Defaults, then the INI file, then command-line overrides.
    pub fn config(&self) -> Result<MergeConfig, CliError> {
        let mut config = match self.ini_file {
            Some(ref path) => MergeConfig::from_ini_file(path)?,
            None => MergeConfig::default(),
        };

        if let Some(base) = self.updater_base {
            config.updater_base = base;
        }
        if let Some(base) = self.app_base {
            config.app_base = base;
        }
        if let Some(sram) = self.sram {
            config.sram = sram;
        }
        if self.no_checksums {
            config.verify_checksums = false;
        }
        if let Some(ref tool) = self.merge_tool {
            config.merge_tool_path = Some(tool.clone());
        }
        if let Some(ref tool) = self.package_tool {
            config.packaging_tool_path = Some(tool.clone());
        }

        Ok(config)
    }

    fn validate_combination(&self) -> Result<(), CliError> {
        if self.analyze_file.is_some() && self.updater_file.is_some() {
            return Err(CliError::Usage(
                "cannot combine /AN with updater/app input files".into(),
            ));
        }
        if self.analyze_file.is_none() && self.dump_address.is_some() {
            return Err(CliError::Usage("/DUMP requires /AN".into()));
        }
        if self.analyze_file.is_some() && self.output_dir.is_some() {
            return Err(CliError::Usage("/AN does not write artifacts".into()));
        }
        Ok(())
    }

    pub fn execute(&self) -> Result<ExecuteOutput, CliError> {
        self.validate_combination()?;
        let config = self.config()?;

        if let Some(ref path) = self.analyze_file {
            return self.execute_analyze(path, &config);
        }

        let (Some(updater), Some(app)) = (&self.updater_file, &self.app_file) else {
            return Err(ParseArgError::MissingInputFile.into());
        };

        let merger = ImageMerger::with_process_runner(config);
        let updater = merger.updater_source(updater);
        let app = merger.app_source(app);
        let report = match self.output_dir {
            Some(ref dir) => merger.run(&updater, &app, dir)?,
            None => merger.analyze(&updater, &app)?,
        };

        Ok(ExecuteOutput {
            warnings: report.warning_count(),
            report: self.render(&report)?,
        })
    }

    fn execute_analyze(&self, path: &Path, config: &MergeConfig) -> Result<ExecuteOutput, CliError> {
        info!(path = %path.display(), "analyzing merged image");
        let options = ParseOptions {
            verify_checksums: config.verify_checksums,
        };
        let image = load_image(path, &options)?;
        let mut report = analyze_image(
            &image,
            &[
                (UPDATER_LABEL, config.updater_base),
                (APP_LABEL, config.app_base),
            ],
            &config.sram,
        );
        if let Some(addr) = self.dump_address {
            report.dump = Some(HexDump::around(&image, addr, DUMP_WINDOW, DUMP_WINDOW));
        }

        let warnings = report.vector_tables.iter().filter(|t| !t.is_valid()).count();
        Ok(ExecuteOutput {
            warnings,
            report: self.render(&report)?,
        })
    }

    fn render<T: Serialize + std::fmt::Display>(&self, report: &T) -> Result<String, CliError> {
        if self.json {
            let mut out = serde_json::to_string_pretty(report)?;
            out.push('\n');
            Ok(out)
        } else {
            Ok(report.to_string())
        }
    }
}
