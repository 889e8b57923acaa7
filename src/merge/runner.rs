use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch {}: {source}", program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} exited with {status}", program.display())]
    Failed { program: PathBuf, status: String },
}

/// Runs an external program to completion.
///
/// The merge pipeline never spawns processes directly; tests substitute a
/// recording implementation.
pub trait ExternalToolRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> Result<(), ToolError>;
}

impl<R: ExternalToolRunner + ?Sized> ExternalToolRunner for &R {
    fn run(&self, program: &Path, args: &[OsString]) -> Result<(), ToolError> {
        (**self).run(program, args)
    }
}

/// Runs tools with `std::process::Command`, inheriting stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ExternalToolRunner for ProcessRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> Result<(), ToolError> {
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|source| ToolError::Launch {
                program: program.to_path_buf(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(ToolError::Failed {
                program: program.to_path_buf(),
                status: status.to_string(),
            })
        }
    }
}

// srec_cat command lines.

/// `<updater> -Intel <app> -Intel -o <out.hex> -Intel`
pub fn merge_args(updater: &Path, app: &Path, out_hex: &Path) -> Vec<OsString> {
    vec![
        updater.into(),
        "-Intel".into(),
        app.into(),
        "-Intel".into(),
        "-o".into(),
        out_hex.into(),
        "-Intel".into(),
    ]
}

/// `<in.hex> -Intel -o <out.bin> -Binary`
pub fn convert_args(hex: &Path, out_bin: &Path) -> Vec<OsString> {
    vec![
        hex.into(),
        "-Intel".into(),
        "-o".into(),
        out_bin.into(),
        "-Binary".into(),
    ]
}

// adafruit-nrfutil command line.

/// `dfu genpkg --dev-type 0xNNNN --application <bin> --application-version 0xNNNN <zip>`
pub fn package_args(
    bin: &Path,
    device_type: u16,
    application_version: u32,
    out_zip: &Path,
) -> Vec<OsString> {
    vec![
        "dfu".into(),
        "genpkg".into(),
        "--dev-type".into(),
        format!("0x{device_type:04X}").into(),
        "--application".into(),
        bin.into(),
        "--application-version".into(),
        format!("0x{application_version:04X}").into(),
        out_zip.into(),
    ]
}
