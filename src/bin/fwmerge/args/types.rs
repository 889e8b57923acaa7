use std::path::PathBuf;

use fwmerge::SramWindow;

use super::parse::parse_option;

#[derive(Debug, Default)]
pub struct Args {
    // Positional: <updater.hex> <app.hex>
    pub updater_file: Option<PathBuf>,
    pub app_file: Option<PathBuf>,

    // Analyze one merged file: /AN:file
    pub analyze_file: Option<PathBuf>,

    // Settings file: /P:file
    pub ini_file: Option<PathBuf>,

    // Layout overrides: /UB:addr, /AB:addr, /SR:start-end
    pub updater_base: Option<u32>,
    pub app_base: Option<u32>,
    pub sram: Option<SramWindow>,

    // Skip record checksum verification: /NOCS
    pub no_checksums: bool,

    // External tools: /MT:path, /PT:path
    pub merge_tool: Option<PathBuf>,
    pub package_tool: Option<PathBuf>,

    // Artifact directory: /D:dir or -o dir
    pub output_dir: Option<PathBuf>,

    // Report as JSON: /JSON
    pub json: bool,

    // Hex-dump window around an address: /DUMP:addr
    pub dump_address: Option<u32>,

    // Error log: /E=file
    pub error_log: Option<PathBuf>,

    // Silent mode: /S
    pub silent: bool,

    // Debug logging: /V
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseArgError {
    MissingInputFile,
    InvalidOption(String),
    InvalidRange(String),
    InvalidNumber(String),
    MissingValue(String),
}

impl std::fmt::Display for ParseArgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingInputFile => write!(f, "missing input file"),
            Self::InvalidOption(s) => write!(f, "invalid option: {s}"),
            Self::InvalidRange(s) => write!(f, "invalid range: {s}"),
            Self::InvalidNumber(s) => write!(f, "invalid number: {s}"),
            Self::MissingValue(s) => write!(f, "missing value for {s}"),
        }
    }
}

impl std::error::Error for ParseArgError {}

impl Args {
    pub fn parse() -> Result<Self, ParseArgError> {
        Self::parse_from(std::env::args().skip(1).collect())
    }

    pub fn parse_from(args: Vec<String>) -> Result<Self, ParseArgError> {
        Self::parse_from_with(args, |arg| {
            let path = std::path::Path::new(arg);
            arg.starts_with('/') && path.is_absolute() && path.exists()
        })
    }

    /// `is_existing_abs_path` decides whether an unrecognized `/...` argument
    /// is a Unix path rather than an option.
    pub fn parse_from_with<F>(
        args: Vec<String>,
        is_existing_abs_path: F,
    ) -> Result<Self, ParseArgError>
    where
        F: Fn(&str) -> bool,
    {
        let mut result = Args::default();
        let mut args_iter = args.iter();
        let mut force_positional = false;

        while let Some(arg) = args_iter.next() {
            if arg == "--" {
                force_positional = true;
                continue;
            }

            if !force_positional && arg.eq_ignore_ascii_case("-o") {
                let next = args_iter
                    .next()
                    .ok_or(ParseArgError::MissingValue("-o".into()))?;
                result.output_dir = Some(PathBuf::from(next));
                continue;
            }

            if force_positional {
                result.push_positional(arg)?;
                continue;
            }

            if let Some(opt) = arg.strip_prefix('/').or_else(|| arg.strip_prefix('-')) {
                match parse_option(&mut result, opt) {
                    Ok(()) => {}
                    Err(ParseArgError::InvalidOption(_)) if is_existing_abs_path(arg) => {
                        result.push_positional(arg)?;
                    }
                    Err(ParseArgError::InvalidOption(_)) => {
                        return Err(ParseArgError::InvalidOption(arg.clone()));
                    }
                    Err(e) => return Err(e),
                }
            } else {
                result.push_positional(arg)?;
            }
        }

        Ok(result)
    }

    fn push_positional(&mut self, arg: &str) -> Result<(), ParseArgError> {
        if self.updater_file.is_none() {
            self.updater_file = Some(PathBuf::from(arg));
        } else if self.app_file.is_none() {
            self.app_file = Some(PathBuf::from(arg));
        } else {
            return Err(ParseArgError::InvalidOption(arg.to_string()));
        }
        Ok(())
    }
}
