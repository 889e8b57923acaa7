use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::metadata::DEFAULT_APP_MAX_SIZE;
use crate::{RangeError, SramWindow, parse_number};

pub const DEFAULT_UPDATER_BASE: u32 = 0x0002_7000;
pub const DEFAULT_APP_BASE: u32 = 0x0004_0000;
/// Nordic nRF52 device type expected by the DFU bootloader.
pub const DEFAULT_DEVICE_TYPE: u16 = 0x0052;
/// nRF52840 flash size. A combined image spanning more than this is not
/// flattened into a binary.
pub const DEFAULT_BIN_MAX_SPAN: u32 = 0x0010_0000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for '{key}': {source}")]
    InvalidValue {
        key: String,
        #[source]
        source: RangeError,
    },

    #[error("invalid boolean for '{key}': {value}")]
    InvalidBool { key: String, value: String },

    #[error("value for '{key}' out of range: {value:#X}")]
    OutOfRange { key: String, value: u32 },
}

/// Everything the merge pipeline needs to know about the target and the
/// external tools. Nothing is looked up from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConfig {
    /// srec_cat-compatible merge/convert tool. None: the core writes outputs itself.
    pub merge_tool_path: Option<PathBuf>,
    /// adafruit-nrfutil-compatible packaging tool. None: no package is built.
    pub packaging_tool_path: Option<PathBuf>,
    pub sram: SramWindow,
    pub updater_base: u32,
    pub app_base: u32,
    pub verify_checksums: bool,
    pub device_type: u16,
    pub application_version: u32,
    pub app_max_size: u32,
    /// Fill byte for gaps when flattening to binary.
    pub gap_fill: u8,
    /// Largest lowest-to-highest address span written as a flat binary.
    pub bin_max_span: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            merge_tool_path: None,
            packaging_tool_path: None,
            sram: SramWindow::default(),
            updater_base: DEFAULT_UPDATER_BASE,
            app_base: DEFAULT_APP_BASE,
            verify_checksums: true,
            device_type: DEFAULT_DEVICE_TYPE,
            application_version: 1,
            app_max_size: DEFAULT_APP_MAX_SIZE,
            gap_fill: 0xFF,
            bin_max_span: DEFAULT_BIN_MAX_SPAN,
        }
    }
}

impl MergeConfig {
    /// Load from an INI file. Unknown keys are ignored, missing keys keep defaults.
    pub fn from_ini_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::default().with_ini(&content)
    }

    /// Apply `key=value` pairs from INI text on top of this config.
    pub fn with_ini(mut self, content: &str) -> Result<Self, ConfigError> {
        let ini = parse_ini(content);

        if let Some(value) = ini.get("mergetool") {
            self.merge_tool_path = non_empty_path(value);
        }
        if let Some(value) = ini.get("packagetool") {
            self.packaging_tool_path = non_empty_path(value);
        }
        if let Some(value) = number(&ini, "sramstart")? {
            self.sram.start = value;
        }
        if let Some(value) = number(&ini, "sramend")? {
            self.sram.end = value;
        }
        if self.sram.start > self.sram.end {
            return Err(ConfigError::InvalidValue {
                key: "sramend".to_string(),
                source: RangeError::StartExceedsEnd {
                    start: self.sram.start,
                    end: self.sram.end,
                },
            });
        }
        if let Some(value) = number(&ini, "updaterbase")? {
            self.updater_base = value;
        }
        if let Some(value) = number(&ini, "appbase")? {
            self.app_base = value;
        }
        if let Some(value) = ini.get("verifychecksums") {
            self.verify_checksums = parse_bool("verifychecksums", value)?;
        }
        if let Some(value) = number(&ini, "devtype")? {
            self.device_type = narrow("devtype", value)?;
        }
        if let Some(value) = number(&ini, "appversion")? {
            self.application_version = value;
        }
        if let Some(value) = number(&ini, "appmaxsize")? {
            self.app_max_size = value;
        }
        if let Some(value) = number(&ini, "gapfill")? {
            self.gap_fill = narrow("gapfill", value)?;
        }
        if let Some(value) = number(&ini, "binmaxspan")? {
            self.bin_max_span = value;
        }

        Ok(self)
    }
}

fn parse_ini(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().trim_matches('"').to_string();
        map.insert(key, value);
    }

    map
}

fn number(ini: &HashMap<String, String>, key: &str) -> Result<Option<u32>, ConfigError> {
    ini.get(key)
        .map(|v| parse_number(v))
        .transpose()
        .map_err(|source| ConfigError::InvalidValue {
            key: key.to_string(),
            source,
        })
}

fn narrow<T: TryFrom<u32>>(key: &str, value: u32) -> Result<T, ConfigError> {
    T::try_from(value).map_err(|_| ConfigError::OutOfRange {
        key: key.to_string(),
        value,
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}
