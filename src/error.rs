use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::io::ParseError;
use crate::merge::ToolError;
use crate::metadata::MetadataError;
use crate::range::RangeError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("source file not found: {}", path.display())]
    SourceUnavailable { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}
