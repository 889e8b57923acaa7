//! Updater + app merge pipeline.
//!
//! The core (parse, combine, validate) is pure. Writing artifacts either goes
//! through an [`ExternalToolRunner`] or falls back to the crate's own writers.

mod merger;
mod runner;

pub use merger::{
    APP_LABEL, ImageMerger, ImageSource, OutputLayout, UPDATER_LABEL, analyze_image, load_image,
};
pub use runner::{
    ExternalToolRunner, ProcessRunner, ToolError, convert_args, merge_args, package_args,
};
