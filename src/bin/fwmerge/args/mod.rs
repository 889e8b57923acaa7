//! HexView-style CLI for the updater + app merge.
//!
//! Processing order:
//! 1. Open error log (/E)
//! 2. Set log level (/S, /V)
//! 3. Build config: defaults, INI (/P), option overrides
//! 4. Analyze one file (/AN) or merge updater + app
//! 5. Write artifacts (/D or -o) and print the report (/JSON)

mod error;
mod execute;
mod parse;
mod types;

use std::process::ExitCode;

use tracing::{Level, error, info};

pub use types::Args;

fn init_tracing(level: Level) {
    let _ = tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() -> ExitCode {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(ref path) = args.error_log {
        let _ = std::fs::write(path, "");
    }

    let level = if args.silent {
        Level::ERROR
    } else if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(level);

    match args.execute() {
        Ok(output) => {
            if output.warnings > 0 {
                info!(warnings = output.warnings, "finished with warnings");
            }
            if args.json || !args.silent {
                print!("{}", output.report);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if let Some(ref path) = args.error_log {
                let _ = std::fs::write(path, format!("{e}"));
            }
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
