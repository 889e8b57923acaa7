use std::path::PathBuf;

use fwmerge::{Region, SramWindow};

use super::types::{Args, ParseArgError};

type ValueParser = fn(&mut Args, &str, &str) -> Result<bool, ParseArgError>;

pub(super) fn split_option(opt: &str) -> Option<(&str, &str)> {
    if let Some(pos) = opt.find(':') {
        Some((&opt[..pos], &opt[pos + 1..]))
    } else if let Some(pos) = opt.find('=') {
        Some((&opt[..pos], &opt[pos + 1..]))
    } else {
        None
    }
}

pub(super) fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'')
}

fn parse_number(s: &str) -> Result<u32, ParseArgError> {
    let s = strip_quotes(s.trim());
    if s.is_empty() {
        return Err(ParseArgError::InvalidNumber("empty".to_string()));
    }
    fwmerge::parse_number(s).map_err(|_| ParseArgError::InvalidNumber(s.to_string()))
}

fn parse_path(key: &str, value: &str) -> Result<PathBuf, ParseArgError> {
    let value = strip_quotes(value);
    if value.is_empty() {
        return Err(ParseArgError::MissingValue(key.to_string()));
    }
    Ok(PathBuf::from(value))
}

fn parse_simple_flag(args: &mut Args, opt_upper: &str) -> bool {
    match opt_upper {
        "S" => {
            args.silent = true;
            true
        }
        "V" => {
            args.verbose = true;
            true
        }
        "NOCS" => {
            args.no_checksums = true;
            true
        }
        "JSON" => {
            args.json = true;
            true
        }
        _ => false,
    }
}

fn parse_path_option(args: &mut Args, key_upper: &str, value: &str) -> Result<bool, ParseArgError> {
    let target = match key_upper {
        "E" => &mut args.error_log,
        "P" => &mut args.ini_file,
        "AN" => &mut args.analyze_file,
        "MT" => &mut args.merge_tool,
        "PT" => &mut args.package_tool,
        "D" => &mut args.output_dir,
        _ => return Ok(false),
    };
    *target = Some(parse_path(key_upper, value)?);
    Ok(true)
}

fn parse_numeric_option(
    args: &mut Args,
    key_upper: &str,
    value: &str,
) -> Result<bool, ParseArgError> {
    let target = match key_upper {
        "UB" => &mut args.updater_base,
        "AB" => &mut args.app_base,
        "DUMP" => &mut args.dump_address,
        _ => return Ok(false),
    };
    *target = Some(parse_number(value)?);
    Ok(true)
}

fn parse_range_option(
    args: &mut Args,
    key_upper: &str,
    value: &str,
) -> Result<bool, ParseArgError> {
    match key_upper {
        "SR" => {
            let region: Region = strip_quotes(value)
                .parse()
                .map_err(|e| ParseArgError::InvalidRange(format!("{value}: {e}")))?;
            args.sram = Some(SramWindow::from(region));
            Ok(true)
        }
        _ => Ok(false),
    }
}

pub(super) fn parse_option(args: &mut Args, opt: &str) -> Result<(), ParseArgError> {
    let opt_upper = opt.to_ascii_uppercase();

    if parse_simple_flag(args, &opt_upper) {
        return Ok(());
    }

    let Some((key, value)) = split_option(opt) else {
        return Err(ParseArgError::InvalidOption(opt.to_string()));
    };
    let key_upper = key.to_ascii_uppercase();

    let parsers: &[ValueParser] = &[parse_path_option, parse_numeric_option, parse_range_option];
    for parser in parsers {
        if parser(args, &key_upper, value)? {
            return Ok(());
        }
    }
    Err(ParseArgError::InvalidOption(opt.to_string()))
}
