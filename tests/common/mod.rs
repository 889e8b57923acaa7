#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};

use fwmerge::{IntelHexWriteOptions, MemoryImage, parse_binary, write_intel_hex};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

pub const EOF_RECORD: &str = ":00000001FF";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let mut dir = std::env::temp_dir();
    dir.push(format!("fwmerge_{prefix}_{}_{}", std::process::id(), id));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn write_file(path: &Path, data: &[u8]) {
    std::fs::write(path, data).unwrap();
}

pub fn run_fwmerge(args: &[String]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fwmerge"))
        .args(args)
        .output()
        .unwrap()
}

pub fn assert_success(output: &Output) {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("fwmerge failed: {stderr}");
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn record(record_type: u8, address: u16, payload: &[u8]) -> String {
    let [hi, lo] = address.to_be_bytes();
    let mut sum = (payload.len() as u8)
        .wrapping_add(hi)
        .wrapping_add(lo)
        .wrapping_add(record_type);
    let mut line = format!(":{:02X}{address:04X}{record_type:02X}", payload.len());
    for &b in payload {
        sum = sum.wrapping_add(b);
        line.push_str(&format!("{b:02X}"));
    }
    line.push_str(&format!("{:02X}", sum.wrapping_neg()));
    line
}

/// Data record line with a correct checksum.
pub fn data_record(address: u16, payload: &[u8]) -> String {
    record(0x00, address, payload)
}

/// Extended linear address record selecting the upper 16 address bits.
pub fn ela_record(high: u16) -> String {
    record(0x04, 0, &high.to_be_bytes())
}

pub fn vector_table(sp: u32, reset: u32) -> Vec<u8> {
    let mut bytes = sp.to_le_bytes().to_vec();
    bytes.extend_from_slice(&reset.to_le_bytes());
    bytes
}

/// `len` bytes at `base`: a vector table followed by filler.
pub fn firmware_image(base: u32, len: usize, sp: u32, reset: u32) -> MemoryImage {
    let mut data = vector_table(sp, reset);
    data.resize(len, 0x5A);
    parse_binary(&data, base)
}

pub fn write_hex(path: &Path, image: &MemoryImage) {
    write_file(path, &write_intel_hex(image, &IntelHexWriteOptions::default()));
}

/// 512-byte updater at 0x27000 and 256-byte app at 0x40000, both with
/// valid vector tables.
pub fn write_default_pair(dir: &Path) -> (PathBuf, PathBuf) {
    let updater = dir.join("updater.hex");
    let app = dir.join("app.hex");
    write_hex(
        &updater,
        &firmware_image(0x27000, 0x200, 0x2000_8000, 0x0002_7101),
    );
    write_hex(&app, &firmware_image(0x40000, 0x100, 0x2004_0000, 0x0004_0081));
    (updater, app)
}
