//! Sanitizer Report Parser (C7), §4.7.
//!
//! Reads `<work_dir>/<log_prefix>.<pid>`, a two-state machine: seek the
//! AddressSanitizer header line, then collect numbered frames until a blank
//! line. The file is unlinked once read, win or lose, since a half-written
//! log from a still-running tracee is only ever useful once.

use crate::record::{CallStack, Frame, MemOp};
use libc::pid_t;
use std::fs;
use std::path::{Path, PathBuf};

/// Base name of the ephemeral sanitizer log file, `kLOGPREFIX` in the
/// reference tool.
pub const LOG_PREFIX: &str = "HF.sanitizer.log";

/// `<work_dir>/<LOG_PREFIX>.<pid>`, the path a sanitizer runtime writes its
/// report to before the tracee exits.
pub fn log_path(work_dir: &Path, pid: pid_t) -> PathBuf {
    work_dir.join(format!("{}.{}", LOG_PREFIX, pid))
}

pub struct SanitizerReport {
    pub fault_addr: Option<u64>,
    pub op: MemOp,
    pub stack: CallStack,
}

/// Returns `Ok(None)` when the log file does not exist yet — "not my TID,
/// try again later" per §4.7 — and `Ok(Some(report))` once it has been
/// read and removed. Never returns an error for a malformed log; a header
/// that never appears just yields an empty stack.
pub fn parse_log(path: &Path) -> std::io::Result<Option<SanitizerReport>> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let report = parse_text(&text);
    let _ = fs::remove_file(path);
    Ok(Some(report))
}

#[derive(PartialEq)]
enum State {
    SeekingHeader,
    Frames,
}

fn parse_text(text: &str) -> SanitizerReport {
    let mut state = State::SeekingHeader;
    let mut fault_addr = None;
    let mut op = MemOp::Unknown;
    let mut stack = CallStack::new();
    let mut next_frame: usize = 0;

    for line in text.lines() {
        match state {
            State::SeekingHeader => {
                if line.contains("ERROR: AddressSanitizer:") {
                    if let Some(addr) = extract_address(line) {
                        fault_addr = Some(addr);
                    }
                    state = State::Frames;
                }
            }
            State::Frames => {
                let trimmed = line.trim_start();
                if trimmed.is_empty() {
                    if !stack.is_empty() {
                        break;
                    }
                    continue;
                }
                if let Some(addr) = extract_address(trimmed) {
                    if fault_addr.is_none() {
                        fault_addr = Some(addr);
                    }
                }
                if op == MemOp::Unknown {
                    // Intended semantics: a plain prefix match on the
                    // trimmed line, not the inverted-polarity strncmp
                    // comparison the reference parser performs.
                    if trimmed.starts_with("READ") {
                        op = MemOp::Read;
                    } else if trimmed.starts_with("WRITE") {
                        op = MemOp::Write;
                    }
                }
                if trimmed.len() < 10 {
                    continue;
                }
                if let Some(frame) = parse_frame_line(trimmed, next_frame) {
                    if !stack.push(frame) {
                        break;
                    }
                    next_frame += 1;
                }
            }
        }
    }

    SanitizerReport { fault_addr, op, stack }
}

fn extract_address(line: &str) -> Option<u64> {
    let idx = line.find("address 0x")?;
    let rest = &line[idx + "address ".len()..];
    let token = rest.split(' ').next()?;
    let hex = token.trim_start_matches("0x").trim_end_matches(|c: char| !c.is_ascii_hexdigit());
    u64::from_str_radix(hex, 16).ok()
}

/// Parses one `#<n> 0x<pc> (module+0x<offset>)` frame line. Returns `None`
/// if the line does not start with the expected `#<n>` prefix for the
/// frame index we are currently collecting.
fn parse_frame_line(line: &str, expected_index: usize) -> Option<Frame> {
    let prefix = format!("#{}", expected_index);
    if !line.starts_with(&prefix) {
        return None;
    }
    let rest = line[prefix.len()..].trim_start();
    let mut tokens = rest.split_whitespace();
    let pc_tok = tokens.next()?;
    let pc = u64::from_str_radix(pc_tok.trim_start_matches("0x"), 16).ok()?;

    let module_tok = tokens.next().unwrap_or("");
    let inner = module_tok.trim_start_matches('(').trim_end_matches(')');
    let (symbol, offset) = match inner.split_once("+0x") {
        Some((module, off)) => (module.to_string(), u32::from_str_radix(off, 16).unwrap_or(0)),
        None => (String::new(), 0),
    };
    Some(Frame::new(pc, symbol, offset))
}
