//! Crash Persistor (C9), §4.9.
//!
//! Filenames double as a dedup mechanism: "unique" mode derives a name
//! entirely from crash content, so the filesystem itself rejects a second
//! write of an identical crash. "Non-unique" mode exists for hosts that
//! want every crash kept even when they collide, at the cost of a
//! timestamp+pid suffix to keep names distinct.

use crate::config::SharedConfig;
use crate::counters::SharedCounters;
use crate::error::{CrashOutcome, DropReason};
use crate::log;
use crate::logging::LogLevel;
use crate::record::{CrashRecord, MemOp, SanitizerTag};
use crate::util::local_time_string;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Which label goes in the `<SIG>`/`CODE` slots of a composed filename:
/// a plain signal crash, or a sanitizer exit.
pub enum CrashKind<'a> {
    Signal { descr: &'a str, si_code: i32 },
    Sanitizer { tag: SanitizerTag, op: MemOp },
}

/// `save_unique` is the per-crash decision computed by the classifier
/// (§4.8 step 9: whitelisted and zero/single-frame-unreliable crashes are
/// downgraded to non-unique naming so they are never dedup-dropped), not
/// `cfg.save_unique` directly — the global config only sets the default a
/// given crash starts from.
pub fn compose_filename(
    cfg: &SharedConfig,
    pid: i32,
    orig_name: &str,
    record: &CrashRecord,
    kind: &CrashKind,
    save_unique: bool,
) -> PathBuf {
    if cfg.dry_run && cfg.use_verifier {
        return cfg.work_dir.join(orig_name);
    }

    let (tag, code) = match kind {
        CrashKind::Signal { descr, si_code } => (descr.to_string(), si_code.to_string()),
        CrashKind::Sanitizer { tag, op } => (tag.filename_tag().to_string(), op.as_str().to_string()),
    };

    let base = format!(
        "{}.PC.0x{:016x}.STACK.{}.CODE.{}.ADDR.0x{:x}",
        tag,
        record.pc,
        record.stack_hash.as_hex16(),
        code,
        record.fault_addr.unwrap_or(0),
    );
    let base = format!("{}.INSTR.{}", base, record.instr_str);

    if save_unique {
        cfg.work_dir.join(format!("{}.{}", base, cfg.file_ext))
    } else {
        let disambiguator = format!("{}.{}", local_time_string("%Y%m%d.%H%M%S"), pid);
        cfg.work_dir.join(format!("{}.{}.{}", base, disambiguator, cfg.file_ext))
    }
}

/// Copies `input_path` to `crash_path` with create-new (exclusive)
/// semantics, writes the sibling report, and optionally snapshots
/// `/proc/<pid>/maps`. Never overwrites an existing crash file.
pub fn save(
    cfg: &SharedConfig,
    counters: &SharedCounters,
    pid: i32,
    input_path: &Path,
    crash_path: &Path,
    orig_name: &str,
    record: &CrashRecord,
    kind: &CrashKind,
) -> CrashOutcome {
    let bytes = match fs::read(input_path) {
        Ok(b) => b,
        Err(e) => {
            log!(LogLevel::LogError, "failed to read input {}: {}", input_path.display(), e);
            return CrashOutcome::IoError(e.to_string());
        }
    };

    let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(crash_path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return CrashOutcome::Duplicate,
        Err(e) => {
            log!(LogLevel::LogError, "failed to persist crash file {}: {}", crash_path.display(), e);
            return CrashOutcome::IoError(e.to_string());
        }
    };
    if let Err(e) = file.write_all(&bytes) {
        log!(LogLevel::LogError, "failed writing crash file {}: {}", crash_path.display(), e);
        return CrashOutcome::IoError(e.to_string());
    }

    counters.incr_unique_crashes();
    counters.reset_dyn_iter_expire();

    let report_path = report_path_for(crash_path);
    let text = render_report(pid, orig_name, crash_path, record, kind);
    if let Err(e) = fs::write(&report_path, text) {
        return CrashOutcome::IoError(e.to_string());
    }

    if cfg.save_maps {
        let maps_path = maps_path_for(crash_path);
        if let Ok(maps) = fs::read_to_string(format!("/proc/{}/maps", pid)) {
            let _ = fs::write(maps_path, maps);
        }
    }

    CrashOutcome::Saved { crash_path: crash_path.to_path_buf() }
}

fn report_path_for(crash_path: &Path) -> PathBuf {
    let mut s = crash_path.as_os_str().to_os_string();
    s.push(".report.txt");
    PathBuf::from(s)
}

fn maps_path_for(crash_path: &Path) -> PathBuf {
    let stem = crash_path.with_extension("");
    let mut s = stem.as_os_str().to_os_string();
    s.push(".maps");
    PathBuf::from(s)
}

fn render_report(pid: i32, orig_name: &str, crash_path: &Path, record: &CrashRecord, kind: &CrashKind) -> String {
    let mut out = String::new();
    out.push_str(&format!("ORIG_FNAME: {}\n", orig_name));
    out.push_str(&format!("FUZZ_FNAME: {}\n", crash_path.display()));
    out.push_str(&format!("PID: {}\n", pid));
    match kind {
        CrashKind::Signal { descr, .. } => {
            out.push_str(&format!("SIGNAL: {} (code={})\n", descr, record.si_code));
            out.push_str(&format!("FAULT ADDRESS: 0x{:x}\n", record.fault_addr.unwrap_or(0)));
            out.push_str(&format!("INSTRUCTION: {}\n", record.instr_str));
        }
        CrashKind::Sanitizer { tag, op } => {
            out.push_str(&format!("EXIT CODE: {}\n", tag.as_str()));
            out.push_str(&format!("OPERATION: {}\n", op.as_str()));
        }
    }
    out.push_str(&format!("STACK HASH: {}\n", record.stack_hash.as_hex16()));
    out.push_str("STACK:\n");
    for frame in record.stack.frames() {
        if frame.is_unresolved() {
            out.push_str(&format!(" <0x{:016x}> []\n", frame.pc));
        } else {
            out.push_str(&format!(" <0x{:016x}> [{} + 0x{:x}]\n", frame.pc, frame.symbol, frame.offset));
        }
    }
    out
}

pub fn blacklisted_drop(counters: &SharedCounters) -> CrashOutcome {
    counters.incr_blacklisted_crashes();
    CrashOutcome::Dropped(DropReason::BlacklistedHash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CallStack, StackHash};
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn cfg(work_dir: PathBuf, save_unique: bool) -> SharedConfig {
        SharedConfig::new(
            work_dir,
            "fuzz".to_string(),
            0,
            save_unique,
            true,
            false,
            false,
            false,
            7,
            HashSet::new(),
            HashSet::new(),
            vec![],
            true,
        )
        .unwrap()
    }

    fn record() -> CrashRecord {
        CrashRecord {
            signal: libc::SIGSEGV,
            si_code: 1,
            fault_addr: Some(0x400123),
            pc: 0xdeadbeef,
            instr_str: "mov_eax_ebx".to_string(),
            stack: CallStack::new(),
            stack_hash: StackHash(0x42),
            op: MemOp::Unknown,
            sanitizer_tag: SanitizerTag::None,
        }
    }

    #[test]
    fn unique_filename_has_no_timestamp_suffix() {
        let dir = tempdir().unwrap();
        let c = cfg(dir.path().to_path_buf(), true);
        let kind = CrashKind::Signal { descr: "SIGSEGV", si_code: 1 };
        let path = compose_filename(&c, 123, "input", &record(), &kind, true);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("SIGSEGV.PC."));
        assert!(name.ends_with(".fuzz"));
        assert!(!name.contains(".123."));
    }

    #[test]
    fn non_unique_filename_embeds_pid() {
        let dir = tempdir().unwrap();
        let c = cfg(dir.path().to_path_buf(), false);
        let kind = CrashKind::Signal { descr: "SIGSEGV", si_code: 1 };
        let path = compose_filename(&c, 123, "input", &record(), &kind, false);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.contains(".123."));
    }

    #[test]
    fn per_crash_save_unique_overrides_the_config_default() {
        let dir = tempdir().unwrap();
        // cfg.save_unique = true, but the classifier downgrades a
        // whitelisted/unreliable crash to non-unique naming per-crash.
        let c = cfg(dir.path().to_path_buf(), true);
        let kind = CrashKind::Signal { descr: "SIGSEGV", si_code: 1 };
        let path = compose_filename(&c, 123, "input", &record(), &kind, false);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.contains(".123."));
    }

    #[test]
    fn save_refuses_to_overwrite_existing_crash_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.bin");
        fs::write(&input, b"hello").unwrap();
        let crash_path = dir.path().join("crash.bin");
        fs::write(&crash_path, b"already here").unwrap();

        let c = cfg(dir.path().to_path_buf(), true);
        let counters = SharedCounters::new();
        let kind = CrashKind::Signal { descr: "SIGSEGV", si_code: 1 };
        let outcome = save(&c, &counters, 1, &input, &crash_path, "input.bin", &record(), &kind);
        assert_eq!(outcome, CrashOutcome::Duplicate);
        assert_eq!(fs::read(&crash_path).unwrap(), b"already here");
    }

    #[test]
    fn save_writes_input_bytes_and_a_report() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.bin");
        fs::write(&input, b"hello").unwrap();
        let crash_path = dir.path().join("crash.bin");

        let c = cfg(dir.path().to_path_buf(), true);
        let counters = SharedCounters::new();
        let kind = CrashKind::Signal { descr: "SIGSEGV", si_code: 1 };
        let outcome = save(&c, &counters, 1, &input, &crash_path, "input.bin", &record(), &kind);
        assert_eq!(outcome, CrashOutcome::Saved { crash_path: crash_path.clone() });
        assert_eq!(fs::read(&crash_path).unwrap(), b"hello");
        assert_eq!(counters.unique_crashes(), 1);
        let report = fs::read_to_string(report_path_for(&crash_path)).unwrap();
        assert!(report.contains("SIGNAL: SIGSEGV"));
        assert!(report.contains("STACK HASH:"));
    }
}
