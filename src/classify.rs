//! Crash Classifier & Filter (C8), §4.8.
//!
//! This is where the pieces assembled elsewhere in the crate (registers,
//! memory, disassembly, unwinding, the stack hash) get fused into a single
//! decision: save this crash, or drop it, and why. [`on_signal_stop`] is the
//! main-worker path (full filtering and persistence); [`analyze_only`] is
//! the cheaper path every other worker in a tracee's thread group takes —
//! it only updates `slot.backtrace` so a later duplicate can be recognized,
//! without ever touching the filesystem. [`on_sanitizer_exit`] shares the
//! same dedup/filter machinery for a sanitizer-reported crash instead of a
//! signal-reported one.

use crate::arch::{self, Arch, RegWidth};
use crate::collaborators::{MemorySource, RegisterSource, SiginfoSource};
use crate::config::SharedConfig;
use crate::counters::SharedCounters;
use crate::disasm::{self, Disassembler};
use crate::error::{CrashOutcome, DropReason};
use crate::persist::{self, CrashKind};
use crate::record::{CallStack, CrashRecord, FuzzerSlot, MemOp, SanitizerTag, StackHash};
use crate::sanitizer;
use crate::signals;
use crate::stack_hash;
use crate::unwind::{self, Unwinder};
use libc::pid_t;
use std::collections::HashSet;
use std::path::Path;

/// Everything extracted from a stopped thread before any filtering
/// decision is made: steps 1, 2 and 4 of §4.8, common to both the
/// full-save and analyze-only paths.
struct Capture {
    pc: u64,
    width: RegWidth,
    arch: Arch,
    si_code: i32,
    /// The raw address the kernel reported, before any zeroing for
    /// filenames or user-induced signals — used for the ignore-below-addr
    /// check in the caller, which needs the real value regardless of how
    /// the eventual record renders it.
    raw_fault_addr: u64,
    user_induced: bool,
    instr_str: String,
    stack: CallStack,
}

fn capture_context(
    pid: pid_t,
    siginfo: &dyn SiginfoSource,
    regs: &dyn RegisterSource,
    mem: &dyn MemorySource,
    disassembler: &dyn Disassembler,
    unwinder: &dyn Unwinder,
) -> Option<Capture> {
    let (si_code, raw_fault_addr) = siginfo.read_siginfo(pid)?;
    let (pc, status_reg, width) = regs.pc_and_status(pid)?;
    let current_arch = arch::current_arch();
    let mode = arch::derive_disasm_mode(current_arch, width, status_reg);
    let bytes = mem.read(pid, pc, disasm::MAX_INSTR_BYTES);
    let instr_str = disasm::disassemble(disassembler, &bytes, pc, mode);

    let mut frames = unwinder.unwind(pid, crate::record::MAX_FRAMES);
    if frames.is_empty() && pc != 0 {
        frames = unwind::single_frame_fallback(pc);
    }

    Some(Capture {
        pc,
        width,
        arch: current_arch,
        si_code,
        raw_fault_addr,
        user_induced: signals::is_user_induced(si_code),
        instr_str,
        stack: CallStack::from_frames(frames),
    })
}

/// Folds the ARM/ARM64 link-register XOR into a stack hash for a
/// single-(or zero-)frame stack, per the caller-side rule in §4.5.
fn fold_link_register(hash: StackHash, pid: pid_t, ctx: &Capture, regs: &dyn RegisterSource) -> StackHash {
    if !ctx.arch.has_link_register() || ctx.stack.len() > 1 {
        return hash;
    }
    match regs.link_register(pid, ctx.arch) {
        Some(lr) => StackHash(hash.0 ^ stack_hash::digest_last3(lr, ctx.width)),
        None => hash,
    }
}

fn symbol_whitelisted(stack: &CallStack, whitelist: &HashSet<String>) -> bool {
    !whitelist.is_empty() && stack.frames().iter().any(|f| whitelist.contains(&f.symbol))
}

fn first_blacklisted_symbol(stack: &CallStack, blacklist: &HashSet<String>) -> Option<String> {
    if blacklist.is_empty() {
        return None;
    }
    stack.frames().iter().find(|f| blacklist.contains(&f.symbol)).map(|f| f.symbol.clone())
}

/// Main-worker path: full filter chain plus persistence. Entry point
/// `on_signal_stop` from §4.8.
#[allow(clippy::too_many_arguments)]
pub fn on_signal_stop(
    pid: pid_t,
    slot: &mut FuzzerSlot,
    cfg: &SharedConfig,
    counters: &SharedCounters,
    siginfo: &dyn SiginfoSource,
    regs: &dyn RegisterSource,
    mem: &dyn MemorySource,
    disassembler: &dyn Disassembler,
    unwinder: &dyn Unwinder,
    signal: i32,
) -> CrashOutcome {
    let ctx = match capture_context(pid, siginfo, regs, mem, disassembler, unwinder) {
        Some(ctx) => ctx,
        None => return CrashOutcome::Dropped(DropReason::Unanalyzable),
    };

    // Step 3: ignore-below-addr suppression.
    if !ctx.user_induced && ctx.raw_fault_addr < cfg.ignore_below_addr {
        return CrashOutcome::Dropped(DropReason::BelowIgnoreAddr);
    }

    // Step 4 (unwind + PC-only fallback) already ran in capture_context.
    // An empty stack even after the fallback means no PC was known either
    // — can't dedup reliably.
    let mut save_unique = cfg.save_unique && !ctx.stack.is_empty();

    // Step 5: remember the slot's previous hash before overwriting it.
    let old_hash = slot.backtrace;

    // Step 6: compute the new hash.
    let mut new_hash = stack_hash::hash_callstack(ctx.stack.frames(), cfg.num_major_frames, save_unique, ctx.width);
    new_hash = fold_link_register(new_hash, pid, &ctx, regs);
    slot.backtrace = new_hash;

    // Step 7: duplicate within the same target process.
    if slot.crash_path.is_some() && old_hash == slot.backtrace {
        return CrashOutcome::Dropped(DropReason::DuplicateInSlot);
    }

    // Step 8.
    counters.incr_crashes_total();

    // Step 9: whitelist short-circuits the blacklist checks.
    let whitelisted = symbol_whitelisted(&ctx.stack, &cfg.symbol_whitelist);
    if whitelisted {
        save_unique = false;
    } else {
        // Step 10: hash blacklist, then symbol blacklist.
        if cfg.is_hash_blacklisted(slot.backtrace.0) {
            return persist::blacklisted_drop(counters);
        }
        if let Some(symbol) = first_blacklisted_symbol(&ctx.stack, &cfg.symbol_blacklist) {
            counters.incr_blacklisted_crashes();
            return CrashOutcome::Dropped(DropReason::BlacklistedSymbol(symbol));
        }
    }

    // Step 11.
    counters.clear_dyn_iter_expire_top_bits();

    // Steps 12-13: zero pc/fault_addr for reproducible filenames under
    // ASLR, then always zero fault_addr for a user-induced signal.
    let mut record_pc = ctx.pc;
    let mut record_fault_addr = if ctx.user_induced { None } else { Some(ctx.raw_fault_addr) };
    if !cfg.disable_randomization {
        record_pc = 0;
        record_fault_addr = Some(0);
    }
    if ctx.user_induced {
        record_fault_addr = None;
    }

    let (descr, _important) = signals::classify(signal, cfg.sigabrt_important);
    let record = CrashRecord {
        signal,
        si_code: ctx.si_code,
        fault_addr: record_fault_addr,
        pc: record_pc,
        instr_str: ctx.instr_str,
        stack: ctx.stack,
        stack_hash: slot.backtrace,
        op: MemOp::Unknown,
        sanitizer_tag: SanitizerTag::None,
    };

    let kind = CrashKind::Signal { descr, si_code: ctx.si_code };
    let crash_path = persist::compose_filename(cfg, pid, &slot.orig_name, &record, &kind, save_unique);
    let outcome = persist::save(cfg, counters, pid, &slot.input_path, &crash_path, &slot.orig_name, &record, &kind);
    apply_persist_outcome(slot, &outcome);
    outcome
}

/// The other workers in a tracee's thread group take this path: steps 1,
/// 2, 4 and 6 only, updating `slot.backtrace` so a subsequent duplicate in
/// the *main* worker can still be recognized. Never touches the
/// filesystem or the shared counters.
pub fn analyze_only(
    pid: pid_t,
    slot: &mut FuzzerSlot,
    cfg: &SharedConfig,
    siginfo: &dyn SiginfoSource,
    regs: &dyn RegisterSource,
    mem: &dyn MemorySource,
    disassembler: &dyn Disassembler,
    unwinder: &dyn Unwinder,
) {
    let ctx = match capture_context(pid, siginfo, regs, mem, disassembler, unwinder) {
        Some(ctx) => ctx,
        None => return,
    };
    let save_unique = cfg.save_unique && !ctx.stack.is_empty();
    let mut hash = stack_hash::hash_callstack(ctx.stack.frames(), cfg.num_major_frames, save_unique, ctx.width);
    hash = fold_link_register(hash, pid, &ctx, regs);
    slot.backtrace = hash;
}

/// Shares the dedup/filter chain above with a sanitizer-reported crash
/// (§4.7/§4.11) instead of a signal-reported one. `log_path` is the
/// `<work_dir>/<log_prefix>.<pid>` file the sanitizer runtime wrote before
/// exiting.
pub fn on_sanitizer_exit(
    pid: pid_t,
    slot: &mut FuzzerSlot,
    cfg: &SharedConfig,
    counters: &SharedCounters,
    log_path: &Path,
    tag: SanitizerTag,
) -> CrashOutcome {
    let report = match sanitizer::parse_log(log_path) {
        Ok(Some(report)) => report,
        Ok(None) => return CrashOutcome::Dropped(DropReason::SanitizerLogNotYetAvailable),
        Err(_) => return CrashOutcome::Dropped(DropReason::SanitizerLogNotYetAvailable),
    };

    let mut save_unique = cfg.save_unique && !report.stack.is_empty();
    let old_hash = slot.backtrace;
    // A sanitizer log carries no register width; its PCs are rendered at
    // native pointer width for this build, matching the reference tool's
    // assumption that the sanitizer runtime and the tracer share an ABI.
    let width = if arch::current_arch() == Arch::X86 || arch::current_arch() == Arch::Arm {
        RegWidth::Bits32
    } else {
        RegWidth::Bits64
    };
    slot.backtrace = stack_hash::hash_callstack(report.stack.frames(), cfg.num_major_frames, save_unique, width);

    if slot.crash_path.is_some() && old_hash == slot.backtrace {
        return CrashOutcome::Dropped(DropReason::DuplicateInSlot);
    }

    counters.incr_crashes_total();

    if symbol_whitelisted(&report.stack, &cfg.symbol_whitelist) {
        save_unique = false;
    } else {
        if cfg.is_hash_blacklisted(slot.backtrace.0) {
            return persist::blacklisted_drop(counters);
        }
        if let Some(symbol) = first_blacklisted_symbol(&report.stack, &cfg.symbol_blacklist) {
            counters.incr_blacklisted_crashes();
            return CrashOutcome::Dropped(DropReason::BlacklistedSymbol(symbol));
        }
    }

    counters.clear_dyn_iter_expire_top_bits();

    let record = CrashRecord {
        signal: 0,
        si_code: 0,
        fault_addr: report.fault_addr,
        pc: 0,
        instr_str: String::new(),
        stack: report.stack,
        stack_hash: slot.backtrace,
        op: report.op,
        sanitizer_tag: tag,
    };
    let kind = CrashKind::Sanitizer { tag, op: report.op };
    let crash_path = persist::compose_filename(cfg, pid, &slot.orig_name, &record, &kind, save_unique);
    let outcome = persist::save(cfg, counters, pid, &slot.input_path, &crash_path, &slot.orig_name, &record, &kind);
    apply_persist_outcome(slot, &outcome);
    outcome
}

fn apply_persist_outcome(slot: &mut FuzzerSlot, outcome: &CrashOutcome) {
    match outcome {
        CrashOutcome::Saved { crash_path } => slot.crash_path = Some(crash_path.clone()),
        CrashOutcome::Duplicate => slot.crash_path = None,
        _ => {}
    }
}
