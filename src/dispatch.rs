//! Stop-Event Dispatcher (C11), §4.11.
//!
//! The one place in this core that issues `PTRACE_CONT`/`PTRACE_GETEVENTMSG`
//! directly rather than behind a collaborator trait: deciding whether, and
//! with what signal, to resume the tracee is inseparable from the
//! classification decision itself, and a fake pid makes the raw syscall a
//! harmless no-op in tests, the same way [`crate::attach`] treats
//! `PTRACE_INTERRUPT`/`PTRACE_DETACH`.

use crate::classify;
use crate::collaborators::{MemorySource, RegisterSource, SiginfoSource};
use crate::config::SharedConfig;
use crate::counters::SharedCounters;
use crate::disasm::Disassembler;
use crate::error::CrashOutcome;
use crate::record::{FuzzerSlot, SanitizerTag};
use crate::sanitizer;
use crate::signals;
use crate::unwind::Unwinder;
use libc::{c_void, pid_t};
use nix::sys::wait::WaitStatus;

/// Fixed compile-time exit codes a sanitizer runtime reports instead of
/// raising a signal, so a target built with `SIGABRT` disabled is still
/// caught. Values match the reference tool's `HF_ASAN_EXIT_CODE`,
/// `HF_UBSAN_EXIT_CODE` and `HF_MSAN_EXIT_CODE`.
pub const ASAN_EXIT_CODE: i32 = 101;
pub const UBSAN_EXIT_CODE: i32 = 102;
pub const MSAN_EXIT_CODE: i32 = 103;

fn sanitizer_tag_for_exit_code(code: i32) -> Option<SanitizerTag> {
    match code {
        ASAN_EXIT_CODE => Some(SanitizerTag::Asan),
        UBSAN_EXIT_CODE => Some(SanitizerTag::Ubsan),
        MSAN_EXIT_CODE => Some(SanitizerTag::Msan),
        _ => None,
    }
}

/// What happened to a single dispatched event, for callers (and tests) that
/// want to distinguish "a crash decision was made" from "nothing to do
/// here".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The main-worker or sanitizer-exit path ran and produced a verdict.
    Crash(CrashOutcome),
    /// A non-main-worker updated its backtrace hash but made no save
    /// decision.
    Analyzed,
    /// The event carried no crash information (uninteresting signal,
    /// `SIGCONT` notice, plain exit, plain termination, or an event this
    /// dispatcher does not act on).
    Ignored,
}

/// Reads the word `PTRACE_GETEVENTMSG` reports for the current trace event.
/// For `PTRACE_EVENT_EXIT` this is the tracee's raw wait status, which the
/// `WIFEXITED`/`WEXITSTATUS` macros can still be applied to.
fn get_event_msg(pid: pid_t) -> Option<libc::c_int> {
    let mut msg: libc::c_long = 0;
    let ret = unsafe {
        libc::ptrace(
            libc::PTRACE_GETEVENTMSG,
            pid,
            std::ptr::null_mut::<c_void>(),
            &mut msg as *mut libc::c_long as *mut c_void,
        )
    };
    if ret == -1 {
        return None;
    }
    Some(msg as libc::c_int)
}

fn ptrace_continue(pid: pid_t, forward_signal: libc::c_int) {
    unsafe {
        libc::ptrace(
            libc::PTRACE_CONT,
            pid,
            std::ptr::null_mut::<c_void>(),
            forward_signal as *mut c_void,
        );
    }
}

/// Single entry point a host calls for every `(pid, wait_status)` pair its
/// spawn/wait loop produces. Performs the matching analysis/persistence
/// work, resumes the tracee where the decision tree calls for it, and
/// reports what happened.
#[allow(clippy::too_many_arguments)]
pub fn analyze(
    status: WaitStatus,
    slot: &mut FuzzerSlot,
    cfg: &SharedConfig,
    counters: &SharedCounters,
    siginfo: &dyn SiginfoSource,
    regs: &dyn RegisterSource,
    mem: &dyn MemorySource,
    disassembler: &dyn Disassembler,
    unwinder: &dyn Unwinder,
) -> DispatchOutcome {
    match status {
        WaitStatus::PtraceEvent(pid, _signal, event) => {
            let pid = pid.as_raw();
            let outcome = if event == libc::PTRACE_EVENT_EXIT {
                get_event_msg(pid)
                    .filter(|raw| libc::WIFEXITED(*raw))
                    .map(libc::WEXITSTATUS)
                    .and_then(sanitizer_tag_for_exit_code)
                    .map(|tag| {
                        let log_path = sanitizer::log_path(&cfg.work_dir, pid);
                        DispatchOutcome::Crash(classify::on_sanitizer_exit(pid, slot, cfg, counters, &log_path, tag))
                    })
                    .unwrap_or(DispatchOutcome::Ignored)
            } else {
                DispatchOutcome::Ignored
            };
            ptrace_continue(pid, 0);
            outcome
        }
        WaitStatus::Stopped(pid, signal) => {
            let pid = pid.as_raw();
            let signo = signal as libc::c_int;
            let (_, important) = signals::classify(signo, cfg.sigabrt_important);
            let outcome = if !important {
                DispatchOutcome::Ignored
            } else if slot.is_main_worker {
                DispatchOutcome::Crash(classify::on_signal_stop(
                    pid, slot, cfg, counters, siginfo, regs, mem, disassembler, unwinder, signo,
                ))
            } else {
                classify::analyze_only(pid, slot, cfg, siginfo, regs, mem, disassembler, unwinder);
                DispatchOutcome::Analyzed
            };
            ptrace_continue(pid, signo);
            outcome
        }
        WaitStatus::Continued(_) => DispatchOutcome::Ignored,
        WaitStatus::Exited(pid, code) => sanitizer_tag_for_exit_code(code)
            .map(|tag| {
                let pid = pid.as_raw();
                let log_path = sanitizer::log_path(&cfg.work_dir, pid);
                DispatchOutcome::Crash(classify::on_sanitizer_exit(pid, slot, cfg, counters, &log_path, tag))
            })
            .unwrap_or(DispatchOutcome::Ignored),
        WaitStatus::Signaled(..) => DispatchOutcome::Ignored,
        WaitStatus::StillAlive | WaitStatus::PtraceSyscall(_) => {
            unreachable!("wait loop must block without WNOHANG and never enable PTRACE_O_TRACESYSGOOD")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::RegWidth;
    use crate::collaborators::{FakeDisassembler, FakeMemorySource, FakeRegisterSource, FakeSiginfoSource, FakeUnwinder};
    use nix::sys::signal::Signal;
    use nix::unistd::Pid;
    use std::collections::{HashMap, HashSet};
    use tempfile::tempdir;

    const FAKE_PID: pid_t = 4242;

    fn base_config(dir: &std::path::Path) -> SharedConfig {
        SharedConfig::new(
            dir.to_path_buf(),
            "fuzz".to_string(),
            0,
            true,
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

    fn slot(dir: &std::path::Path) -> FuzzerSlot {
        let input = dir.join("input.bin");
        std::fs::write(&input, b"AAAA").unwrap();
        FuzzerSlot::new(input, "input.bin".to_string(), true)
    }

    fn fakes() -> (FakeSiginfoSource, FakeRegisterSource, FakeMemorySource, FakeDisassembler, FakeUnwinder) {
        (
            FakeSiginfoSource { si_code: 1, si_addr: 0x400123 },
            FakeRegisterSource { pc_status: Some((0xdeadbeef, 0, RegWidth::Bits64)), link_register: None },
            FakeMemorySource { pages: HashMap::new() },
            FakeDisassembler { mnemonic: "mov eax, ebx" },
            FakeUnwinder { frames: vec![crate::record::Frame::new(0xdeadbeef, "main", 0x10)] },
        )
    }

    #[test]
    fn important_stop_on_main_worker_saves_a_crash() {
        let dir = tempdir().unwrap();
        let cfg = base_config(dir.path());
        let counters = SharedCounters::new();
        let mut s = slot(dir.path());
        let (siginfo, regs, mem, disassembler, unwinder) = fakes();

        let status = WaitStatus::Stopped(Pid::from_raw(FAKE_PID), Signal::SIGSEGV);
        let outcome = analyze(status, &mut s, &cfg, &counters, &siginfo, &regs, &mem, &disassembler, &unwinder);

        assert!(matches!(outcome, DispatchOutcome::Crash(CrashOutcome::Saved { .. })));
        assert_eq!(counters.crashes_total(), 1);
    }

    #[test]
    fn important_stop_on_secondary_worker_only_analyzes() {
        let dir = tempdir().unwrap();
        let cfg = base_config(dir.path());
        let counters = SharedCounters::new();
        let mut s = slot(dir.path());
        s.is_main_worker = false;
        let (siginfo, regs, mem, disassembler, unwinder) = fakes();

        let status = WaitStatus::Stopped(Pid::from_raw(FAKE_PID), Signal::SIGSEGV);
        let outcome = analyze(status, &mut s, &cfg, &counters, &siginfo, &regs, &mem, &disassembler, &unwinder);

        assert_eq!(outcome, DispatchOutcome::Analyzed);
        assert_eq!(counters.crashes_total(), 0);
        assert!(s.crash_path.is_none());
    }

    #[test]
    fn sigtrap_stop_is_ignored_without_touching_counters() {
        let dir = tempdir().unwrap();
        let cfg = base_config(dir.path());
        let counters = SharedCounters::new();
        let mut s = slot(dir.path());
        let (siginfo, regs, mem, disassembler, unwinder) = fakes();

        let status = WaitStatus::Stopped(Pid::from_raw(FAKE_PID), Signal::SIGTRAP);
        let outcome = analyze(status, &mut s, &cfg, &counters, &siginfo, &regs, &mem, &disassembler, &unwinder);

        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert_eq!(counters.crashes_total(), 0);
    }

    #[test]
    fn continued_and_signaled_events_are_ignored() {
        let dir = tempdir().unwrap();
        let cfg = base_config(dir.path());
        let counters = SharedCounters::new();
        let mut s = slot(dir.path());
        let (siginfo, regs, mem, disassembler, unwinder) = fakes();

        let continued = WaitStatus::Continued(Pid::from_raw(FAKE_PID));
        assert_eq!(
            analyze(continued, &mut s, &cfg, &counters, &siginfo, &regs, &mem, &disassembler, &unwinder),
            DispatchOutcome::Ignored
        );

        let signaled = WaitStatus::Signaled(Pid::from_raw(FAKE_PID), Signal::SIGKILL, false);
        assert_eq!(
            analyze(signaled, &mut s, &cfg, &counters, &siginfo, &regs, &mem, &disassembler, &unwinder),
            DispatchOutcome::Ignored
        );
    }

    #[test]
    fn plain_exit_is_ignored_but_sanitizer_exit_code_triggers_a_save() {
        let dir = tempdir().unwrap();
        let cfg = base_config(dir.path());
        let counters = SharedCounters::new();
        let (siginfo, regs, mem, disassembler, unwinder) = fakes();

        let mut s = slot(dir.path());
        let ordinary = WaitStatus::Exited(Pid::from_raw(FAKE_PID), 0);
        assert_eq!(
            analyze(ordinary, &mut s, &cfg, &counters, &siginfo, &regs, &mem, &disassembler, &unwinder),
            DispatchOutcome::Ignored
        );

        let log = sanitizer::log_path(&cfg.work_dir, FAKE_PID);
        std::fs::write(
            &log,
            "==1==ERROR: AddressSanitizer: heap-buffer-overflow on address 0xdeadc0de\nWRITE of size 4 at 0xdeadc0de thread T0\n    #0 0x1000 (a.out+0x10)\n\nSUMMARY: AddressSanitizer: heap-buffer-overflow\n",
        )
        .unwrap();

        let mut s2 = slot(dir.path());
        let sanitizer_exit = WaitStatus::Exited(Pid::from_raw(FAKE_PID), ASAN_EXIT_CODE);
        let outcome = analyze(sanitizer_exit, &mut s2, &cfg, &counters, &siginfo, &regs, &mem, &disassembler, &unwinder);
        match outcome {
            DispatchOutcome::Crash(CrashOutcome::Saved { crash_path }) => {
                assert!(crash_path.file_name().unwrap().to_string_lossy().starts_with("ASAN.PC."));
            }
            other => panic!("expected a sanitizer save, got {:?}", other),
        }
        assert!(!log.exists());
    }

    #[test]
    fn ptrace_event_exit_with_no_live_tracee_is_ignored() {
        let dir = tempdir().unwrap();
        let cfg = base_config(dir.path());
        let counters = SharedCounters::new();
        let mut s = slot(dir.path());
        let (siginfo, regs, mem, disassembler, unwinder) = fakes();

        // PTRACE_GETEVENTMSG against a nonexistent pid fails, so this
        // degrades to Ignored even though the event code is EXIT.
        let status = WaitStatus::PtraceEvent(Pid::from_raw(999_999), Signal::SIGTRAP, libc::PTRACE_EVENT_EXIT);
        let outcome = analyze(status, &mut s, &cfg, &counters, &siginfo, &regs, &mem, &disassembler, &unwinder);
        assert_eq!(outcome, DispatchOutcome::Ignored);
    }
}
