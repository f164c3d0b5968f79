//! Thread-Group Attach/Detach (C10), §4.10.
//!
//! Attach is seize-then-enumerate: a single `PTRACE_SEIZE` on the group
//! leader establishes the tracing relationship for every thread it later
//! spawns, but existing sibling threads still need their own seize call.
//! Detach is best-effort and idempotent: a process that is already gone is
//! a successful detach, not an error.

use bitflags::bitflags;
use libc::pid_t;
use std::fs;

use crate::log;
use crate::logging::LogLevel;

bitflags! {
    /// `PTRACE_SEIZE` options this core always requests: follow every way a
    /// tracee can spawn a child, plus the exit notification the dispatcher
    /// needs to know a thread is on its way out.
    struct SeizeOptions: libc::c_int {
        const TRACECLONE = libc::PTRACE_O_TRACECLONE;
        const TRACEFORK = libc::PTRACE_O_TRACEFORK;
        const TRACEVFORK = libc::PTRACE_O_TRACEVFORK;
        const TRACEEXIT = libc::PTRACE_O_TRACEEXIT;
    }
}

fn seize(pid: pid_t) -> bool {
    let options = SeizeOptions::TRACECLONE | SeizeOptions::TRACEFORK | SeizeOptions::TRACEVFORK | SeizeOptions::TRACEEXIT;
    let ret = unsafe {
        libc::ptrace(
            libc::PTRACE_SEIZE,
            pid,
            std::ptr::null_mut::<libc::c_void>(),
            options.bits() as *mut libc::c_void,
        )
    };
    ret == 0
}

/// Lists the numeric task IDs under `/proc/<pid>/task`, ignoring any
/// non-numeric entry (there should not be any, but a racing rmdir during
/// enumeration is not this core's problem to diagnose).
fn list_tasks(pid: pid_t) -> Vec<pid_t> {
    let dir = format!("/proc/{}/task", pid);
    let entries = match fs::read_dir(&dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str().and_then(|s| s.parse::<pid_t>().ok()))
        .collect()
}

/// Seizes `pid`'s group leader, then best-effort seizes every sibling task
/// already running. Returns `false` only if the group-leader seize itself
/// failed.
pub fn attach(pid: pid_t) -> bool {
    if !seize(pid) {
        log!(LogLevel::LogWarn, "PTRACE_SEIZE failed for pid {}", pid);
        return false;
    }
    for tid in list_tasks(pid) {
        if tid != pid && !seize(tid) {
            log!(LogLevel::LogDebug, "PTRACE_SEIZE failed for sibling task {} of {}", tid, pid);
        }
    }
    true
}

fn process_alive(pid: pid_t) -> bool {
    let ret = unsafe { libc::kill(pid, 0) };
    ret == 0 || unsafe { *libc::__errno_location() } != libc::ESRCH
}

/// Blocks on `waitpid` for `pid`, restarting across `EINTR`. Returns `true`
/// only once the status reported indicates the tracee stopped.
pub fn wait_for_stop(pid: pid_t) -> bool {
    loop {
        let mut status: libc::c_int = 0;
        let ret = unsafe { libc::waitpid(pid, &mut status, 0) };
        if ret == -1 {
            let err = unsafe { *libc::__errno_location() };
            if err == libc::EINTR {
                continue;
            }
            return false;
        }
        return libc::WIFSTOPPED(status);
    }
}

fn interrupt(pid: pid_t) {
    unsafe {
        libc::ptrace(
            libc::PTRACE_INTERRUPT,
            pid,
            std::ptr::null_mut::<libc::c_void>(),
            std::ptr::null_mut::<libc::c_void>(),
        );
    }
}

fn detach_one(pid: pid_t) {
    interrupt(pid);
    wait_for_stop(pid);
    unsafe {
        libc::ptrace(
            libc::PTRACE_DETACH,
            pid,
            std::ptr::null_mut::<libc::c_void>(),
            std::ptr::null_mut::<libc::c_void>(),
        );
    }
}

/// Idempotent: a dead process detaches immediately and successfully.
pub fn detach(pid: pid_t) {
    if !process_alive(pid) {
        return;
    }
    for tid in list_tasks(pid) {
        detach_one(tid);
    }
    if list_tasks(pid).is_empty() {
        detach_one(pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_tasks_of_a_nonexistent_pid_is_empty_not_a_panic() {
        assert!(list_tasks(999_999).is_empty());
    }

    #[test]
    fn detaching_a_dead_process_returns_immediately() {
        // pid 999_999 is assumed not to be a live process in the test
        // environment; process_alive must report false and detach must
        // not block.
        detach(999_999);
    }
}
