//! Error hierarchy for the crash-analysis core (§7 of the design).
//!
//! Most per-tracee errors are recovered locally by the caller and folded
//! into a [`CrashOutcome`] rather than propagated as an `Err` — the
//! dispatcher and classifier always make forward progress on a stop event.
//! `CoreError` exists for the handful of operations (attach, persist) where
//! the caller genuinely needs to distinguish failure modes.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The tracee died mid-operation. Not fatal: treat as a completed event.
    #[error("tracee {pid} is gone")]
    TraceeGone { pid: i32 },

    /// Both register-acquisition paths (GETREGSET, then GETREGS) failed.
    #[error("failed to read registers for pid {pid}")]
    RegReadFailed { pid: i32 },

    /// The unwinder produced zero frames and no PC was available either.
    #[error("unwind produced no frames and PC is unknown for pid {pid}")]
    UnwindEmpty { pid: i32 },

    /// The sanitizer log file for this pid has not appeared yet.
    #[error("sanitizer log missing for pid {pid}")]
    SanitizerLogMissing { pid: i32 },

    /// Copying the crash input failed for a reason other than the
    /// destination already existing.
    #[error("failed to persist crash file {path}: {source}")]
    PersistIoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A `/proc` read (task list, maps, siginfo) failed.
    #[error("failed to read {what} for pid {pid}: {source}")]
    ProcRead {
        what: &'static str,
        pid: i32,
        #[source]
        source: std::io::Error,
    },

    /// A ptrace request failed with an errno we could not otherwise recover
    /// from (request name is kept for diagnostics, not for branching on).
    #[error("ptrace({request}, {pid}) failed: {source}")]
    Ptrace {
        request: &'static str,
        pid: i32,
        #[source]
        source: nix::Error,
    },
}

/// The sum-type result of attempting to act on a single crash, named
/// explicitly (rather than folded into a boolean) so callers and tests can
/// match on the reason instead of just a pass/fail bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrashOutcome {
    /// A new crash file (and report) was written.
    Saved { crash_path: PathBuf },
    /// The computed crash filename already existed; nothing was written.
    Duplicate,
    /// The event was observed but deliberately not saved.
    Dropped(DropReason),
    /// Persisting failed for an I/O reason unrelated to deduplication.
    IoError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// `fault_addr` was below `ignore_below_addr` and the signal was not
    /// user-induced.
    BelowIgnoreAddr,
    /// Identical stack hash to the slot's previous crash.
    DuplicateInSlot,
    /// The stack hash is present in the configured blacklist.
    BlacklistedHash,
    /// A frame's symbol matched the configured symbol blacklist.
    BlacklistedSymbol(String),
    /// Not a signal the policy table marks as interesting.
    UninterestingSignal,
    /// The sanitizer log for this pid has not shown up yet; try again later.
    SanitizerLogNotYetAvailable,
    /// This worker already reported a sanitizer exit for its current input.
    AlreadyReportedThisInput,
    /// Context capture (siginfo, registers, memory, unwind) failed outright;
    /// there is nothing left to classify.
    Unanalyzable,
}
