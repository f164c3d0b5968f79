//! Signal Policy (C6), §4.6. Pure table lookup; no I/O, no state.

/// `classify(signo, sigabrt_important)` → `(descr, important)`. Unknown
/// signals report `("UNKNOWN", false)`.
///
/// `SIGTRAP` is tabulated but never "important": a tracer relies on
/// `SIGTRAP` for its own bookkeeping (singlestep, breakpoint, ptrace
/// events riding on it) and it must never be mistaken for a crash.
pub fn classify(signo: i32, sigabrt_important: bool) -> (&'static str, bool) {
    match signo {
        libc::SIGTRAP => ("SIGTRAP", false),
        libc::SIGILL => ("SIGILL", true),
        libc::SIGFPE => ("SIGFPE", true),
        libc::SIGSEGV => ("SIGSEGV", true),
        libc::SIGBUS => ("SIGBUS", true),
        libc::SIGABRT => ("SIGABRT", sigabrt_important),
        _ => ("UNKNOWN", false),
    }
}

/// `SI_FROMUSER`-equivalent check: a non-positive `si_code` means the
/// signal was generated by `kill()`/`raise()` rather than the kernel
/// reacting to a fault, so `si_addr` carries no meaningful address.
pub fn is_user_induced(si_code: i32) -> bool {
    si_code <= 0
}
