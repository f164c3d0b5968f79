//! Minimal siginfo capture for the classifier (§4.8 step 1): `si_code` and
//! the faulting address off a stopped tracee.
//!
//! Reads the raw bytes `PTRACE_GETSIGINFO` hands back rather than going
//! through `libc::siginfo_t`'s architecture-specific accessor methods,
//! mirroring the raw-byte approach [`crate::registers`] uses for the
//! general-purpose register block.

use libc::{c_void, pid_t};
use std::convert::TryInto;

/// glibc's `siginfo_t` on a 64-bit target lays out `si_signo`, `si_errno`,
/// `si_code` as three 4-byte ints, then pads to align the trailing union,
/// whose first member (for a fault signal) is `si_addr` at byte 16.
const SI_CODE_OFFSET: usize = 8;
const SI_ADDR_OFFSET: usize = 16;
const SIGINFO_BUF_LEN: usize = 128;

/// Returns `(si_code, si_addr)` for the signal currently pending on `pid`,
/// or `None` if the tracee is gone or the kernel request otherwise failed.
pub fn read_siginfo(pid: pid_t) -> Option<(i32, u64)> {
    let mut buf = [0u8; SIGINFO_BUF_LEN];
    let ret = unsafe {
        libc::ptrace(
            libc::PTRACE_GETSIGINFO,
            pid,
            std::ptr::null_mut::<c_void>(),
            buf.as_mut_ptr() as *mut c_void,
        )
    };
    if ret == -1 {
        return None;
    }
    let si_code = i32::from_ne_bytes(buf[SI_CODE_OFFSET..SI_CODE_OFFSET + 4].try_into().ok()?);
    let si_addr = u64::from_ne_bytes(buf[SI_ADDR_OFFSET..SI_ADDR_OFFSET + 8].try_into().ok()?);
    Some((si_code, si_addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_from_a_nonexistent_pid_returns_none() {
        assert!(read_siginfo(999_999).is_none());
    }
}
