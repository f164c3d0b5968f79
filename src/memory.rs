//! Tracee Memory Reader (C1), §4.1.
//!
//! Two-tier strategy: try a single vectored cross-process read first, and
//! only fall back to a word-at-a-time `PTRACE_PEEKDATA` loop when that
//! fails (no `process_vm_readv` support, or the target crosses an unmapped
//! page). Never returns more bytes than were actually read, and never
//! fails the caller outright: a dead tracee or a wholly unmapped address
//! just yields an empty buffer.

use libc::{c_void, iovec, pid_t};

/// Reads up to `len` bytes from `pid`'s address space at `remote_addr`.
/// Returns however many bytes were actually obtained, which may be zero.
pub fn read_mem(pid: pid_t, remote_addr: u64, len: usize) -> Vec<u8> {
    if len == 0 {
        return Vec::new();
    }
    if let Some(buf) = read_vectored(pid, remote_addr, len) {
        if buf.len() == len {
            return buf;
        }
    }
    read_word_granular(pid, remote_addr, len)
}

fn read_vectored(pid: pid_t, remote_addr: u64, len: usize) -> Option<Vec<u8>> {
    let mut local = vec![0u8; len];
    let mut local_iov = iovec {
        iov_base: local.as_mut_ptr() as *mut c_void,
        iov_len: len,
    };
    let mut remote_iov = iovec {
        iov_base: remote_addr as *mut c_void,
        iov_len: len,
    };
    let n = unsafe { libc::process_vm_readv(pid, &mut local_iov, 1, &mut remote_iov, 1, 0) };
    if n < 0 {
        return None;
    }
    local.truncate(n as usize);
    Some(local)
}

/// `W`, the natural word width of this build, matching the reference
/// tool's assumption that the tracee is native-width for this fallback.
const WORD_BYTES: usize = std::mem::size_of::<usize>();

fn read_word_granular(pid: pid_t, remote_addr: u64, len: usize) -> Vec<u8> {
    let words = len / WORD_BYTES;
    let mut out = Vec::with_capacity(len);
    for i in 0..words {
        let addr = remote_addr + (i * WORD_BYTES) as u64;
        unsafe { *libc::__errno_location() = 0 };
        let word = unsafe { libc::ptrace(libc::PTRACE_PEEKDATA, pid, addr as *mut c_void, std::ptr::null_mut::<c_void>()) };
        if word == -1 && unsafe { *libc::__errno_location() } != 0 {
            break;
        }
        out.extend_from_slice(&(word as usize).to_ne_bytes());
    }
    out
}
