//! Collaborator traits (A5): the seams named in §6. Each trait has a real,
//! ptrace-backed implementation built from [`crate::memory`] and
//! [`crate::registers`], plus a fake implementation driven by fixed data
//! for the end-to-end tests described in §8 — those tests never need a
//! live tracee.

use crate::arch::{Arch, RegWidth};
use libc::pid_t;
use std::collections::HashMap;

/// PC, status register, and width for a stopped thread (C2).
pub trait RegisterSource {
    fn pc_and_status(&self, pid: pid_t) -> Option<(u64, u64, RegWidth)>;
    fn link_register(&self, pid: pid_t, arch: Arch) -> Option<u64>;
}

pub struct PtraceRegisterSource;

impl RegisterSource for PtraceRegisterSource {
    fn pc_and_status(&self, pid: pid_t) -> Option<(u64, u64, RegWidth)> {
        crate::registers::get_pc_and_status(pid)
    }

    fn link_register(&self, pid: pid_t, arch: Arch) -> Option<u64> {
        crate::registers::get_link_register(pid, arch)
    }
}

/// Cross-process byte reads (C1).
pub trait MemorySource {
    fn read(&self, pid: pid_t, addr: u64, len: usize) -> Vec<u8>;
}

pub struct PtraceMemorySource;

impl MemorySource for PtraceMemorySource {
    fn read(&self, pid: pid_t, addr: u64, len: usize) -> Vec<u8> {
        crate::memory::read_mem(pid, addr, len)
    }
}

/// `si_code` and faulting address off a stopped thread's pending signal.
pub trait SiginfoSource {
    fn read_siginfo(&self, pid: pid_t) -> Option<(i32, u64)>;
}

pub struct PtraceSiginfoSource;

impl SiginfoSource for PtraceSiginfoSource {
    fn read_siginfo(&self, pid: pid_t) -> Option<(i32, u64)> {
        crate::siginfo::read_siginfo(pid)
    }
}

/// Fixed-response register source for tests: one `(pc, status, width)`
/// tuple and an optional link register value, returned for every pid.
pub struct FakeRegisterSource {
    pub pc_status: Option<(u64, u64, RegWidth)>,
    pub link_register: Option<u64>,
}

impl RegisterSource for FakeRegisterSource {
    fn pc_and_status(&self, _pid: pid_t) -> Option<(u64, u64, RegWidth)> {
        self.pc_status
    }

    fn link_register(&self, _pid: pid_t, _arch: Arch) -> Option<u64> {
        self.link_register
    }
}

/// Fixed-response memory source: a map of address to bytes, anything else
/// reads as empty (matching a real `[NOT_MMAPED]` region).
pub struct FakeMemorySource {
    pub pages: HashMap<u64, Vec<u8>>,
}

impl MemorySource for FakeMemorySource {
    fn read(&self, _pid: pid_t, addr: u64, len: usize) -> Vec<u8> {
        match self.pages.get(&addr) {
            Some(bytes) => bytes.iter().take(len).cloned().collect(),
            None => Vec::new(),
        }
    }
}

/// Fixed-response siginfo source: one `(si_code, si_addr)` tuple for every
/// pid, letting tests drive the classifier without a live tracee.
pub struct FakeSiginfoSource {
    pub si_code: i32,
    pub si_addr: u64,
}

impl SiginfoSource for FakeSiginfoSource {
    fn read_siginfo(&self, _pid: pid_t) -> Option<(i32, u64)> {
        Some((self.si_code, self.si_addr))
    }
}

/// Fixed-response unwinder: returns the same frame list for every call.
pub struct FakeUnwinder {
    pub frames: Vec<crate::record::Frame>,
}

impl crate::unwind::Unwinder for FakeUnwinder {
    fn unwind(&self, _pid: pid_t, max_frames: usize) -> Vec<crate::record::Frame> {
        self.frames.iter().take(max_frames).cloned().collect()
    }
}

/// Fixed-response disassembler: returns the same mnemonic text for every
/// call, letting tests exercise sanitization without a real decoder.
pub struct FakeDisassembler {
    pub mnemonic: &'static str,
}

impl crate::disasm::Disassembler for FakeDisassembler {
    fn decode(&self, _bytes: &[u8], _pc: u64, _mode: crate::arch::DisasmMode) -> Option<String> {
        Some(self.mnemonic.to_string())
    }
}
