//! Core data model (§3): frames, call stacks, stack hashes, crash records,
//! and the per-worker slot the classifier reads and writes.

use std::path::PathBuf;

/// Maximum number of frames a [`CallStack`] will hold, matching `_HF_MAX_FUNCS`
/// in the reference tool.
pub const MAX_FRAMES: usize = 80;

/// Maximum length of a [`Frame`] symbol, truncated (on a UTF-8 boundary)
/// rather than rejected.
pub const MAX_SYMBOL_LEN: usize = 64;

/// High bit of a [`StackHash`], set when only a single frame contributed
/// and the caller asked for masking.
pub const SINGLE_FRAME_MASK: u64 = 1 << 63;

/// One level of a call stack.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Frame {
    pub pc: u64,
    /// Empty string means "unresolved".
    pub symbol: String,
    pub offset: u32,
}

impl Frame {
    pub fn new(pc: u64, symbol: impl Into<String>, offset: u32) -> Self {
        let mut symbol = symbol.into();
        if symbol.len() > MAX_SYMBOL_LEN {
            let mut end = MAX_SYMBOL_LEN;
            while !symbol.is_char_boundary(end) {
                end -= 1;
            }
            symbol.truncate(end);
        }
        Frame { pc, symbol, offset }
    }

    pub fn unresolved(pc: u64) -> Self {
        Frame::new(pc, "", 0)
    }

    pub fn is_unresolved(&self) -> bool {
        self.symbol.is_empty()
    }
}

/// Ordered call stack, innermost frame first. Refuses to grow past
/// [`MAX_FRAMES`] rather than panicking.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallStack(Vec<Frame>);

impl CallStack {
    pub fn new() -> Self {
        CallStack(Vec::new())
    }

    pub fn from_frames(frames: Vec<Frame>) -> Self {
        let mut frames = frames;
        frames.truncate(MAX_FRAMES);
        CallStack(frames)
    }

    pub fn push(&mut self, frame: Frame) -> bool {
        if self.0.len() >= MAX_FRAMES {
            return false;
        }
        self.0.push(frame);
        true
    }

    pub fn frames(&self) -> &[Frame] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 64-bit deduplication fingerprint, see §4.5.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, PartialOrd, Ord)]
pub struct StackHash(pub u64);

impl StackHash {
    pub fn is_single_frame_masked(self) -> bool {
        self.0 & SINGLE_FRAME_MASK != 0
    }

    pub fn as_hex16(self) -> String {
        format!("{:016x}", self.0)
    }
}

/// Which memory operation a sanitizer report attributed the fault to.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MemOp {
    Read,
    Write,
    Unknown,
}

impl MemOp {
    pub fn as_str(self) -> &'static str {
        match self {
            MemOp::Read => "READ",
            MemOp::Write => "WRITE",
            MemOp::Unknown => "UNKNOWN",
        }
    }
}

/// Which sanitizer (if any) produced the crash.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SanitizerTag {
    None,
    Asan,
    Msan,
    Ubsan,
}

impl SanitizerTag {
    pub fn as_str(self) -> &'static str {
        match self {
            SanitizerTag::None => "NONE",
            SanitizerTag::Asan => "ASAN",
            SanitizerTag::Msan => "MSAN",
            SanitizerTag::Ubsan => "UBSAN",
        }
    }

    /// The `UNKNW` fallback used in filenames when an exit code does not
    /// match any known sanitizer (§4.9).
    pub fn filename_tag(self) -> &'static str {
        match self {
            SanitizerTag::Asan => "ASAN",
            SanitizerTag::Msan => "MSAN",
            SanitizerTag::Ubsan => "UBSAN",
            SanitizerTag::None => "UNKNW",
        }
    }
}

/// Transient per-crash value computed by the classifier (§3).
#[derive(Clone, Debug)]
pub struct CrashRecord {
    pub signal: i32,
    pub si_code: i32,
    /// `None` for a user-induced signal, or when zeroed for reproducible
    /// filenames under ASLR.
    pub fault_addr: Option<u64>,
    pub pc: u64,
    pub instr_str: String,
    pub stack: CallStack,
    pub stack_hash: StackHash,
    pub op: MemOp,
    pub sanitizer_tag: SanitizerTag,
}

/// Per-worker mutable state the classifier reads and writes (§3). Owned by
/// exactly one worker; the core never shares it across threads.
#[derive(Clone, Debug)]
pub struct FuzzerSlot {
    pub input_path: PathBuf,
    pub orig_name: String,
    pub crash_path: Option<PathBuf>,
    pub backtrace: StackHash,
    pub is_main_worker: bool,
    pub sancov_counters: u64,
}

impl FuzzerSlot {
    pub fn new(input_path: PathBuf, orig_name: String, is_main_worker: bool) -> Self {
        FuzzerSlot {
            input_path,
            orig_name,
            crash_path: None,
            backtrace: StackHash(0),
            is_main_worker,
            sancov_counters: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_symbol_truncates_on_char_boundary() {
        let long = "x".repeat(100);
        let f = Frame::new(1, long, 0);
        assert_eq!(f.symbol.len(), MAX_SYMBOL_LEN);
    }

    #[test]
    fn call_stack_refuses_past_max_frames() {
        let mut stack = CallStack::new();
        for i in 0..MAX_FRAMES {
            assert!(stack.push(Frame::unresolved(i as u64)));
        }
        assert!(!stack.push(Frame::unresolved(999)));
        assert_eq!(stack.len(), MAX_FRAMES);
    }

    #[test]
    fn unresolved_frame_has_empty_symbol() {
        let f = Frame::unresolved(0x1000);
        assert!(f.is_unresolved());
    }
}
