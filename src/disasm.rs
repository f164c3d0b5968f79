//! Disassembler Facade (C3), §4.3.
//!
//! Owns sanitization and the two fallback strings; mnemonic decoding itself
//! is delegated to an injected [`Disassembler`] collaborator (§6/A5). A host
//! with no decoder backend wired in still gets a fully-functional core,
//! just with every instruction rendered as `[UNKNOWN]`.

/// Maximum length of the returned instruction string, `_HF_INSTR_SZ` in the
/// reference tool.
pub const INSTR_MAX: usize = 32;

/// Bytes read from the tracee at `pc` before handing them to the decoder;
/// comfortably longer than the longest x86 instruction encoding (15 bytes).
pub const MAX_INSTR_BYTES: usize = 16;

pub const NOT_MMAPED: &str = "[NOT_MMAPED]";
pub const UNKNOWN_INSTR: &str = "[UNKNOWN]";

/// A pluggable mnemonic decoder. `decode` receives the raw bytes read at
/// `pc`, the disassembly mode derived from [`crate::arch::derive_disasm_mode`],
/// and returns the best-effort mnemonic text (unsanitized; this facade
/// sanitizes the result).
pub trait Disassembler {
    fn decode(&self, bytes: &[u8], pc: u64, mode: crate::arch::DisasmMode) -> Option<String>;
}

/// Always reports `[UNKNOWN]`; the valid, supported configuration for a
/// host that has not wired in a real decoder.
pub struct NullDisassembler;

impl Disassembler for NullDisassembler {
    fn decode(&self, _bytes: &[u8], _pc: u64, _mode: crate::arch::DisasmMode) -> Option<String> {
        None
    }
}

/// Replaces every character outside `[printable ∧ not '/' ∧ not '\\' ∧ not
/// whitespace]` with `_`, and truncates to [`INSTR_MAX`] bytes on a UTF-8
/// boundary.
fn sanitize(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '/' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.len() > INSTR_MAX {
        let mut end = INSTR_MAX;
        while !out.is_char_boundary(end) {
            end -= 1;
        }
        out.truncate(end);
    }
    out
}

/// Produces the final, sanitized instruction string for a fault site.
/// `bytes` is whatever [`crate::memory::read_mem`] returned at `pc`
/// (possibly empty).
pub fn disassemble(
    decoder: &dyn Disassembler,
    bytes: &[u8],
    pc: u64,
    mode: crate::arch::DisasmMode,
) -> String {
    if bytes.is_empty() {
        return NOT_MMAPED.to_string();
    }
    if mode == crate::arch::DisasmMode::Unknown {
        return UNKNOWN_INSTR.to_string();
    }
    match decoder.decode(bytes, pc, mode) {
        Some(raw) => sanitize(&raw),
        None => UNKNOWN_INSTR.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::DisasmMode;

    struct FixedDecoder(&'static str);
    impl Disassembler for FixedDecoder {
        fn decode(&self, _bytes: &[u8], _pc: u64, _mode: DisasmMode) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[test]
    fn empty_bytes_yield_not_mmaped_regardless_of_decoder() {
        let d = FixedDecoder("mov eax, ebx");
        assert_eq!(disassemble(&d, &[], 0x1000, DisasmMode::X86_64), NOT_MMAPED);
    }

    #[test]
    fn unknown_mode_short_circuits_to_unknown_instr() {
        let d = FixedDecoder("mov eax, ebx");
        assert_eq!(disassemble(&d, &[0x90], 0x1000, DisasmMode::Unknown), UNKNOWN_INSTR);
    }

    #[test]
    fn null_disassembler_always_reports_unknown() {
        assert_eq!(
            disassemble(&NullDisassembler, &[0x90], 0x1000, DisasmMode::X86_64),
            UNKNOWN_INSTR
        );
    }

    #[test]
    fn sanitize_replaces_slashes_backslashes_and_whitespace() {
        let d = FixedDecoder("mov\teax,\\ [ebx]/2");
        let out = disassemble(&d, &[0x90], 0x1000, DisasmMode::X86_64);
        assert!(!out.contains('/'));
        assert!(!out.contains('\\'));
        assert!(!out.contains(char::is_whitespace));
    }

    #[test]
    fn sanitize_truncates_to_instr_max_on_char_boundary() {
        let long = "x".repeat(100);
        let d = FixedDecoder(Box::leak(long.into_boxed_str()));
        let out = disassemble(&d, &[0x90], 0x1000, DisasmMode::X86_64);
        assert_eq!(out.len(), INSTR_MAX);
    }
}
