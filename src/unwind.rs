//! Unwinder Facade (C4), §4.4.
//!
//! Symbol resolution requires a BFD-class reader this crate does not ship;
//! a no-op [`Unwinder`] is a legitimate, fully-supported configuration, and
//! the classifier (C8) already knows how to fall back to a PC-only frame
//! when the unwind comes back empty.

use crate::record::Frame;
use libc::pid_t;

/// Seam over whatever stack-walking and symbol-table machinery a host
/// links in.
pub trait Unwinder {
    /// Returns up to `max_frames` frames, innermost first. An empty
    /// result is valid and handled by the caller.
    fn unwind(&self, pid: pid_t, max_frames: usize) -> Vec<Frame>;
}

/// Always returns no frames. Pairs with a PC-only fallback one level up.
pub struct NullUnwinder;

impl Unwinder for NullUnwinder {
    fn unwind(&self, _pid: pid_t, _max_frames: usize) -> Vec<Frame> {
        Vec::new()
    }
}

/// Builds the one-frame stack the classifier falls back to when a real
/// unwind produced nothing but a PC is known (§4.8 step 4).
pub fn single_frame_fallback(pc: u64) -> Vec<Frame> {
    vec![Frame::unresolved(pc)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_unwinder_returns_no_frames() {
        assert!(NullUnwinder.unwind(1234, crate::record::MAX_FRAMES).is_empty());
    }

    #[test]
    fn single_frame_fallback_carries_the_given_pc() {
        let frames = single_frame_fallback(0xdeadbeef);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].pc, 0xdeadbeef);
        assert!(frames[0].is_unresolved());
    }
}
