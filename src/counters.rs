//! Shared Counters (C12 half), §4.12.
//!
//! Process-wide, atomic, and lock-free. Every field uses `Relaxed` except
//! `dyn_iter_expire`, whose read-modify-write result feeds a branch and so
//! needs `AcqRel`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Clears the top two bits of `dyn_iter_expire` (§4.8 step 11).
pub const DYN_ITER_EXPIRE_SUB_MASK: u64 = !(0b11u64 << 62);

#[derive(Default)]
pub struct SharedCounters {
    crashes_total: AtomicU64,
    unique_crashes: AtomicU64,
    blacklisted_crashes: AtomicU64,
    dyn_iter_expire: AtomicU64,
}

impl SharedCounters {
    pub fn new() -> Self {
        SharedCounters::default()
    }

    pub fn incr_crashes_total(&self) -> u64 {
        self.crashes_total.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn incr_unique_crashes(&self) -> u64 {
        self.unique_crashes.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn incr_blacklisted_crashes(&self) -> u64 {
        self.blacklisted_crashes.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn crashes_total(&self) -> u64 {
        self.crashes_total.load(Ordering::Relaxed)
    }

    pub fn unique_crashes(&self) -> u64 {
        self.unique_crashes.load(Ordering::Relaxed)
    }

    pub fn blacklisted_crashes(&self) -> u64 {
        self.blacklisted_crashes.load(Ordering::Relaxed)
    }

    pub fn dyn_iter_expire(&self) -> u64 {
        self.dyn_iter_expire.load(Ordering::Relaxed)
    }

    /// Clears the two most significant bits (§4.8 step 11).
    pub fn clear_dyn_iter_expire_top_bits(&self) {
        self.dyn_iter_expire.fetch_and(DYN_ITER_EXPIRE_SUB_MASK, Ordering::AcqRel);
    }

    /// Resets the counter to zero on a successful save (§4.9).
    pub fn reset_dyn_iter_expire(&self) {
        self.dyn_iter_expire.store(0, Ordering::AcqRel);
    }
}
