//! Shared, read-mostly configuration (C12 half, §3/§4.12/§A3).
//!
//! Built once before attach and never mutated afterward; a mutation
//! requires a stop-the-world phase the surrounding host owns, not this
//! crate. Construction is fallible because a handful of invariants
//! (`num_major_frames` range, a sorted blacklist) are load-bearing for
//! correctness elsewhere in the core, not just nice-to-haves.

use crate::error::CoreError;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("num_major_frames must be in 1..=16, got {0}")]
    MajorFramesOutOfRange(usize),
    #[error("work_dir {path} could not be canonicalized: {source}")]
    WorkDirInvalid { path: PathBuf, #[source] source: std::io::Error },
}

impl From<ConfigError> for CoreError {
    fn from(e: ConfigError) -> Self {
        CoreError::ProcRead {
            what: "configuration",
            pid: 0,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SharedConfig {
    pub work_dir: PathBuf,
    pub file_ext: String,
    pub ignore_below_addr: u64,
    pub save_unique: bool,
    pub disable_randomization: bool,
    pub dry_run: bool,
    pub use_verifier: bool,
    pub save_maps: bool,
    pub num_major_frames: usize,
    pub symbol_whitelist: HashSet<String>,
    pub symbol_blacklist: HashSet<String>,
    /// Always sorted; [`SharedConfig::new`] sorts it itself rather than
    /// trusting the caller, since a binary search over an unsorted vector
    /// is a silent correctness bug.
    stack_hash_blacklist: Vec<u64>,
    /// Lets a host targeting a mobile ABI turn off the default "SIGABRT is
    /// important" policy without forking the signal table.
    pub sigabrt_important: bool,
}

impl SharedConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        work_dir: PathBuf,
        file_ext: String,
        ignore_below_addr: u64,
        save_unique: bool,
        disable_randomization: bool,
        dry_run: bool,
        use_verifier: bool,
        save_maps: bool,
        num_major_frames: usize,
        symbol_whitelist: HashSet<String>,
        symbol_blacklist: HashSet<String>,
        mut stack_hash_blacklist: Vec<u64>,
        sigabrt_important: bool,
    ) -> Result<Self, ConfigError> {
        if !(1..=16).contains(&num_major_frames) {
            return Err(ConfigError::MajorFramesOutOfRange(num_major_frames));
        }
        let work_dir = std::fs::canonicalize(&work_dir).map_err(|source| ConfigError::WorkDirInvalid {
            path: work_dir.clone(),
            source,
        })?;
        stack_hash_blacklist.sort_unstable();
        Ok(SharedConfig {
            work_dir,
            file_ext,
            ignore_below_addr,
            save_unique,
            disable_randomization,
            dry_run,
            use_verifier,
            save_maps,
            num_major_frames,
            symbol_whitelist,
            symbol_blacklist,
            stack_hash_blacklist,
            sigabrt_important,
        })
    }

    pub fn is_hash_blacklisted(&self, hash: u64) -> bool {
        self.stack_hash_blacklist.binary_search(&hash).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(num_major_frames: usize, blacklist: Vec<u64>) -> Result<SharedConfig, ConfigError> {
        SharedConfig::new(
            PathBuf::from("/tmp"),
            "fuzz".to_string(),
            0,
            true,
            true,
            false,
            false,
            false,
            num_major_frames,
            HashSet::new(),
            HashSet::new(),
            blacklist,
            true,
        )
    }

    #[test]
    fn rejects_major_frames_out_of_range() {
        assert!(base(0, vec![]).is_err());
        assert!(base(17, vec![]).is_err());
        assert!(base(16, vec![]).is_ok());
    }

    #[test]
    fn sorts_blacklist_regardless_of_input_order() {
        let cfg = base(7, vec![30, 10, 20]).unwrap();
        assert!(cfg.is_hash_blacklisted(10));
        assert!(cfg.is_hash_blacklisted(30));
        assert!(!cfg.is_hash_blacklisted(15));
    }
}
