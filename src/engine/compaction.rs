//! Compaction extension point
//!
//! `defrag` hands the host file to a `Compactor`. No reclaiming algorithm
//! ships with the crate; the default strategy reports `Unsupported` so callers
//! can tell "not implemented" apart from "nothing to reclaim".

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;

use crate::error::{FsError, Result};

/// What a compactor is allowed to see and touch
pub struct CompactionTarget<'a> {
    /// The open host file. Mutations are serialized for the duration of the call.
    pub file: &'a File,

    /// Live names and their record offsets at the start of compaction
    pub live: &'a BTreeMap<String, u64>,

    /// Offset just past the last record
    pub end_offset: u64,
}

/// Outcome reported by a compactor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// The file was left untouched
    Unchanged,

    /// The file was rewritten; every offset must be recomputed
    Rewritten,
}

/// A defrag strategy.
///
/// Implementations must be atomic from the caller's point of view: either the
/// whole file is consistently rewritten and `Rewritten` is returned, or the
/// file is left exactly as it was and an error (or `Unchanged`) is returned.
/// The engine rebuilds its index after `Rewritten`.
pub trait Compactor: Send + Sync + fmt::Debug {
    fn compact(&self, target: &CompactionTarget<'_>) -> Result<CompactionOutcome>;
}

/// Default strategy: defrag is not implemented
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

impl Compactor for Unsupported {
    fn compact(&self, _target: &CompactionTarget<'_>) -> Result<CompactionOutcome> {
        Err(FsError::Unsupported(
            "defrag has no compaction strategy configured".to_string(),
        ))
    }
}
