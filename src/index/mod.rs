//! Offset Index Module
//!
//! In-memory map from object name to the offset of its live record.
//!
//! ## Responsibilities
//! - Rebuild from the host file by a full linear replay at open time
//! - Insert/remove/lookup per name
//! - Prefix listing of names
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys make prefix listing a range scan
//! - Per-name operations are O(log n) rather than constant time; a hash map
//!   would need a full scan for every prefix listing
//! - Many concurrent readers, exclusive writer
//! - Never persisted; discarded when the filesystem closes

pub mod replay;

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::ops::Bound;

use parking_lot::RwLock;

use crate::error::Result;

pub use replay::{RecordScanner, ReplayStats, ScannedRecord};

/// Name → record offset, for live records only
#[derive(Debug, Default)]
pub struct OffsetIndex {
    entries: RwLock<BTreeMap<String, u64>>,
}

impl OffsetIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay every record from `start_offset` to end of file.
    ///
    /// Deleted records are parsed only far enough to skip them. When a name
    /// appears more than once, the highest offset wins because the scan runs
    /// in append order.
    pub fn rebuild(file: &File, start_offset: u64) -> Result<(Self, ReplayStats)> {
        let mut map = BTreeMap::new();
        let mut stats = ReplayStats {
            end_offset: start_offset,
            ..ReplayStats::default()
        };

        for record in RecordScanner::new(file, start_offset)? {
            let record = record?;
            stats.records += 1;
            stats.end_offset = record.end_offset();

            match record.name {
                Some(name) if !record.flags.is_deleted() => {
                    if map.insert(name, record.offset).is_some() {
                        stats.superseded += 1;
                    }
                }
                _ => stats.deleted += 1,
            }
        }

        stats.live = map.len() as u64;
        Ok((
            Self {
                entries: RwLock::new(map),
            },
            stats,
        ))
    }

    /// Point `name` at `offset`, returning the previous offset if any
    pub fn insert(&self, name: impl Into<String>, offset: u64) -> Option<u64> {
        self.entries.write().insert(name.into(), offset)
    }

    /// Drop `name`, returning its offset if it was present
    pub fn remove(&self, name: &str) -> Option<u64> {
        self.entries.write().remove(name)
    }

    /// Offset of the live record for `name`
    pub fn lookup(&self, name: &str) -> Option<u64> {
        self.entries.read().get(name).copied()
    }

    /// Snapshot of names starting with `prefix`; an empty prefix returns all names
    pub fn keys_with_prefix(&self, prefix: &str) -> BTreeSet<String> {
        let entries = self.entries.read();
        entries
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Snapshot of every entry
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.entries.read().clone()
    }

    /// Swap in the contents of another index (after the file was rewritten)
    pub fn replace_with(&self, other: OffsetIndex) {
        *self.entries.write() = other.entries.into_inner();
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
