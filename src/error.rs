//! Error types for FileFs
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using FsError
pub type Result<T> = std::result::Result<T, FsError>;

/// Unified error type for FileFs operations
#[derive(Debug, Error)]
pub enum FsError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Host file is locked by another handle: {}", .0.display())]
    Locked(PathBuf),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Not found: {0}")]
    NotFound(String),

    // -------------------------------------------------------------------------
    // On-disk Structure Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt superblock: {0}")]
    CorruptHeader(String),

    #[error("Corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Source for {name:?} ended after {actual} of {expected} bytes")]
    SourceTruncated {
        name: String,
        expected: u64,
        actual: u64,
    },

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Filesystem is closed")]
    Closed,

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Worker error: {0}")]
    Worker(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FsError {
    /// Shorthand for a structural error found while parsing a record
    pub(crate) fn corrupt_record(offset: u64, reason: impl Into<String>) -> Self {
        FsError::CorruptRecord {
            offset,
            reason: reason.into(),
        }
    }

    /// True for `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }
}
