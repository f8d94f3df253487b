//! Superblock
//!
//! The fixed 8-byte header at offset 0 holding the format version.

use std::fs::File;

use crate::error::{FsError, Result};
use crate::fileio;

/// Current format version written by `create`
pub const FORMAT_VERSION: u64 = 1;

/// Size of the superblock; the first record starts here
pub const SUPERBLOCK_SIZE: u64 = 8;

/// Decoded superblock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub version: u64,
}

impl Superblock {
    pub fn current() -> Self {
        Self {
            version: FORMAT_VERSION,
        }
    }

    /// Whether this file was written by the current format version.
    ///
    /// A mismatch is not an error. There is no migration path yet; callers
    /// decide what to do with an older or newer file.
    pub fn is_current(&self) -> bool {
        self.version == FORMAT_VERSION
    }

    /// Truncate `file` to exactly the superblock and write `version`, then fsync.
    ///
    /// Destroys any existing content.
    pub fn write(file: &File, version: u64) -> Result<Self> {
        file.set_len(SUPERBLOCK_SIZE)?;
        fileio::write_all_at(file, &version.to_be_bytes(), 0)?;
        file.sync_all()?;
        Ok(Self { version })
    }

    /// Read the superblock from the start of `file`
    pub fn read(file: &File) -> Result<Self> {
        let len = file.metadata()?.len();
        if len < SUPERBLOCK_SIZE {
            return Err(FsError::CorruptHeader(format!(
                "file is {} bytes, superblock needs {}",
                len, SUPERBLOCK_SIZE
            )));
        }

        let mut buf = [0u8; SUPERBLOCK_SIZE as usize];
        fileio::read_exact_at(file, &mut buf, 0)?;

        Ok(Self {
            version: u64::from_be_bytes(buf),
        })
    }
}
