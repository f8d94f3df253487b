//! Engine Module
//!
//! The core storage engine that owns the host file.
//!
//! ## Responsibilities
//! - Create or open a host file (superblock + index replay)
//! - Append records, soft-delete them, stream payloads back out
//! - Serialize mutations, keep reads off the mutation lock
//! - Hand the file to a compaction strategy on `defrag`

pub mod compaction;

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions, TryLockError};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};

use crate::config::{Config, ReadMissPolicy, SyncStrategy};
use crate::error::{FsError, Result};
use crate::fileio;
use crate::format::record::{self, header_size, RecordFlags, RecordHeader, FLAGS_SIZE, NAME_LEN_SIZE};
use crate::format::superblock::{Superblock, FORMAT_VERSION, SUPERBLOCK_SIZE};
use crate::index::{OffsetIndex, RecordScanner, ScannedRecord};

use self::compaction::{CompactionOutcome, CompactionTarget};

/// The storage engine
///
/// ## Concurrency Model
///
/// - **Mutations** (write/delete/defrag/close): serialized by `write_lock`,
///   which also guards the append offset. `update` is a delete followed by a
///   write, i.e. two critical sections; a concurrent reader may briefly see
///   the name missing.
///
/// - **Reads**: look the offset up under the index's read lock, then copy the
///   payload with positioned reads while holding only a shared guard on the
///   file. Payload bytes never change once written, so a reader that resolved
///   an offset just before a delete still reads the old payload. The shared
///   guard is held for the whole copy into the caller's destination, so a
///   slow destination delays `close` and `defrag` until it drains.
///
/// - **Publishing**: a mutation touches the index only after its bytes are on
///   disk (and synced under `SyncStrategy::EveryWrite`). A failed mutation
///   leaves the index as it was.
///
/// - **Close**: takes the file out from under an exclusive guard, so it waits
///   for in-flight reads and turns every later call into `FsError::Closed`.
pub struct Engine {
    /// Host file path
    path: PathBuf,

    /// Engine configuration
    config: Config,

    /// Superblock read at open (or written at create)
    superblock: Superblock,

    /// Host file handle; `None` once closed
    file: RwLock<Option<File>>,

    /// Name → offset of the live record
    index: OffsetIndex,

    /// Serializes mutations; holds the offset where the next record goes
    write_lock: Mutex<u64>,
}

impl Engine {
    /// Create a fresh filesystem at `path`.
    ///
    /// **Destructive**: any existing content of `path` is truncated away.
    pub fn create(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();

        let file = Self::open_file(path, true, config.lock_file)?;
        let superblock = Superblock::write(&file, FORMAT_VERSION)?;

        tracing::info!(path = %path.display(), version = superblock.version, "created filesystem");

        Ok(Self {
            path: path.to_path_buf(),
            config,
            superblock,
            file: RwLock::new(Some(file)),
            index: OffsetIndex::new(),
            write_lock: Mutex::new(SUPERBLOCK_SIZE),
        })
    }

    /// Open an existing filesystem at `path`
    ///
    /// On startup:
    /// 1. Open (and lock) the host file
    /// 2. Read the superblock
    /// 3. Replay every record to rebuild the index
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();

        let file = Self::open_file(path, false, config.lock_file)?;

        let superblock = Superblock::read(&file)?;
        if !superblock.is_current() {
            tracing::warn!(
                path = %path.display(),
                found = superblock.version,
                expected = FORMAT_VERSION,
                "format version mismatch, opening without migration"
            );
        }

        let (index, stats) = OffsetIndex::rebuild(&file, SUPERBLOCK_SIZE)?;

        tracing::info!(
            path = %path.display(),
            records = stats.records,
            live = stats.live,
            deleted = stats.deleted,
            superseded = stats.superseded,
            end_offset = stats.end_offset,
            "opened filesystem"
        );

        Ok(Self {
            path: path.to_path_buf(),
            config,
            superblock,
            file: RwLock::new(Some(file)),
            index,
            write_lock: Mutex::new(stats.end_offset),
        })
    }

    /// Open with default config (convenience method)
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, Config::default())
    }

    fn open_file(path: &Path, create: bool, lock: bool) -> Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => FsError::NotFound(path.display().to_string()),
                _ => FsError::Io(e),
            })?;

        if lock {
            match file.try_lock() {
                Ok(()) => {}
                Err(TryLockError::WouldBlock) => return Err(FsError::Locked(path.to_path_buf())),
                Err(TryLockError::Error(e)) => return Err(FsError::Io(e)),
            }
        }

        Ok(file)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Append a record for `name` with exactly `len` bytes taken from `source`.
    ///
    /// Returns the record's offset. A live record already stored under `name`
    /// stays on disk untouched but is no longer reachable. If `source` ends
    /// early the partial record is truncated away and `SourceTruncated` is
    /// returned. Any failure, including the sync under `EveryWrite`, rolls the
    /// file back and leaves the index untouched.
    pub fn write<R: Read>(&self, name: &str, source: R, len: u64) -> Result<u64> {
        let header = RecordHeader::new(name, len).encode()?;

        let mut tail = self.write_lock.lock();
        let guard = self.file.read();
        let file = guard.as_ref().ok_or(FsError::Closed)?;

        let offset = *tail;
        if let Err(e) = self.append(file, offset, &header, name, source, len) {
            if let Err(rollback) = file.set_len(offset) {
                tracing::warn!(offset, error = %rollback, "failed to roll back partial record");
            }
            return Err(e);
        }

        *tail = offset + header.len() as u64 + len;
        if let Some(previous) = self.index.insert(name, offset) {
            tracing::debug!(name, previous, "record superseded without delete");
        }

        tracing::debug!(name, offset, payload_len = len, "appended record");
        Ok(offset)
    }

    fn append<R: Read>(
        &self,
        file: &File,
        offset: u64,
        header: &[u8],
        name: &str,
        source: R,
        len: u64,
    ) -> Result<()> {
        fileio::write_all_at(file, header, offset)?;

        let mut source = source.take(len);
        let mut buf = vec![0u8; self.chunk_len(len)];
        let mut pos = offset + header.len() as u64;
        let mut copied = 0u64;

        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            fileio::write_all_at(file, &buf[..n], pos)?;
            pos += n as u64;
            copied += n as u64;
        }

        if copied < len {
            return Err(FsError::SourceTruncated {
                name: name.to_string(),
                expected: len,
                actual: copied,
            });
        }
        self.sync_if_needed(file)
    }

    /// Soft-delete the live record for `name`.
    ///
    /// Sets the deleted bit in place and drops the index entry. Returns
    /// `false` (and touches nothing) if `name` has no live record.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let _tail = self.write_lock.lock();
        let guard = self.file.read();
        let file = guard.as_ref().ok_or(FsError::Closed)?;

        let Some(offset) = self.index.lookup(name) else {
            return Ok(false);
        };

        let mut raw = [0u8; FLAGS_SIZE as usize];
        fileio::read_exact_at(file, &mut raw, offset)?;
        let flags = record::decode_flags(&raw)?;
        let deleted = RecordFlags::from_bits(flags.bits() | RecordFlags::DELETED.bits());
        fileio::write_all_at(file, &deleted.to_bytes(), offset)?;

        if let Err(e) = self.sync_if_needed(file) {
            if let Err(restore) = fileio::write_all_at(file, &raw, offset) {
                tracing::warn!(name, offset, error = %restore, "failed to restore record flags");
            }
            return Err(e);
        }

        self.index.remove(name);

        tracing::debug!(name, offset, "deleted record");
        Ok(true)
    }

    /// Soft-delete `name` (if present) and append a new record for it
    pub fn update<R: Read>(&self, name: &str, source: R, len: u64) -> Result<u64> {
        self.delete(name)?;
        self.write(name, source, len)
    }

    /// Run the configured compaction strategy.
    ///
    /// Reads and writes wait while the strategy runs. After a rewrite the
    /// index is rebuilt from scratch since every offset may have moved.
    pub fn defrag(&self) -> Result<CompactionOutcome> {
        let mut tail = self.write_lock.lock();
        let guard = self.file.write();
        let file = guard.as_ref().ok_or(FsError::Closed)?;

        let live = self.index.snapshot();
        let outcome = self.config.compactor.compact(&CompactionTarget {
            file,
            live: &live,
            end_offset: *tail,
        })?;

        if outcome == CompactionOutcome::Rewritten {
            let (index, stats) = OffsetIndex::rebuild(file, SUPERBLOCK_SIZE)?;
            self.index.replace_with(index);
            *tail = stats.end_offset;
            tracing::info!(live = stats.live, end_offset = stats.end_offset, "defrag rewrote filesystem");
        }

        Ok(outcome)
    }

    /// Sync to disk and release the host file.
    ///
    /// Every later operation fails with `FsError::Closed`; closing again is a no-op.
    pub fn close(&self) -> Result<()> {
        let _tail = self.write_lock.lock();
        let Some(file) = self.file.write().take() else {
            tracing::debug!(path = %self.path.display(), "close on closed filesystem");
            return Ok(());
        };

        file.sync_all()?;
        tracing::info!(path = %self.path.display(), live = self.index.len(), "closed filesystem");
        self.index.clear();
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Stream the payload of `name` into `destination`.
    ///
    /// Returns the number of bytes copied. A missing name fails with
    /// `NotFound` unless the config opts into `ReadMissPolicy::CloseSilently`.
    pub fn read<W: Write>(&self, name: &str, destination: &mut W) -> Result<u64> {
        let guard = self.file.read();
        let file = guard.as_ref().ok_or(FsError::Closed)?;

        let Some(offset) = self.index.lookup(name) else {
            return match self.config.read_miss {
                ReadMissPolicy::Error => Err(FsError::NotFound(name.to_string())),
                ReadMissPolicy::CloseSilently => {
                    destination.flush()?;
                    Ok(0)
                }
            };
        };

        let mut len_buf = [0u8; record::PAYLOAD_LEN_SIZE as usize];
        let len_offset = offset + FLAGS_SIZE + NAME_LEN_SIZE + name.len() as u64;
        fileio::read_exact_at(file, &mut len_buf, len_offset)?;
        let payload_len = record::decode_payload_length(&len_buf)?;

        let mut buf = vec![0u8; self.chunk_len(payload_len)];
        let mut pos = offset + header_size(name.len());
        let mut remaining = payload_len;
        while remaining > 0 {
            let n = remaining.min(buf.len() as u64) as usize;
            fileio::read_exact_at(file, &mut buf[..n], pos)?;
            destination.write_all(&buf[..n])?;
            pos += n as u64;
            remaining -= n as u64;
        }
        destination.flush()?;

        tracing::trace!(name, offset, payload_len, "read record");
        Ok(payload_len)
    }

    /// Read the payload of `name` into memory
    pub fn read_to_vec(&self, name: &str) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.read(name, &mut out)?;
        Ok(out)
    }

    /// Names starting with `prefix`; `None` or `""` lists everything
    pub fn list(&self, prefix: Option<&str>) -> Result<BTreeSet<String>> {
        self.ensure_open()?;
        Ok(self.index.keys_with_prefix(prefix.unwrap_or("")))
    }

    /// Every record header in the file, live or deleted, in append order
    pub fn inspect(&self) -> Result<Vec<ScannedRecord>> {
        let _tail = self.write_lock.lock();
        let guard = self.file.read();
        let file = guard.as_ref().ok_or(FsError::Closed)?;

        let records = RecordScanner::new(file, SUPERBLOCK_SIZE)?
            .read_deleted_names(true)
            .collect::<Result<Vec<_>>>();
        records
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Offset of the live record for `name`
    pub fn offset_of(&self, name: &str) -> Option<u64> {
        self.index.lookup(name)
    }

    /// Offset where the next record will be appended
    pub fn end_offset(&self) -> u64 {
        *self.write_lock.lock()
    }

    /// Number of live names
    pub fn live_count(&self) -> usize {
        self.index.len()
    }

    pub fn superblock(&self) -> Superblock {
        self.superblock
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.file.read().is_none()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(FsError::Closed);
        }
        Ok(())
    }

    fn sync_if_needed(&self, file: &File) -> Result<()> {
        if self.config.sync_strategy == SyncStrategy::EveryWrite {
            file.sync_data()?;
        }
        Ok(())
    }

    fn chunk_len(&self, len: u64) -> usize {
        len.min(self.config.copy_buffer_size as u64) as usize
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(file) = self.file.get_mut().take() {
            if let Err(e) = file.sync_all() {
                tracing::warn!(path = %self.path.display(), error = %e, "sync on drop failed");
            }
        }
    }
}
