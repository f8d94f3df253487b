//! Configuration for FileFs
//!
//! Centralized configuration with sensible defaults.

use std::sync::Arc;

use crate::engine::compaction::{Compactor, Unsupported};
use crate::error::{FsError, Result};

/// Main configuration for a FileFs instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: when to fsync the host file
    pub sync_strategy: SyncStrategy,

    /// Take an exclusive advisory lock on the host file while it is open
    pub lock_file: bool,

    // -------------------------------------------------------------------------
    // Read Configuration
    // -------------------------------------------------------------------------
    /// What `read` does when the name is not in the index
    pub read_miss: ReadMissPolicy,

    /// Chunk size used when streaming payloads in and out of the host file
    pub copy_buffer_size: usize,

    // -------------------------------------------------------------------------
    // Execution Configuration
    // -------------------------------------------------------------------------
    /// Number of worker threads executing asynchronous operations
    pub worker_threads: usize,

    /// Strategy invoked by `defrag`
    pub compactor: Arc<dyn Compactor>,
}

/// Host file sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append and every deletion flag flip
    EveryWrite,

    /// fsync only when the filesystem is closed
    OnClose,
}

/// Behavior of `read` for a name that has no live record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMissPolicy {
    /// Fail with `FsError::NotFound`
    Error,

    /// Flush the destination without writing anything and succeed
    CloseSilently,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_strategy: SyncStrategy::OnClose,
            lock_file: true,
            read_miss: ReadMissPolicy::Error,
            copy_buffer_size: 64 * 1024, // 64 KiB
            worker_threads: 4,
            compactor: Arc::new(Unsupported),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(FsError::Config("worker_threads must be at least 1".to_string()));
        }
        if self.copy_buffer_size == 0 {
            return Err(FsError::Config("copy_buffer_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Enable or disable the exclusive host file lock
    pub fn lock_file(mut self, lock: bool) -> Self {
        self.config.lock_file = lock;
        self
    }

    /// Set the read-miss policy
    pub fn read_miss(mut self, policy: ReadMissPolicy) -> Self {
        self.config.read_miss = policy;
        self
    }

    /// Set the payload streaming chunk size (in bytes)
    pub fn copy_buffer_size(mut self, size: usize) -> Self {
        self.config.copy_buffer_size = size;
        self
    }

    /// Set the number of worker threads
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    /// Set the defrag strategy
    pub fn compactor(mut self, compactor: Arc<dyn Compactor>) -> Self {
        self.config.compactor = compactor;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
