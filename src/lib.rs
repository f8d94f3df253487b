//! # FileFs
//!
//! An append-only object store embedded in a single host file:
//! - Filename-keyed write/read/delete/update/list
//! - Soft deletes by flipping a flag in place
//! - In-memory offset index rebuilt by replaying the file at open
//! - Asynchronous operations on a worker pool
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              FilesystemProxy (decorators)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │            FileFs (worker pool, Task handles)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Engine                                  │
//! │        (serialized mutations / lock-free payload reads)      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ OffsetIndex │          │  Host file  │
//!   │  (RwLock)   │◄─replay──│ (superblock │
//!   └─────────────┘          │ + records)  │
//!                            └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod fileio;
pub mod format;
pub mod index;
pub mod engine;
pub mod runtime;
pub mod filesystem;
pub mod proxy;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FsError, Result};
pub use config::{Config, ReadMissPolicy, SyncStrategy};
pub use engine::compaction::{CompactionOutcome, CompactionTarget, Compactor};
pub use engine::Engine;
pub use filesystem::FileFs;
pub use proxy::{FilesystemProxy, Passthrough};
pub use runtime::Task;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of FileFs
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
