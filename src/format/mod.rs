//! On-disk Format Module
//!
//! Byte layout of the host file.
//!
//! ## Responsibilities
//! - Encode and decode record headers
//! - Write and read the superblock
//!
//! ## File Format
//! All multi-byte integers are **big-endian**.
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Superblock (8 bytes)                                        │
//! │   Version: u64 (8)                                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Record 1                                                    │
//! │ ┌──────────┬───────────┬──────┬──────────────┬───────────┐ │
//! │ │Flags (4) │NameLen (4)│ Name │PayloadLen (8)│  Payload  │ │
//! │ └──────────┴───────────┴──────┴──────────────┴───────────┘ │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Record 2 ... (records continue to end of file)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Flags bit 0 marks a record deleted. It is the only field ever rewritten
//! after a record has been appended.

pub mod record;
pub mod superblock;

pub use record::{header_size, RecordFlags, RecordHeader};
pub use superblock::{Superblock, FORMAT_VERSION, SUPERBLOCK_SIZE};
