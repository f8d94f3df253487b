//! Record replay
//!
//! Sequential walk over the records of a host file.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::error::{FsError, Result};
use crate::format::record::{
    self, header_size, RecordFlags, FLAGS_SIZE, NAME_LEN_SIZE, PAYLOAD_LEN_SIZE,
};

/// Result of rebuilding an index
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records parsed, live or deleted
    pub records: u64,

    /// Records indexed at the end of the scan
    pub live: u64,

    /// Records whose deleted flag was set
    pub deleted: u64,

    /// Live records shadowed by a later record with the same name
    pub superseded: u64,

    /// Offset just past the last record
    pub end_offset: u64,
}

/// One record header as found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRecord {
    /// Offset of the flags field
    pub offset: u64,
    pub flags: RecordFlags,
    pub name_len: u32,
    /// `None` for deleted records unless the scanner reads deleted names
    pub name: Option<String>,
    pub payload_len: u64,
}

impl ScannedRecord {
    pub fn payload_offset(&self) -> u64 {
        self.offset + header_size(self.name_len as usize)
    }

    pub fn end_offset(&self) -> u64 {
        self.payload_offset() + self.payload_len
    }
}

/// Iterator over record headers from a start offset to end of file.
///
/// Stops after the first error.
pub struct RecordScanner<'a> {
    reader: BufReader<&'a File>,
    offset: u64,
    end: u64,
    read_deleted_names: bool,
    failed: bool,
}

impl<'a> RecordScanner<'a> {
    /// Position a scanner at `start_offset`; the end is the current file length
    pub fn new(file: &'a File, start_offset: u64) -> Result<Self> {
        let end = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(start_offset))?;

        Ok(Self {
            reader,
            offset: start_offset,
            end,
            read_deleted_names: false,
            failed: false,
        })
    }

    /// Decode names of deleted records too, instead of skipping them
    pub fn read_deleted_names(mut self, enabled: bool) -> Self {
        self.read_deleted_names = enabled;
        self
    }

    fn read_record(&mut self) -> Result<ScannedRecord> {
        let offset = self.offset;
        let remaining = self.end - offset;

        if remaining < FLAGS_SIZE + NAME_LEN_SIZE {
            return Err(FsError::corrupt_record(
                offset,
                format!("{} trailing bytes cannot hold a record header", remaining),
            ));
        }

        let mut prefix = [0u8; (FLAGS_SIZE + NAME_LEN_SIZE) as usize];
        self.reader.read_exact(&mut prefix)?;
        let flags = record::decode_flags(&prefix)?;
        let name_len = record::decode_name_length(&prefix[FLAGS_SIZE as usize..])
            .map_err(|e| FsError::corrupt_record(offset, e.to_string()))?;

        let header_len = header_size(name_len as usize);
        if remaining < header_len {
            return Err(FsError::corrupt_record(
                offset,
                format!("name length {} runs past end of file", name_len),
            ));
        }

        let name = if flags.is_deleted() && !self.read_deleted_names {
            self.reader.seek_relative(name_len as i64)?;
            None
        } else {
            let mut raw = vec![0u8; name_len as usize];
            self.reader.read_exact(&mut raw)?;
            let name = String::from_utf8(raw)
                .map_err(|e| FsError::corrupt_record(offset, format!("name is not UTF-8: {}", e)))?;
            Some(name)
        };

        let mut len_buf = [0u8; PAYLOAD_LEN_SIZE as usize];
        self.reader.read_exact(&mut len_buf)?;
        let payload_len = record::decode_payload_length(&len_buf)?;

        if payload_len > remaining - header_len {
            return Err(FsError::corrupt_record(
                offset,
                format!("payload length {} runs past end of file", payload_len),
            ));
        }

        // Bounded by the file length checked above.
        self.reader.seek_relative(payload_len as i64)?;
        self.offset = offset + header_len + payload_len;

        tracing::trace!(
            offset,
            deleted = flags.is_deleted(),
            name_len,
            payload_len,
            "scanned record"
        );

        Ok(ScannedRecord {
            offset,
            flags,
            name_len,
            name,
            payload_len,
        })
    }
}

impl Iterator for RecordScanner<'_> {
    type Item = Result<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.end {
            return None;
        }

        let result = self.read_record();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}
