//! Record codec
//!
//! Pure encoding/decoding of record headers. No I/O.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FsError, Result};

// =============================================================================
// Field Sizes
// =============================================================================

/// Size of the flags field
pub const FLAGS_SIZE: u64 = 4;

/// Size of the name length field
pub const NAME_LEN_SIZE: u64 = 4;

/// Size of the payload length field
pub const PAYLOAD_LEN_SIZE: u64 = 8;

/// Largest encodable name, in UTF-8 bytes
pub const MAX_NAME_LEN: usize = i32::MAX as usize;

/// Bytes preceding the payload of a record whose name is `name_len` bytes long
pub fn header_size(name_len: usize) -> u64 {
    FLAGS_SIZE + NAME_LEN_SIZE + name_len as u64 + PAYLOAD_LEN_SIZE
}

// =============================================================================
// Flags
// =============================================================================

/// The mutable flags word at the start of every record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags(u32);

impl RecordFlags {
    /// Bit 0: record has been soft-deleted
    pub const DELETED: RecordFlags = RecordFlags(1);

    /// Flags of a freshly appended record
    pub const LIVE: RecordFlags = RecordFlags(0);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_deleted(self) -> bool {
        self.0 & Self::DELETED.0 != 0
    }

    /// Encoded form, as written in place when a record is deleted
    pub fn to_bytes(self) -> [u8; FLAGS_SIZE as usize] {
        self.0.to_be_bytes()
    }
}

// =============================================================================
// Header
// =============================================================================

/// Everything in a record except its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub flags: RecordFlags,
    pub name: String,
    pub payload_len: u64,
}

impl RecordHeader {
    pub fn new(name: impl Into<String>, payload_len: u64) -> Self {
        Self {
            flags: RecordFlags::LIVE,
            name: name.into(),
            payload_len,
        }
    }

    /// Size of the encoded header
    pub fn encoded_len(&self) -> u64 {
        header_size(self.name.len())
    }

    /// Header plus payload
    pub fn record_len(&self) -> u64 {
        self.encoded_len() + self.payload_len
    }

    /// Offset of the payload for a record starting at `record_offset`
    pub fn payload_offset(&self, record_offset: u64) -> u64 {
        record_offset + self.encoded_len()
    }

    pub fn encode(&self) -> Result<Bytes> {
        encode_header(self.flags, &self.name, self.payload_len)
    }
}

/// Encode `flags | name_len | name | payload_len`
///
/// Fails with `Encoding` if the name does not fit the 4-byte signed length field.
pub fn encode_header(flags: RecordFlags, name: &str, payload_len: u64) -> Result<Bytes> {
    let name_len = checked_name_len(name)?;

    let mut buf = BytesMut::with_capacity(header_size(name.len()) as usize);
    buf.put_u32(flags.bits());
    buf.put_u32(name_len);
    buf.put_slice(name.as_bytes());
    buf.put_u64(payload_len);

    Ok(buf.freeze())
}

/// Validate a name's encoded length against the length field
pub fn checked_name_len(name: &str) -> Result<u32> {
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::Encoding(format!(
            "name is {} bytes, limit is {}",
            name.len(),
            MAX_NAME_LEN
        )));
    }
    Ok(name.len() as u32)
}

/// Decode the flags field from the start of `bytes`
pub fn decode_flags(mut bytes: &[u8]) -> Result<RecordFlags> {
    ensure_len(bytes, FLAGS_SIZE, "flags")?;
    Ok(RecordFlags::from_bits(bytes.get_u32()))
}

/// Decode the name length field from the start of `bytes`
pub fn decode_name_length(mut bytes: &[u8]) -> Result<u32> {
    ensure_len(bytes, NAME_LEN_SIZE, "name length")?;
    let len = bytes.get_u32();
    if len as usize > MAX_NAME_LEN {
        return Err(FsError::Encoding(format!("name length {} out of range", len)));
    }
    Ok(len)
}

/// Decode the payload length field from the start of `bytes`
pub fn decode_payload_length(mut bytes: &[u8]) -> Result<u64> {
    ensure_len(bytes, PAYLOAD_LEN_SIZE, "payload length")?;
    Ok(bytes.get_u64())
}

/// Decode a whole header from a contiguous buffer
pub fn decode_header(bytes: &[u8]) -> Result<RecordHeader> {
    let flags = decode_flags(bytes)?;
    let name_len = decode_name_length(&bytes[FLAGS_SIZE as usize..])? as usize;

    let name_start = (FLAGS_SIZE + NAME_LEN_SIZE) as usize;
    let name_end = name_start + name_len;
    if bytes.len() < name_end {
        return Err(FsError::Encoding(format!(
            "name needs {} bytes, only {} available",
            name_len,
            bytes.len() - name_start
        )));
    }
    let name = std::str::from_utf8(&bytes[name_start..name_end])
        .map_err(|e| FsError::Encoding(format!("name is not valid UTF-8: {}", e)))?
        .to_string();

    let payload_len = decode_payload_length(&bytes[name_end..])?;

    Ok(RecordHeader {
        flags,
        name,
        payload_len,
    })
}

fn ensure_len(bytes: &[u8], needed: u64, field: &str) -> Result<()> {
    if (bytes.len() as u64) < needed {
        return Err(FsError::Encoding(format!(
            "{} needs {} bytes, got {}",
            field,
            needed,
            bytes.len()
        )));
    }
    Ok(())
}
