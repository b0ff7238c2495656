//! Log record codec.
//!
//! Every record is an 11-byte header followed by the UTF-8 key:
//!
//! ```text
//! +--------------+-----------+-------------+-----------+-------------------+
//! | checksum (4) | flags (1) | key_len (2) | value (4) | key (key_len)     |
//! +--------------+-----------+-------------+-----------+-------------------+
//! ```
//!
//! The checksum is CRC32 over everything after it. Integers are big-endian.
//! An all-zero header marks unused space at the end of a page; keys are never
//! empty, so a real record never encodes to it.

use bytes::{Buf, BufMut, BytesMut};

use eventum_common::constants::LOG_RECORD_HEADER_SIZE;

use super::status::RecordInfo;
use super::Address;
use crate::error::{IndexError, IndexResult};

bitflags::bitflags! {
    /// Flags for log records.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RecordFlags: u8 {
        /// Record deletes its key.
        const TOMBSTONE = 0b0000_0001;
        /// Record was abandoned and must be skipped.
        const INVALID = 0b0000_0010;
    }
}

/// A decoded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Record flags.
    pub flags: RecordFlags,
    /// Key bytes as a string.
    pub key: String,
    /// Value, zero for tombstones.
    pub value: u32,
}

/// Result of decoding at a position inside a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A record and its encoded length.
    Record(LogRecord, usize),
    /// No more records in this page.
    EndOfPage,
}

impl LogRecord {
    /// Size of the header in bytes.
    pub const HEADER_SIZE: usize = LOG_RECORD_HEADER_SIZE;

    /// Creates a record mapping `key` to `value`.
    pub fn upsert(key: impl Into<String>, value: u32) -> Self {
        Self {
            flags: RecordFlags::empty(),
            key: key.into(),
            value,
        }
    }

    /// Creates a tombstone for `key`.
    pub fn tombstone(key: impl Into<String>) -> Self {
        Self {
            flags: RecordFlags::TOMBSTONE,
            key: key.into(),
            value: 0,
        }
    }

    /// Returns the encoded size of this record.
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + self.key.len()
    }

    /// Returns the flags as scan information.
    pub fn info(&self) -> RecordInfo {
        RecordInfo {
            tombstone: self.flags.contains(RecordFlags::TOMBSTONE),
            invalid: self.flags.contains(RecordFlags::INVALID),
        }
    }

    /// Serializes the record.
    ///
    /// Callers must have checked that the key fits in a `u16`.
    pub fn serialize(&self, buf: &mut impl BufMut) {
        let body = self.body();
        buf.put_u32(crc32fast::hash(&body));
        buf.put_slice(&body);
    }

    /// Serializes the record to a fresh buffer.
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.serialize(&mut buf);
        buf
    }

    /// Decodes the record at the start of `bytes`, which runs to the end of
    /// its page. `address` is only used for error reporting.
    pub fn decode(bytes: &[u8], address: Address) -> IndexResult<Decoded> {
        if bytes.len() < Self::HEADER_SIZE
            || bytes[..Self::HEADER_SIZE].iter().all(|b| *b == 0)
        {
            return Ok(Decoded::EndOfPage);
        }

        let mut buf = bytes;
        let checksum = buf.get_u32();
        let flags = RecordFlags::from_bits_truncate(buf.get_u8());
        let key_len = usize::from(buf.get_u16());
        let value = buf.get_u32();

        if key_len == 0 || key_len > buf.remaining() {
            return Err(IndexError::record_corrupted(
                address,
                format!("key length {key_len} with {} bytes left", buf.remaining()),
            ));
        }

        let total = Self::HEADER_SIZE + key_len;
        let computed = crc32fast::hash(&bytes[4..total]);
        if computed != checksum {
            return Err(IndexError::checksum_mismatch(address, checksum, computed));
        }

        let key = std::str::from_utf8(&buf[..key_len])
            .map_err(|e| IndexError::record_corrupted(address, format!("key is not UTF-8: {e}")))?
            .to_string();

        Ok(Decoded::Record(Self { flags, key, value }, total))
    }

    fn body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.encoded_len() - 4);
        body.put_u8(self.flags.bits());
        body.put_u16(self.key.len() as u16);
        body.put_u32(self.value);
        body.put_slice(self.key.as_bytes());
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_record(bytes: &[u8]) -> (LogRecord, usize) {
        match LogRecord::decode(bytes, 0).unwrap() {
            Decoded::Record(record, len) => (record, len),
            Decoded::EndOfPage => panic!("expected a record"),
        }
    }

    #[test]
    fn test_record_layout() {
        let record = LogRecord::upsert("orders", 1024);
        let bytes = record.to_bytes();

        assert_eq!(bytes.len(), LogRecord::HEADER_SIZE + 6);
        assert_eq!(bytes[4], 0); // flags
        assert_eq!(&bytes[5..7], &6u16.to_be_bytes());
        assert_eq!(&bytes[7..11], &1024u32.to_be_bytes());
        assert_eq!(&bytes[11..], b"orders");
    }

    #[test]
    fn test_decode_followed_by_more_data() {
        let mut page = vec![0u8; 64];
        let first = LogRecord::upsert("a", 1).to_bytes();
        let second = LogRecord::tombstone("a").to_bytes();
        page[..first.len()].copy_from_slice(&first);
        page[first.len()..first.len() + second.len()].copy_from_slice(&second);

        let (record, len) = decode_record(&page);
        assert_eq!(record.value, 1);
        assert!(record.info().is_live());

        let (record, _) = decode_record(&page[len..]);
        assert!(record.info().tombstone);
        assert_eq!(record.key, "a");
    }

    #[test]
    fn test_zeroed_space_ends_page() {
        let page = vec![0u8; 32];
        assert_eq!(LogRecord::decode(&page, 0).unwrap(), Decoded::EndOfPage);
        assert_eq!(LogRecord::decode(&page[..5], 0).unwrap(), Decoded::EndOfPage);
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = LogRecord::upsert("stream-1", 7).to_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let err = LogRecord::decode(&bytes, 4096).unwrap_err();
        assert!(matches!(
            err,
            IndexError::ChecksumMismatch { address: 4096, .. }
        ));
    }

    #[test]
    fn test_truncated_key() {
        let bytes = LogRecord::upsert("stream-1", 7).to_bytes();
        let err = LogRecord::decode(&bytes[..bytes.len() - 2], 0).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_invalid_flag_reported() {
        let mut record = LogRecord::upsert("x", 3);
        record.flags |= RecordFlags::INVALID;

        let (decoded, _) = decode_record(&record.to_bytes());
        assert!(decoded.info().invalid);
        assert!(!decoded.info().is_live());
    }
}
