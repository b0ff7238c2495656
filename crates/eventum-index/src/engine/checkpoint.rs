//! Checkpoint metadata.
//!
//! A checkpoint records how far the log is durable. The metadata file is
//! replaced atomically: it is written to a temporary file, synced, then
//! renamed over the previous checkpoint.
//!
//! ```text
//! +-----------+-------------+--------------+----------+---------+
//! | magic (4) | version (4) | sequence (8) | tail (8) | crc (4) |
//! +-----------+-------------+--------------+----------+---------+
//! ```

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut};

use eventum_common::constants::{CHECKPOINT_MAGIC, CHECKPOINT_VERSION};

use super::Address;
use crate::error::{IndexError, IndexResult};

/// Durable state captured by a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointMetadata {
    /// Increases by one per checkpoint.
    pub sequence: u64,
    /// Log address up to which every record is durable.
    pub tail: Address,
}

impl CheckpointMetadata {
    /// Encoded size in bytes.
    pub const SIZE: usize = 28;

    /// Serializes the metadata.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut cursor = &mut buf[..];
        cursor.put_u32(CHECKPOINT_MAGIC);
        cursor.put_u32(CHECKPOINT_VERSION);
        cursor.put_u64(self.sequence);
        cursor.put_u64(self.tail);
        let crc = crc32fast::hash(&buf[..Self::SIZE - 4]);
        buf[Self::SIZE - 4..].copy_from_slice(&crc.to_be_bytes());
        buf
    }

    /// Deserializes and validates metadata.
    pub fn from_bytes(bytes: &[u8]) -> IndexResult<Self> {
        if bytes.len() != Self::SIZE {
            return Err(IndexError::checkpoint_corrupted(format!(
                "expected {} bytes, found {}",
                Self::SIZE,
                bytes.len()
            )));
        }

        let mut buf = bytes;
        let magic = buf.get_u32();
        if magic != CHECKPOINT_MAGIC {
            return Err(IndexError::checkpoint_corrupted(format!(
                "invalid magic {magic:#010x}"
            )));
        }
        let version = buf.get_u32();
        if version != CHECKPOINT_VERSION {
            return Err(IndexError::checkpoint_corrupted(format!(
                "unsupported version {version}"
            )));
        }
        let sequence = buf.get_u64();
        let tail = buf.get_u64();
        let crc = buf.get_u32();

        let computed = crc32fast::hash(&bytes[..Self::SIZE - 4]);
        if crc != computed {
            return Err(IndexError::checkpoint_corrupted(format!(
                "checksum mismatch: expected {crc:#010x}, computed {computed:#010x}"
            )));
        }

        Ok(Self { sequence, tail })
    }

    /// Atomically replaces the checkpoint at `path`.
    pub fn write(&self, path: &Path) -> IndexResult<()> {
        let tmp = temp_path(path);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&self.to_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Reads the checkpoint at `path`. Returns `None` if there is none.
    pub fn read(path: &Path) -> IndexResult<Option<Self>> {
        match fs::read(path) {
            Ok(bytes) => Self::from_bytes(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a temporary file left by an interrupted write.
    pub fn remove_stale(path: &Path) -> IndexResult<bool> {
        match fs::remove_file(temp_path(path)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("streams.checkpoint");

        assert_eq!(CheckpointMetadata::read(&path).unwrap(), None);

        let meta = CheckpointMetadata {
            sequence: 3,
            tail: 8192 + 40,
        };
        meta.write(&path).unwrap();
        assert_eq!(CheckpointMetadata::read(&path).unwrap(), Some(meta));

        // Replacing keeps a single file
        let newer = CheckpointMetadata {
            sequence: 4,
            tail: 9000,
        };
        newer.write(&path).unwrap();
        assert_eq!(CheckpointMetadata::read(&path).unwrap(), Some(newer));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_corruption_detected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("streams.checkpoint");

        let mut bytes = CheckpointMetadata {
            sequence: 1,
            tail: 100,
        }
        .to_bytes();
        bytes[12] ^= 0x01;
        fs::write(&path, bytes).unwrap();

        let err = CheckpointMetadata::read(&path).unwrap_err();
        assert!(err.is_corruption());

        fs::write(&path, b"short").unwrap();
        assert!(CheckpointMetadata::read(&path).is_err());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = CheckpointMetadata {
            sequence: 1,
            tail: 100,
        }
        .to_bytes();
        bytes[0] = 0;
        let err = CheckpointMetadata::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_remove_stale() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("streams.checkpoint");

        assert!(!CheckpointMetadata::remove_stale(&path).unwrap());
        fs::write(temp_path(&path), b"partial").unwrap();
        assert!(CheckpointMetadata::remove_stale(&path).unwrap());
    }
}
