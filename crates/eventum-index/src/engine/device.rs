//! File-backed log device.
//!
//! Positional reads and writes over a single file, serialized by a mutex.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::IndexResult;

/// A log file on disk.
pub struct LogDevice {
    /// Path to the file.
    path: PathBuf,
    /// File handle.
    file: Mutex<File>,
}

impl LogDevice {
    /// Opens the file at `path`, creating it and its directory if missing.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the path to the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file length in bytes.
    pub fn len(&self) -> IndexResult<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    /// Reads into `buf` starting at `offset`.
    ///
    /// Bytes past the end of the file are left untouched. Returns the number
    /// of bytes read.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> IndexResult<usize> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut read = 0;
        while read < buf.len() {
            match file.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(read)
    }

    /// Writes all of `data` at `offset`.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> IndexResult<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    /// Syncs the file to disk.
    pub fn sync(&self) -> IndexResult<()> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }

    /// Cuts the file to `len` bytes.
    pub fn truncate(&self, len: u64) -> IndexResult<()> {
        let file = self.file.lock();
        file.set_len(len)?;
        Ok(())
    }
}

impl std::fmt::Debug for LogDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogDevice")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let device = LogDevice::open(tmp.path().join("nested/streams.log")).unwrap();

        device.write_at(100, b"hello").unwrap();
        assert_eq!(device.len().unwrap(), 105);

        let mut buf = [0u8; 5];
        assert_eq!(device.read_at(100, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_short_read_past_end() {
        let tmp = TempDir::new().unwrap();
        let device = LogDevice::open(tmp.path().join("streams.log")).unwrap();
        device.write_at(0, b"abc").unwrap();

        let mut buf = [7u8; 8];
        assert_eq!(device.read_at(1, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"bc");
        assert_eq!(buf[2], 7);
    }

    #[test]
    fn test_truncate_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("streams.log");

        let device = LogDevice::open(&path).unwrap();
        device.write_at(0, &[1u8; 64]).unwrap();
        device.truncate(16).unwrap();
        device.sync().unwrap();
        drop(device);

        let device = LogDevice::open(&path).unwrap();
        assert_eq!(device.len().unwrap(), 16);
        assert_eq!(device.path(), path.as_path());
    }
}
