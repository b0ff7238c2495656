//! Engine sessions.
//!
//! Callers never touch the store directly. Appends go through a
//! [`WriterSession`], deletes and checkpoints through a
//! [`MaintenanceSession`], and point reads through [`ReaderSession`]s, which
//! are cheap to pool. Each session is used by one thread at a time.

use std::sync::Arc;

use tracing::warn;

use super::checkpoint::CheckpointMetadata;
use super::status::Status;
use super::store::{LogStore, Lookup};
use super::Address;
use crate::error::IndexResult;

/// Session that appends upserts.
#[derive(Debug)]
pub struct WriterSession {
    store: Arc<LogStore>,
}

impl WriterSession {
    /// Creates a writer over `store`.
    pub fn new(store: Arc<LogStore>) -> Self {
        Self { store }
    }

    /// Maps `key` to `value`.
    pub fn upsert(&mut self, key: &str, value: u32) -> IndexResult<Status> {
        self.store.upsert(key, value)
    }
}

/// Session that deletes keys and takes checkpoints.
#[derive(Debug)]
pub struct MaintenanceSession {
    store: Arc<LogStore>,
    completed: usize,
}

impl MaintenanceSession {
    /// Creates a maintenance session over `store`.
    pub fn new(store: Arc<LogStore>) -> Self {
        Self {
            store,
            completed: 0,
        }
    }

    /// Deletes `key`. Returns `NotFound` if it has no live record.
    pub fn delete(&mut self, key: &str) -> IndexResult<Status> {
        let status = self.store.delete(key)?;
        self.completed += 1;
        Ok(status)
    }

    /// Waits for outstanding operations.
    ///
    /// Deletes complete when they are issued, so there is never anything to
    /// wait for; returns the number of operations completed since the last
    /// call.
    pub fn complete_pending(&mut self) -> IndexResult<usize> {
        Ok(std::mem::take(&mut self.completed))
    }

    /// Makes all appended records durable.
    pub fn checkpoint(&mut self) -> IndexResult<CheckpointMetadata> {
        self.store.checkpoint()
    }
}

/// Output slot reused by a [`ReaderSession`] across reads.
#[derive(Debug, Default)]
pub struct ReadContext {
    status: Status,
    value: Option<u32>,
    pending: Option<(String, Address)>,
}

impl ReadContext {
    /// Returns the status of the last read.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns the value found by the last read.
    pub fn value(&self) -> Option<u32> {
        self.value
    }

    fn set(&mut self, status: Status, value: Option<u32>) {
        self.status = status;
        self.value = value;
    }
}

/// Session that performs point reads.
#[derive(Debug)]
pub struct ReaderSession {
    store: Arc<LogStore>,
    context: ReadContext,
}

impl ReaderSession {
    /// Creates a reader over `store`.
    pub fn new(store: Arc<LogStore>) -> Self {
        Self {
            store,
            context: ReadContext::default(),
        }
    }

    /// Reads `key`.
    ///
    /// Records in memory complete immediately. A record that has left memory
    /// returns `Pending`; call [`ReaderSession::complete_pending`] to read it
    /// from the device. The result is left in [`ReaderSession::context`].
    pub fn read(&mut self, key: &str) -> Status {
        self.context.pending = None;
        match self.store.lookup(key) {
            Ok(Lookup::Found(value)) => self.context.set(Status::Ok, Some(value)),
            Ok(Lookup::NotFound) => self.context.set(Status::NotFound, None),
            Ok(Lookup::OnDisk(address)) => {
                self.context.set(Status::Pending, None);
                self.context.pending = Some((key.to_string(), address));
            }
            Err(e) => {
                warn!(store = %self.store.name(), key, error = %e, "read failed");
                self.context.set(Status::Error, None);
            }
        }
        self.context.status
    }

    /// Completes a pending read from the device.
    pub fn complete_pending(&mut self) -> IndexResult<()> {
        if let Some((key, address)) = self.context.pending.take() {
            match self.store.read_from_device(&key, address)? {
                Some(value) => self.context.set(Status::Ok, Some(value)),
                None => self.context.set(Status::NotFound, None),
            }
        }
        Ok(())
    }

    /// Returns the output of the last read.
    pub fn context(&self) -> &ReadContext {
        &self.context
    }
}
