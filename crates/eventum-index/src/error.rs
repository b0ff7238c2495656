//! Name index error types.
//!
//! This module defines all error types for the storage engine and the
//! persistent name index built on it.

use std::io;
use thiserror::Error;

use eventum_common::error::{ErrorCode, EventumError};

use crate::engine::{Address, Status};

/// Result type for name index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur during name index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// I/O error on the log device or checkpoint file.
    #[error("index I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// A log record failed to decode.
    #[error("log record corrupted at address {address}: {reason}")]
    RecordCorrupted { address: Address, reason: String },

    /// A log record checksum did not match its contents.
    #[error("log record checksum mismatch at address {address}: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        address: Address,
        expected: u32,
        computed: u32,
    },

    /// The checkpoint metadata file is unreadable.
    #[error("checkpoint corrupted: {reason}")]
    CheckpointCorrupted { reason: String },

    /// A key does not fit in a single log page.
    #[error("log record too large: {size} bytes exceeds maximum {max} bytes")]
    RecordTooLarge { size: usize, max: usize },

    /// An add broke the value sequence.
    #[error("index '{index}': value {value} is out of order, expected {expected} after {last}")]
    OutOfOrder {
        index: String,
        value: u32,
        last: u32,
        expected: u32,
    },

    /// The index and its source map the same value to different names.
    #[error("index '{index}': value {value} is '{index_name}' in the index but '{source_name}' in the source")]
    NameMismatch {
        index: String,
        value: u32,
        index_name: String,
        source_name: String,
    },

    /// The source has no name for a value it claims to contain.
    #[error("index '{index}': source has no name for value {value}")]
    SourceMissingValue { index: String, value: u32 },

    /// The source's own view of its contents is contradictory.
    #[error("index '{index}': source is inconsistent: {reason}")]
    SourceInconsistent { index: String, reason: String },

    /// The engine returned a status the caller cannot handle.
    #[error("index '{index}': unexpected status {status:?} during {operation}")]
    UnexpectedStatus {
        index: String,
        operation: &'static str,
        status: Status,
    },

    /// An argument was rejected.
    #[error("index '{index}': invalid argument: {reason}")]
    InvalidArgument { index: String, reason: String },

    /// The operation was cancelled.
    #[error("index operation cancelled")]
    Cancelled,

    /// The index has been disposed.
    #[error("index '{index}' has been disposed")]
    Disposed { index: String },

    /// Configuration error.
    #[error("index configuration error: {reason}")]
    Config { reason: String },

    /// Error from a shared primitive.
    #[error(transparent)]
    Common(#[from] EventumError),
}

impl IndexError {
    /// Creates a record corrupted error.
    pub fn record_corrupted(address: Address, reason: impl Into<String>) -> Self {
        Self::RecordCorrupted {
            address,
            reason: reason.into(),
        }
    }

    /// Creates a checksum mismatch error.
    pub fn checksum_mismatch(address: Address, expected: u32, computed: u32) -> Self {
        Self::ChecksumMismatch {
            address,
            expected,
            computed,
        }
    }

    /// Creates a checkpoint corrupted error.
    pub fn checkpoint_corrupted(reason: impl Into<String>) -> Self {
        Self::CheckpointCorrupted {
            reason: reason.into(),
        }
    }

    /// Creates an unexpected status error.
    pub fn unexpected_status(index: &str, operation: &'static str, status: Status) -> Self {
        Self::UnexpectedStatus {
            index: index.to_string(),
            operation,
            status,
        }
    }

    /// Creates a config error.
    pub fn config_error(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Returns the stable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io { .. } => ErrorCode::Io,
            Self::RecordCorrupted { .. }
            | Self::ChecksumMismatch { .. }
            | Self::CheckpointCorrupted { .. } => ErrorCode::Corruption,
            Self::RecordTooLarge { .. } | Self::InvalidArgument { .. } | Self::Config { .. } => {
                ErrorCode::InvalidArgument
            }
            Self::OutOfOrder { .. } => ErrorCode::OutOfOrder,
            Self::NameMismatch { .. }
            | Self::SourceMissingValue { .. }
            | Self::SourceInconsistent { .. } => ErrorCode::Inconsistent,
            Self::UnexpectedStatus { .. } => ErrorCode::UnexpectedStatus,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Disposed { .. } => ErrorCode::Disposed,
            Self::Common(err) => err.code(),
        }
    }

    /// Returns true if the index can no longer be trusted after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::OutOfOrder { .. }
                | Self::NameMismatch { .. }
                | Self::SourceMissingValue { .. }
                | Self::SourceInconsistent { .. }
                | Self::UnexpectedStatus { .. }
        ) || self.is_corruption()
    }

    /// Returns true if this is a corruption error.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::RecordCorrupted { .. }
                | Self::ChecksumMismatch { .. }
                | Self::CheckpointCorrupted { .. }
        )
    }
}
