//! Shared error types.
//!
//! Provides the error enum used by the pooling, scheduling and collection
//! primitives, and the stable error codes higher crates map onto.

use std::fmt;
use thiserror::Error;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Invalid argument provided.
    InvalidArgument = 0x0003,
    /// Operation was cancelled.
    Cancelled = 0x0005,
    /// An internal invariant was violated.
    InvariantViolation = 0x0006,

    // I/O errors (0x0100 - 0x01FF)
    /// General I/O error.
    Io = 0x0100,
    /// Data corruption detected.
    Corruption = 0x0104,

    // Pool errors (0x0200 - 0x02FF)
    /// Object pool reached its maximum number of live objects.
    PoolMaxLimitReached = 0x0200,
    /// Object pool is being disposed.
    PoolDisposing = 0x0201,

    // Index errors (0x0400 - 0x04FF)
    /// Entry added out of sequence.
    OutOfOrder = 0x0400,
    /// Index disagrees with its source of truth.
    Inconsistent = 0x0401,
    /// Storage engine returned an unexpected status.
    UnexpectedStatus = 0x0402,
    /// Index was used after being disposed.
    Disposed = 0x0403,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "I/O",
            0x02 => "Pool",
            0x04 => "Index",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The shared error type for eventum primitives.
///
/// # Example
///
/// ```rust
/// use eventum_common::error::{EventumError, EventumResult};
///
/// fn lease(live: usize, max: usize) -> EventumResult<()> {
///     if live >= max {
///         return Err(EventumError::PoolMaxLimitReached {
///             pool: "readers".to_string(),
///             max_count: max,
///         });
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Error)]
pub enum EventumError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    /// Operation was cancelled.
    #[error("operation was cancelled")]
    Cancelled,

    /// An internal invariant was violated.
    #[error("invariant violated: {message}")]
    InvariantViolation {
        /// Description of the violation.
        message: String,
    },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Data corruption detected.
    #[error("data corruption detected: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    // ==========================================================================
    // Pool Errors
    // ==========================================================================
    /// The pool already has `max_count` live objects.
    #[error("object pool '{pool}' reached its limit of {max_count} objects")]
    PoolMaxLimitReached {
        /// Pool name.
        pool: String,
        /// Configured ceiling.
        max_count: usize,
    },

    /// The pool is being disposed and hands out no more objects.
    #[error("object pool '{pool}' is being disposed")]
    PoolDisposing {
        /// Pool name.
        pool: String,
    },

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },
}

impl EventumError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::InvariantViolation { .. } => ErrorCode::InvariantViolation,
            Self::Io { .. } => ErrorCode::Io,
            Self::Corruption { .. } => ErrorCode::Corruption,
            Self::PoolMaxLimitReached { .. } => ErrorCode::PoolMaxLimitReached,
            Self::PoolDisposing { .. } => ErrorCode::PoolDisposing,
            Self::InvalidConfig { .. } => ErrorCode::InvalidArgument,
        }
    }

    /// Returns true if backing off or raising limits can make the
    /// operation succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolMaxLimitReached { .. })
    }

    /// Returns true if this error indicates a bug or broken invariant.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Internal { .. } | Self::InvariantViolation { .. } | Self::Corruption { .. }
        )
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invariant violation error.
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    #[must_use]
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
