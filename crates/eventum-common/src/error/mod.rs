//! Error handling for eventum.
//!
//! This module provides the shared error type and result alias used
//! across all eventum components.

mod kind;

pub use kind::{ErrorCode, EventumError};

/// Result type alias for eventum operations.
pub type EventumResult<T> = std::result::Result<T, EventumError>;
