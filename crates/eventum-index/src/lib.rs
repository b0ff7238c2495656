//! # eventum-index
//!
//! Persistent name index for eventum.
//!
//! This crate maps stream and event type names to values from a strictly
//! increasing `u32` sequence, and keeps that mapping on disk:
//! - A log-structured key/value engine with checkpoints and crash recovery
//! - Bounded reader session pools for parallel lookups
//! - Debounced background checkpoints
//! - Reconciliation against an authoritative source on startup
//!
//! # Architecture
//!
//! [`NameIndexPersistence`] sits on a [`engine::LogStore`]. Entries are
//! appended to a paged log; the newest pages stay in memory and older ones
//! are read back from disk on demand. On startup the index recovers its
//! newest entry from the log and then reconciles with a [`NameLookup`]:
//!
//! ```text
//!   empty index           -> catch up from the source's first value
//!   newest entry in source -> catch up from the newest entry
//!   newest entry missing   -> truncate back to the source's last value
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use eventum_index::{InMemoryNameLookup, NameIndexConfig, NameIndexPersistence};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> eventum_index::IndexResult<()> {
//! let index = NameIndexPersistence::open(NameIndexConfig::new("streams", "/var/lib/index"))?;
//! let source = InMemoryNameLookup::from_entries([(1024, "orders")]);
//! index.init(&source, &CancellationToken::new()).await?;
//!
//! index.add("payments", 1026)?;
//! assert_eq!(index.lookup_value("payments")?, 1026);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;

/// Log-structured key/value engine.
pub mod engine;

/// Authoritative name sources.
pub mod lookup;

/// Persistent name index.
pub mod persistence;

// Re-exports for convenience
pub use config::{EngineConfig, ExistenceFilterConfig, NameIndexConfig};
pub use error::{IndexError, IndexResult};
pub use lookup::{InMemoryNameLookup, NameLookup};
pub use persistence::{BackwardScan, NameIndexPersistence, NameScan};
