//! # eventum-common
//!
//! Shared primitives for eventum.
//!
//! This crate provides the building blocks the cache and name index crates
//! are assembled from:
//!
//! - **Errors**: Unified error handling with `EventumError`
//! - **Constants**: System-wide defaults
//! - **Memory**: Bounded object pool with RAII leases
//! - **Collections**: Bounded queue and pairing heap
//! - **Timer**: Pairing-heap timer scheduler and trigger-then-flush debouncer
//!
//! ## Example
//!
//! ```rust
//! use eventum_common::collections::PairingHeap;
//! use eventum_common::error::EventumResult;
//! use eventum_common::memory::ObjectPool;
//!
//! fn example() -> EventumResult<()> {
//!     let pool = ObjectPool::new("scratch", 0, 4, || Vec::<u8>::new())?;
//!     let _buf = pool.rent()?;
//!
//!     let mut heap = PairingHeap::new();
//!     heap.add(3);
//!     heap.add(1);
//!     assert_eq!(heap.delete_min(), Some(1));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod collections;
pub mod constants;
pub mod error;
pub mod memory;
pub mod timer;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use error::{ErrorCode, EventumError, EventumResult};
