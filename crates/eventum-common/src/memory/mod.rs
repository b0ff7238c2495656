//! Memory reuse utilities for eventum.
//!
//! - **Object pools**: bounded recycling of expensive instances with
//!   RAII leases and cooperative disposal

mod pool;

pub use pool::{ObjectPool, PoolLease};
