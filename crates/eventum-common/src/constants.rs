//! System-wide constants for eventum.
//!
//! Defaults shared by the cache, pool and name index crates.

// =============================================================================
// Log Engine Constants
// =============================================================================

/// Default log page size as a power of two (4 KB pages).
pub const DEFAULT_PAGE_SIZE_BITS: u32 = 12;

/// Smallest supported page size as a power of two (512 bytes).
pub const MIN_PAGE_SIZE_BITS: u32 = 9;

/// Largest supported page size as a power of two (1 MB).
pub const MAX_PAGE_SIZE_BITS: u32 = 20;

/// Default number of log pages kept in memory (32 KB with 4 KB pages).
pub const DEFAULT_MEMORY_PAGES: usize = 8;

/// Size of a log record header in bytes.
///
/// Contains: checksum (4), flags (1), key_len (2), value (4) = 11 bytes.
pub const LOG_RECORD_HEADER_SIZE: usize = 11;

/// Magic number for the checkpoint metadata file.
pub const CHECKPOINT_MAGIC: u32 = 0x4556_434B; // "EVCK" in ASCII

/// Version number for the checkpoint metadata format.
pub const CHECKPOINT_VERSION: u32 = 1;

// =============================================================================
// Name Index Constants
// =============================================================================

/// Default first value handed out by a name index. Values below it are reserved.
pub const DEFAULT_FIRST_VALUE: u32 = 1024;

/// Default step between consecutive name index values.
pub const DEFAULT_VALUE_INTERVAL: u32 = 2;

/// Default number of reader sessions created up front.
pub const DEFAULT_INITIAL_READER_COUNT: usize = 2;

/// Default ceiling on concurrently leased reader sessions.
pub const DEFAULT_MAX_READER_COUNT: usize = 64;

/// Default number of entries held by the optional read cache.
pub const DEFAULT_READ_CACHE_CAPACITY: u64 = 32 * 1024;

/// Default checkpoint debounce interval in milliseconds.
pub const DEFAULT_CHECKPOINT_INTERVAL_MS: u64 = 60_000;

// =============================================================================
// Cache Constants
// =============================================================================

/// Default capacity for caches when not specified.
pub const DEFAULT_CACHE_CAPACITY: u64 = 1024;

/// Default expected item count for bloom filters.
pub const DEFAULT_BLOOM_EXPECTED_ITEMS: usize = 1_000_000;

/// Default target false positive rate for bloom filters.
pub const DEFAULT_BLOOM_FALSE_POSITIVE_RATE: f64 = 0.01;
