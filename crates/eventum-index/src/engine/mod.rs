//! Log-structured key/value engine.
//!
//! A small hybrid log in the style of FASTER: an append-only paged log with
//! an in-memory hash index, a tail window of pages kept in memory, fold-over
//! checkpoints and replay-based recovery. Reads of records that have left
//! memory report [`Status::Pending`] and are completed from disk on request.
//!
//! # Record Format
//!
//! ```text
//! +--------------+-----------+-------------+-----------+-------------------+
//! | checksum (4) | flags (1) | key_len (2) | value (4) | key (key_len)     |
//! +--------------+-----------+-------------+-----------+-------------------+
//! ```

/// Byte offset of a record in the log.
pub type Address = u64;

pub mod checkpoint;
pub mod device;
pub mod record;
pub mod session;
pub mod status;
pub mod store;

pub use checkpoint::CheckpointMetadata;
pub use record::{LogRecord, RecordFlags};
pub use session::{MaintenanceSession, ReadContext, ReaderSession, WriterSession};
pub use status::{RecordInfo, Status};
pub use store::{LogScanner, LogStore, MemoryUsage, RecoveryOutcome, ScanRecord};
