//! Log-structured key/value store.
//!
//! Records are appended to a paged log. The newest `memory_pages` pages stay
//! in memory; older pages are written to the log device when they leave the
//! window. A hash index maps each live key to the address of its latest
//! record.
//!
//! # Addresses
//!
//! An address is a byte offset into the log. Page `n` covers addresses
//! `n * page_size .. (n + 1) * page_size`. A record never straddles a page:
//! if it does not fit in the rest of the current page, the remainder stays
//! zeroed and the record starts the next page.
//!
//! # Durability
//!
//! A checkpoint writes every dirty page, syncs the device and then records
//! the tail in the checkpoint file. Recovery replays the log up to that tail
//! and discards everything after it.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::checkpoint::CheckpointMetadata;
use super::device::LogDevice;
use super::record::{Decoded, LogRecord};
use super::status::{RecordInfo, Status};
use super::Address;
use crate::config::EngineConfig;
use crate::error::{IndexError, IndexResult};

/// How a store came up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// No checkpoint was found; the log starts empty.
    StartedFresh,
    /// The log was replayed up to a checkpoint.
    Recovered {
        /// Sequence number of the checkpoint.
        sequence: u64,
        /// Durable tail.
        tail: Address,
        /// Live keys after replay.
        keys: usize,
    },
}

/// Approximate memory held by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryUsage {
    /// Hash index entries.
    pub index_bytes: u64,
    /// In-memory log pages.
    pub page_bytes: u64,
}

impl MemoryUsage {
    /// Returns the total in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.index_bytes + self.page_bytes
    }

    /// Returns the total in MiB.
    pub fn total_mib(&self) -> f64 {
        self.total_bytes() as f64 / (1024.0 * 1024.0)
    }
}

/// Outcome of an in-memory lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    /// Latest record is in memory.
    Found(u32),
    /// Key has no live record.
    NotFound,
    /// Latest record is only on the device.
    OnDisk(Address),
}

/// A record produced by [`LogScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    /// Address of the record.
    pub address: Address,
    /// Record key.
    pub key: String,
    /// Record value.
    pub value: u32,
    /// Record flags.
    pub info: RecordInfo,
}

struct Page {
    number: u64,
    data: Box<[u8]>,
    dirty: bool,
}

struct StoreState {
    index: HashMap<String, Address>,
    pages: VecDeque<Page>,
    tail: Address,
    checkpoint: Option<CheckpointMetadata>,
}

/// A log-structured store of `String -> u32` mappings.
pub struct LogStore {
    /// Store name, used for file names and logs.
    name: String,
    /// Engine settings.
    config: EngineConfig,
    /// Page size in bytes.
    page_size: u64,
    /// Log device.
    device: LogDevice,
    /// Checkpoint metadata file.
    checkpoint_path: PathBuf,
    /// Index, memory window and tail.
    state: RwLock<StoreState>,
    /// Serializes checkpoints.
    checkpoint_lock: Mutex<()>,
}

impl LogStore {
    /// Opens the store `name` in `dir`, recovering from the last checkpoint.
    ///
    /// Creates `{name}.log` if it does not exist. Bytes past the checkpointed
    /// tail are discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the checkpoint is
    /// corrupt, or the log cannot be read or replayed.
    pub fn open(
        name: impl Into<String>,
        dir: &Path,
        config: EngineConfig,
    ) -> IndexResult<(Self, RecoveryOutcome)> {
        config.validate()?;
        let name = name.into();
        let device = LogDevice::open(dir.join(format!("{name}.log")))?;
        let checkpoint_path = dir.join(format!("{name}.checkpoint"));

        if CheckpointMetadata::remove_stale(&checkpoint_path)? {
            warn!(store = %name, "removed interrupted checkpoint");
        }

        let store = Self {
            page_size: config.page_size(),
            name,
            config,
            device,
            checkpoint_path,
            state: RwLock::new(StoreState {
                index: HashMap::new(),
                pages: VecDeque::new(),
                tail: 0,
                checkpoint: None,
            }),
            checkpoint_lock: Mutex::new(()),
        };

        let outcome = match CheckpointMetadata::read(&store.checkpoint_path)? {
            Some(meta) => store.recover(meta)?,
            None => {
                let len = store.device.len()?;
                if len > 0 {
                    warn!(
                        store = %store.name,
                        bytes = len,
                        "no checkpoint found, discarding log contents"
                    );
                    store.device.truncate(0)?;
                }
                RecoveryOutcome::StartedFresh
            }
        };

        Ok((store, outcome))
    }

    fn recover(&self, meta: CheckpointMetadata) -> IndexResult<RecoveryOutcome> {
        let len = self.device.len()?;
        if len < meta.tail {
            return Err(IndexError::checkpoint_corrupted(format!(
                "log holds {len} bytes but checkpoint tail is {}",
                meta.tail
            )));
        }
        if len > meta.tail {
            info!(
                store = %self.name,
                discarded = len - meta.tail,
                "discarding log records after checkpoint"
            );
            self.device.truncate(meta.tail)?;
        }

        {
            let mut state = self.state.write();
            state.tail = meta.tail;
            state.checkpoint = Some(meta);
        }

        let mut index = HashMap::new();
        for record in self.scan(0, meta.tail) {
            let record = record?;
            if record.info.invalid {
                continue;
            }
            if record.info.tombstone {
                index.remove(&record.key);
            } else {
                index.insert(record.key, record.address);
            }
        }
        let keys = index.len();

        let mut state = self.state.write();
        state.index = index;
        if meta.tail % self.page_size != 0 {
            let number = meta.tail / self.page_size;
            let data = self.read_page_from_device(number)?;
            state.pages.push_back(Page {
                number,
                data,
                dirty: false,
            });
        }

        Ok(RecoveryOutcome::Recovered {
            sequence: meta.sequence,
            tail: meta.tail,
            keys,
        })
    }

    /// Returns the store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Returns the first address of the log.
    pub fn begin_address(&self) -> Address {
        0
    }

    /// Returns the address the next record will be written at or after.
    pub fn tail_address(&self) -> Address {
        self.state.read().tail
    }

    /// Returns the lowest address held in memory.
    pub fn head_address(&self) -> Address {
        let state = self.state.read();
        self.head(&state)
    }

    /// Returns the number of live keys.
    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    /// Returns true if there are no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the last completed checkpoint.
    pub fn last_checkpoint(&self) -> Option<CheckpointMetadata> {
        self.state.read().checkpoint
    }

    /// Returns true if records were appended since the last checkpoint.
    pub fn has_unsaved_changes(&self) -> bool {
        let state = self.state.read();
        state.checkpoint.map_or(0, |c| c.tail) != state.tail
    }

    /// Returns approximate memory usage.
    pub fn memory_usage(&self) -> MemoryUsage {
        let state = self.state.read();
        let entry_overhead = (std::mem::size_of::<String>() + std::mem::size_of::<Address>()) as u64;
        let index_bytes = state
            .index
            .keys()
            .map(|k| k.capacity() as u64 + entry_overhead)
            .sum();
        MemoryUsage {
            index_bytes,
            page_bytes: state.pages.len() as u64 * self.page_size,
        }
    }

    /// Appends a record mapping `key` to `value`.
    pub(crate) fn upsert(&self, key: &str, value: u32) -> IndexResult<Status> {
        let record = LogRecord::upsert(key, value);
        let mut state = self.state.write();
        let address = self.append(&mut state, &record)?;
        state.index.insert(record.key, address);
        Ok(Status::Ok)
    }

    /// Appends a tombstone for `key` if it has a live record.
    pub(crate) fn delete(&self, key: &str) -> IndexResult<Status> {
        let mut state = self.state.write();
        if !state.index.contains_key(key) {
            return Ok(Status::NotFound);
        }
        self.append(&mut state, &LogRecord::tombstone(key))?;
        state.index.remove(key);
        Ok(Status::Ok)
    }

    /// Looks up `key` without touching the device.
    pub(crate) fn lookup(&self, key: &str) -> IndexResult<Lookup> {
        let state = self.state.read();
        let Some(&address) = state.index.get(key) else {
            return Ok(Lookup::NotFound);
        };
        if address < self.head(&state) {
            return Ok(Lookup::OnDisk(address));
        }

        let number = address / self.page_size;
        let offset = (address % self.page_size) as usize;
        let page = state
            .pages
            .iter()
            .find(|p| p.number == number)
            .ok_or_else(|| IndexError::record_corrupted(address, "page missing from memory"))?;
        match self.decode_key(&page.data[offset..], address, key)? {
            Some(value) => Ok(Lookup::Found(value)),
            None => Ok(Lookup::NotFound),
        }
    }

    /// Reads the record for `key` at `address` from the device.
    pub(crate) fn read_from_device(&self, key: &str, address: Address) -> IndexResult<Option<u32>> {
        let offset = address % self.page_size;
        let max_len = LogRecord::HEADER_SIZE + self.config.max_key_len();
        let len = (self.page_size - offset).min(max_len as u64) as usize;
        let mut buf = vec![0u8; len];
        self.device.read_at(address, &mut buf)?;
        self.decode_key(&buf, address, key)
    }

    /// Returns a forward scan over records in `[begin, end)`.
    ///
    /// `begin` must be a record or page boundary. `end` is clamped to the
    /// current tail.
    pub fn scan(&self, begin: Address, end: Address) -> LogScanner<'_> {
        LogScanner {
            store: self,
            cursor: begin,
            end: end.min(self.tail_address()),
            page: None,
        }
    }

    /// Makes everything appended so far durable.
    pub fn checkpoint(&self) -> IndexResult<CheckpointMetadata> {
        let _guard = self.checkpoint_lock.lock();

        let (tail, sequence) = {
            let mut state = self.state.write();
            let tail = state.tail;
            for page in state.pages.iter_mut().filter(|p| p.dirty) {
                // The tail page is only written up to the tail.
                let start = page.number * self.page_size;
                let len = tail.saturating_sub(start).min(self.page_size) as usize;
                self.device.write_at(start, &page.data[..len])?;
                page.dirty = false;
            }
            let sequence = state.checkpoint.map_or(1, |c| c.sequence + 1);
            (tail, sequence)
        };

        if self.config.sync_on_checkpoint {
            self.device.sync()?;
        }

        let meta = CheckpointMetadata { sequence, tail };
        meta.write(&self.checkpoint_path)?;
        self.state.write().checkpoint = Some(meta);

        debug!(store = %self.name, sequence, tail, "checkpoint written");
        Ok(meta)
    }

    fn head(&self, state: &StoreState) -> Address {
        state
            .pages
            .front()
            .map_or(state.tail, |p| p.number * self.page_size)
    }

    fn append(&self, state: &mut StoreState, record: &LogRecord) -> IndexResult<Address> {
        if record.key.is_empty() {
            return Err(IndexError::InvalidArgument {
                index: self.name.clone(),
                reason: "keys must not be empty".to_string(),
            });
        }
        let max_key_len = self.config.max_key_len();
        if record.key.len() > max_key_len {
            return Err(IndexError::RecordTooLarge {
                size: record.encoded_len(),
                max: LogRecord::HEADER_SIZE + max_key_len,
            });
        }

        let bytes = record.to_bytes();
        let len = bytes.len() as u64;
        if state.tail % self.page_size + len > self.page_size {
            state.tail = (state.tail / self.page_size + 1) * self.page_size;
        }

        let number = state.tail / self.page_size;
        if state.pages.back().map(|p| p.number) != Some(number) {
            state.pages.push_back(Page {
                number,
                data: vec![0u8; self.page_size as usize].into_boxed_slice(),
                dirty: false,
            });
            self.evict(state)?;
        }

        let address = state.tail;
        let offset = (address % self.page_size) as usize;
        if let Some(page) = state.pages.back_mut() {
            page.data[offset..offset + bytes.len()].copy_from_slice(&bytes);
            page.dirty = true;
        }
        state.tail += len;
        Ok(address)
    }

    fn evict(&self, state: &mut StoreState) -> IndexResult<()> {
        while state.pages.len() > self.config.memory_pages {
            let Some(page) = state.pages.pop_front() else {
                break;
            };
            if page.dirty {
                if let Err(e) = self.device.write_at(page.number * self.page_size, &page.data) {
                    state.pages.push_front(page);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn decode_key(&self, bytes: &[u8], address: Address, key: &str) -> IndexResult<Option<u32>> {
        match LogRecord::decode(bytes, address)? {
            Decoded::Record(record, _) if record.key == key => {
                Ok(record.info().is_live().then_some(record.value))
            }
            Decoded::Record(record, _) => Err(IndexError::record_corrupted(
                address,
                format!("expected key '{key}', found '{}'", record.key),
            )),
            Decoded::EndOfPage => Err(IndexError::record_corrupted(address, "no record at address")),
        }
    }

    fn load_page(&self, number: u64) -> IndexResult<Box<[u8]>> {
        let state = self.state.read();
        if let Some(page) = state.pages.iter().find(|p| p.number == number) {
            return Ok(page.data.clone());
        }
        self.read_page_from_device(number)
    }

    fn read_page_from_device(&self, number: u64) -> IndexResult<Box<[u8]>> {
        let mut data = vec![0u8; self.page_size as usize].into_boxed_slice();
        self.device.read_at(number * self.page_size, &mut data)?;
        Ok(data)
    }
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("LogStore")
            .field("name", &self.name)
            .field("page_size", &self.page_size)
            .field("tail", &state.tail)
            .field("head", &self.head(&state))
            .field("keys", &state.index.len())
            .finish()
    }
}

/// Forward iterator over log records.
///
/// Copies one page at a time, so appends made while scanning are not
/// observed past the end fixed at creation.
pub struct LogScanner<'a> {
    store: &'a LogStore,
    cursor: Address,
    end: Address,
    page: Option<(u64, Box<[u8]>)>,
}

impl Iterator for LogScanner<'_> {
    type Item = IndexResult<ScanRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let page_size = self.store.page_size;
        loop {
            if self.cursor >= self.end {
                return None;
            }

            let number = self.cursor / page_size;
            if self.page.as_ref().map(|(n, _)| *n) != Some(number) {
                match self.store.load_page(number) {
                    Ok(data) => self.page = Some((number, data)),
                    Err(e) => {
                        self.cursor = self.end;
                        return Some(Err(e));
                    }
                }
            }

            let offset = (self.cursor % page_size) as usize;
            let data = self.page.as_ref().map(|(_, d)| &d[offset..])?;
            match LogRecord::decode(data, self.cursor) {
                Ok(Decoded::EndOfPage) => {
                    self.cursor = (number + 1) * page_size;
                }
                Ok(Decoded::Record(record, len)) => {
                    let address = self.cursor;
                    self.cursor += len as u64;
                    let info = record.info();
                    return Some(Ok(ScanRecord {
                        address,
                        key: record.key,
                        value: record.value,
                        info,
                    }));
                }
                Err(e) => {
                    self.cursor = self.end;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small_config() -> EngineConfig {
        // 512-byte pages, two in memory
        EngineConfig::default()
            .with_page_size_bits(9)
            .with_memory_pages(2)
            .with_sync_on_checkpoint(false)
    }

    fn open(dir: &Path) -> (LogStore, RecoveryOutcome) {
        LogStore::open("streams", dir, small_config()).unwrap()
    }

    fn fill(store: &LogStore, count: u32) {
        for i in 0..count {
            store.upsert(&format!("stream-{i:04}"), 1024 + i * 2).unwrap();
        }
    }

    fn value_of(store: &LogStore, key: &str) -> Option<u32> {
        match store.lookup(key).unwrap() {
            Lookup::Found(v) => Some(v),
            Lookup::NotFound => None,
            Lookup::OnDisk(address) => store.read_from_device(key, address).unwrap(),
        }
    }

    #[test]
    fn test_open_fresh() {
        let tmp = TempDir::new().unwrap();
        let (store, outcome) = open(tmp.path());

        assert_eq!(outcome, RecoveryOutcome::StartedFresh);
        assert!(store.is_empty());
        assert_eq!(store.tail_address(), 0);
        assert!(tmp.path().join("streams.log").exists());
    }

    #[test]
    fn test_upsert_and_lookup() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = open(tmp.path());

        assert_eq!(store.upsert("orders", 1024).unwrap(), Status::Ok);
        assert_eq!(store.lookup("orders").unwrap(), Lookup::Found(1024));
        assert_eq!(store.lookup("missing").unwrap(), Lookup::NotFound);

        store.upsert("orders", 1030).unwrap();
        assert_eq!(store.lookup("orders").unwrap(), Lookup::Found(1030));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = open(tmp.path());

        store.upsert("orders", 1024).unwrap();
        assert_eq!(store.delete("orders").unwrap(), Status::Ok);
        assert_eq!(store.delete("orders").unwrap(), Status::NotFound);
        assert_eq!(store.lookup("orders").unwrap(), Lookup::NotFound);

        let infos: Vec<_> = store
            .scan(0, u64::MAX)
            .map(|r| r.unwrap().info)
            .collect();
        assert_eq!(infos.len(), 2);
        assert!(infos[1].tombstone);
    }

    #[test]
    fn test_rejects_bad_keys() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = open(tmp.path());

        assert!(matches!(
            store.upsert("", 1).unwrap_err(),
            IndexError::InvalidArgument { .. }
        ));
        let long = "x".repeat(600);
        assert!(matches!(
            store.upsert(&long, 1).unwrap_err(),
            IndexError::RecordTooLarge { .. }
        ));
        assert_eq!(store.tail_address(), 0);
    }

    #[test]
    fn test_records_do_not_straddle_pages() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = open(tmp.path());
        fill(&store, 100);

        for record in store.scan(0, u64::MAX) {
            let record = record.unwrap();
            let len = (LogRecord::HEADER_SIZE + record.key.len()) as u64;
            assert_eq!(record.address / 512, (record.address + len - 1) / 512);
        }
        assert_eq!(store.scan(0, u64::MAX).count(), 100);
    }

    #[test]
    fn test_old_pages_leave_memory() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = open(tmp.path());
        fill(&store, 100);

        assert!(store.head_address() > 0);
        assert_eq!(store.memory_usage().page_bytes, 2 * 512);

        // The first record now lives only on disk
        match store.lookup("stream-0000").unwrap() {
            Lookup::OnDisk(address) => assert_eq!(address, 0),
            other => panic!("expected on-disk record, got {other:?}"),
        }
        for i in 0..100 {
            assert_eq!(value_of(&store, &format!("stream-{i:04}")), Some(1024 + i * 2));
        }
    }

    #[test]
    fn test_scan_range() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = open(tmp.path());
        fill(&store, 50);

        assert_eq!(store.scan(0, 0).count(), 0);

        // Start from the second page
        let from_page: Vec<_> = store
            .scan(512, u64::MAX)
            .map(|r| r.unwrap())
            .collect();
        assert!(!from_page.is_empty());
        assert!(from_page.iter().all(|r| r.address >= 512));
        assert_eq!(
            from_page.len() + store.scan(0, 512).count(),
            50
        );
    }

    #[test]
    fn test_checkpoint_and_recover() {
        let tmp = TempDir::new().unwrap();
        let tail = {
            let (store, _) = open(tmp.path());
            fill(&store, 60);
            store.delete("stream-0003").unwrap();
            assert!(store.has_unsaved_changes());

            let meta = store.checkpoint().unwrap();
            assert_eq!(meta.sequence, 1);
            assert!(!store.has_unsaved_changes());
            meta.tail
        };

        let (store, outcome) = open(tmp.path());
        assert_eq!(
            outcome,
            RecoveryOutcome::Recovered {
                sequence: 1,
                tail,
                keys: 59
            }
        );
        assert_eq!(store.tail_address(), tail);
        assert_eq!(value_of(&store, "stream-0003"), None);
        assert_eq!(value_of(&store, "stream-0059"), Some(1024 + 59 * 2));

        // Appends continue on the recovered tail page
        store.upsert("after-restart", 7).unwrap();
        assert_eq!(value_of(&store, "after-restart"), Some(7));
        assert_eq!(store.checkpoint().unwrap().sequence, 2);
    }

    #[test]
    fn test_recover_discards_unsaved_records() {
        let tmp = TempDir::new().unwrap();
        {
            let (store, _) = open(tmp.path());
            fill(&store, 5);
            store.checkpoint().unwrap();

            // Enough to push pages to disk without a checkpoint
            for i in 0..100 {
                store.upsert(&format!("late-{i:04}"), i).unwrap();
            }
        }

        let (store, outcome) = open(tmp.path());
        assert!(matches!(outcome, RecoveryOutcome::Recovered { keys: 5, .. }));
        assert_eq!(value_of(&store, "late-0000"), None);
        assert_eq!(store.scan(0, u64::MAX).count(), 5);
    }

    #[test]
    fn test_missing_checkpoint_starts_fresh() {
        let tmp = TempDir::new().unwrap();
        {
            let (store, _) = open(tmp.path());
            fill(&store, 100);
        }

        let (store, outcome) = open(tmp.path());
        assert_eq!(outcome, RecoveryOutcome::StartedFresh);
        assert!(store.is_empty());
        assert_eq!(store.scan(0, u64::MAX).count(), 0);
    }

    #[test]
    fn test_corrupt_checkpoint_is_fatal() {
        let tmp = TempDir::new().unwrap();
        {
            let (store, _) = open(tmp.path());
            fill(&store, 3);
            store.checkpoint().unwrap();
        }
        std::fs::write(tmp.path().join("streams.checkpoint"), b"garbage").unwrap();

        let err = LogStore::open("streams", tmp.path(), small_config()).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_short_log_is_fatal() {
        let tmp = TempDir::new().unwrap();
        {
            let (store, _) = open(tmp.path());
            fill(&store, 3);
            store.checkpoint().unwrap();
        }
        let log = LogDevice::open(tmp.path().join("streams.log")).unwrap();
        log.truncate(10).unwrap();

        assert!(LogStore::open("streams", tmp.path(), small_config()).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let tmp = TempDir::new().unwrap();
        let config = EngineConfig::default().with_memory_pages(0);
        assert!(LogStore::open("streams", tmp.path(), config).is_err());
    }
}
