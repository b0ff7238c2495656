//! Persistent name index.
//!
//! Maps names to values drawn from a strictly increasing sequence
//! `first_value, first_value + interval, ...`. Entries are appended to a
//! [`LogStore`] and survive restarts; on startup the index is reconciled
//! against an authoritative [`NameLookup`] by catching up on entries it is
//! missing or truncating entries the source never confirmed.
//!
//! # Sessions
//!
//! All appends go through one writer session and all deletes through one
//! maintenance session. Reads borrow a reader session from a bounded pool,
//! so any number of threads may read while one thread adds.
//!
//! # Checkpoints
//!
//! Every add triggers a debouncer. Each checkpoint interval the debouncer
//! takes a checkpoint if anything was added since the last one. A failed
//! checkpoint is logged and retried on the next tick.
//!
//! # Read cache
//!
//! Every add and delete bumps a write generation. A reader only keeps the
//! value it cached if no write happened between its read and its insert.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use eventum_cache::{BloomFilter, LruCache};
use eventum_common::error::EventumError;
use eventum_common::memory::ObjectPool;
use eventum_common::timer::{Debouncer, TimerScheduler};

use crate::config::NameIndexConfig;
use crate::engine::{
    Address, CheckpointMetadata, LogScanner, LogStore, MaintenanceSession, MemoryUsage,
    ReaderSession, RecoveryOutcome, Status, WriterSession,
};
use crate::error::{IndexError, IndexResult};
use crate::lookup::NameLookup;

/// Approximate bytes held per read cache entry.
const READ_CACHE_ENTRY_BYTES: u64 = 64;

/// A persistent `name -> value` index.
pub struct NameIndexPersistence {
    /// Index settings.
    config: NameIndexConfig,
    /// Underlying engine.
    store: Arc<LogStore>,
    /// Serializes appends.
    writer: Mutex<WriterSession>,
    /// Serializes deletes.
    maintenance: Mutex<MaintenanceSession>,
    /// Reader sessions for lookups.
    readers: ObjectPool<ReaderSession>,
    /// Optional cache in front of reads.
    read_cache: Option<LruCache<String, u32>>,
    /// Bumped after every upsert and delete.
    write_generation: AtomicU64,
    /// Optional filter in front of reads.
    existence_filter: Option<BloomFilter>,
    /// Value of the newest entry, zero when empty.
    last_value_added: Mutex<u32>,
    /// Serializes initialization.
    init_lock: tokio::sync::Mutex<()>,
    /// Runs checkpoint ticks.
    scheduler: Arc<TimerScheduler>,
    /// Takes checkpoints after adds.
    checkpointer: Debouncer,
    /// Cancelled on dispose.
    cancellation: CancellationToken,
    /// Set once disposed.
    disposed: AtomicBool,
}

impl NameIndexPersistence {
    /// Opens the index described by `config` and recovers its last entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the log cannot be
    /// recovered. A log without a checkpoint is not an error; the index
    /// starts empty.
    pub fn open(config: NameIndexConfig) -> IndexResult<Self> {
        config.validate()?;
        let name = config.index_name.clone();

        let (store, outcome) = LogStore::open(&name, &config.log_dir, config.engine())?;
        let store = Arc::new(store);

        let readers = {
            let store = Arc::clone(&store);
            ObjectPool::new(
                format!("{name} readers pool"),
                config.initial_reader_count,
                config.max_reader_count,
                move || ReaderSession::new(Arc::clone(&store)),
            )?
        };

        let read_cache = config
            .enable_read_cache
            .then(|| LruCache::new(config.read_cache_capacity));
        let existence_filter = config
            .existence_filter
            .as_ref()
            .map(|filter| BloomFilter::new(filter.expected_items, filter.false_positive_rate))
            .transpose()?;

        let cancellation = CancellationToken::new();
        let scheduler = Arc::new(TimerScheduler::start(format!("{name}-checkpointer"))?);
        let checkpointer = {
            let store = Arc::clone(&store);
            let name = name.clone();
            Debouncer::start(
                config.checkpoint_interval,
                Arc::clone(&scheduler),
                cancellation.clone(),
                move |_token| match store.checkpoint() {
                    Ok(meta) => {
                        debug!(index = %name, sequence = meta.sequence, "took checkpoint");
                        true
                    }
                    Err(e) => {
                        error!(index = %name, error = %e, "could not take checkpoint, will retry");
                        false
                    }
                },
            )?
        };

        let index = Self {
            writer: Mutex::new(WriterSession::new(Arc::clone(&store))),
            maintenance: Mutex::new(MaintenanceSession::new(Arc::clone(&store))),
            config,
            store,
            readers,
            read_cache,
            write_generation: AtomicU64::new(0),
            existence_filter,
            last_value_added: Mutex::new(0),
            init_lock: tokio::sync::Mutex::new(()),
            scheduler,
            checkpointer,
            cancellation,
            disposed: AtomicBool::new(false),
        };

        info!(
            index = %index.name(),
            memory_mib = index.total_memory_mib(),
            "total memory before recovery"
        );
        index.recover(outcome)?;
        info!(
            index = %index.name(),
            memory_mib = index.total_memory_mib(),
            "total memory after recovery"
        );

        Ok(index)
    }

    fn recover(&self, outcome: RecoveryOutcome) -> IndexResult<()> {
        let RecoveryOutcome::Recovered { sequence, tail, keys } = outcome else {
            info!(index = %self.name(), "starting from scratch");
            return Ok(());
        };

        if let Some(filter) = &self.existence_filter {
            for record in self.store.scan(0, tail) {
                let record = record?;
                if record.info.is_live() {
                    filter.add(record.key.as_str());
                }
            }
        }

        let newest = self.scan_backwards().next().transpose()?;
        let (name, value) = newest.unwrap_or_default();
        *self.last_value_added.lock() = value;

        info!(
            index = %self.name(),
            sequence,
            keys,
            last_name = %name,
            last_value = value,
            "has been recovered"
        );
        Ok(())
    }

    /// Returns the index name.
    pub fn name(&self) -> &str {
        &self.config.index_name
    }

    /// Returns the index settings.
    pub fn config(&self) -> &NameIndexConfig {
        &self.config
    }

    /// Returns the value of the newest entry, or zero if the index is empty.
    #[must_use]
    pub fn last_value_added(&self) -> u32 {
        *self.last_value_added.lock()
    }

    /// Returns the number of names in the index.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns true if the index holds no names.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Returns approximate memory held by the engine.
    pub fn memory_usage(&self) -> MemoryUsage {
        self.store.memory_usage()
    }

    /// Returns the last completed checkpoint.
    pub fn last_checkpoint(&self) -> Option<CheckpointMetadata> {
        self.store.last_checkpoint()
    }

    /// Reconciles the index with `source`.
    ///
    /// - An empty index catches up from the start of the source.
    /// - If the newest entry is in the source under the same name, the
    ///   index catches up from that entry.
    /// - Otherwise entries are truncated, newest first, until one is found
    ///   in the source; the source must end at that entry.
    ///
    /// A checkpoint is taken before returning.
    ///
    /// # Errors
    ///
    /// Returns `NameMismatch`, `SourceMissingValue` or `SourceInconsistent`
    /// when the index and source cannot be reconciled, and `Cancelled` if
    /// `token` is cancelled. Truncations are applied only after the whole
    /// walk succeeds, so a failed or cancelled init leaves nothing half
    /// truncated.
    pub async fn init(&self, source: &dyn NameLookup, token: &CancellationToken) -> IndexResult<()> {
        self.ensure_open()?;
        let _init = self.init_lock.lock().await;
        info!(index = %self.name(), "initializing");

        let mut entries = self.scan_backwards();
        match entries.next().transpose()? {
            None => {
                info!(index = %self.name(), "index is empty, catching up from beginning of source");
                self.catch_up(source, 0, token).await?;
            }
            Some((name, value)) => match source.lookup_name(value, token).await? {
                Some(source_name) => {
                    if source_name != name {
                        return Err(self.name_mismatch(value, name, source_name));
                    }
                    info!(index = %self.name(), value, "catching up from last entry");
                    self.catch_up(source, value, token).await?;
                }
                None => self.truncate(source, entries, name, value, token).await?,
            },
        }

        self.checkpoint_now().await?;

        info!(
            index = %self.name(),
            last_value = self.last_value_added(),
            "initialized"
        );
        info!(
            index = %self.name(),
            memory_mib = self.total_memory_mib(),
            "total memory after initialization"
        );
        Ok(())
    }

    async fn catch_up(
        &self,
        source: &dyn NameLookup,
        previous: u32,
        token: &CancellationToken,
    ) -> IndexResult<()> {
        let Some(source_last) = source.try_get_last_value(token).await? else {
            info!(index = %self.name(), "source is empty, nothing to catch up");
            return Ok(());
        };
        info!(index = %self.name(), source_last, "source last value");

        let interval = u64::from(self.config.value_interval);
        let mut next = if previous == 0 {
            u64::from(self.config.first_value)
        } else {
            u64::from(previous) + interval
        };

        let mut count = 0u64;
        while next <= u64::from(source_last) {
            if token.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            let value = next as u32;
            let Some(name) = source.lookup_name(value, token).await? else {
                return Err(IndexError::SourceMissingValue {
                    index: self.name().to_string(),
                    value,
                });
            };
            self.add(&name, value)?;
            count += 1;
            next += interval;
        }

        info!(index = %self.name(), count, "caught up entries");
        Ok(())
    }

    async fn truncate(
        &self,
        source: &dyn NameLookup,
        mut entries: BackwardScan<'_>,
        name: String,
        value: u32,
        token: &CancellationToken,
    ) -> IndexResult<()> {
        let mut plan = Truncation {
            names: Vec::new(),
            seen: HashSet::new(),
            last_value: self.last_value_added(),
        };
        self.pop_entry(&mut plan, name, value)?;

        let mut found = None;
        while found.is_none() {
            if token.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            let Some((name, value)) = entries.next().transpose()? else {
                break;
            };
            match source.lookup_name(value, token).await? {
                Some(source_name) => found = Some((name, value, source_name)),
                None => self.pop_entry(&mut plan, name, value)?,
            }
        }

        let source_last = source.try_get_last_value(token).await?;
        match found {
            Some((name, value, source_name)) => {
                if source_last != Some(value) {
                    return Err(IndexError::SourceInconsistent {
                        index: self.name().to_string(),
                        reason: format!(
                            "expected source to hold values up to {value}, found {source_last:?}"
                        ),
                    });
                }
                if name != source_name {
                    return Err(self.name_mismatch(value, name, source_name));
                }
            }
            None => {
                if let Some(last) = source_last {
                    return Err(IndexError::SourceInconsistent {
                        index: self.name().to_string(),
                        reason: format!("expected source to be empty, holds values up to {last}"),
                    });
                }
            }
        }

        if token.is_cancelled() {
            return Err(IndexError::Cancelled);
        }

        info!(index = %self.name(), count = plan.names.len(), "truncating entries");
        for name in &plan.names {
            self.truncate_tail(name)?;
        }
        *self.last_value_added.lock() = plan.last_value;
        Ok(())
    }

    fn pop_entry(&self, plan: &mut Truncation, name: String, value: u32) -> IndexResult<()> {
        if plan.seen.contains(&name) {
            return Ok(());
        }
        if plan.last_value != value {
            return Err(EventumError::invariant(format!(
                "index '{}' is removing entry '{name}':{value} but its last value is {}",
                self.name(),
                plan.last_value
            ))
            .into());
        }

        plan.last_value = if plan.last_value > self.config.first_value {
            plan.last_value - self.config.value_interval
        } else {
            0
        };
        trace!(index = %self.name(), name = %name, value, "going to delete");
        plan.seen.insert(name.clone());
        plan.names.push(name);
        Ok(())
    }

    fn truncate_tail(&self, name: &str) -> IndexResult<()> {
        let mut maintenance = self.maintenance.lock();
        match maintenance.delete(name)? {
            Status::Ok | Status::NotFound => {}
            Status::Pending => {
                maintenance.complete_pending()?;
            }
            status => return Err(IndexError::unexpected_status(self.name(), "delete", status)),
        }
        drop(maintenance);

        self.invalidate(name);
        trace!(index = %self.name(), name, "deleted entry");
        Ok(())
    }

    fn name_mismatch(&self, value: u32, index_name: String, source_name: String) -> IndexError {
        IndexError::NameMismatch {
            index: self.name().to_string(),
            value,
            index_name,
            source_name,
        }
    }

    /// Adds `name` with the next value in the sequence.
    ///
    /// # Errors
    ///
    /// Returns `OutOfOrder` unless `value` is the first value of an empty
    /// index or the last value plus the interval.
    pub fn add(&self, name: &str, value: u32) -> IndexResult<()> {
        self.ensure_open()?;
        self.check_name(name)?;

        let mut last = self.last_value_added.lock();
        let valid_first = *last == 0 && value == self.config.first_value;
        let valid_next = last.checked_add(self.config.value_interval) == Some(value);
        if !valid_first && !valid_next {
            let expected = if *last == 0 {
                self.config.first_value
            } else {
                last.wrapping_add(self.config.value_interval)
            };
            return Err(IndexError::OutOfOrder {
                index: self.name().to_string(),
                value,
                last: *last,
                expected,
            });
        }

        if let Some(filter) = &self.existence_filter {
            filter.add(name);
        }

        // Pending upserts complete in order; anything lost is caught up on restart.
        match self.writer.lock().upsert(name, value)? {
            Status::Ok | Status::NotFound | Status::Pending => {}
            status => return Err(IndexError::unexpected_status(self.name(), "upsert", status)),
        }
        *last = value;
        drop(last);

        self.invalidate(name);
        self.checkpointer.trigger();

        trace!(index = %self.name(), name, value, "added new entry");
        Ok(())
    }

    /// Returns the value for `name`, if present.
    pub fn try_get_value(&self, name: &str) -> IndexResult<Option<u32>> {
        self.ensure_open()?;

        if let Some(filter) = &self.existence_filter {
            if !filter.may_exist(name) {
                return Ok(None);
            }
        }
        if let Some(cache) = &self.read_cache {
            if let Some(value) = cache.try_get(&name.to_string()) {
                return Ok(Some(value));
            }
        }

        let generation = self.write_generation.load(Ordering::SeqCst);
        let value = self.read(name)?;
        if let Some(value) = value {
            self.cache_value(name, value, generation);
        }
        Ok(value)
    }

    /// Caches `value`, read when the write generation was `generation`.
    fn cache_value(&self, name: &str, value: u32, generation: u64) {
        let Some(cache) = &self.read_cache else {
            return;
        };
        cache.put(name.to_string(), value);
        // A write since the read may already have invalidated the name.
        if self.write_generation.load(Ordering::SeqCst) != generation {
            cache.remove(&name.to_string());
        }
    }

    /// Must run after the engine write so readers that saw the old value notice.
    fn invalidate(&self, name: &str) {
        self.write_generation.fetch_add(1, Ordering::SeqCst);
        if let Some(cache) = &self.read_cache {
            cache.remove(&name.to_string());
        }
    }

    fn read(&self, name: &str) -> IndexResult<Option<u32>> {
        let mut reader = self.readers.rent()?;
        match reader.read(name) {
            Status::Ok => Ok(reader.context().value()),
            Status::NotFound => Ok(None),
            Status::Pending => {
                reader.complete_pending()?;
                match reader.context().status() {
                    Status::Ok => Ok(reader.context().value()),
                    Status::NotFound => Ok(None),
                    status => Err(IndexError::unexpected_status(
                        self.name(),
                        "complete read",
                        status,
                    )),
                }
            }
            status => Err(IndexError::unexpected_status(self.name(), "read", status)),
        }
    }

    /// Returns the value for `name`, or zero if it is absent.
    pub fn lookup_value(&self, name: &str) -> IndexResult<u32> {
        self.check_name(name)?;
        Ok(self.try_get_value(name)?.unwrap_or_default())
    }

    /// Returns the live entries in `[begin, end)`, oldest first.
    ///
    /// `begin` must be a record or page boundary. Entries that were
    /// truncated, or re-added with another value, are skipped.
    pub fn scan_range(&self, begin: Address, end: Address) -> NameScan<'_> {
        NameScan {
            index: self,
            records: self.store.scan(begin, end),
        }
    }

    /// Returns every live entry, oldest first.
    pub fn scan(&self) -> NameScan<'_> {
        self.scan_range(self.store.begin_address(), self.store.tail_address())
    }

    /// Returns every live entry, newest first.
    ///
    /// The log only scans forwards, so this scans one page at a time from
    /// the tail and yields each page in reverse.
    pub fn scan_backwards(&self) -> BackwardScan<'_> {
        let page_size = self.store.page_size();
        let end = self.store.tail_address();
        BackwardScan {
            index: self,
            page_size,
            begin: end / page_size * page_size,
            end,
            buffered: Vec::new(),
        }
    }

    /// Takes a checkpoint. Returns true if it succeeded.
    pub async fn checkpoint_log_async(&self) -> bool {
        match self.checkpoint_now().await {
            Ok(_) => true,
            Err(e) => {
                error!(index = %self.name(), error = %e, "could not take checkpoint");
                false
            }
        }
    }

    async fn checkpoint_now(&self) -> IndexResult<CheckpointMetadata> {
        debug!(
            index = %self.name(),
            memory_mib = self.total_memory_mib(),
            "checkpointing"
        );
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.checkpoint())
            .await
            .map_err(|e| EventumError::internal(format!("checkpoint task failed: {e}")))?
    }

    /// Releases the index.
    ///
    /// Stops checkpoint ticks, takes a final checkpoint if anything is
    /// unsaved and disposes the reader pool. Later calls do nothing.
    pub fn dispose(&self) -> IndexResult<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.cancellation.cancel();
        self.checkpointer.cancel();
        self.scheduler.shutdown();

        let result = if self.store.has_unsaved_changes() {
            self.maintenance.lock().checkpoint().map(|_| ())
        } else {
            Ok(())
        };
        self.readers.dispose();

        info!(index = %self.name(), "disposed");
        result
    }

    /// Returns true once disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> IndexResult<()> {
        if self.is_disposed() {
            return Err(IndexError::Disposed {
                index: self.name().to_string(),
            });
        }
        Ok(())
    }

    fn check_name(&self, name: &str) -> IndexResult<()> {
        if name.is_empty() {
            return Err(IndexError::InvalidArgument {
                index: self.name().to_string(),
                reason: "name must not be empty".to_string(),
            });
        }
        Ok(())
    }

    fn total_memory_mib(&self) -> f64 {
        let cache_bytes = self
            .read_cache
            .as_ref()
            .map_or(0, |cache| cache.len() as u64 * READ_CACHE_ENTRY_BYTES);
        let filter_bytes = self
            .existence_filter
            .as_ref()
            .map_or(0, |filter| filter.size_bytes() as u64);
        let usage = self.store.memory_usage();
        (usage.total_bytes() + cache_bytes + filter_bytes) as f64 / (1024.0 * 1024.0)
    }
}

impl Drop for NameIndexPersistence {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            error!(index = %self.name(), error = %e, "final checkpoint failed");
        }
    }
}

impl std::fmt::Debug for NameIndexPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameIndexPersistence")
            .field("name", &self.config.index_name)
            .field("last_value_added", &self.last_value_added())
            .field("store", &self.store)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

struct Truncation {
    names: Vec<String>,
    seen: HashSet<String>,
    last_value: u32,
}

/// Forward scan over live entries. See [`NameIndexPersistence::scan`].
pub struct NameScan<'a> {
    index: &'a NameIndexPersistence,
    records: LogScanner<'a>,
}

impl Iterator for NameScan<'_> {
    type Item = IndexResult<(String, u32)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            };
            if !record.info.is_live() {
                continue;
            }
            // Skip records superseded by a delete or a later upsert
            match self.index.try_get_value(&record.key) {
                Ok(Some(current)) if current == record.value => {
                    return Some(Ok((record.key, record.value)));
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Backward scan over live entries. See [`NameIndexPersistence::scan_backwards`].
pub struct BackwardScan<'a> {
    index: &'a NameIndexPersistence,
    page_size: u64,
    begin: Address,
    end: Address,
    buffered: Vec<(String, u32)>,
}

impl Iterator for BackwardScan<'_> {
    type Item = IndexResult<(String, u32)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffered.pop() {
                return Some(Ok(entry));
            }
            if self.end == 0 {
                return None;
            }

            match self
                .index
                .scan_range(self.begin, self.end)
                .collect::<IndexResult<Vec<_>>>()
            {
                Ok(entries) => self.buffered = entries,
                Err(e) => {
                    self.end = 0;
                    return Some(Err(e));
                }
            }
            self.end = self.begin;
            self.begin = self.begin.saturating_sub(self.page_size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExistenceFilterConfig;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(dir: &std::path::Path) -> NameIndexConfig {
        NameIndexConfig::new("streams", dir)
            .with_readers(1, 4)
            .with_page_size_bits(9)
            .with_memory_pages(2)
    }

    fn open(dir: &std::path::Path) -> NameIndexPersistence {
        NameIndexPersistence::open(config(dir)).unwrap()
    }

    #[test]
    fn test_open_empty() {
        let tmp = TempDir::new().unwrap();
        let index = open(tmp.path());

        assert_eq!(index.last_value_added(), 0);
        assert!(index.is_empty());
        assert_eq!(index.scan().count(), 0);
        assert_eq!(index.scan_backwards().count(), 0);
    }

    #[test]
    fn test_add_in_order() {
        let tmp = TempDir::new().unwrap();
        let index = open(tmp.path());

        index.add("orders", 1024).unwrap();
        index.add("payments", 1026).unwrap();
        assert_eq!(index.last_value_added(), 1026);
        assert_eq!(index.len(), 2);
        assert_eq!(index.try_get_value("orders").unwrap(), Some(1024));
        assert_eq!(index.lookup_value("payments").unwrap(), 1026);
        assert_eq!(index.lookup_value("missing").unwrap(), 0);
    }

    #[test]
    fn test_add_out_of_order() {
        let tmp = TempDir::new().unwrap();
        let index = open(tmp.path());

        // Must start at the first value
        let err = index.add("orders", 1026).unwrap_err();
        assert!(matches!(
            err,
            IndexError::OutOfOrder {
                value: 1026,
                last: 0,
                expected: 1024,
                ..
            }
        ));

        index.add("orders", 1024).unwrap();
        assert!(index.add("payments", 1024).is_err());
        assert!(index.add("payments", 1027).is_err());
        assert!(index.add("payments", 1028).is_err());
        assert_eq!(index.last_value_added(), 1024);
        assert_eq!(index.try_get_value("payments").unwrap(), None);
    }

    #[test]
    fn test_empty_name_rejected() {
        let tmp = TempDir::new().unwrap();
        let index = open(tmp.path());

        assert!(matches!(
            index.add("", 1024).unwrap_err(),
            IndexError::InvalidArgument { .. }
        ));
        assert!(index.lookup_value("").is_err());
        assert_eq!(index.last_value_added(), 0);
    }

    #[test]
    fn test_scan_orders() {
        let tmp = TempDir::new().unwrap();
        let index = open(tmp.path());
        for i in 0..80u32 {
            index.add(&format!("stream-{i}"), 1024 + i * 2).unwrap();
        }

        let forward: Vec<_> = index.scan().map(|e| e.unwrap().1).collect();
        let mut backward: Vec<_> = index.scan_backwards().map(|e| e.unwrap().1).collect();
        assert_eq!(forward.len(), 80);
        assert!(forward.windows(2).all(|w| w[0] < w[1]));

        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(index.scan_range(0, 0).count(), 0);
    }

    #[test]
    fn test_read_cache() {
        let tmp = TempDir::new().unwrap();
        let index = NameIndexPersistence::open(config(tmp.path()).with_read_cache(16)).unwrap();

        index.add("orders", 1024).unwrap();
        assert_eq!(index.try_get_value("orders").unwrap(), Some(1024));
        // Served from the cache
        assert_eq!(index.try_get_value("orders").unwrap(), Some(1024));
        assert_eq!(index.try_get_value("missing").unwrap(), None);
    }

    #[test]
    fn test_read_cache_skips_value_read_before_write() {
        let tmp = TempDir::new().unwrap();
        let index = NameIndexPersistence::open(config(tmp.path()).with_read_cache(16)).unwrap();
        index.add("orders", 1024).unwrap();

        let before = index.write_generation.load(Ordering::SeqCst);
        index.add("payments", 1026).unwrap();

        // Read before the add, cached after it
        index.cache_value("orders", 1024, before);
        let cache = index.read_cache.as_ref().unwrap();
        assert!(!cache.contains(&"orders".to_string()));

        let current = index.write_generation.load(Ordering::SeqCst);
        index.cache_value("orders", 1024, current);
        assert!(cache.contains(&"orders".to_string()));
    }

    #[tokio::test]
    async fn test_read_cache_after_truncate_and_readd() {
        let tmp = TempDir::new().unwrap();
        let index = NameIndexPersistence::open(config(tmp.path()).with_read_cache(16)).unwrap();
        index.add("orders", 1024).unwrap();
        index.add("payments", 1026).unwrap();
        index.add("refunds", 1028).unwrap();
        assert_eq!(index.try_get_value("refunds").unwrap(), Some(1028));

        let source = crate::lookup::InMemoryNameLookup::from_entries([(1024, "orders")]);
        index.init(&source, &CancellationToken::new()).await.unwrap();
        assert_eq!(index.try_get_value("refunds").unwrap(), None);
        assert_eq!(index.try_get_value("payments").unwrap(), None);

        index.add("refunds", 1026).unwrap();
        assert_eq!(index.try_get_value("refunds").unwrap(), Some(1026));
        assert_eq!(index.lookup_value("refunds").unwrap(), 1026);
        let entries: Vec<_> = index.scan().map(|e| e.unwrap()).collect();
        assert_eq!(
            entries,
            vec![("orders".to_string(), 1024), ("refunds".to_string(), 1026)]
        );
    }

    #[test]
    fn test_existence_filter() {
        let tmp = TempDir::new().unwrap();
        let filter = ExistenceFilterConfig {
            expected_items: 1000,
            false_positive_rate: 0.01,
        };
        {
            let index =
                NameIndexPersistence::open(config(tmp.path()).with_existence_filter(filter.clone()))
                    .unwrap();
            for i in 0..20u32 {
                index.add(&format!("stream-{i}"), 1024 + i * 2).unwrap();
            }
            assert_eq!(index.try_get_value("stream-7").unwrap(), Some(1038));
            index.dispose().unwrap();
        }

        // Rebuilt on recovery
        let index =
            NameIndexPersistence::open(config(tmp.path()).with_existence_filter(filter)).unwrap();
        for i in 0..20u32 {
            assert_eq!(
                index.try_get_value(&format!("stream-{i}")).unwrap(),
                Some(1024 + i * 2)
            );
        }
        assert_eq!(index.try_get_value("never-added").unwrap(), None);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let index = open(tmp.path());
        index.add("orders", 1024).unwrap();

        index.dispose().unwrap();
        assert!(index.is_disposed());
        index.dispose().unwrap();

        assert!(matches!(
            index.add("payments", 1026).unwrap_err(),
            IndexError::Disposed { .. }
        ));
        assert!(index.try_get_value("orders").is_err());

        // The final checkpoint made the add durable
        assert!(index.last_checkpoint().is_some());
    }

    #[test]
    fn test_debounced_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let index = NameIndexPersistence::open(
            config(tmp.path()).with_checkpoint_interval(Duration::from_millis(20)),
        )
        .unwrap();

        // Idle indexes are never checkpointed
        std::thread::sleep(Duration::from_millis(80));
        assert!(index.last_checkpoint().is_none());

        index.add("orders", 1024).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while index.last_checkpoint().is_none() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(index.last_checkpoint().is_some());
    }

    #[test]
    fn test_failed_checkpoint_is_retried() {
        let tmp = TempDir::new().unwrap();
        let index = NameIndexPersistence::open(
            config(tmp.path()).with_checkpoint_interval(Duration::from_millis(20)),
        )
        .unwrap();

        // A non-empty directory where the checkpoint file goes blocks the rename
        let blocker = tmp.path().join("streams.checkpoint");
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), b"x").unwrap();

        index.add("orders", 1024).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        assert!(index.last_checkpoint().is_none());

        std::fs::remove_dir_all(&blocker).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while index.last_checkpoint().is_none() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(index.last_checkpoint().is_some());
    }

    #[tokio::test]
    async fn test_checkpoint_log_async() {
        let tmp = TempDir::new().unwrap();
        let index = open(tmp.path());
        index.add("orders", 1024).unwrap();

        assert!(index.checkpoint_log_async().await);
        let meta = index.last_checkpoint().unwrap();
        assert_eq!(meta.sequence, 1);
    }
}
