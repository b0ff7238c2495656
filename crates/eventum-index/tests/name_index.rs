//! Name index integration tests: recovery, reconciliation and scans.

use std::path::Path;

use eventum_index::{
    InMemoryNameLookup, IndexError, NameIndexConfig, NameIndexPersistence,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const FIRST: u32 = 1024;
const INTERVAL: u32 = 2;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(dir: &Path) -> NameIndexConfig {
    NameIndexConfig::new("stream-names", dir)
        .with_values(FIRST, INTERVAL)
        .with_readers(2, 8)
        .with_page_size_bits(9)
        .with_memory_pages(2)
}

fn open(dir: &Path) -> NameIndexPersistence {
    NameIndexPersistence::open(config(dir)).unwrap()
}

fn value(n: u32) -> u32 {
    FIRST + n * INTERVAL
}

fn entries(index: &NameIndexPersistence) -> Vec<(String, u32)> {
    index.scan().map(|e| e.unwrap()).collect()
}

fn pairs(items: &[(&str, u32)]) -> Vec<(String, u32)> {
    items.iter().map(|(n, v)| (n.to_string(), *v)).collect()
}

#[tokio::test]
async fn test_catch_up_from_empty() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let index = open(tmp.path());
    let source = InMemoryNameLookup::from_entries([(value(0), "a"), (value(1), "b"), (value(2), "c")]);

    index.init(&source, &CancellationToken::new()).await.unwrap();

    assert_eq!(index.last_value_added(), value(2));
    assert_eq!(
        entries(&index),
        pairs(&[("a", value(0)), ("b", value(1)), ("c", value(2))])
    );
    assert_eq!(index.lookup_value("b").unwrap(), value(1));
    assert!(index.last_checkpoint().is_some());
}

#[tokio::test]
async fn test_catch_up_from_last_entry() {
    let tmp = TempDir::new().unwrap();
    let index = open(tmp.path());
    index.add("a", value(0)).unwrap();

    let source = InMemoryNameLookup::from_entries([(value(0), "a"), (value(1), "b"), (value(2), "c")]);
    index.init(&source, &CancellationToken::new()).await.unwrap();

    assert_eq!(index.last_value_added(), value(2));
    assert_eq!(index.len(), 3);
    assert_eq!(index.try_get_value("c").unwrap(), Some(value(2)));
}

#[tokio::test]
async fn test_init_in_sync_is_noop() {
    let tmp = TempDir::new().unwrap();
    let index = open(tmp.path());
    index.add("a", value(0)).unwrap();
    index.add("b", value(1)).unwrap();

    let source = InMemoryNameLookup::from_entries([(value(0), "a"), (value(1), "b")]);
    index.init(&source, &CancellationToken::new()).await.unwrap();

    assert_eq!(index.last_value_added(), value(1));
    assert_eq!(entries(&index), pairs(&[("a", value(0)), ("b", value(1))]));
}

#[tokio::test]
async fn test_empty_source_empty_index() {
    let tmp = TempDir::new().unwrap();
    let index = open(tmp.path());

    index
        .init(&InMemoryNameLookup::new(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(index.last_value_added(), 0);
    assert!(index.is_empty());
}

#[tokio::test]
async fn test_truncate_extra_entry() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let index = open(tmp.path());
    index.add("a", value(0)).unwrap();
    index.add("b", value(1)).unwrap();
    // Appended locally but never confirmed by the source
    index.add("c", value(2)).unwrap();

    let source = InMemoryNameLookup::from_entries([(value(0), "a"), (value(1), "b")]);
    index.init(&source, &CancellationToken::new()).await.unwrap();

    assert_eq!(index.last_value_added(), value(1));
    assert_eq!(index.try_get_value("c").unwrap(), None);
    assert_eq!(entries(&index), pairs(&[("a", value(0)), ("b", value(1))]));

    let newest = index.scan_backwards().next().unwrap().unwrap();
    assert_eq!(newest, ("b".to_string(), value(1)));

    // The sequence continues from the source's last value
    index.add("d", value(2)).unwrap();
    assert_eq!(index.lookup_value("d").unwrap(), value(2));
}

#[tokio::test]
async fn test_truncate_to_empty() {
    let tmp = TempDir::new().unwrap();
    let index = open(tmp.path());
    index.add("a", value(0)).unwrap();
    index.add("b", value(1)).unwrap();

    index
        .init(&InMemoryNameLookup::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(index.last_value_added(), 0);
    assert!(index.is_empty());
    assert_eq!(index.scan().count(), 0);
    index.add("z", value(0)).unwrap();
}

#[tokio::test]
async fn test_truncate_then_readd_skips_stale_records() {
    let tmp = TempDir::new().unwrap();
    let index = open(tmp.path());
    index.add("a", value(0)).unwrap();
    index.add("b", value(1)).unwrap();
    index.add("c", value(2)).unwrap();

    let source = InMemoryNameLookup::from_entries([(value(0), "a")]);
    index.init(&source, &CancellationToken::new()).await.unwrap();
    assert_eq!(index.last_value_added(), value(0));

    // "c" comes back with a different value; its old record is stale
    index.add("c", value(1)).unwrap();
    assert_eq!(entries(&index), pairs(&[("a", value(0)), ("c", value(1))]));

    let backwards: Vec<_> = index.scan_backwards().map(|e| e.unwrap()).collect();
    assert_eq!(backwards, pairs(&[("c", value(1)), ("a", value(0))]));
}

#[tokio::test]
async fn test_name_mismatch_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let index = open(tmp.path());
    index.add("a", value(0)).unwrap();

    let source = InMemoryNameLookup::from_entries([(value(0), "not-a")]);
    let err = index
        .init(&source, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, IndexError::NameMismatch { value: 1024, .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_name_mismatch_while_truncating() {
    let tmp = TempDir::new().unwrap();
    let index = open(tmp.path());
    index.add("a", value(0)).unwrap();
    index.add("b", value(1)).unwrap();

    let source = InMemoryNameLookup::from_entries([(value(0), "x")]);
    let err = index
        .init(&source, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::NameMismatch { .. }));

    // Nothing was deleted
    assert_eq!(index.try_get_value("b").unwrap(), Some(value(1)));
}

#[tokio::test]
async fn test_source_missing_value() {
    let tmp = TempDir::new().unwrap();
    let index = open(tmp.path());

    // A gap at value(1)
    let source = InMemoryNameLookup::from_entries([(value(0), "a"), (value(2), "c")]);
    let err = index
        .init(&source, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, IndexError::SourceMissingValue { value: 1026, .. }));
    assert_eq!(index.last_value_added(), value(0));
}

#[tokio::test]
async fn test_source_inconsistent_leaves_index_untouched() {
    let tmp = TempDir::new().unwrap();
    let index = open(tmp.path());
    index.add("a", value(0)).unwrap();
    index.add("b", value(1)).unwrap();
    index.add("c", value(2)).unwrap();

    // Source agrees on "a" but claims values beyond it
    let source = InMemoryNameLookup::from_entries([(value(0), "a"), (value(3), "z")]);
    let err = index
        .init(&source, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, IndexError::SourceInconsistent { .. }));
    assert_eq!(index.last_value_added(), value(2));
    assert_eq!(index.len(), 3);
}

#[tokio::test]
async fn test_cancelled_init() {
    let tmp = TempDir::new().unwrap();
    let index = open(tmp.path());
    index.add("a", value(0)).unwrap();
    index.add("b", value(1)).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let source = InMemoryNameLookup::from_entries([(value(0), "a")]);
    let err = index.init(&source, &token).await.unwrap_err();

    assert!(matches!(err, IndexError::Cancelled));
    assert_eq!(index.last_value_added(), value(1));
    assert_eq!(index.len(), 2);

    // A later init still reconciles
    index.init(&source, &CancellationToken::new()).await.unwrap();
    assert_eq!(index.last_value_added(), value(0));
}

#[test]
fn test_recovery_restores_last_value() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    {
        let index = open(tmp.path());
        for n in 0..50 {
            index.add(&format!("stream-{n}"), value(n)).unwrap();
        }
        index.dispose().unwrap();
    }

    let index = open(tmp.path());
    assert_eq!(index.last_value_added(), value(49));
    assert_eq!(index.len(), 50);
    for n in 0..50 {
        assert_eq!(
            index.try_get_value(&format!("stream-{n}")).unwrap(),
            Some(value(n))
        );
    }
    index.add("stream-50", value(50)).unwrap();
}

#[test]
fn test_recovery_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    {
        let index = open(tmp.path());
        index.add("a", value(0)).unwrap();
        index.add("b", value(1)).unwrap();
    }
    for _ in 0..3 {
        let index = open(tmp.path());
        assert_eq!(index.last_value_added(), value(1));
        assert_eq!(entries(&index), pairs(&[("a", value(0)), ("b", value(1))]));
    }
}

#[tokio::test]
async fn test_recovery_after_truncation() {
    let tmp = TempDir::new().unwrap();
    {
        let index = open(tmp.path());
        index.add("a", value(0)).unwrap();
        index.add("b", value(1)).unwrap();
        index.add("c", value(2)).unwrap();

        let source = InMemoryNameLookup::from_entries([(value(0), "a")]);
        index.init(&source, &CancellationToken::new()).await.unwrap();
    }

    let index = open(tmp.path());
    assert_eq!(index.last_value_added(), value(0));
    assert_eq!(index.try_get_value("b").unwrap(), None);
    assert_eq!(index.try_get_value("c").unwrap(), None);
}

#[test]
fn test_reads_from_disk() {
    let tmp = TempDir::new().unwrap();
    let index = NameIndexPersistence::open(config(tmp.path()).with_memory_pages(1)).unwrap();
    for n in 0..200 {
        index.add(&format!("stream-{n:03}"), value(n)).unwrap();
    }

    // Early entries have left memory
    assert!(index.memory_usage().page_bytes <= 512);
    for n in [0, 1, 57, 199] {
        assert_eq!(index.lookup_value(&format!("stream-{n:03}")).unwrap(), value(n));
    }
    assert_eq!(index.scan_backwards().count(), 200);
}

#[test]
fn test_concurrent_readers() {
    let tmp = TempDir::new().unwrap();
    let index = open(tmp.path());
    for n in 0..100 {
        index.add(&format!("stream-{n}"), value(n)).unwrap();
    }

    std::thread::scope(|scope| {
        for t in 0..4 {
            let index = &index;
            scope.spawn(move || {
                for n in (t..100).step_by(4) {
                    assert_eq!(
                        index.try_get_value(&format!("stream-{n}")).unwrap(),
                        Some(value(n))
                    );
                }
            });
        }
        scope.spawn(|| {
            for n in 100..150 {
                index.add(&format!("stream-{n}"), value(n)).unwrap();
            }
        });
    });

    assert_eq!(index.last_value_added(), value(149));
}
