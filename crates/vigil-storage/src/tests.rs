use crate::file::FileBackend;
use crate::flush::spawn_periodic_flush;
use crate::null::NullBackend;
use crate::sqlite::SqliteBackend;
use crate::{MetricStore, MetricValue, StorageBackend, StorageError};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use vigil_common::{MetricKind, MetricTable, RetryPolicy, WireMetric};

fn memory_store() -> MetricStore {
    MetricStore::new(Arc::new(NullBackend), true)
}

fn file_backend(dir: &TempDir) -> Arc<FileBackend> {
    Arc::new(FileBackend::open(&dir.path().join("metrics.json")).unwrap())
}

#[test]
fn counter_accumulates_across_updates() {
    let store = memory_store();
    for delta in ["12", "2", "8", "-7"] {
        store.set(MetricKind::Counter, "PollCount", delta).unwrap();
    }
    assert_eq!(
        store.get(MetricKind::Counter, "PollCount").unwrap(),
        MetricValue::Counter(15)
    );
}

#[test]
fn gauge_keeps_last_value() {
    let store = memory_store();
    store.set(MetricKind::Gauge, "Alloc", "100.0").unwrap();
    let stored = store.set(MetricKind::Gauge, "Alloc", "-123.456").unwrap();
    assert_eq!(stored.to_string(), "-123.456");
    assert_eq!(
        store.get(MetricKind::Gauge, "Alloc").unwrap(),
        MetricValue::Gauge(-123.456)
    );
}

#[test]
fn set_returns_running_total() {
    let store = memory_store();
    store.set(MetricKind::Counter, "Hits", "5").unwrap();
    let stored = store.set(MetricKind::Counter, "Hits", "3").unwrap();
    assert_eq!(stored, MetricValue::Counter(8));
}

#[test]
fn unparsable_value_leaves_table_untouched() {
    let store = memory_store();
    store.set(MetricKind::Counter, "Hits", "5").unwrap();

    let err = store.set(MetricKind::Counter, "Hits", "1.5").unwrap_err();
    assert!(matches!(err, StorageError::Metric(_)));
    assert!(!err.is_backend_failure());
    assert_eq!(
        store.get(MetricKind::Counter, "Hits").unwrap(),
        MetricValue::Counter(5)
    );
}

#[test]
fn non_finite_gauge_never_reaches_backends() {
    let dir = TempDir::new().unwrap();
    let backend = file_backend(&dir);
    let store = MetricStore::new(backend.clone(), true);

    for raw in ["NaN", "inf", "-infinity"] {
        let err = store.set(MetricKind::Gauge, "Weird", raw).unwrap_err();
        assert!(matches!(err, StorageError::Metric(_)), "{raw}");
    }
    store.set(MetricKind::Gauge, "Alloc", "1").unwrap();

    let reopened = MetricStore::new(file_backend(&dir), true);
    assert_eq!(reopened.restore().unwrap(), 1);
    assert!(reopened.get(MetricKind::Gauge, "Weird").is_err());

    let sqlite = Arc::new(SqliteBackend::in_memory().unwrap());
    let deferred = MetricStore::new(sqlite.clone(), false);
    assert!(deferred.set(MetricKind::Gauge, "Weird", "NaN").is_err());
    assert!(deferred
        .set_batch(&[WireMetric::gauge("Weird", f64::NAN)])
        .is_err());
    deferred.set(MetricKind::Counter, "PollCount", "2").unwrap();
    deferred.flush().unwrap();
    assert_eq!(
        sqlite.get(MetricKind::Counter, "PollCount").unwrap(),
        Some(MetricValue::Counter(2))
    );
}

#[test]
fn batch_counter_sum_wraps_instead_of_panicking() {
    let store = memory_store();
    store
        .set_batch(&[
            WireMetric::counter("Hits", i64::MAX),
            WireMetric::counter("Hits", 1),
        ])
        .unwrap();
    assert_eq!(
        store.get(MetricKind::Counter, "Hits").unwrap(),
        MetricValue::Counter(i64::MIN)
    );
}

#[test]
fn kinds_have_separate_namespaces() {
    let store = memory_store();
    store.set(MetricKind::Gauge, "Shared", "1.5").unwrap();
    assert!(matches!(
        store.get(MetricKind::Counter, "Shared"),
        Err(StorageError::NotFound {
            kind: MetricKind::Counter,
            ..
        })
    ));
}

#[test]
fn batch_is_validated_before_applying() {
    let store = memory_store();
    let bad = WireMetric {
        id: "Broken".into(),
        kind: MetricKind::Counter,
        value: Some(1.0),
        delta: None,
    };
    let result = store.set_batch(&[WireMetric::gauge("Alloc", 1.0), bad]);
    assert!(matches!(result, Err(StorageError::Metric(_))));
    assert!(store.get_all().is_empty());
}

#[test]
fn batch_sums_repeated_counters() {
    let store = memory_store();
    store.set(MetricKind::Counter, "PollCount", "1").unwrap();
    store
        .set_batch(&[
            WireMetric::counter("PollCount", 2),
            WireMetric::counter("PollCount", 3),
            WireMetric::gauge("Alloc", 7.0),
        ])
        .unwrap();

    let table = store.get_all();
    assert_eq!(table.counters["PollCount"], 6);
    assert_eq!(table.gauges["Alloc"], 7.0);
}

#[test]
fn file_backend_mirrors_totals() {
    let dir = TempDir::new().unwrap();
    let backend = file_backend(&dir);
    let store = MetricStore::new(backend.clone(), true);

    store.set(MetricKind::Counter, "PollCount", "4").unwrap();
    store.set(MetricKind::Counter, "PollCount", "6").unwrap();
    store
        .set_batch(&[WireMetric::counter("PollCount", 5), WireMetric::gauge("Alloc", 2.5)])
        .unwrap();

    assert_eq!(
        backend.get(MetricKind::Counter, "PollCount").unwrap(),
        Some(MetricValue::Counter(15))
    );
    assert_eq!(
        backend.get(MetricKind::Gauge, "Alloc").unwrap(),
        Some(MetricValue::Gauge(2.5))
    );
    assert!(backend.get(MetricKind::Gauge, "Missing").unwrap().is_none());
}

#[test]
fn file_backend_document_layout() {
    let dir = TempDir::new().unwrap();
    let backend = file_backend(&dir);
    backend.set("Alloc", MetricValue::Gauge(1.5)).unwrap();
    backend.set("PollCount", MetricValue::Counter(3)).unwrap();

    let raw = std::fs::read_to_string(backend.path()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["gauges"]["Alloc"], 1.5);
    assert_eq!(doc["counters"]["PollCount"], 3);
}

#[test]
fn restore_is_idempotent() {
    let dir = TempDir::new().unwrap();
    {
        let store = MetricStore::new(file_backend(&dir), true);
        store.set(MetricKind::Counter, "PollCount", "9").unwrap();
        store.set(MetricKind::Gauge, "Alloc", "3.25").unwrap();
    }

    let store = MetricStore::new(file_backend(&dir), true);
    assert_eq!(store.restore().unwrap(), 2);
    assert_eq!(store.restore().unwrap(), 2);
    assert_eq!(
        store.get(MetricKind::Counter, "PollCount").unwrap(),
        MetricValue::Counter(9)
    );

    store.set(MetricKind::Counter, "PollCount", "1").unwrap();
    assert_eq!(
        store.get(MetricKind::Counter, "PollCount").unwrap(),
        MetricValue::Counter(10)
    );
}

#[test]
fn sqlite_backend_adds_counter_deltas() {
    let backend = Arc::new(SqliteBackend::in_memory().unwrap());
    let store = MetricStore::new(backend.clone(), true);

    store.set(MetricKind::Counter, "PollCount", "12").unwrap();
    store.set(MetricKind::Counter, "PollCount", "3").unwrap();
    store
        .set_batch(&[WireMetric::counter("PollCount", 5), WireMetric::counter("PollCount", 1)])
        .unwrap();
    store.set(MetricKind::Gauge, "Alloc", "1.0").unwrap();
    store.set(MetricKind::Gauge, "Alloc", "2.0").unwrap();

    assert_eq!(
        backend.get(MetricKind::Counter, "PollCount").unwrap(),
        Some(MetricValue::Counter(21))
    );
    assert_eq!(
        backend.get(MetricKind::Gauge, "Alloc").unwrap(),
        Some(MetricValue::Gauge(2.0))
    );
    assert_eq!(store.get_all(), backend.get_all().unwrap());
}

#[test]
fn sqlite_snapshot_overwrites_totals() {
    let backend = SqliteBackend::in_memory().unwrap();
    backend.set("PollCount", MetricValue::Counter(40)).unwrap();

    let mut table = MetricTable::new();
    table.counters.insert("PollCount".into(), 7);
    table.gauges.insert("Alloc".into(), 0.5);
    backend.store_snapshot(&table).unwrap();

    assert_eq!(backend.get_all().unwrap(), table);
    backend.ping().unwrap();
}

#[test]
fn sqlite_database_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data").join("metrics.db");
    {
        let backend = Arc::new(SqliteBackend::open(&path, &RetryPolicy::none()).unwrap());
        let store = MetricStore::new(backend, true);
        store.set(MetricKind::Counter, "PollCount", "5").unwrap();
    }

    let backend = Arc::new(SqliteBackend::open(&path, &RetryPolicy::none()).unwrap());
    let store = MetricStore::new(backend, true);
    store.restore().unwrap();
    store.restore().unwrap();
    assert_eq!(
        store.get(MetricKind::Counter, "PollCount").unwrap(),
        MetricValue::Counter(5)
    );
}

#[test]
fn deferred_store_writes_only_on_flush() {
    let dir = TempDir::new().unwrap();
    let backend = file_backend(&dir);
    let store = MetricStore::new(backend.clone(), false);

    store.set(MetricKind::Counter, "PollCount", "2").unwrap();
    assert!(backend.get_all().unwrap().is_empty());

    store.flush().unwrap();
    assert_eq!(backend.get_all().unwrap(), store.get_all());
}

#[tokio::test]
async fn periodic_flush_writes_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let backend = file_backend(&dir);
    let store = Arc::new(MetricStore::new(backend.clone(), false));
    let cancel = CancellationToken::new();
    let handle = spawn_periodic_flush(store.clone(), Duration::from_secs(300), cancel.clone());

    store.set(MetricKind::Gauge, "Alloc", "4.5").unwrap();
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(
        backend.get(MetricKind::Gauge, "Alloc").unwrap(),
        Some(MetricValue::Gauge(4.5))
    );
}

#[tokio::test]
async fn periodic_flush_runs_on_interval() {
    let dir = TempDir::new().unwrap();
    let backend = file_backend(&dir);
    let store = Arc::new(MetricStore::new(backend.clone(), false));
    store.set(MetricKind::Counter, "PollCount", "3").unwrap();

    let cancel = CancellationToken::new();
    let handle = spawn_periodic_flush(store, Duration::from_millis(20), cancel.clone());
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(
        backend.get(MetricKind::Counter, "PollCount").unwrap(),
        Some(MetricValue::Counter(3))
    );
    cancel.cancel();
    handle.await.unwrap();
}
