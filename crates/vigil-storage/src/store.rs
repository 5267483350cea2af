use crate::error::{Result, StorageError};
use crate::{CounterSemantics, MetricValue, StorageBackend};
use std::sync::{Arc, Mutex, MutexGuard};
use vigil_common::{MetricKind, MetricTable, WireMetric};

/// The collector's metric table.
///
/// Memory is authoritative: reads never touch the backend. With
/// `sync_writes` every update is mirrored to the backend before it returns;
/// otherwise the backend only sees [`MetricStore::flush`] snapshots.
pub struct MetricStore {
    table: Mutex<MetricTable>,
    backend: Arc<dyn StorageBackend>,
    sync_writes: bool,
}

impl MetricStore {
    pub fn new(backend: Arc<dyn StorageBackend>, sync_writes: bool) -> Self {
        Self {
            table: Mutex::new(MetricTable::new()),
            backend,
            sync_writes,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Lock the table, recovering from a poisoned Mutex if necessary.
    fn lock_table(&self) -> MutexGuard<'_, MetricTable> {
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Parses `raw` as a value of `kind` and applies it: gauges are replaced,
    /// counters add to the running total. Returns the value now stored.
    ///
    /// Nothing changes if `raw` does not parse. If the mirrored write fails
    /// the in-memory update stays in place and the error is returned.
    pub fn set(&self, kind: MetricKind, key: &str, raw: &str) -> Result<MetricValue> {
        let value = MetricValue::parse(kind, raw)?;

        let mut table = self.lock_table();
        let (stored, mirrored) = match value {
            MetricValue::Gauge(v) => {
                table.gauges.insert(key.to_string(), v);
                (value, value)
            }
            MetricValue::Counter(delta) => {
                let total = table.counters.entry(key.to_string()).or_insert(0);
                *total = total.wrapping_add(delta);
                let stored = MetricValue::Counter(*total);
                match self.backend.counter_semantics() {
                    CounterSemantics::Absolute => (stored, stored),
                    CounterSemantics::Delta => (stored, value),
                }
            }
        };

        if self.sync_writes {
            self.backend.set(key, mirrored)?;
        }
        Ok(stored)
    }

    /// Applies a whole batch. Every entry is validated before any is
    /// applied; repeated counter ids in one batch add up.
    pub fn set_batch(&self, metrics: &[WireMetric]) -> Result<()> {
        let batch = MetricTable::from_wire(metrics)?;

        let mut table = self.lock_table();
        for (key, value) in &batch.gauges {
            table.gauges.insert(key.clone(), *value);
        }
        for (key, delta) in &batch.counters {
            let total = table.counters.entry(key.clone()).or_insert(0);
            *total = total.wrapping_add(*delta);
        }

        if self.sync_writes {
            match self.backend.counter_semantics() {
                CounterSemantics::Delta => self.backend.set_batch(&batch)?,
                CounterSemantics::Absolute => {
                    let totals = MetricTable {
                        gauges: batch.gauges.clone(),
                        counters: batch
                            .counters
                            .keys()
                            .map(|key| (key.clone(), table.counters[key]))
                            .collect(),
                    };
                    self.backend.set_batch(&totals)?;
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, kind: MetricKind, key: &str) -> Result<MetricValue> {
        let table = self.lock_table();
        let value = match kind {
            MetricKind::Gauge => table.gauges.get(key).copied().map(MetricValue::Gauge),
            MetricKind::Counter => table.counters.get(key).copied().map(MetricValue::Counter),
        };
        value.ok_or_else(|| StorageError::NotFound {
            kind,
            key: key.to_string(),
        })
    }

    /// Copy of the whole table.
    pub fn get_all(&self) -> MetricTable {
        self.lock_table().clone()
    }

    pub fn ping(&self) -> Result<()> {
        self.backend.ping()
    }

    /// Loads everything the backend holds into memory, replacing values for
    /// the same keys. Nothing is mirrored back. Returns the number of
    /// metrics loaded.
    pub fn restore(&self) -> Result<usize> {
        let stored = self.backend.get_all()?;
        let count = stored.len();

        let mut table = self.lock_table();
        table.gauges.extend(stored.gauges);
        table.counters.extend(stored.counters);
        tracing::info!(backend = self.backend.name(), count, "Restored metrics");
        Ok(count)
    }

    /// Writes the whole table to the backend, overwriting what it holds.
    pub fn flush(&self) -> Result<()> {
        let snapshot = self.get_all();
        self.backend.store_snapshot(&snapshot)?;
        tracing::debug!(backend = self.backend.name(), count = snapshot.len(), "Flushed metrics");
        Ok(())
    }
}
