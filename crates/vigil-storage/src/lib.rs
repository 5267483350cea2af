//! Metric storage for the vigil collector.
//!
//! [`store::MetricStore`] keeps the authoritative gauge and counter table in
//! memory and mirrors writes to a [`StorageBackend`]:
//!
//! - [`file::FileBackend`]: one JSON document holding the whole table.
//! - [`sqlite::SqliteBackend`]: a SQLite database with WAL mode, one table
//!   per metric kind.
//! - [`null::NullBackend`]: nothing is persisted.
//!
//! Writes are mirrored either synchronously, on every update, or by the
//! periodic task in [`flush`], which overwrites the backend with a full
//! snapshot.

pub mod error;
pub mod file;
pub mod flush;
pub mod null;
pub mod sqlite;
pub mod store;

#[cfg(test)]
mod tests;

pub use error::{Result, StorageError};
pub use store::MetricStore;

use vigil_common::{format_counter, format_gauge, parse_counter, parse_gauge};
use vigil_common::{MetricError, MetricKind, MetricTable};

/// A parsed metric value.
///
/// # Examples
///
/// ```
/// use vigil_common::MetricKind;
/// use vigil_storage::MetricValue;
///
/// let value = MetricValue::parse(MetricKind::Gauge, "100.0").unwrap();
/// assert_eq!(value, MetricValue::Gauge(100.0));
/// assert_eq!(value.to_string(), "100");
/// assert!(MetricValue::parse(MetricKind::Counter, "1.5").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn parse(kind: MetricKind, raw: &str) -> std::result::Result<Self, MetricError> {
        match kind {
            MetricKind::Gauge => parse_gauge(raw).map(MetricValue::Gauge),
            MetricKind::Counter => parse_counter(raw).map(MetricValue::Counter),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Gauge(v) => f.write_str(&format_gauge(*v)),
            MetricValue::Counter(v) => f.write_str(&format_counter(*v)),
        }
    }
}

/// What a backend expects in the counter slot of a mirrored write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterSemantics {
    /// The running total; the backend stores it as is.
    Absolute,
    /// The increment; the backend adds it to what it holds.
    Delta,
}

/// Persistence backend behind [`MetricStore`].
///
/// Implementations must be safe to share across threads (`Send + Sync`)
/// because request handlers and the periodic flush task use the store
/// concurrently.
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn counter_semantics(&self) -> CounterSemantics;

    /// Writes one metric. Gauges always overwrite; counters follow
    /// [`Self::counter_semantics`].
    fn set(&self, key: &str, value: MetricValue) -> Result<()>;

    /// Writes every entry of `batch` as one unit.
    fn set_batch(&self, batch: &MetricTable) -> Result<()>;

    fn get(&self, kind: MetricKind, key: &str) -> Result<Option<MetricValue>>;

    fn get_all(&self) -> Result<MetricTable>;

    /// Overwrites every key in `table` with its value, counters included,
    /// regardless of [`Self::counter_semantics`].
    fn store_snapshot(&self, table: &MetricTable) -> Result<()>;

    /// Checks that the backend is reachable.
    fn ping(&self) -> Result<()>;
}
