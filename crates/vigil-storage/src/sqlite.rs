use crate::error::Result;
use crate::{CounterSemantics, MetricValue, StorageBackend};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use vigil_common::{MetricKind, MetricTable, RetryPolicy};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS gauges (
    key TEXT PRIMARY KEY,
    value REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS counters (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
";

const UPSERT_GAUGE: &str = "INSERT INTO gauges (key, value) VALUES (?1, ?2)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value";

const ADD_COUNTER: &str = "INSERT INTO counters (key, value) VALUES (?1, ?2)
     ON CONFLICT(key) DO UPDATE SET value = counters.value + excluded.value";

const REPLACE_COUNTER: &str = "INSERT INTO counters (key, value) VALUES (?1, ?2)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value";

/// SQLite-backed metric storage.
///
/// Counter writes are increments: the stored total grows by the value
/// passed in. Full snapshots overwrite totals instead.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (or creates) the database at `path`, retrying transient
    /// failures such as a locked file.
    pub fn open(path: &Path, retry: &RetryPolicy) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = retry.run_blocking(
            || -> rusqlite::Result<Connection> {
                let conn = Connection::open(path)?;
                conn.execute_batch("PRAGMA journal_mode=WAL;")?;
                conn.execute_batch(SCHEMA)?;
                Ok(conn)
            },
            |e: &rusqlite::Error| {
                let transient = is_transient(e);
                if transient {
                    tracing::warn!(path = %path.display(), error = %e, "Database not ready, retrying");
                }
                transient
            },
        )?;
        tracing::info!(path = %path.display(), "Opened metrics database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_table(&self, table: &MetricTable, counter_sql: &str) -> Result<()> {
        let conn = self.lock_conn();
        let tx = conn.unchecked_transaction()?;
        {
            let mut gauge_stmt = tx.prepare_cached(UPSERT_GAUGE)?;
            for (key, value) in &table.gauges {
                gauge_stmt.execute(rusqlite::params![key, value])?;
            }
            let mut counter_stmt = tx.prepare_cached(counter_sql)?;
            for (key, value) in &table.counters {
                counter_stmt.execute(rusqlite::params![key, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn is_transient(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen)
    )
}

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn counter_semantics(&self) -> CounterSemantics {
        CounterSemantics::Delta
    }

    fn set(&self, key: &str, value: MetricValue) -> Result<()> {
        let conn = self.lock_conn();
        match value {
            MetricValue::Gauge(v) => conn.execute(UPSERT_GAUGE, rusqlite::params![key, v])?,
            MetricValue::Counter(v) => conn.execute(ADD_COUNTER, rusqlite::params![key, v])?,
        };
        Ok(())
    }

    fn set_batch(&self, batch: &MetricTable) -> Result<()> {
        self.write_table(batch, ADD_COUNTER)
    }

    fn get(&self, kind: MetricKind, key: &str) -> Result<Option<MetricValue>> {
        let conn = self.lock_conn();
        let value = match kind {
            MetricKind::Gauge => conn
                .query_row(
                    "SELECT value FROM gauges WHERE key = ?1 LIMIT 1",
                    [key],
                    |row| row.get::<_, f64>(0),
                )
                .optional()?
                .map(MetricValue::Gauge),
            MetricKind::Counter => conn
                .query_row(
                    "SELECT value FROM counters WHERE key = ?1 LIMIT 1",
                    [key],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .map(MetricValue::Counter),
        };
        Ok(value)
    }

    fn get_all(&self) -> Result<MetricTable> {
        let conn = self.lock_conn();
        let mut table = MetricTable::new();

        let mut stmt = conn.prepare_cached("SELECT key, value FROM gauges")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?;
        for row in rows {
            let (key, value) = row?;
            table.gauges.insert(key, value);
        }

        let mut stmt = conn.prepare_cached("SELECT key, value FROM counters")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (key, value) = row?;
            table.counters.insert(key, value);
        }

        Ok(table)
    }

    fn store_snapshot(&self, table: &MetricTable) -> Result<()> {
        self.write_table(table, REPLACE_COUNTER)
    }

    fn ping(&self) -> Result<()> {
        self.lock_conn()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}
