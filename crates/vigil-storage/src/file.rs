use crate::error::Result;
use crate::{CounterSemantics, MetricValue, StorageBackend};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use vigil_common::{MetricKind, MetricTable};

/// Keeps the whole table as one JSON document, rewritten on every change.
///
/// Counters are stored as running totals, so callers pass absolute values.
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileBackend {
    /// Opens or creates the snapshot file. Parent directories are created.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        tracing::info!(path = %path.display(), "Opened snapshot file");
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock the file, recovering from a poisoned Mutex if necessary.
    fn lock_file(&self) -> MutexGuard<'_, File> {
        self.file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_table(file: &mut File) -> Result<MetricTable> {
        file.seek(SeekFrom::Start(0))?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(MetricTable::new());
        }
        Ok(serde_json::from_slice(&raw)?)
    }

    fn write_table(file: &mut File, table: &MetricTable) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(table)?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&encoded)?;
        file.flush()?;
        Ok(())
    }

    /// Decode, mutate and re-encode the document under the file lock.
    fn update(&self, f: impl FnOnce(&mut MetricTable)) -> Result<()> {
        let mut file = self.lock_file();
        let mut table = Self::read_table(&mut file)?;
        f(&mut table);
        Self::write_table(&mut file, &table)
    }
}

impl StorageBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn counter_semantics(&self) -> CounterSemantics {
        CounterSemantics::Absolute
    }

    fn set(&self, key: &str, value: MetricValue) -> Result<()> {
        self.update(|table| match value {
            MetricValue::Gauge(v) => {
                table.gauges.insert(key.to_string(), v);
            }
            MetricValue::Counter(v) => {
                table.counters.insert(key.to_string(), v);
            }
        })
    }

    fn set_batch(&self, batch: &MetricTable) -> Result<()> {
        self.update(|table| {
            table
                .gauges
                .extend(batch.gauges.iter().map(|(k, v)| (k.clone(), *v)));
            table
                .counters
                .extend(batch.counters.iter().map(|(k, v)| (k.clone(), *v)));
        })
    }

    fn get(&self, kind: MetricKind, key: &str) -> Result<Option<MetricValue>> {
        let table = Self::read_table(&mut self.lock_file())?;
        Ok(match kind {
            MetricKind::Gauge => table.gauges.get(key).copied().map(MetricValue::Gauge),
            MetricKind::Counter => table.counters.get(key).copied().map(MetricValue::Counter),
        })
    }

    fn get_all(&self) -> Result<MetricTable> {
        Self::read_table(&mut self.lock_file())
    }

    fn store_snapshot(&self, table: &MetricTable) -> Result<()> {
        Self::write_table(&mut self.lock_file(), table)
    }

    fn ping(&self) -> Result<()> {
        self.lock_file().metadata()?;
        Ok(())
    }
}
