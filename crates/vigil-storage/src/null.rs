use crate::error::Result;
use crate::{CounterSemantics, MetricValue, StorageBackend};
use vigil_common::{MetricKind, MetricTable};

/// Backend for a purely in-memory collector. Writes are discarded and
/// reads find nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl StorageBackend for NullBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn counter_semantics(&self) -> CounterSemantics {
        CounterSemantics::Absolute
    }

    fn set(&self, _key: &str, _value: MetricValue) -> Result<()> {
        Ok(())
    }

    fn set_batch(&self, _batch: &MetricTable) -> Result<()> {
        Ok(())
    }

    fn get(&self, _kind: MetricKind, _key: &str) -> Result<Option<MetricValue>> {
        Ok(None)
    }

    fn get_all(&self) -> Result<MetricTable> {
        Ok(MetricTable::new())
    }

    fn store_snapshot(&self, _table: &MetricTable) -> Result<()> {
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }
}
