//! Metric samplers for the vigil agent.
//!
//! Each [`Sampler`] reads one family of metrics and returns a flat list of
//! [`MetricSample`]s. The agent runs every sampler on its own timer and
//! tags the result with the sampler's [`SnapshotKind`]:
//!
//! - [`runtime::RuntimeSampler`] (primary): this process and its async runtime.
//! - [`host::HostSampler`] (secondary): host memory and per-core CPU load.

pub mod host;
pub mod runtime;

use anyhow::Result;
use vigil_common::{MetricSample, Snapshot, SnapshotKind};

/// A metric source polled by the agent.
///
/// `sample` is called from a single task per sampler, so implementations
/// may keep mutable state (previous readings, refreshed system handles)
/// between calls.
pub trait Sampler: Send {
    /// Short name used in logs (e.g. `"runtime"`, `"host"`).
    fn name(&self) -> &str;

    /// Which half of the aggregation window this sampler fills.
    fn kind(&self) -> SnapshotKind;

    /// Takes one reading of every metric this sampler knows about.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails. The agent
    /// forwards the failure as an errored [`Snapshot`].
    fn sample(&mut self) -> Result<Vec<MetricSample>>;

    /// Samples once and packages the outcome as a [`Snapshot`].
    fn snapshot(&mut self) -> Snapshot {
        match self.sample() {
            Ok(samples) => Snapshot::new(self.kind(), samples),
            Err(e) => Snapshot::failed(self.kind(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl Sampler for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn kind(&self) -> SnapshotKind {
            SnapshotKind::Secondary
        }

        fn sample(&mut self) -> Result<Vec<MetricSample>> {
            anyhow::bail!("sensor unavailable")
        }
    }

    #[test]
    fn failing_sample_becomes_errored_snapshot() {
        let snapshot = Broken.snapshot();
        assert_eq!(snapshot.kind, SnapshotKind::Secondary);
        assert_eq!(snapshot.error.as_deref(), Some("sensor unavailable"));
    }

    #[test]
    fn host_sampler_reports_memory() {
        let mut sampler = host::HostSampler::new();
        let snapshot = sampler.snapshot();
        assert!(snapshot.error.is_none());
        assert!(snapshot.samples.contains_key("TotalMemory"));
        assert!(snapshot.samples.contains_key("FreeMemory"));
    }

    #[test]
    fn runtime_sampler_reports_process_metrics() {
        let mut sampler = runtime::RuntimeSampler::new();
        let snapshot = sampler.snapshot();
        assert_eq!(snapshot.kind, SnapshotKind::Primary);
        assert!(snapshot.samples.contains_key("RandomValue"));
        assert!(snapshot.samples.contains_key("ProcessResidentMemory"));
    }
}
