use crate::Sampler;
use anyhow::Result;
use sysinfo::System;
use vigil_common::{MetricSample, SnapshotKind};

/// Host memory and per-core CPU utilisation.
pub struct HostSampler {
    system: System,
}

impl HostSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes; prime the first one.
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for HostSampler {
    fn name(&self) -> &str {
        "host"
    }

    fn kind(&self) -> SnapshotKind {
        SnapshotKind::Secondary
    }

    fn sample(&mut self) -> Result<Vec<MetricSample>> {
        self.system.refresh_memory();
        self.system.refresh_cpu_all();

        let total = self.system.total_memory();
        if total == 0 {
            anyhow::bail!("host memory information unavailable");
        }

        let mut samples = vec![
            MetricSample::gauge("TotalMemory", total as f64),
            MetricSample::gauge("FreeMemory", self.system.free_memory() as f64),
        ];

        for (i, cpu) in self.system.cpus().iter().enumerate() {
            samples.push(MetricSample::gauge(
                format!("CPUutilization{}", i + 1),
                cpu.cpu_usage() as f64,
            ));
        }

        Ok(samples)
    }
}
