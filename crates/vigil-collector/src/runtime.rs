use crate::Sampler;
use anyhow::Result;
use rand::Rng;
use sysinfo::{Pid, ProcessesToUpdate, System};
use vigil_common::{MetricSample, SnapshotKind};

/// Counters about the agent process itself: memory, CPU, uptime and the
/// async runtime it is scheduled on.
pub struct RuntimeSampler {
    system: System,
    pid: Option<Pid>,
}

impl RuntimeSampler {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        let mut system = System::new();
        if let Some(pid) = pid {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        }
        Self { system, pid }
    }
}

impl Default for RuntimeSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for RuntimeSampler {
    fn name(&self) -> &str {
        "runtime"
    }

    fn kind(&self) -> SnapshotKind {
        SnapshotKind::Primary
    }

    fn sample(&mut self) -> Result<Vec<MetricSample>> {
        let pid = self
            .pid
            .ok_or_else(|| anyhow::anyhow!("current process id unavailable"))?;
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        let process = self
            .system
            .process(pid)
            .ok_or_else(|| anyhow::anyhow!("process {pid} not found"))?;

        let mut samples = vec![
            MetricSample::gauge("ProcessResidentMemory", process.memory() as f64),
            MetricSample::gauge("ProcessVirtualMemory", process.virtual_memory() as f64),
            MetricSample::gauge("ProcessCpuUsage", process.cpu_usage() as f64),
            MetricSample::gauge("ProcessRunTime", process.run_time() as f64),
        ];

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let metrics = handle.metrics();
            samples.push(MetricSample::gauge(
                "RuntimeWorkers",
                metrics.num_workers() as f64,
            ));
            samples.push(MetricSample::gauge(
                "RuntimeAliveTasks",
                metrics.num_alive_tasks() as f64,
            ));
        }

        samples.push(MetricSample::gauge(
            "RandomValue",
            rand::thread_rng().gen::<f64>(),
        ));

        Ok(samples)
    }
}
