use crate::delivery::Delivery;
use crate::error::{AgentError, Result};
use crate::state::AgentState;
use crate::window::{AggregationWindow, DispatchJob};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use vigil_common::Snapshot;

/// Outcome of one dispatched job, reported back to the engine.
#[derive(Debug)]
pub struct JobResult {
    pub error: Option<AgentError>,
    pub sequence: i64,
}

/// Owns the aggregation window and the worker pool.
///
/// The dispatch queue holds `rate_limit` jobs and `rate_limit + 1` workers
/// consume it. A job whose delivery fails puts its sequence back into the
/// shared counter, so the next batch's `PollCount` reflects it.
pub struct Engine {
    state: Arc<AgentState>,
    delivery: Arc<Delivery>,
    report_interval: Duration,
    rate_limit: usize,
}

impl Engine {
    pub fn new(
        state: Arc<AgentState>,
        delivery: Arc<Delivery>,
        report_interval: Duration,
        rate_limit: usize,
    ) -> Self {
        Self {
            state,
            delivery,
            report_interval,
            rate_limit: rate_limit.max(1),
        }
    }

    pub fn state(&self) -> Arc<AgentState> {
        self.state.clone()
    }

    /// Runs until `cancel` fires (returns `Ok`) or a drain is observed on a
    /// report tick (returns [`AgentError::Closed`]). Either way the dispatch
    /// queue is closed on return so idle workers exit.
    pub async fn run(
        &self,
        mut snapshots: mpsc::Receiver<Snapshot>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let (jobs_tx, jobs_rx) = mpsc::channel::<DispatchJob>(self.rate_limit);
        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<JobResult>();
        let jobs_rx = Arc::new(Mutex::new(jobs_rx));

        let workers = self.rate_limit + 1;
        for id in 0..workers {
            tokio::spawn(worker(
                id,
                jobs_rx.clone(),
                results_tx.clone(),
                self.delivery.clone(),
                self.state.clone(),
            ));
        }
        drop(results_tx);
        tracing::info!(
            workers,
            queue = self.rate_limit,
            report_interval_secs = self.report_interval.as_secs(),
            "Engine started"
        );

        let mut window = AggregationWindow::new(self.state.clone());
        let mut tick = interval_at(Instant::now() + self.report_interval, self.report_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut snapshots_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Engine cancelled");
                    return Ok(());
                }
                next = snapshots.recv(), if snapshots_open => match next {
                    Some(snapshot) => window.absorb(snapshot),
                    None => {
                        tracing::debug!("Snapshot stream closed");
                        snapshots_open = false;
                    }
                },
                Some(result) = results_rx.recv() => {
                    if let Some(error) = result.error {
                        tracing::warn!(error = %error, sequence = result.sequence, "Dispatch failed, keeping poll count");
                        self.state.restore_sequence(result.sequence);
                    }
                }
                _ = tick.tick() => {
                    if !self.state.is_running() {
                        tracing::info!("Drain requested, closing dispatch queue");
                        return Err(AgentError::Closed);
                    }
                    if let Some(job) = window.try_flush() {
                        tracing::debug!(metrics = job.metrics.len(), sequence = job.sequence, "Dispatching batch");
                        if jobs_tx.send(job).await.is_err() {
                            return Err(AgentError::Closed);
                        }
                    }
                }
            }
        }
    }
}

async fn worker(
    id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<DispatchJob>>>,
    results: mpsc::UnboundedSender<JobResult>,
    delivery: Arc<Delivery>,
    state: Arc<AgentState>,
) {
    let _active = state.enter_worker();
    loop {
        let job = jobs.lock().await.recv().await;
        let Some(job) = job else { break };

        if !state.is_running() {
            tracing::warn!(worker = id, sequence = job.sequence, "Draining, job discarded");
            break;
        }

        let sequence = job.sequence;
        let error = delivery.deliver(job).await.err();
        if results.send(JobResult { error, sequence }).is_err() {
            break;
        }
    }
    tracing::debug!(worker = id, "Worker stopped");
}
