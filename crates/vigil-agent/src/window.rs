use crate::state::AgentState;
use std::collections::HashMap;
use std::sync::Arc;
use vigil_common::{MetricSample, Snapshot, SnapshotKind};

/// Work item handed from the engine to the worker pool.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub metrics: HashMap<String, MetricSample>,
    /// Snapshots absorbed into this job; becomes the `PollCount` delta.
    pub sequence: i64,
}

/// Accumulates snapshots between flushes.
///
/// A flush is only allowed once both a primary and a secondary snapshot have
/// been absorbed since the last flush, so every batch carries process and
/// host metrics together.
pub struct AggregationWindow {
    pending: Vec<Snapshot>,
    saw_primary: bool,
    saw_secondary: bool,
    state: Arc<AgentState>,
}

impl AggregationWindow {
    pub fn new(state: Arc<AgentState>) -> Self {
        Self {
            pending: Vec::new(),
            saw_primary: false,
            saw_secondary: false,
            state,
        }
    }

    /// Adds a snapshot to the window. Errored snapshots are logged and dropped
    /// without touching the flags or the sequence counter.
    pub fn absorb(&mut self, snapshot: Snapshot) {
        if let Some(error) = &snapshot.error {
            tracing::warn!(kind = %snapshot.kind, error = %error, "Sampler reported error, snapshot dropped");
            return;
        }

        match snapshot.kind {
            SnapshotKind::Primary => self.saw_primary = true,
            SnapshotKind::Secondary => self.saw_secondary = true,
        }
        self.pending.push(snapshot);
        self.state.record_snapshot();
    }

    pub fn is_complete(&self) -> bool {
        self.saw_primary && self.saw_secondary
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Folds the pending snapshots into one job and resets the window,
    /// flags included.
    ///
    /// Returns `None`, leaving everything untouched, while the window is
    /// empty or has not yet seen both snapshot kinds. When two snapshots
    /// carry the same metric name, the earliest-absorbed one wins.
    pub fn try_flush(&mut self) -> Option<DispatchJob> {
        if self.pending.is_empty() || !self.is_complete() {
            return None;
        }

        let mut metrics = HashMap::new();
        // Newest first, so older readings overwrite newer ones.
        for snapshot in self.pending.drain(..).rev() {
            metrics.extend(snapshot.samples);
        }

        self.saw_primary = false;
        self.saw_secondary = false;
        let sequence = self.state.take_sequence();
        Some(DispatchJob { metrics, sequence })
    }
}
