use std::sync::atomic::{AtomicI64, AtomicU8, AtomicUsize, Ordering};

/// Lifecycle of the engine as seen by workers and the drain controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
    Stopped,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Phase::Running,
            1 => Phase::Draining,
            _ => Phase::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Phase::Running => 0,
            Phase::Draining => 1,
            Phase::Stopped => 2,
        }
    }
}

/// Cells shared between the engine loop, the worker pool and the drain
/// controller. One instance per agent; hand it around as `Arc<AgentState>`.
#[derive(Debug)]
pub struct AgentState {
    /// Non-errored snapshots absorbed since the last successful flush.
    sequence: AtomicI64,
    phase: AtomicU8,
    active_workers: AtomicUsize,
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentState {
    pub fn new() -> Self {
        Self {
            sequence: AtomicI64::new(0),
            phase: AtomicU8::new(Phase::Running.as_u8()),
            active_workers: AtomicUsize::new(0),
        }
    }

    pub fn sequence(&self) -> i64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub(crate) fn record_snapshot(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Reads the counter and resets it to zero in one step.
    pub(crate) fn take_sequence(&self) -> i64 {
        self.sequence.swap(0, Ordering::SeqCst)
    }

    /// Puts a failed job's sequence back. The stored value is replaced, not
    /// added to, so snapshots absorbed since that flush are no longer counted.
    pub(crate) fn restore_sequence(&self, sequence: i64) {
        self.sequence.store(sequence, Ordering::SeqCst);
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    /// Moves `Running` to `Draining`. Returns false if a drain had already begun.
    pub(crate) fn begin_drain(&self) -> bool {
        self.phase
            .compare_exchange(
                Phase::Running.as_u8(),
                Phase::Draining.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub(crate) fn mark_stopped(&self) {
        self.phase.store(Phase::Stopped.as_u8(), Ordering::SeqCst);
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    /// Counts the caller as an active worker until the guard is dropped.
    pub(crate) fn enter_worker(&self) -> WorkerGuard<'_> {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
        WorkerGuard { state: self }
    }
}

pub(crate) struct WorkerGuard<'a> {
    state: &'a AgentState,
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        self.state.active_workers.fetch_sub(1, Ordering::SeqCst);
    }
}
