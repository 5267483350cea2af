use crate::error::{AgentError, Result};
use crate::state::AgentState;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const INITIAL_POLL: Duration = Duration::from_millis(1);
const MAX_POLL: Duration = Duration::from_secs(10);

/// Poll schedule for the active-worker count: each interval is the base plus
/// up to 10% jitter, and the base doubles after every poll up to 10s.
#[derive(Debug)]
pub struct DrainBackoff {
    base: Duration,
}

impl Default for DrainBackoff {
    fn default() -> Self {
        Self { base: INITIAL_POLL }
    }
}

impl DrainBackoff {
    pub fn next_interval(&mut self) -> Duration {
        let jitter_cap = (self.base.as_nanos() / 10).max(1) as u64;
        let jitter = Duration::from_nanos(rand::thread_rng().gen_range(0..jitter_cap));
        let interval = self.base + jitter;
        self.base = (self.base * 2).min(MAX_POLL);
        interval
    }
}

/// Stops new dispatch and waits for in-flight deliveries to finish.
#[derive(Clone)]
pub struct DrainController {
    state: Arc<AgentState>,
}

impl DrainController {
    pub fn new(state: Arc<AgentState>) -> Self {
        Self { state }
    }

    /// Flags the engine as draining, then polls until no worker is active or
    /// `deadline` passes. The engine notices the flag on its next tick and
    /// closes the dispatch queue, which lets idle workers exit.
    pub async fn drain(&self, deadline: Instant) -> Result<()> {
        if self.state.begin_drain() {
            tracing::info!(active = self.state.active_workers(), "Draining workers");
        }

        let mut backoff = DrainBackoff::default();
        let expired = tokio::time::sleep_until(deadline);
        tokio::pin!(expired);

        loop {
            let active = self.state.active_workers();
            if active == 0 {
                self.state.mark_stopped();
                tracing::info!("All workers finished");
                return Ok(());
            }

            tokio::select! {
                _ = &mut expired => {
                    tracing::warn!(active, "Drain deadline reached");
                    return Err(AgentError::DrainDeadline { active });
                }
                _ = tokio::time::sleep(backoff.next_interval()) => {}
            }
        }
    }
}
