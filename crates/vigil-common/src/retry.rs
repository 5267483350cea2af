use serde::Deserialize;
use std::time::Duration;

/// Linear retry schedule: `attempts` tries in total, waiting
/// `start_delay_ms`, then `start_delay_ms + step_ms`, and so on between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_start_delay_ms() -> u64 {
    1000
}

fn default_step_ms() -> u64 {
    2000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            start_delay_ms: default_start_delay_ms(),
            step_ms: default_step_ms(),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            start_delay_ms: 0,
            step_ms: 0,
        }
    }

    /// Wait before retry number `retry` (0-based, so the wait after the first
    /// failed attempt is `delay(0)`).
    pub fn delay(&self, retry: u32) -> Duration {
        Duration::from_millis(
            self.start_delay_ms
                .saturating_add(self.step_ms.saturating_mul(u64::from(retry))),
        )
    }

    /// Runs `op` until it succeeds, the schedule is exhausted, or
    /// `is_transient` rejects an error. Blocks the calling thread between tries.
    pub fn run_blocking<T, E>(
        &self,
        mut op: impl FnMut() -> Result<T, E>,
        is_transient: impl Fn(&E) -> bool,
    ) -> Result<T, E> {
        let attempts = self.attempts.max(1);
        let mut retry = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if retry + 1 >= attempts || !is_transient(&e) => return Err(e),
                Err(_) => {
                    std::thread::sleep(self.delay(retry));
                    retry += 1;
                }
            }
        }
    }
}
