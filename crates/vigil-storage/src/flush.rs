use crate::store::MetricStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Snapshots `store` to its backend every `every`, plus once more when
/// `cancel` fires. Failures are logged and the loop keeps going.
pub fn spawn_periodic_flush(
    store: Arc<MetricStore>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = every.as_secs(), backend = store.backend_name(), "Periodic flush started");
        let mut tick = interval_at(Instant::now() + every, every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => flush_logged(&store).await,
            }
        }

        flush_logged(&store).await;
        tracing::info!("Periodic flush stopped");
    })
}

async fn flush_logged(store: &Arc<MetricStore>) {
    let store = store.clone();
    match tokio::task::spawn_blocking(move || store.flush()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Metric flush failed"),
        Err(e) => tracing::error!(error = %e, "Metric flush task panicked"),
    }
}
