//! Sampler tasks and the merge point that funnels their snapshots into a
//! single stream for the engine.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use vigil_collector::Sampler;
use vigil_common::Snapshot;

const SAMPLER_BUFFER: usize = 16;

/// Runs `sampler` every `every` until `cancel` fires or the receiver is
/// dropped. The first reading is taken immediately.
pub fn spawn_sampler(
    mut sampler: Box<dyn Sampler>,
    every: Duration,
    cancel: CancellationToken,
) -> mpsc::Receiver<Snapshot> {
    let (tx, rx) = mpsc::channel(SAMPLER_BUFFER);
    tokio::spawn(async move {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let snapshot = sampler.snapshot();
                    tracing::debug!(
                        sampler = sampler.name(),
                        count = snapshot.samples.len(),
                        failed = snapshot.is_failed(),
                        "Sampled"
                    );
                    if tx.send(snapshot).await.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(sampler = sampler.name(), "Sampler stopped");
    });
    rx
}

/// Merges any number of snapshot streams into one.
///
/// Each source keeps its own order in the output; no order is implied
/// between sources. The output closes once every source has either closed
/// or stopped forwarding because `cancel` fired.
pub fn fan_in(
    sources: Vec<mpsc::Receiver<Snapshot>>,
    cancel: CancellationToken,
) -> mpsc::Receiver<Snapshot> {
    let (tx, rx) = mpsc::channel(SAMPLER_BUFFER * sources.len().max(1));
    for mut source in sources {
        let tx = tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = source.recv() => match next {
                        Some(snapshot) => {
                            if tx.send(snapshot).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_common::{MetricSample, SnapshotKind};

    struct Counting {
        kind: SnapshotKind,
        calls: i64,
    }

    impl Sampler for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn kind(&self) -> SnapshotKind {
            self.kind
        }

        fn sample(&mut self) -> anyhow::Result<Vec<MetricSample>> {
            self.calls += 1;
            Ok(vec![MetricSample::counter("Calls", self.calls)])
        }
    }

    fn numbered(kind: SnapshotKind, n: i64) -> Snapshot {
        Snapshot::new(kind, [MetricSample::counter("N", n)])
    }

    #[tokio::test]
    async fn fan_in_keeps_per_source_order() {
        let cancel = CancellationToken::new();
        let (a_tx, a_rx) = mpsc::channel(8);
        let (b_tx, b_rx) = mpsc::channel(8);
        let mut merged = fan_in(vec![a_rx, b_rx], cancel);

        for n in 1..=3 {
            a_tx.send(numbered(SnapshotKind::Primary, n)).await.unwrap();
            b_tx.send(numbered(SnapshotKind::Secondary, n)).await.unwrap();
        }
        drop(a_tx);
        drop(b_tx);

        let mut primary = Vec::new();
        let mut secondary = Vec::new();
        while let Some(snapshot) = merged.recv().await {
            let n = snapshot.samples["N"].raw_value.clone();
            match snapshot.kind {
                SnapshotKind::Primary => primary.push(n),
                SnapshotKind::Secondary => secondary.push(n),
            }
        }
        assert_eq!(primary, ["1", "2", "3"]);
        assert_eq!(secondary, ["1", "2", "3"]);
    }

    #[tokio::test]
    async fn fan_in_closes_on_cancel() {
        let cancel = CancellationToken::new();
        let (_keep_open, rx) = mpsc::channel::<Snapshot>(1);
        let mut merged = fan_in(vec![rx], cancel.clone());
        cancel.cancel();
        assert!(merged.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sampler_ticks_until_cancelled() {
        let cancel = CancellationToken::new();
        let mut rx = spawn_sampler(
            Box::new(Counting {
                kind: SnapshotKind::Primary,
                calls: 0,
            }),
            Duration::from_secs(2),
            cancel.clone(),
        );

        for expected in ["1", "2", "3"] {
            let snapshot = rx.recv().await.unwrap();
            assert_eq!(snapshot.samples["Calls"].raw_value, expected);
        }
        cancel.cancel();
        while rx.recv().await.is_some() {}
    }
}
