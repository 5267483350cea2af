use crate::error::Result;
use crate::sender::{EncodedBatch, MetricSender};
use crate::window::DispatchJob;
use std::sync::Arc;
use vigil_common::codec::{self, SealingKey};
use vigil_common::{MetricSample, RetryPolicy, WireMetric};

/// Name of the counter every batch carries with the job's sequence.
pub const POLL_COUNT: &str = "PollCount";

/// Turns a job into its wire batch: adds the `PollCount` counter and
/// converts every sample, ordered by name.
pub fn build_batch(job: DispatchJob) -> Result<Vec<WireMetric>> {
    let mut metrics = job.metrics;
    metrics.insert(
        POLL_COUNT.to_string(),
        MetricSample::counter(POLL_COUNT, job.sequence),
    );

    let mut batch = metrics
        .values()
        .map(WireMetric::try_from)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    batch.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(batch)
}

/// Applies the configured payload transforms: sign the plain bytes, seal,
/// then gzip.
#[derive(Clone, Default)]
pub struct BatchEncoder {
    secret: Option<String>,
    sealing_key: Option<SealingKey>,
    gzip: bool,
}

impl BatchEncoder {
    pub fn new(secret: Option<String>, sealing_key: Option<SealingKey>, gzip: bool) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            sealing_key,
            gzip,
        }
    }

    pub fn encode(&self, plain: Vec<u8>) -> Result<EncodedBatch> {
        let signature = self
            .secret
            .as_deref()
            .map(|secret| codec::sign(&plain, secret));

        let (mut body, wrapped_key) = match &self.sealing_key {
            Some(key) => {
                let envelope = key.seal(&plain)?;
                (envelope.ciphertext, Some(hex::encode(envelope.wrapped_key)))
            }
            None => (plain, None),
        };

        if self.gzip {
            body = codec::gzip(&body)?;
        }

        Ok(EncodedBatch {
            body,
            signature,
            wrapped_key,
            gzipped: self.gzip,
        })
    }
}

/// Runs `op` under `policy`, sleeping between attempts. Errors that are not
/// transient end the loop at once.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut retry = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retry + 1 >= attempts || !e.is_transient() => return Err(e),
            Err(e) => {
                let delay = policy.delay(retry);
                tracing::warn!(
                    attempt = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
        }
    }
}

/// Everything a worker needs to turn a job into a delivered batch.
pub struct Delivery {
    encoder: BatchEncoder,
    sender: Arc<dyn MetricSender>,
    retry: RetryPolicy,
}

impl Delivery {
    pub fn new(encoder: BatchEncoder, sender: Arc<dyn MetricSender>, retry: RetryPolicy) -> Self {
        Self {
            encoder,
            sender,
            retry,
        }
    }

    pub async fn deliver(&self, job: DispatchJob) -> Result<()> {
        let batch = build_batch(job)?;
        let count = batch.len();
        let plain = serde_json::to_vec(&batch)?;
        let encoded = self.encoder.encode(plain)?;

        retry(&self.retry, || self.sender.send(&encoded)).await?;
        tracing::debug!(count, "Batch sent");
        Ok(())
    }
}
