use crate::config::AgentConfig;
use crate::delivery::{BatchEncoder, Delivery};
use crate::drain::DrainController;
use crate::engine::Engine;
use crate::error::Result;
use crate::sampling::{fan_in, spawn_sampler};
use crate::sender::{HttpSender, MetricSender};
use crate::state::AgentState;
use anyhow::Context;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use vigil_collector::Sampler;
use vigil_common::codec::SealingKey;

/// A configured agent: samplers in, batches out.
pub struct Agent {
    config: AgentConfig,
    engine: Engine,
    drain: DrainController,
}

impl Agent {
    /// Builds an agent that posts to the configured collector over HTTP.
    pub fn from_config(config: AgentConfig) -> anyhow::Result<Self> {
        let sender = HttpSender::new(config.updates_url(), config.response_timeout())?;
        Self::with_sender(config, Arc::new(sender))
    }

    pub fn with_sender(config: AgentConfig, sender: Arc<dyn MetricSender>) -> anyhow::Result<Self> {
        let sealing_key = match &config.public_key_path {
            Some(path) => {
                let pem = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read public key {path}"))?;
                Some(SealingKey::from_pem(&pem)?)
            }
            None => None,
        };
        let encoder = BatchEncoder::new(config.secret.clone(), sealing_key, config.gzip);
        let delivery = Delivery::new(encoder, sender, config.retry);

        let state = Arc::new(AgentState::new());
        let engine = Engine::new(
            state.clone(),
            Arc::new(delivery),
            config.report_interval(),
            config.rate_limit,
        );
        Ok(Self {
            config,
            engine,
            drain: DrainController::new(state),
        })
    }

    pub fn state(&self) -> Arc<AgentState> {
        self.engine.state()
    }

    /// Starts one task per sampler, merges their output and runs the engine
    /// on it. Sampler tasks stop when the engine returns.
    pub async fn run(&self, samplers: Vec<Box<dyn Sampler>>, cancel: CancellationToken) -> Result<()> {
        let sampling = cancel.child_token();
        let sources = samplers
            .into_iter()
            .map(|sampler| {
                tracing::info!(sampler = sampler.name(), kind = %sampler.kind(), "Starting sampler");
                spawn_sampler(sampler, self.config.poll_interval(), sampling.clone())
            })
            .collect();
        let merged = fan_in(sources, sampling.clone());

        let result = self.engine.run(merged, cancel).await;
        sampling.cancel();
        result
    }

    /// Drains in-flight deliveries, waiting at most `shutdown_timeout_secs`.
    pub async fn shutdown(&self) -> Result<()> {
        self.drain
            .drain(Instant::now() + self.config.shutdown_timeout())
            .await
    }
}
