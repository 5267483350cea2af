use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use vigil_agent::{Agent, AgentConfig, AgentError};
use vigil_collector::host::HostSampler;
use vigil_collector::runtime::RuntimeSampler;
use vigil_collector::Sampler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = AgentConfig::load(&config_path)?;
    tracing::info!(
        server = %config.server_endpoint,
        poll_interval_secs = config.poll_interval_secs,
        report_interval_secs = config.report_interval_secs,
        rate_limit = config.rate_limit,
        signed = config.secret.is_some(),
        sealed = config.public_key_path.is_some(),
        "vigil-agent starting"
    );

    let agent = Arc::new(Agent::from_config(config)?);
    let samplers: Vec<Box<dyn Sampler>> = vec![
        Box::new(RuntimeSampler::new()),
        Box::new(HostSampler::new()),
    ];

    let cancel = CancellationToken::new();
    let runner = tokio::spawn({
        let agent = agent.clone();
        let cancel = cancel.clone();
        async move { agent.run(samplers, cancel).await }
    });

    signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully");

    if let Err(e) = agent.shutdown().await {
        tracing::warn!(error = %e, "Shutdown did not complete cleanly");
    }
    cancel.cancel();

    match runner.await? {
        Ok(()) | Err(AgentError::Closed) => {}
        Err(e) => tracing::error!(error = %e, "Engine stopped with error"),
    }
    Ok(())
}
