use anyhow::Result;
use std::path::Path;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use vigil_common::codec::generate_key_pair;
use vigil_storage::flush::spawn_periodic_flush;

use vigil_server::app;
use vigil_server::config::ServerConfig;
use vigil_server::state::AppState;

const KEY_BITS: usize = 2048;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  vigil-server [config.toml]      Start the server (default config/server.toml)");
    eprintln!("  vigil-server keygen <dir>       Write private.pem and public.pem into <dir>");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("keygen") => {
            let dir = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("keygen requires a <dir> argument")
            })?;
            run_keygen(Path::new(dir))
        }
        Some("-h") | Some("--help") => {
            print_usage();
            Ok(())
        }
        Some(config_path) => run_server(config_path).await,
        None => run_server("config/server.toml").await,
    }
}

fn run_keygen(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let (private_pem, public_pem) = generate_key_pair(KEY_BITS)?;
    std::fs::write(dir.join("private.pem"), private_pem)?;
    std::fs::write(dir.join("public.pem"), public_pem)?;
    tracing::info!(dir = %dir.display(), bits = KEY_BITS, "Key pair written");
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let addr = config.socket_addr()?;

    tracing::info!(
        http_addr = %addr,
        store_interval_secs = config.store_interval_secs,
        restore = config.restore,
        signed = config.secret.is_some(),
        sealed = config.private_key_path.is_some(),
        "vigil-server starting"
    );

    let state = AppState::from_config(&config)?;
    let store = state.store.clone();

    let cancel = CancellationToken::new();
    let flush_handle = (!config.sync_writes())
        .then(|| spawn_periodic_flush(store, config.store_interval(), cancel.clone()));

    let app = app::build_http_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(http = %addr, "Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            tracing::info!("Shutting down gracefully");
        })
        .await?;

    cancel.cancel();
    if let Some(handle) = flush_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Flush task failed");
        }
    }
    tracing::info!("Server stopped");
    Ok(())
}
