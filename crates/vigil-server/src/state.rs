use crate::config::ServerConfig;
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use vigil_common::codec::OpeningKey;
use vigil_storage::file::FileBackend;
use vigil_storage::null::NullBackend;
use vigil_storage::sqlite::SqliteBackend;
use vigil_storage::{MetricStore, StorageBackend};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MetricStore>,
    /// HMAC key for request verification and response signing.
    pub secret: Option<Arc<String>>,
    /// Opens sealed request bodies.
    pub opening_key: Option<Arc<OpeningKey>>,
}

impl AppState {
    pub fn new(store: Arc<MetricStore>) -> Self {
        Self {
            store,
            secret: None,
            opening_key: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.secret = (!secret.is_empty()).then(|| Arc::new(secret));
        self
    }

    pub fn with_opening_key(mut self, key: OpeningKey) -> Self {
        self.opening_key = Some(Arc::new(key));
        self
    }

    /// Builds the store and payload keys described by `config`, restoring
    /// persisted metrics when asked to.
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let store = Arc::new(MetricStore::new(open_backend(config)?, config.sync_writes()));
        if config.restore {
            store.restore().context("failed to restore metrics")?;
        }

        let mut state = Self::new(store);
        if let Some(secret) = &config.secret {
            state = state.with_secret(secret.clone());
        }
        if let Some(path) = &config.private_key_path {
            let pem = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read private key {path}"))?;
            state = state.with_opening_key(OpeningKey::from_pem(&pem)?);
        }
        Ok(state)
    }
}

/// Picks the persistence backend: SQLite when `database_path` is set, else
/// the snapshot file, else nothing.
pub fn open_backend(config: &ServerConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    if let Some(path) = &config.database_path {
        let backend = SqliteBackend::open(Path::new(path), &config.database_retry)
            .with_context(|| format!("failed to open database {path}"))?;
        return Ok(Arc::new(backend));
    }
    if let Some(path) = &config.file_storage_path {
        let backend = FileBackend::open(Path::new(path))
            .with_context(|| format!("failed to open snapshot file {path}"))?;
        return Ok(Arc::new(backend));
    }
    tracing::info!("No storage configured, metrics are kept in memory only");
    Ok(Arc::new(NullBackend))
}
