use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use vigil_common::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    /// Snapshot file for the file backend.
    pub file_storage_path: Option<String>,
    /// SQLite database; takes precedence over `file_storage_path`.
    pub database_path: Option<String>,
    /// Seconds between full snapshots to the backend. 0 mirrors every write
    /// synchronously.
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: u64,
    /// Load the backend's contents into memory at startup.
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// HMAC key used to verify request signatures and sign responses.
    pub secret: Option<String>,
    /// PKCS#1 PEM key used to open sealed request bodies.
    pub private_key_path: Option<String>,
    /// Retry schedule for opening the database.
    #[serde(default)]
    pub database_retry: RetryPolicy,
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_store_interval() -> u64 {
    300
}

fn default_restore() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            file_storage_path: None,
            database_path: None,
            store_interval_secs: default_store_interval(),
            restore: default_restore(),
            secret: None,
            private_key_path: None,
            database_retry: RetryPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Loads the config from a TOML file. A missing file yields the defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            tracing::warn!(path, "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.http_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid http_addr '{}': {e}", self.http_addr))
    }

    pub fn sync_writes(&self) -> bool {
        self.store_interval_secs == 0
    }

    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs)
    }
}
