use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use vigil_common::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Collector base URL; batches go to `{server_endpoint}/updates/`.
    #[serde(default = "default_server_endpoint")]
    pub server_endpoint: String,
    /// How often every sampler takes a reading.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// How often the aggregation window is offered for dispatch.
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Dispatch queue capacity. The worker pool has one more worker than this.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
    /// Upper bound on waiting for in-flight deliveries at shutdown. A batch
    /// still retrying when it expires is dropped, so keep this above the
    /// report interval if the final batch matters.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
    /// HMAC key; when set every batch carries a signature header.
    pub secret: Option<String>,
    /// Collector public key (SPKI PEM); when set every batch is sealed.
    pub public_key_path: Option<String>,
    #[serde(default = "default_gzip")]
    pub gzip: bool,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_server_endpoint() -> String {
    "http://localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    1
}

fn default_response_timeout() -> u64 {
    3
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_gzip() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_endpoint: default_server_endpoint(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            rate_limit: default_rate_limit(),
            response_timeout_secs: default_response_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            secret: None,
            public_key_path: None,
            gzip: default_gzip(),
            retry: RetryPolicy::default(),
        }
    }
}

impl AgentConfig {
    /// Loads the config from a TOML file. A missing file yields the defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            tracing::warn!(path, "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }
        if self.report_interval_secs == 0 {
            anyhow::bail!("report_interval_secs must be greater than zero");
        }
        if self.rate_limit == 0 {
            anyhow::bail!("rate_limit must be at least 1");
        }
        if !self.drain_outlasts_report_tick() {
            tracing::warn!(
                shutdown_timeout_secs = self.shutdown_timeout_secs,
                report_interval_secs = self.report_interval_secs,
                "Shutdown timeout does not exceed the report interval; the final batch may be dropped"
            );
        }
        Ok(())
    }

    /// Whether the shutdown drain waits longer than one report tick.
    pub fn drain_outlasts_report_tick(&self) -> bool {
        self.shutdown_timeout_secs > self.report_interval_secs
    }

    /// Full URL of the batch endpoint. A bare `host:port` is taken as plain HTTP.
    pub fn updates_url(&self) -> String {
        let addr = self.server_endpoint.trim().trim_end_matches('/');
        if addr.contains("://") {
            format!("{addr}/updates/")
        } else {
            format!("http://{addr}/updates/")
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_takes_defaults() {
        let config: AgentConfig = toml::from_str("").unwrap();
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.report_interval_secs, 10);
        assert_eq!(config.rate_limit, 1);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.secret.is_none());
        assert!(config.gzip);
    }

    #[test]
    fn load_reads_toml_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server_endpoint = "collector.internal:9000"
rate_limit = 4
secret = "k"

[retry]
attempts = 5
"#
        )
        .unwrap();

        let config = AgentConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.rate_limit, 4);
        assert_eq!(config.secret.as_deref(), Some("k"));
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.retry.start_delay_ms, 1000);
        assert_eq!(config.updates_url(), "http://collector.internal:9000/updates/");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        let config = AgentConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server_endpoint, "http://localhost:8080");
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let config = AgentConfig {
            rate_limit: 0,
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn short_shutdown_timeout_warns_but_loads() {
        let config = AgentConfig::default();
        assert!(!config.drain_outlasts_report_tick());
        assert!(config.validate().is_ok());

        let config = AgentConfig {
            shutdown_timeout_secs: 15,
            ..AgentConfig::default()
        };
        assert!(config.drain_outlasts_report_tick());
    }

    #[test]
    fn updates_url_keeps_scheme() {
        let config = AgentConfig {
            server_endpoint: "https://metrics.example.com/".into(),
            ..AgentConfig::default()
        };
        assert_eq!(config.updates_url(), "https://metrics.example.com/updates/");
    }
}
