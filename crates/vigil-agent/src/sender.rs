use crate::error::{AgentError, Result};
use async_trait::async_trait;
use std::time::Duration;
use vigil_common::codec::{SIGNATURE_HEADER, WRAPPED_KEY_HEADER};

/// A batch body ready for the wire plus the headers that describe it.
#[derive(Debug, Clone, Default)]
pub struct EncodedBatch {
    pub body: Vec<u8>,
    pub signature: Option<String>,
    /// Hex of the RSA-wrapped symmetric key when the body is sealed.
    pub wrapped_key: Option<String>,
    pub gzipped: bool,
}

/// Transport for encoded batches. One call is one delivery attempt.
#[async_trait]
pub trait MetricSender: Send + Sync {
    async fn send(&self, batch: &EncodedBatch) -> Result<()>;
}

/// Posts batches to the collector's `/updates/` endpoint.
pub struct HttpSender {
    client: reqwest::Client,
    url: String,
}

impl HttpSender {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl MetricSender for HttpSender {
    async fn send(&self, batch: &EncodedBatch) -> Result<()> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(batch.body.clone());
        if batch.gzipped {
            request = request.header("Content-Encoding", "gzip");
        }
        if let Some(signature) = &batch.signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        if let Some(wrapped_key) = &batch.wrapped_key {
            request = request.header(WRAPPED_KEY_HEADER, wrapped_key);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if status.is_success() {
            tracing::debug!(url = %self.url, status = status.as_u16(), "Batch delivered");
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        tracing::warn!(url = %self.url, status = status.as_u16(), body = %body, "Collector refused batch");
        if status.is_server_error() {
            Err(AgentError::Unavailable {
                status: status.as_u16(),
            })
        } else {
            Err(AgentError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}
