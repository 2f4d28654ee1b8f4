//! Audit forwarding
//!
//! Mirrors raw publish bodies to an external logging endpoint. Best effort:
//! one attempt, failures are logged and never reach the caller.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::metrics::RelayMetrics;

/// Audit forwarding failure
#[derive(Error, Debug)]
pub enum ForwardError {
    /// Request never produced a response
    #[error("audit POST error: {0}")]
    Transport(String),

    /// Endpoint answered outside 2xx
    #[error("audit response status: {0}")]
    Status(u16),
}

/// Destination for mirrored request bodies
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn forward(&self, body: Bytes) -> Result<(), ForwardError>;

    /// Whether forwarding does anything at all
    fn enabled(&self) -> bool {
        true
    }
}

/// Sink used when no audit endpoint is configured
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn forward(&self, _body: Bytes) -> Result<(), ForwardError> {
        Ok(())
    }

    fn enabled(&self) -> bool {
        false
    }
}

/// POSTs the body as JSON to a fixed endpoint
pub struct HttpAuditSink {
    endpoint: String,
    client: Client,
}

impl HttpAuditSink {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ForwardError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ForwardError::Transport(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn forward(&self, body: Bytes) -> Result<(), ForwardError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body)
            .send()
            .await
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ForwardError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Forward on a detached task; the caller never waits on it
pub fn spawn_forward(sink: Arc<dyn AuditSink>, body: Bytes, metrics: Arc<RelayMetrics>) {
    if !sink.enabled() {
        return;
    }
    tokio::spawn(async move {
        match sink.forward(body).await {
            Ok(()) => debug!("Audit record forwarded"),
            Err(e) => {
                metrics.record_audit_failure();
                warn!(error = %e, "Audit forwarding failed");
            }
        }
    });
}
