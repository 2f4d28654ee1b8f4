//! Broker integration
//!
//! The relay never talks to a backend directly. It asks a [`BrokerConnector`]
//! for a client bound to one (domain, project) scope, resolves a [`Topic`] on
//! it, publishes, and closes the client before returning.

mod nats;
mod rest;

pub use nats::NatsConnector;
pub use rest::RestConnector;

use crate::config::{BrokerKind, RelayConfig};
use crate::publish::{OutboundMessage, ProjectScope};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Backend failures, shared by every connector
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Backend unreachable or client construction failed
    #[error("connection failed: {0}")]
    Connect(String),

    /// Backend refused the static credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Topic name cannot be addressed on this backend
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Message attribute cannot be carried by this backend
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// Backend answered with a non-success status
    #[error("broker returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Request or acknowledgement lost in transit
    #[error("transport error: {0}")]
    Transport(String),

    /// Backend answered with something that is not a publish result
    #[error("invalid broker response: {0}")]
    InvalidResponse(String),
}

/// Builds per-request broker clients
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Construct a client scoped to one project
    async fn connect(&self, scope: &ProjectScope) -> Result<Box<dyn BrokerClient>, BrokerError>;

    /// Short backend name for logs and readiness output
    fn kind(&self) -> &'static str;
}

/// A client owned by exactly one request
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Resolve a handle to a named topic
    fn topic(&self, name: &str) -> Result<Box<dyn Topic>, BrokerError>;

    /// Release the client; called once on every exit path
    async fn close(&self);
}

/// A publishable topic handle
#[async_trait]
pub trait Topic: Send + Sync {
    fn name(&self) -> &str;

    /// Submit one message and wait for the broker's acknowledgement.
    ///
    /// Returns the broker-assigned message id.
    async fn publish(&self, message: &OutboundMessage) -> Result<String, BrokerError>;
}

/// Build the connector selected by configuration
pub fn connector_from_config(config: &RelayConfig) -> Result<Arc<dyn BrokerConnector>, BrokerError> {
    let connector: Arc<dyn BrokerConnector> = match config.broker_kind {
        BrokerKind::Rest => Arc::new(RestConnector::new(
            &config.broker_endpoint,
            config.credentials.clone(),
        )?),
        BrokerKind::Nats => Arc::new(NatsConnector::new(
            &config.broker_endpoint,
            config.credentials.clone(),
        )),
    };
    Ok(connector)
}
