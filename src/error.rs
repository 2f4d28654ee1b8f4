//! Domain error types for the publish relay
//!
//! Every publish-path failure is terminal for the request that raised it.
//! Variants map onto an HTTP status and a plain-text body; the broker client
//! is still closed by the relay before the error leaves the handler.
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All application code returns Result<T, RelayError>.

use crate::broker::BrokerError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Relay domain errors
///
/// Variants carry the context an on-call engineer needs (message index,
/// offending path) so logs can be read without parsing message strings.
///
/// Example log output:
/// ```text
/// RelayError::Encoding { index: 2, .. }
/// → "Base64 decode error at message 2: Invalid symbol 33, offset 4."
/// ```
#[derive(Error, Debug)]
pub enum RelayError {
    /// Request path is too short to name a domain, project and topic
    #[error("Invalid URL: {path}")]
    InvalidAddress { path: String },

    /// Request body is not a well-formed publish request
    #[error("JSON decode error: {0}")]
    MalformedBody(#[source] serde_json::Error),

    /// Publish request carried no messages
    #[error("No messages provided")]
    EmptyMessageList,

    /// Message payload is not valid base64
    #[error("Base64 decode error at message {index}: {source}")]
    Encoding {
        index: usize,
        #[source]
        source: base64::DecodeError,
    },

    /// Broker client could not be constructed for the project
    #[error("broker client error: {0}")]
    ClientInit(#[source] BrokerError),

    /// Topic handle could not be obtained from the client
    #[error("topic '{topic}' unavailable: {source}")]
    TopicUnavailable {
        topic: String,
        #[source]
        source: BrokerError,
    },

    /// Broker rejected or failed to acknowledge a message
    #[error("Publish error at message {index}: {source}")]
    Publish {
        index: usize,
        #[source]
        source: BrokerError,
    },

    /// Detached publish task panicked or was cancelled
    #[error("publish task failed: {0}")]
    TaskFailed(String),

    /// Configuration error (environment variable missing or invalid)
    #[error("configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// Returns a static label string suitable for Prometheus metrics.
    ///
    /// Used as the `outcome` label on `relay_requests_total`.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::InvalidAddress { .. } => "invalid_address",
            Self::MalformedBody(_) => "malformed_body",
            Self::EmptyMessageList => "empty_message_list",
            Self::Encoding { .. } => "encoding",
            Self::ClientInit(_) => "client_init",
            Self::TopicUnavailable { .. } => "topic_unavailable",
            Self::Publish { .. } => "publish",
            Self::TaskFailed(_) => "task_failed",
            Self::Config(_) => "config",
        }
    }

    /// HTTP status returned to the caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidAddress { .. }
            | Self::MalformedBody(_)
            | Self::EmptyMessageList
            | Self::Encoding { .. } => StatusCode::BAD_REQUEST,
            Self::ClientInit(_)
            | Self::TopicUnavailable { .. }
            | Self::Publish { .. }
            | Self::TaskFailed(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        // (StatusCode, String) renders as text/plain; charset=utf-8
        (self.status_code(), self.to_string()).into_response()
    }
}
