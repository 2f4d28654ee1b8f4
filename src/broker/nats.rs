//! NATS JetStream backend
//!
//! Topics map to subjects `{domain}.{project}.{topic}`. Attributes travel as
//! message headers and the message id is `{stream}:{sequence}` from the ack.

use super::{BrokerClient, BrokerConnector, BrokerError, Topic};
use crate::config::Credentials;
use crate::publish::{OutboundMessage, ProjectScope};
use async_nats::jetstream::{self, Context as JsContext};
use async_nats::{Client, ConnectOptions, HeaderMap};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Connector that opens a fresh NATS connection per request
pub struct NatsConnector {
    /// NATS server URL(s) - comma-separated for multiple servers
    servers: String,
    credentials: Credentials,
}

impl NatsConnector {
    pub fn new(servers: &str, credentials: Credentials) -> Self {
        Self {
            servers: servers.to_string(),
            credentials,
        }
    }
}

#[async_trait]
impl BrokerConnector for NatsConnector {
    async fn connect(&self, scope: &ProjectScope) -> Result<Box<dyn BrokerClient>, BrokerError> {
        debug!(servers = %self.servers, domain = %scope.domain, project = %scope.project, "Connecting to NATS");

        let client = ConnectOptions::with_user_and_password(
            self.credentials.id.clone(),
            self.credentials.secret.clone(),
        )
        .name(format!("pubsub-relay/{}/{}", scope.domain, scope.project))
        .connect(self.servers.as_str())
        .await
        .map_err(|e| BrokerError::Connect(e.to_string()))?;

        let jetstream = jetstream::new(client.clone());

        Ok(Box::new(NatsClient {
            client,
            jetstream,
            scope: scope.clone(),
        }))
    }

    fn kind(&self) -> &'static str {
        "nats"
    }
}

struct NatsClient {
    client: Client,
    jetstream: JsContext,
    scope: ProjectScope,
}

/// Build the subject for a topic, rejecting tokens NATS cannot route
fn subject_for(scope: &ProjectScope, topic: &str) -> Result<String, BrokerError> {
    for token in [scope.domain.as_str(), scope.project.as_str(), topic] {
        let routable = !token.is_empty()
            && !token
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '.' | '*' | '>'));
        if !routable {
            return Err(BrokerError::InvalidTopic(format!(
                "'{token}' is not a valid subject token"
            )));
        }
    }
    Ok(format!("{}.{}.{}", scope.domain, scope.project, topic))
}

/// Map message attributes onto NATS headers
///
/// Names must be printable ASCII without `:`; values must not contain CR or
/// LF. Either would otherwise be written verbatim into the header block.
fn headers_for(attributes: &HashMap<String, String>) -> Result<HeaderMap, BrokerError> {
    let mut headers = HeaderMap::new();
    for (key, value) in attributes {
        let valid_name = !key.is_empty() && key.bytes().all(|b| b.is_ascii_graphic() && b != b':');
        if !valid_name {
            return Err(BrokerError::InvalidAttribute(format!(
                "'{}' is not a valid header name",
                key.escape_debug()
            )));
        }
        if value.contains(['\r', '\n']) {
            return Err(BrokerError::InvalidAttribute(format!(
                "value of '{key}' contains a line break"
            )));
        }
        headers.insert(key.as_str(), value.as_str());
    }
    Ok(headers)
}

/// Message id reported for a JetStream acknowledgement
fn message_id(stream: &str, sequence: u64) -> String {
    format!("{stream}:{sequence}")
}

#[async_trait]
impl BrokerClient for NatsClient {
    fn topic(&self, name: &str) -> Result<Box<dyn Topic>, BrokerError> {
        let subject = subject_for(&self.scope, name)?;
        Ok(Box::new(NatsTopic {
            name: name.to_string(),
            subject,
            jetstream: self.jetstream.clone(),
        }))
    }

    async fn close(&self) {
        // Push out anything still buffered; the connection closes on drop
        if let Err(e) = self.client.flush().await {
            warn!(error = %e, "Failed to flush NATS connection on close");
        }
        info!(domain = %self.scope.domain, project = %self.scope.project, "Closed NATS connection");
    }
}

struct NatsTopic {
    name: String,
    subject: String,
    jetstream: JsContext,
}

#[async_trait]
impl Topic for NatsTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<String, BrokerError> {
        let headers = headers_for(&message.attributes)?;

        let ack_future = self
            .jetstream
            .publish_with_headers(
                self.subject.clone(),
                headers,
                message.data.clone().into_bytes().into(),
            )
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let ack = ack_future
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        debug!(
            subject = %self.subject,
            stream = %ack.stream,
            seq = ack.sequence,
            duplicate = ack.duplicate,
            "Message acknowledged"
        );

        Ok(message_id(&ack.stream, ack.sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(domain: &str, project: &str) -> ProjectScope {
        ProjectScope {
            domain: domain.to_string(),
            project: project.to_string(),
        }
    }

    #[test]
    fn test_subject_layout() {
        assert_eq!(
            subject_for(&scope("dom", "proj"), "logs").unwrap(),
            "dom.proj.logs"
        );
    }

    #[test]
    fn test_unroutable_tokens_rejected() {
        assert!(subject_for(&scope("", "proj"), "logs").is_err());
        assert!(subject_for(&scope("dom", "a.b"), "logs").is_err());
        assert!(subject_for(&scope("dom", "proj"), "lo gs").is_err());
        assert!(subject_for(&scope("dom", "proj"), ">").is_err());
    }

    #[test]
    fn test_attributes_become_headers() {
        let attributes = HashMap::from([
            ("source".to_string(), "traffic_generator".to_string()),
            ("loglevel".to_string(), "INFO".to_string()),
        ]);
        let headers = headers_for(&attributes).unwrap();
        assert_eq!(
            headers.get("source").map(|v| v.as_str()),
            Some("traffic_generator")
        );
        assert_eq!(headers.get("loglevel").map(|v| v.as_str()), Some("INFO"));

        let empty = headers_for(&HashMap::new()).unwrap();
        assert!(empty.get("source").is_none());
    }

    #[test]
    fn test_header_injection_rejected() {
        let cases = [
            ("bad key:\r\n", "v"),
            ("with space", "v"),
            ("colon:name", "v"),
            ("", "v"),
            ("ok", "v\r\nX-Injected: 1"),
            ("ok", "line\nbreak"),
        ];
        for (key, value) in cases {
            let attributes = HashMap::from([(key.to_string(), value.to_string())]);
            let err = headers_for(&attributes).unwrap_err();
            assert!(
                matches!(err, BrokerError::InvalidAttribute(_)),
                "{key:?} => {value:?}"
            );
        }
    }

    #[test]
    fn test_message_id_layout() {
        assert_eq!(message_id("EVENTS", 42), "EVENTS:42");
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_connect() {
        let connector = NatsConnector::new("nats://127.0.0.1:1", Credentials::new("id", "secret"));
        let err = connector.connect(&scope("dom", "proj")).await.err().unwrap();
        assert!(matches!(err, BrokerError::Connect(_)));
    }
}
