//! Publish relay
//!
//! Turns one inbound publish call into a sequence of broker publishes:
//!
//! 1. address from the path (before the body is looked at)
//! 2. body decode, non-empty check
//! 3. client acquisition for (domain, project), topic resolution
//! 4. sequential publish, one acknowledgement at a time
//!
//! Failure at step 4 aborts the batch. Messages already acknowledged stay
//! published; their ids are logged since the caller only sees the error.

use crate::audit::{spawn_forward, AuditSink};
use crate::broker::{BrokerClient, BrokerConnector};
use crate::error::RelayError;
use crate::metrics::RelayMetrics;
use crate::publish::{OutboundMessage, PublishRequest, PublishResponse, TopicAddress};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, field, info, warn, Instrument, Span};
use uuid::Uuid;

/// Orchestrates publish requests against an injected broker and audit sink
#[derive(Clone)]
pub struct Relay {
    connector: Arc<dyn BrokerConnector>,
    audit: Arc<dyn AuditSink>,
    metrics: Arc<RelayMetrics>,
    /// Decode every payload before the broker is contacted
    validate_before_publish: bool,
}

impl Relay {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            connector,
            audit,
            metrics,
            validate_before_publish: false,
        }
    }

    pub fn with_validate_before_publish(mut self, enabled: bool) -> Self {
        self.validate_before_publish = enabled;
        self
    }

    pub fn broker_kind(&self) -> &'static str {
        self.connector.kind()
    }

    pub fn audit_enabled(&self) -> bool {
        self.audit.enabled()
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Handle one publish call: `path` is the request path, `body` the raw body
    ///
    /// The work runs on its own task. Dropping the returned future (caller
    /// disconnect) does not cancel publishes already underway, and the client
    /// is still closed when the batch finishes.
    pub async fn handle(&self, path: &str, body: Bytes) -> Result<PublishResponse, RelayError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "publish",
            %request_id,
            path,
            domain = field::Empty,
            project = field::Empty,
            topic = field::Empty,
        );

        let relay = self.clone();
        let path = path.to_string();
        let task = tokio::spawn(
            async move {
                let result = relay.handle_inner(&path, body).await;
                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(e) => e.error_type_label(),
                };
                relay.metrics.record_request(relay.connector.kind(), outcome);
                result
            }
            .instrument(span),
        );

        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(%request_id, error = %e, "Publish task failed");
                self.metrics
                    .record_request(self.connector.kind(), "task_failed");
                Err(RelayError::TaskFailed(e.to_string()))
            }
        }
    }

    async fn handle_inner(&self, path: &str, body: Bytes) -> Result<PublishResponse, RelayError> {
        let address = TopicAddress::from_path(path)?;

        let span = Span::current();
        span.record("domain", address.domain.as_str());
        span.record("project", address.project.as_str());
        span.record("topic", address.topic.as_str());

        let request = PublishRequest::from_slice(&body)?;

        spawn_forward(Arc::clone(&self.audit), body, Arc::clone(&self.metrics));

        if request.messages.is_empty() {
            return Err(RelayError::EmptyMessageList);
        }

        // Decoding is side-effect free; a failure still surfaces at its
        // position in the publish loop unless validation runs first.
        let decoded: Vec<Result<OutboundMessage, RelayError>> = request
            .messages
            .iter()
            .enumerate()
            .map(|(index, message)| message.to_outbound(index))
            .collect();

        let decoded = if self.validate_before_publish {
            decoded
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(Ok)
                .collect()
        } else {
            decoded
        };

        debug!(messages = decoded.len(), "Acquiring broker client");

        let client = self
            .connector
            .connect(&address.scope())
            .await
            .map_err(RelayError::ClientInit)?;

        let result = self.publish_batch(client.as_ref(), &address, decoded).await;
        client.close().await;
        result
    }

    async fn publish_batch(
        &self,
        client: &dyn BrokerClient,
        address: &TopicAddress,
        decoded: Vec<Result<OutboundMessage, RelayError>>,
    ) -> Result<PublishResponse, RelayError> {
        let topic = client
            .topic(&address.topic)
            .map_err(|source| RelayError::TopicUnavailable {
                topic: address.topic.clone(),
                source,
            })?;

        let mut message_ids = Vec::with_capacity(decoded.len());

        for (index, message) in decoded.into_iter().enumerate() {
            let started = Instant::now();
            let published = match message {
                Ok(message) => topic
                    .publish(&message)
                    .await
                    .map_err(|source| RelayError::Publish { index, source }),
                Err(e) => Err(e),
            };

            match published {
                Ok(id) => {
                    self.metrics
                        .record_publish(self.connector.kind(), started.elapsed());
                    debug!(index, message_id = %id, "Message published");
                    message_ids.push(id);
                }
                Err(e) => {
                    if !message_ids.is_empty() {
                        self.metrics.record_partial_commit(message_ids.len());
                        warn!(
                            error = %e,
                            published = message_ids.len(),
                            unreported_ids = ?message_ids,
                            "Batch aborted after partial publish"
                        );
                    }
                    return Err(e);
                }
            }
        }

        info!(messages = message_ids.len(), "Batch published");

        Ok(PublishResponse { message_ids })
    }
}
