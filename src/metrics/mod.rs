//! Prometheus metrics module

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// The global recorder can only be installed once per process
static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Relay metrics collector
#[derive(Clone)]
pub struct RelayMetrics {
    handle: Option<PrometheusHandle>,
}

impl RelayMetrics {
    /// Initialize metrics and return handle
    ///
    /// Safe to call repeatedly; later calls share the first recorder.
    pub fn new() -> Self {
        let handle = HANDLE
            .get_or_init(|| {
                let handle = PrometheusBuilder::new().install_recorder().ok()?;
                Self::register_metrics();
                Some(handle)
            })
            .clone();

        Self { handle }
    }

    /// Register metric descriptions
    fn register_metrics() {
        describe_counter!(
            "relay_requests_total",
            Unit::Count,
            "Publish requests handled, by outcome"
        );
        describe_counter!(
            "relay_messages_published_total",
            Unit::Count,
            "Messages acknowledged by the broker"
        );
        describe_counter!(
            "relay_partial_commits_total",
            Unit::Count,
            "Failed requests after at least one message was published"
        );
        describe_counter!(
            "relay_audit_failures_total",
            Unit::Count,
            "Audit forwards that failed"
        );

        describe_histogram!(
            "relay_publish_duration_seconds",
            Unit::Seconds,
            "Time from submit to broker acknowledgement"
        );
        describe_histogram!(
            "relay_partial_commit_messages",
            Unit::Count,
            "Messages left published by a failed request"
        );
    }

    /// Record a finished request; `outcome` is "ok" or an error label
    pub fn record_request(&self, broker: &'static str, outcome: &'static str) {
        counter!(
            "relay_requests_total",
            "broker" => broker,
            "outcome" => outcome
        )
        .increment(1);
    }

    /// Record one acknowledged message
    ///
    /// Labelled by backend only; topic names come from request URLs.
    pub fn record_publish(&self, broker: &'static str, duration: Duration) {
        counter!(
            "relay_messages_published_total",
            "broker" => broker
        )
        .increment(1);

        histogram!(
            "relay_publish_duration_seconds",
            "broker" => broker
        )
        .record(duration.as_secs_f64());
    }

    /// Record a request that failed after committing messages
    pub fn record_partial_commit(&self, published: usize) {
        counter!("relay_partial_commits_total").increment(1);
        histogram!("relay_partial_commit_messages").record(published as f64);
    }

    pub fn record_audit_failure(&self) {
        counter!("relay_audit_failures_total").increment(1);
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle
            .as_ref()
            .map(PrometheusHandle::render)
            .unwrap_or_default()
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
