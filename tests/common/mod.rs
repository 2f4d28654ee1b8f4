//! Shared fixtures: an in-memory broker and a recording audit sink.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use bytes::Bytes;
use http_body_util::BodyExt;
use pubsub_relay::audit::{AuditSink, ForwardError};
use pubsub_relay::broker::{BrokerClient, BrokerConnector, BrokerError, Topic};
use pubsub_relay::http::{router, AppState};
use pubsub_relay::metrics::RelayMetrics;
use pubsub_relay::publish::{OutboundMessage, ProjectScope};
use pubsub_relay::Relay;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const PUBLISH_PATH: &str = "/v1/domains/dom-1/projects/proj-1/topics/logs/publish";

/// Everything the fake broker observed
#[derive(Debug, Default)]
pub struct BrokerLog {
    pub connects: Vec<ProjectScope>,
    pub closes: usize,
    pub topics: Vec<String>,
    pub published: Vec<OutboundMessage>,
}

#[derive(Default)]
pub struct FakeConnector {
    pub log: Arc<Mutex<BrokerLog>>,
    pub fail_connect: bool,
    pub fail_topic: bool,
    /// Zero-based message position whose publish fails
    pub fail_publish_at: Option<usize>,
    /// Simulated broker latency per publish
    pub publish_delay: Option<Duration>,
}

impl FakeConnector {
    pub fn log(&self) -> Arc<Mutex<BrokerLog>> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl BrokerConnector for FakeConnector {
    async fn connect(&self, scope: &ProjectScope) -> Result<Box<dyn BrokerClient>, BrokerError> {
        if self.fail_connect {
            return Err(BrokerError::Connect("broker unreachable".to_string()));
        }
        self.log.lock().unwrap().connects.push(scope.clone());
        Ok(Box::new(FakeClient {
            log: Arc::clone(&self.log),
            fail_topic: self.fail_topic,
            fail_publish_at: self.fail_publish_at,
            publish_delay: self.publish_delay,
        }))
    }

    fn kind(&self) -> &'static str {
        "fake"
    }
}

struct FakeClient {
    log: Arc<Mutex<BrokerLog>>,
    fail_topic: bool,
    fail_publish_at: Option<usize>,
    publish_delay: Option<Duration>,
}

#[async_trait]
impl BrokerClient for FakeClient {
    fn topic(&self, name: &str) -> Result<Box<dyn Topic>, BrokerError> {
        if self.fail_topic {
            return Err(BrokerError::InvalidTopic(name.to_string()));
        }
        self.log.lock().unwrap().topics.push(name.to_string());
        Ok(Box::new(FakeTopic {
            name: name.to_string(),
            log: Arc::clone(&self.log),
            fail_publish_at: self.fail_publish_at,
            publish_delay: self.publish_delay,
            attempts: Mutex::new(0),
        }))
    }

    async fn close(&self) {
        self.log.lock().unwrap().closes += 1;
    }
}

struct FakeTopic {
    name: String,
    log: Arc<Mutex<BrokerLog>>,
    fail_publish_at: Option<usize>,
    publish_delay: Option<Duration>,
    attempts: Mutex<usize>,
}

#[async_trait]
impl Topic for FakeTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<String, BrokerError> {
        if let Some(delay) = self.publish_delay {
            tokio::time::sleep(delay).await;
        }
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let current = *attempts;
            *attempts += 1;
            current
        };
        if self.fail_publish_at == Some(attempt) {
            return Err(BrokerError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let mut log = self.log.lock().unwrap();
        log.published.push(message.clone());
        Ok(format!("msg-{}", log.published.len()))
    }
}

/// Audit sink that hands every body to a channel
pub struct RecordingAuditSink {
    pub tx: mpsc::UnboundedSender<Bytes>,
    pub fail: bool,
}

impl RecordingAuditSink {
    pub fn new(fail: bool) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail }, rx)
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn forward(&self, body: Bytes) -> Result<(), ForwardError> {
        let _ = self.tx.send(body);
        if self.fail {
            return Err(ForwardError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

pub fn relay_with(connector: Arc<dyn BrokerConnector>, audit: Arc<dyn AuditSink>) -> Relay {
    Relay::new(connector, audit, Arc::new(RelayMetrics::new()))
}

pub fn app(relay: Relay) -> axum::Router {
    router(AppState { relay })
}

pub fn post(path: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

pub fn json_post(path: &str, value: serde_json::Value) -> Request<Body> {
    post(path, serde_json::to_vec(&value).unwrap())
}

pub async fn read_body(response: axum::response::Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&read_body(response).await).unwrap()
}

pub async fn read_text(response: axum::response::Response) -> String {
    String::from_utf8(read_body(response).await.to_vec()).unwrap()
}

/// Wait for the next audited body, failing after a second
pub async fn next_audit(rx: &mut mpsc::UnboundedReceiver<Bytes>) -> Bytes {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("audit forward timed out")
        .expect("audit channel closed")
}
