//! Managed Pub/Sub REST backend
//!
//! `POST {endpoint}/v1/domains/{domain}/projects/{project}/topics/{topic}/publish`
//! authenticated with `Credential-ID` / `Credential-Secret` headers.

use super::{BrokerClient, BrokerConnector, BrokerError, Topic};
use crate::config::Credentials;
use crate::publish::{OutboundMessage, ProjectScope};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

const CREDENTIAL_ID_HEADER: &str = "credential-id";
const CREDENTIAL_SECRET_HEADER: &str = "credential-secret";

/// Connector for the REST publish API
pub struct RestConnector {
    /// Base URL (no trailing slash)
    base_url: String,
    credentials: Credentials,
    /// Shared connection pool; clients built from it are cheap
    http: Client,
}

impl RestConnector {
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self, BrokerError> {
        let http = Client::builder()
            .build()
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            http,
        })
    }

    fn auth_headers(&self) -> Result<HeaderMap, BrokerError> {
        let mut headers = HeaderMap::new();
        let id = HeaderValue::from_str(&self.credentials.id).map_err(|_| {
            BrokerError::Unauthorized("credential id is not a valid header value".to_string())
        })?;
        let mut secret = HeaderValue::from_str(&self.credentials.secret).map_err(|_| {
            BrokerError::Unauthorized("credential secret is not a valid header value".to_string())
        })?;
        secret.set_sensitive(true);
        headers.insert(CREDENTIAL_ID_HEADER, id);
        headers.insert(CREDENTIAL_SECRET_HEADER, secret);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl BrokerConnector for RestConnector {
    async fn connect(&self, scope: &ProjectScope) -> Result<Box<dyn BrokerClient>, BrokerError> {
        let headers = self.auth_headers()?;
        debug!(domain = %scope.domain, project = %scope.project, "Opening REST broker client");
        Ok(Box::new(RestClient {
            base_url: self.base_url.clone(),
            scope: scope.clone(),
            headers,
            http: self.http.clone(),
        }))
    }

    fn kind(&self) -> &'static str {
        "rest"
    }
}

struct RestClient {
    base_url: String,
    scope: ProjectScope,
    headers: HeaderMap,
    http: Client,
}

#[async_trait]
impl BrokerClient for RestClient {
    fn topic(&self, name: &str) -> Result<Box<dyn Topic>, BrokerError> {
        let raw = format!(
            "{}/v1/domains/{}/projects/{}/topics/{}/publish",
            self.base_url, self.scope.domain, self.scope.project, name
        );
        let url = Url::parse(&raw).map_err(|e| BrokerError::InvalidTopic(format!("{raw}: {e}")))?;
        Ok(Box::new(RestTopic {
            name: name.to_string(),
            url,
            headers: self.headers.clone(),
            http: self.http.clone(),
        }))
    }

    async fn close(&self) {
        // Connections return to the shared pool on drop
        debug!(domain = %self.scope.domain, project = %self.scope.project, "Closing REST broker client");
    }
}

struct RestTopic {
    name: String,
    url: Url,
    headers: HeaderMap,
    http: Client,
}

#[derive(Serialize)]
struct RestPublishBody<'a> {
    messages: [RestMessage<'a>; 1],
}

#[derive(Serialize)]
struct RestMessage<'a> {
    data: &'a str,
    attributes: &'a HashMap<String, String>,
}

#[derive(Deserialize)]
struct RestPublishReply {
    #[serde(rename = "messageIds", alias = "message_ids", default)]
    message_ids: Vec<String>,
}

#[async_trait]
impl Topic for RestTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<String, BrokerError> {
        let body = RestPublishBody {
            messages: [RestMessage {
                data: &message.data,
                attributes: &message.attributes,
            }],
        };

        let response = self
            .http
            .post(self.url.clone())
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BrokerError::Unauthorized(format!("status {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let reply: RestPublishReply = response
            .json()
            .await
            .map_err(|e| BrokerError::InvalidResponse(e.to_string()))?;

        reply
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| BrokerError::InvalidResponse("no message id returned".to_string()))
    }
}
