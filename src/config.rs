//! Relay configuration module
//!
//! Handles loading configuration from environment variables. The result is
//! built once at startup and injected into the relay; nothing here is
//! mutated afterwards.

use crate::error::RelayError;
use std::env;
use std::fmt;

/// Default managed Pub/Sub REST endpoint
pub const DEFAULT_REST_ENDPOINT: &str = "https://pub-sub.kr-central-2.kakaocloud.com";

/// Default NATS server when `BROKER_KIND=nats`
pub const DEFAULT_NATS_ENDPOINT: &str = "nats://127.0.0.1:4222";

/// Static broker credential pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub id: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Which backend the relay publishes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    /// Managed Pub/Sub REST API
    Rest,
    /// NATS JetStream
    Nats,
}

impl BrokerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::Nats => "nats",
        }
    }

    fn default_endpoint(&self) -> &'static str {
        match self {
            Self::Rest => DEFAULT_REST_ENDPOINT,
            Self::Nats => DEFAULT_NATS_ENDPOINT,
        }
    }
}

impl std::str::FromStr for BrokerKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" | "http" => Ok(Self::Rest),
            "nats" | "jetstream" => Ok(Self::Nats),
            other => Err(RelayError::Config(format!(
                "BROKER_KIND must be 'rest' or 'nats', got '{other}'"
            ))),
        }
    }
}

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Credentials handed to every broker client the relay constructs
    pub credentials: Credentials,

    /// Broker backend
    pub broker_kind: BrokerKind,

    /// Broker address (REST base URL or NATS server list)
    pub broker_endpoint: String,

    /// Audit forwarding endpoint; None disables forwarding
    pub audit_endpoint: Option<String>,

    /// Decode every payload before touching the broker
    pub validate_before_publish: bool,

    /// HTTP listen port
    pub http_port: u16,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, RelayError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let id = lookup("CREDENTIAL_ID")
            .ok_or_else(|| RelayError::Config("CREDENTIAL_ID must be set".to_string()))?;
        let secret = lookup("CREDENTIAL_SECRET")
            .ok_or_else(|| RelayError::Config("CREDENTIAL_SECRET must be set".to_string()))?;

        let broker_kind: BrokerKind = lookup("BROKER_KIND")
            .unwrap_or_else(|| "rest".to_string())
            .parse()?;

        let broker_endpoint = lookup("BROKER_ENDPOINT")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| broker_kind.default_endpoint().to_string());

        let audit_endpoint = lookup("AUDIT_ENDPOINT").filter(|v| !v.trim().is_empty());

        let validate_before_publish = match lookup("VALIDATE_BEFORE_PUBLISH") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                RelayError::Config(format!(
                    "VALIDATE_BEFORE_PUBLISH must be a boolean, got '{raw}'"
                ))
            })?,
            None => false,
        };

        let http_port = lookup("HTTP_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .map_err(|e| RelayError::Config(format!("HTTP_PORT must be a valid port number: {e}")))?;

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            credentials: Credentials { id, secret },
            broker_kind,
            broker_endpoint,
            audit_endpoint,
            validate_before_publish,
            http_port,
            log_level,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("CREDENTIAL_ID", "id"),
            ("CREDENTIAL_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.broker_kind, BrokerKind::Rest);
        assert_eq!(config.broker_endpoint, DEFAULT_REST_ENDPOINT);
        assert_eq!(config.audit_endpoint, None);
        assert!(!config.validate_before_publish);
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_credentials_required() {
        let err = RelayConfig::from_lookup(lookup_from(&[("CREDENTIAL_ID", "id")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: CREDENTIAL_SECRET must be set"
        );
    }

    #[test]
    fn test_nats_default_endpoint() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("CREDENTIAL_ID", "id"),
            ("CREDENTIAL_SECRET", "secret"),
            ("BROKER_KIND", "NATS"),
            ("VALIDATE_BEFORE_PUBLISH", "yes"),
            ("AUDIT_ENDPOINT", "http://audit.local/"),
        ]))
        .unwrap();

        assert_eq!(config.broker_kind, BrokerKind::Nats);
        assert_eq!(config.broker_endpoint, DEFAULT_NATS_ENDPOINT);
        assert!(config.validate_before_publish);
        assert_eq!(config.audit_endpoint.as_deref(), Some("http://audit.local/"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = [("CREDENTIAL_ID", "id"), ("CREDENTIAL_SECRET", "secret")];

        let mut pairs = base.to_vec();
        pairs.push(("BROKER_KIND", "kafka"));
        assert!(RelayConfig::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = base.to_vec();
        pairs.push(("HTTP_PORT", "99999"));
        assert!(RelayConfig::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = base.to_vec();
        pairs.push(("VALIDATE_BEFORE_PUBLISH", "maybe"));
        assert!(RelayConfig::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn test_secret_is_redacted() {
        let creds = Credentials::new("my-id", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("my-id"));
        assert!(!rendered.contains("hunter2"));
    }
}
