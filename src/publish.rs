//! Publish request wire format and payload codec
//!
//! Inbound body:
//! ```json
//! {"messages": [{"data": "aGVsbG8=", "attributes": {"k": "v"}}]}
//! ```
//! Outbound body:
//! ```json
//! {"message_ids": ["..."]}
//! ```

use crate::error::RelayError;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Lenient standard-alphabet decoder: padding required, trailing bits ignored
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

/// Inbound publish request
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PublishRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<PublishMessage>,
}

/// A single message as submitted by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PublishMessage {
    /// base64 text payload
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: HashMap<String, String>,
}

/// Relay response: one id per input message, input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PublishResponse {
    pub message_ids: Vec<String>,
}

/// Message in the form handed to a broker topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Canonical base64 text of the payload
    pub data: String,
    pub attributes: HashMap<String, String>,
}

impl PublishRequest {
    /// Parse a raw request body
    pub fn from_slice(body: &[u8]) -> Result<Self, RelayError> {
        serde_json::from_slice(body).map_err(RelayError::MalformedBody)
    }
}

impl PublishMessage {
    /// Decode and canonicalize this message for publishing
    ///
    /// `index` is the position in the batch, reported on failure.
    pub fn to_outbound(&self, index: usize) -> Result<OutboundMessage, RelayError> {
        let data =
            canonicalize(&self.data).map_err(|source| RelayError::Encoding { index, source })?;
        Ok(OutboundMessage {
            data,
            attributes: self.attributes.clone(),
        })
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Destination derived from the request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicAddress {
    pub domain: String,
    pub project: String,
    pub topic: String,
}

impl TopicAddress {
    /// Minimum number of `/`-separated segments (leading empty one included)
    pub const MIN_SEGMENTS: usize = 8;

    /// Extract the address from `/v1/domains/{d}/projects/{p}/topics/{t}/publish`
    ///
    /// Only the segment count is checked. Segment contents, including the
    /// literal words, are taken as-is.
    pub fn from_path(path: &str) -> Result<Self, RelayError> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() < Self::MIN_SEGMENTS {
            return Err(RelayError::InvalidAddress {
                path: path.to_string(),
            });
        }
        Ok(Self {
            domain: parts[3].to_string(),
            project: parts[5].to_string(),
            topic: parts[7].to_string(),
        })
    }

    pub fn scope(&self) -> ProjectScope {
        ProjectScope {
            domain: self.domain.clone(),
            project: self.project.clone(),
        }
    }
}

/// The (domain, project) pair a broker client is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectScope {
    pub domain: String,
    pub project: String,
}

/// Decode base64 text into raw bytes
///
/// CR and LF are skipped, matching MIME-style line-wrapped input.
pub fn decode_payload(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if data.contains(['\r', '\n']) {
        let stripped: String = data.chars().filter(|c| *c != '\r' && *c != '\n').collect();
        LENIENT.decode(stripped)
    } else {
        LENIENT.decode(data)
    }
}

/// Re-encode a base64 payload into canonical padded form
pub fn canonicalize(data: &str) -> Result<String, base64::DecodeError> {
    decode_payload(data).map(|bytes| STANDARD.encode(bytes))
}
