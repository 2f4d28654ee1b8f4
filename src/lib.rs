//! Pub/Sub publish relay
//!
//! Accepts Pub/Sub-style publish calls over HTTP, publishes each message to
//! a tenant-scoped broker topic and answers with the assigned message ids.
//! Raw request bodies can be mirrored to an audit endpoint on the side.

pub mod audit;
pub mod broker;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod publish;
pub mod relay;

pub use error::RelayError;
pub use relay::Relay;
