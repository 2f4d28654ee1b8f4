//! Pub/Sub Relay - HTTP publish proxy
//!
//! This service:
//! - Accepts `POST /v1/domains/{d}/projects/{p}/topics/{t}/publish`
//! - Publishes each message through a per-request broker client
//! - Mirrors request bodies to an optional audit endpoint
//! - Exposes health/ready/metrics endpoints

use anyhow::Result;
use pubsub_relay::audit::{AuditSink, HttpAuditSink, NoopAuditSink};
use pubsub_relay::broker::connector_from_config;
use pubsub_relay::config::RelayConfig;
use pubsub_relay::http::{self, AppState};
use pubsub_relay::metrics::RelayMetrics;
use pubsub_relay::Relay;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first to get log level
    let relay_config = RelayConfig::from_env()?;

    // Initialize tracing with configured log level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("pubsub_relay={}", relay_config.log_level).parse()?)
                .add_directive("async_nats=warn".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .json()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        broker = relay_config.broker_kind.as_str(),
        endpoint = %relay_config.broker_endpoint,
        validate_before_publish = relay_config.validate_before_publish,
        "Starting Pub/Sub relay"
    );

    let metrics = Arc::new(RelayMetrics::new());
    info!("Prometheus metrics initialized");

    let connector = connector_from_config(&relay_config)?;

    let audit: Arc<dyn AuditSink> = match relay_config.audit_endpoint.as_deref() {
        Some(endpoint) => {
            info!(endpoint, "Audit forwarding enabled");
            Arc::new(HttpAuditSink::new(endpoint)?)
        }
        None => {
            warn!("No AUDIT_ENDPOINT configured - audit forwarding disabled");
            Arc::new(NoopAuditSink)
        }
    };

    let relay = Relay::new(connector, audit, metrics)
        .with_validate_before_publish(relay_config.validate_before_publish);

    let app = http::router(AppState { relay });
    let addr: SocketAddr = ([0, 0, 0, 0], relay_config.http_port).into();

    info!(port = relay_config.http_port, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "HTTP server error");
        return Err(e.into());
    }

    info!("Relay shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
