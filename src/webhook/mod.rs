//! # Admission Webhook
//!
//! Mutating admission webhook that fills managed Secrets at creation time.
//!
//! The webhook runs on every replica and is never gated on leadership: it only
//! computes a patch for an object that does not exist yet, so there is nothing
//! to race against. It shares the policy and generator with the reconcile sweep.
//!
//! - `mutate`: `/mutate` handler and patch construction
//! - `registration`: `MutatingWebhookConfiguration` restricted to `CREATE`

pub mod mutate;
pub mod registration;

use crate::config::ServerConfig;
use crate::constants::WEBHOOK_PATH;
use crate::runtime::shutdown::ShutdownSignal;
use anyhow::{Context, Result};
use axum::{routing::post, Router};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use mutate::{mutate_handler, mutate_secret, WebhookError};

/// Router serving the admission endpoint
pub fn webhook_router() -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(mutate_handler))
        .layer(TraceLayer::new_for_http())
}

/// Serve the webhook over TLS until shutdown is requested
pub async fn serve(config: &ServerConfig, mut shutdown: ShutdownSignal) -> Result<()> {
    let tls_config = RustlsConfig::from_pem_file(
        &config.webhook_tls_cert_path,
        &config.webhook_tls_key_path,
    )
    .await
    .with_context(|| {
        format!(
            "Failed to load webhook TLS material from {} and {}",
            config.webhook_tls_cert_path.display(),
            config.webhook_tls_key_path.display()
        )
    })?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown.triggered().await;
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
    });

    info!(addr = %addr, path = WEBHOOK_PATH, "Starting admission webhook server");

    axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(webhook_router().into_make_service())
        .await
        .context("Admission webhook server failed")?;

    info!("Admission webhook server stopped");
    Ok(())
}
